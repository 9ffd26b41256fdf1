//! Version counter stores: in-memory and bincode file

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use pbap_core::{PbapResult, StoreError, VersionCounters, VersionStore};
use tracing::debug;

use crate::recorder::lock;

// ----------------------------------------------------------------------------
// Memory Store
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    stored: Mutex<Option<VersionCounters>>,
    saves: AtomicU64,
    fail_saves: AtomicBool,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated as if a previous run had saved `counters`
    pub fn with_counters(counters: VersionCounters) -> Self {
        Self {
            stored: Mutex::new(Some(counters)),
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Option<VersionCounters> {
        *lock(&self.stored)
    }

    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl VersionStore for MemoryVersionStore {
    fn load(&self) -> PbapResult<Option<VersionCounters>> {
        Ok(*lock(&self.stored))
    }

    fn save(&self, counters: &VersionCounters) -> PbapResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Save {
                reason: "injected save failure".to_string(),
            }
            .into());
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *lock(&self.stored) = Some(*counters);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// File Store
// ----------------------------------------------------------------------------

/// Counters persisted as a bincode blob, replaced atomically on save
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    path: PathBuf,
}

impl FileVersionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VersionStore for FileVersionStore {
    fn load(&self) -> PbapResult<Option<VersionCounters>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path).map_err(|e| StoreError::Load {
            reason: format!("{}: {}", self.path.display(), e),
        })?;
        let counters = bincode::deserialize(&bytes).map_err(|e| StoreError::Load {
            reason: format!("{}: {}", self.path.display(), e),
        })?;
        Ok(Some(counters))
    }

    fn save(&self, counters: &VersionCounters) -> PbapResult<()> {
        let bytes = bincode::serialize(counters).map_err(|e| StoreError::Save {
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Save {
                reason: format!("{}: {}", parent.display(), e),
            })?;
        }

        let staging = self.path.with_extension("tmp");
        fs::write(&staging, bytes)
            .and_then(|_| fs::rename(&staging, &self.path))
            .map_err(|e| StoreError::Save {
                reason: format!("{}: {}", self.path.display(), e),
            })?;

        debug!(
            "Saved version counters {}.{} to {}",
            counters.primary,
            counters.secondary,
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbap_core::Timestamp;

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("counters.bin");

        let store = FileVersionStore::new(&path);
        assert!(store.load().unwrap().is_none());

        let mut counters = VersionCounters::fresh(Timestamp::new(5_000));
        counters.primary = 3;
        counters.secondary = 9;
        store.save(&counters).unwrap();

        let reopened = FileVersionStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(counters));
    }

    #[test]
    fn test_corrupt_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.bin");
        fs::write(&path, b"\x01").unwrap();

        let err = FileVersionStore::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("Failed to load"));
    }

    #[test]
    fn test_memory_store_failure_keeps_previous_value() {
        let counters = VersionCounters::fresh(Timestamp::new(1));
        let store = MemoryVersionStore::with_counters(counters);
        store.set_fail_saves(true);

        let mut next = counters;
        next.secondary = 1;
        assert!(store.save(&next).is_err());
        assert_eq!(store.stored(), Some(counters));
        assert_eq!(store.save_count(), 0);
    }
}
