//! Permission store and confirmation prompt doubles

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use pbap_core::{
    AccessPermission, AccessRequestKind, ConfirmationPrompt, PbapResult, PermissionStore,
    RemoteId, StoreError,
};
use tracing::debug;

use crate::recorder::{lock, CallLog};

// ----------------------------------------------------------------------------
// Permission Store
// ----------------------------------------------------------------------------

/// In-memory per-device permission table
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    entries: Mutex<HashMap<RemoteId, AccessPermission>>,
    writes: CallLog<(RemoteId, AccessPermission)>,
    fail_writes: AtomicBool,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored decision without recording it as a write
    pub fn preset(&self, remote: RemoteId, permission: AccessPermission) {
        lock(&self.entries).insert(remote, permission);
    }

    /// Every `set` call the coordinator made
    pub fn writes(&self) -> Vec<(RemoteId, AccessPermission)> {
        self.writes.entries()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl PermissionStore for MemoryPermissionStore {
    fn get(&self, remote: &RemoteId) -> AccessPermission {
        lock(&self.entries)
            .get(remote)
            .copied()
            .unwrap_or(AccessPermission::Unknown)
    }

    fn set(&self, remote: &RemoteId, permission: AccessPermission) -> PbapResult<()> {
        self.writes.record((*remote, permission));
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Permission {
                reason: "permission table is read-only".to_string(),
            }
            .into());
        }
        lock(&self.entries).insert(*remote, permission);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Confirmation Prompt
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptCall {
    Requested {
        remote: RemoteId,
        kind: AccessRequestKind,
    },
    Cancelled {
        remote: RemoteId,
        kind: AccessRequestKind,
    },
}

/// Prompt that records requests and cancellations instead of showing UI
#[derive(Debug, Default)]
pub struct RecordingPrompt {
    calls: CallLog<PromptCall>,
}

impl RecordingPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PromptCall> {
        self.calls.entries()
    }

    pub fn request_count(&self) -> usize {
        self.calls
            .count(|call| matches!(call, PromptCall::Requested { .. }))
    }

    pub fn cancel_count(&self) -> usize {
        self.calls
            .count(|call| matches!(call, PromptCall::Cancelled { .. }))
    }
}

impl ConfirmationPrompt for RecordingPrompt {
    fn request_confirmation(&self, remote: &RemoteId, kind: AccessRequestKind) {
        debug!("Prompt requested for {} ({:?})", remote, kind);
        self.calls.record(PromptCall::Requested {
            remote: *remote,
            kind,
        });
    }

    fn cancel_confirmation(&self, remote: &RemoteId, kind: AccessRequestKind) {
        debug!("Prompt cancelled for {} ({:?})", remote, kind);
        self.calls.record(PromptCall::Cancelled {
            remote: *remote,
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_until_set() {
        let store = MemoryPermissionStore::new();
        let remote = RemoteId::new([1, 2, 3, 4, 5, 6]);

        assert_eq!(store.get(&remote), AccessPermission::Unknown);
        store.set(&remote, AccessPermission::Rejected).unwrap();
        assert_eq!(store.get(&remote), AccessPermission::Rejected);
        assert_eq!(store.writes(), vec![(remote, AccessPermission::Rejected)]);
    }

    #[test]
    fn test_failed_write_is_recorded_but_not_applied() {
        let store = MemoryPermissionStore::new();
        let remote = RemoteId::new([1, 2, 3, 4, 5, 6]);
        store.set_fail_writes(true);

        assert!(store.set(&remote, AccessPermission::Allowed).is_err());
        assert_eq!(store.get(&remote), AccessPermission::Unknown);
        assert_eq!(store.writes().len(), 1);
    }
}
