//! Shared call log used by every recording collaborator

use std::sync::{Arc, Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a panicking test poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Append-only, cloneable log of calls received by a collaborator
#[derive(Debug)]
pub struct CallLog<T> {
    entries: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for CallLog<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for CallLog<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> CallLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: T) {
        lock(&self.entries).push(entry);
    }

    /// Copy of every entry recorded so far
    pub fn entries(&self) -> Vec<T> {
        lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, predicate: impl Fn(&T) -> bool) -> usize {
        lock(&self.entries).iter().filter(|e| predicate(e)).count()
    }

    pub fn last(&self) -> Option<T> {
        lock(&self.entries).last().cloned()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let log = CallLog::new();
        let other = log.clone();

        log.record(1u32);
        other.record(2u32);

        assert_eq!(log.entries(), vec![1, 2]);
        assert_eq!(other.count(|v| *v > 1), 1);
        assert_eq!(log.last(), Some(2));
    }
}
