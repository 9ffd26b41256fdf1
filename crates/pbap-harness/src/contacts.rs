//! Mutable in-memory contact store
//!
//! Snapshots are taken from worker threads, so the store can be held closed
//! to keep a load or recompute in flight while a test queues more events.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use pbap_core::{ContactId, ContactRecord, ContactStore, PbapError, PbapResult, Timestamp};

use crate::recorder::lock;

/// Build a contact record with a digest derived from its contents
pub fn contact(
    id: ContactId,
    last_updated_ms: u64,
    total_fields: u32,
    service_fields: u32,
) -> ContactRecord {
    ContactRecord {
        id,
        last_updated: Timestamp::new(last_updated_ms),
        total_fields,
        service_fields,
        digest: id
            .wrapping_mul(31)
            .wrapping_add(u64::from(total_fields) << 16)
            .wrapping_add(u64::from(service_fields)),
    }
}

#[derive(Debug, Default)]
pub struct MemoryContactStore {
    records: Mutex<BTreeMap<ContactId, ContactRecord>>,
    snapshots: AtomicU64,
    fail_next: AtomicBool,
    held: Mutex<bool>,
    released: Condvar,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ContactRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.upsert(record);
        }
        store
    }

    pub fn upsert(&self, record: ContactRecord) {
        lock(&self.records).insert(record.id, record);
    }

    pub fn remove(&self, id: ContactId) -> Option<ContactRecord> {
        lock(&self.records).remove(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of snapshots started (held snapshots included)
    pub fn snapshot_count(&self) -> u64 {
        self.snapshots.load(Ordering::SeqCst)
    }

    pub fn fail_next_snapshot(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Block every snapshot until [`Self::release`] is called
    pub fn hold(&self) {
        *lock(&self.held) = true;
    }

    pub fn release(&self) {
        *lock(&self.held) = false;
        self.released.notify_all();
    }
}

impl ContactStore for MemoryContactStore {
    fn snapshot(&self) -> PbapResult<Vec<ContactRecord>> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);

        let mut held = lock(&self.held);
        while *held {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        drop(held);

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PbapError::contact_query("contacts provider unavailable"));
        }
        Ok(lock(&self.records).values().cloned().collect())
    }
}
