//! Wake lock and telephony doubles

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use pbap_core::{PbapError, PbapResult, TelephonyInfo, WakeLock, WakeLockProvider};

use crate::recorder::lock;

// ----------------------------------------------------------------------------
// Wake Locks
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct WakeCounters {
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Provider counting acquisitions and releases
#[derive(Debug, Default)]
pub struct CountingWakeLockProvider {
    counters: Arc<WakeCounters>,
    last_tag: Mutex<Option<String>>,
    fail_acquire: AtomicBool,
}

impl CountingWakeLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire_count(&self) -> u64 {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> u64 {
        self.counters.released.load(Ordering::SeqCst)
    }

    /// Locks acquired and not yet released
    pub fn held(&self) -> u64 {
        self.acquire_count() - self.release_count()
    }

    pub fn last_tag(&self) -> Option<String> {
        lock(&self.last_tag).clone()
    }

    pub fn set_fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }
}

impl WakeLockProvider for CountingWakeLockProvider {
    fn acquire(&self, tag: &str) -> PbapResult<Box<dyn WakeLock>> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(PbapError::wake_lock("power service refused the lock"));
        }
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_tag) = Some(tag.to_string());
        Ok(Box::new(CountingWakeLock {
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct CountingWakeLock {
    counters: Arc<WakeCounters>,
}

impl WakeLock for CountingWakeLock {
    fn release(self: Box<Self>) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Telephony
// ----------------------------------------------------------------------------

/// Fixed line-1 number and alpha tag
#[derive(Debug, Clone, Default)]
pub struct StaticTelephony {
    number: Option<String>,
    alpha_tag: Option<String>,
}

impl StaticTelephony {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }

    pub fn with_alpha_tag(mut self, tag: impl Into<String>) -> Self {
        self.alpha_tag = Some(tag.into());
        self
    }
}

impl TelephonyInfo for StaticTelephony {
    fn line1_number(&self) -> Option<String> {
        self.number.clone()
    }

    fn line1_alpha_tag(&self) -> Option<String> {
        self.alpha_tag.clone()
    }
}
