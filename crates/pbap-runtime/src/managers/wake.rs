//! Wake guard with a trailing release
//!
//! Protocol traffic keeps the device awake. Each acquisition restarts the
//! release countdown; the lock is released once no acquisition happened for
//! the configured delay.

use std::sync::Arc;

use pbap_core::{CoordinatorEvent, PbapResult, TimerToken, WakeLock, WakeLockProvider};
use tokio::time::Duration;
use tracing::{debug, info};

use crate::scheduler::{Scheduler, TimerKey};

pub struct WakeGuard {
    provider: Arc<dyn WakeLockProvider>,
    tag: String,
    release_delay: Duration,
    held: Option<Box<dyn WakeLock>>,
}

impl WakeGuard {
    pub fn new(provider: Arc<dyn WakeLockProvider>, tag: String, release_delay: Duration) -> Self {
        Self {
            provider,
            tag,
            release_delay,
            held: None,
        }
    }

    /// Hold the lock and (re)start the release countdown
    ///
    /// Returns `true` if the lock was newly acquired, `false` if it was
    /// already held and only the countdown moved.
    pub fn acquire(&mut self, scheduler: &mut Scheduler) -> PbapResult<bool> {
        let newly_acquired = if self.held.is_none() {
            self.held = Some(self.provider.acquire(&self.tag)?);
            info!("Acquired wake lock '{}'", self.tag);
            true
        } else {
            false
        };

        scheduler.schedule(TimerKey::WakeRelease, self.release_delay, |token| {
            CoordinatorEvent::ReleaseWakeResource { token }
        });
        Ok(newly_acquired)
    }

    /// The countdown delivered `token`; releases if it is still current
    pub fn on_countdown_elapsed(&mut self, token: TimerToken, scheduler: &mut Scheduler) -> bool {
        if !scheduler.fire(TimerKey::WakeRelease, token) {
            return false;
        }
        self.release_now()
    }

    /// Release immediately and cancel the countdown; safe to repeat
    pub fn release(&mut self, scheduler: &mut Scheduler) -> bool {
        scheduler.cancel(TimerKey::WakeRelease);
        self.release_now()
    }

    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    fn release_now(&mut self) -> bool {
        match self.held.take() {
            Some(lock) => {
                lock.release();
                info!("Released wake lock '{}'", self.tag);
                true
            }
            None => {
                debug!("Wake lock already released");
                false
            }
        }
    }
}
