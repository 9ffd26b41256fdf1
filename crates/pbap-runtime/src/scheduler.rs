//! Cancellable delayed events
//!
//! A scheduled event is a sleeping task that enqueues its event into the
//! coordinator inbox when it wakes. Cancelling aborts the task, but an event
//! may already be in the inbox at that point, so every scheduled event carries
//! a [`TimerToken`] and the coordinator asks [`Scheduler::fire`] whether that
//! token is still the live one before acting on it.

use std::collections::HashMap;

use pbap_core::{CoordinatorEvent, EventSender, TimerToken};
use tokio::{task::JoinHandle, time::Duration};
use tracing::debug;

/// Independent timer slots; scheduling a key replaces its previous timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    AuthorizationTimeout,
    WakeRelease,
}

struct ScheduledTimer {
    token: TimerToken,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    events: EventSender,
    next_token: u64,
    live: HashMap<TimerKey, ScheduledTimer>,
}

impl Scheduler {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            next_token: 0,
            live: HashMap::new(),
        }
    }

    /// Deliver the event built by `make` after `delay`, replacing any timer
    /// already scheduled under `key`
    pub fn schedule<F>(&mut self, key: TimerKey, delay: Duration, make: F) -> TimerToken
    where
        F: FnOnce(TimerToken) -> CoordinatorEvent,
    {
        self.cancel(key);

        self.next_token += 1;
        let token = TimerToken(self.next_token);
        let event = make(token);
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if events.send(event).is_err() {
                debug!("Timer {} fired after the coordinator stopped", token);
            }
        });

        debug!("Scheduled {:?} as {} in {:?}", key, token, delay);
        self.live.insert(key, ScheduledTimer { token, handle });
        token
    }

    /// Returns whether a timer was live under `key`
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        match self.live.remove(&key) {
            Some(timer) => {
                timer.handle.abort();
                debug!("Cancelled {:?} ({})", key, timer.token);
                true
            }
            None => false,
        }
    }

    /// Consume a delivered timer event
    ///
    /// Returns `true` exactly once for the live token of `key`; stale or
    /// cancelled tokens return `false`.
    pub fn fire(&mut self, key: TimerKey, token: TimerToken) -> bool {
        match self.live.get(&key) {
            Some(timer) if timer.token == token => {
                self.live.remove(&key);
                true
            }
            _ => {
                debug!("Ignoring stale {:?} timer {}", key, token);
                false
            }
        }
    }

    pub fn is_scheduled(&self, key: TimerKey) -> bool {
        self.live.contains_key(&key)
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.live.drain() {
            timer.handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
