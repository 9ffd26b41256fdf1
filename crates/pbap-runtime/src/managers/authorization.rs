//! Authorization gate for incoming connections
//!
//! A connection is admitted or denied from the stored per-device decision
//! when there is one. Otherwise the user is prompted and a timeout is armed;
//! the first of reply, cancellation or timeout resolves the request and every
//! later one is ignored.

use std::sync::Arc;

use pbap_core::{
    AccessPermission, AccessRequestKind, AuthorizationOutcome, ConfirmationPrompt,
    CoordinatorEvent, PermissionStore, RemoteId, TimerToken,
};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::scheduler::{Scheduler, TimerKey};

/// Result of consulting the gate for a new connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The stored decision settled the request without a prompt
    Resolved(AuthorizationOutcome),
    /// The user was prompted; the outcome arrives later
    Prompted,
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    remote: RemoteId,
}

pub struct AuthorizationGate {
    permissions: Arc<dyn PermissionStore>,
    prompt: Arc<dyn ConfirmationPrompt>,
    timeout: Duration,
    pending: Option<PendingRequest>,
}

impl AuthorizationGate {
    pub fn new(
        permissions: Arc<dyn PermissionStore>,
        prompt: Arc<dyn ConfirmationPrompt>,
        timeout: Duration,
    ) -> Self {
        Self {
            permissions,
            prompt,
            timeout,
            pending: None,
        }
    }

    /// Consult the permission store for `remote`, prompting if it has no answer
    pub fn begin(&mut self, remote: RemoteId, scheduler: &mut Scheduler) -> Admission {
        match self.permissions.get(&remote) {
            AccessPermission::Allowed => {
                debug!("{} is trusted, admitting without prompt", remote);
                Admission::Resolved(AuthorizationOutcome::Allowed)
            }
            AccessPermission::Rejected => {
                debug!("{} is rejected, denying without prompt", remote);
                Admission::Resolved(AuthorizationOutcome::Rejected)
            }
            AccessPermission::Unknown => {
                if let Some(previous) = self.pending.take() {
                    warn!(
                        "Replacing unresolved authorization request for {}",
                        previous.remote
                    );
                }

                self.prompt
                    .request_confirmation(&remote, AccessRequestKind::Phonebook);
                scheduler.schedule(TimerKey::AuthorizationTimeout, self.timeout, |token| {
                    CoordinatorEvent::AuthorizationTimeout { remote, token }
                });
                self.pending = Some(PendingRequest { remote });
                info!(
                    "Waiting up to {:?} for the user to authorize {}",
                    self.timeout, remote
                );
                Admission::Prompted
            }
        }
    }

    /// The user answered the prompt
    pub fn on_reply(
        &mut self,
        remote: RemoteId,
        granted: bool,
        persist: bool,
        scheduler: &mut Scheduler,
    ) -> Option<AuthorizationOutcome> {
        self.take_pending(remote, "reply")?;
        scheduler.cancel(TimerKey::AuthorizationTimeout);

        let (outcome, permission) = if granted {
            (AuthorizationOutcome::Allowed, AccessPermission::Allowed)
        } else {
            (AuthorizationOutcome::Rejected, AccessPermission::Rejected)
        };

        if persist {
            if let Err(e) = self.permissions.set(&remote, permission) {
                error!("Failed to persist {:?} for {}: {}", permission, remote, e);
            }
        }
        Some(outcome)
    }

    /// The user dismissed the prompt
    pub fn on_cancelled(
        &mut self,
        remote: RemoteId,
        scheduler: &mut Scheduler,
    ) -> Option<AuthorizationOutcome> {
        self.take_pending(remote, "cancellation")?;
        scheduler.cancel(TimerKey::AuthorizationTimeout);
        Some(AuthorizationOutcome::Cancelled)
    }

    /// A scheduled timeout was delivered
    pub fn on_timeout(
        &mut self,
        remote: RemoteId,
        token: TimerToken,
        scheduler: &mut Scheduler,
    ) -> Option<AuthorizationOutcome> {
        if !scheduler.fire(TimerKey::AuthorizationTimeout, token) {
            return None;
        }
        self.take_pending(remote, "timeout")?;

        info!("User did not answer for {}, cancelling prompt", remote);
        self.prompt
            .cancel_confirmation(&remote, AccessRequestKind::Phonebook);
        Some(AuthorizationOutcome::TimedOut)
    }

    /// Drop the request for `remote` without resolving it (remote went away)
    pub fn discard(&mut self, remote: RemoteId, scheduler: &mut Scheduler) -> bool {
        match self.pending {
            Some(pending) if pending.remote == remote => {
                self.pending = None;
                scheduler.cancel(TimerKey::AuthorizationTimeout);
                debug!("Discarded authorization request for {}", remote);
                true
            }
            _ => false,
        }
    }

    /// Forget any outstanding request; the prompt is left as is
    pub fn abandon(&mut self, scheduler: &mut Scheduler) {
        if let Some(pending) = self.pending.take() {
            debug!("Abandoning authorization request for {}", pending.remote);
        }
        scheduler.cancel(TimerKey::AuthorizationTimeout);
    }

    pub fn pending_remote(&self) -> Option<RemoteId> {
        self.pending.map(|p| p.remote)
    }

    pub fn is_pending_for(&self, remote: RemoteId) -> bool {
        self.pending_remote() == Some(remote)
    }

    fn take_pending(&mut self, remote: RemoteId, trigger: &str) -> Option<PendingRequest> {
        match self.pending {
            Some(pending) if pending.remote == remote => self.pending.take(),
            Some(pending) => {
                warn!(
                    "Ignoring {} for {}: request pending for {}",
                    trigger, remote, pending.remote
                );
                None
            }
            None => {
                warn!(
                    "Ignoring {} for {}: no authorization pending",
                    trigger, remote
                );
                None
            }
        }
    }
}
