//! Service lifecycle, notification entry points and query surface
//!
//! [`PbapService`] owns the coordinator task. Notifications from the
//! surrounding process go through a [`PbapEventSender`]; status reads and
//! the external disconnect go through a [`PbapQueryHandle`]. Both handles
//! are cheap to clone and may outlive the service; once it stopped their
//! notifications fail with a channel error and their reads return the empty
//! answer.

use std::sync::Arc;

use async_trait::async_trait;
use pbap_core::{
    send_event, AccessRequestKind, CallerContext, ConnectionState, CoordinatorEvent,
    EventReceiver, EventSender, LocalIdentity, PbapError, PbapResult, Permission, RemoteId,
    ServiceEventReceiver, ServiceEventSender, SessionHandle, VersionCounters,
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::coordinator::EventCoordinator;
use crate::status::StatusSnapshot;

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

/// Start/stop contract shared with the host's other profile services
#[async_trait]
pub trait ProfileLifecycle {
    async fn start(&mut self) -> PbapResult<()>;
    async fn stop(&mut self) -> PbapResult<()>;
}

/// A phonebook access server built by [`ServiceBuilder`](crate::ServiceBuilder)
pub struct PbapService {
    pending: Option<(EventCoordinator, EventReceiver)>,
    task: Option<JoinHandle<PbapResult<()>>>,
    shutdown_timeout: std::time::Duration,
    events: EventSender,
    service_events: ServiceEventSender,
    status: watch::Receiver<StatusSnapshot>,
    disconnect_lock: Arc<Mutex<()>>,
}

impl PbapService {
    pub(crate) fn new(
        coordinator: EventCoordinator,
        inbox: EventReceiver,
        shutdown_timeout: std::time::Duration,
        events: EventSender,
        service_events: ServiceEventSender,
        status: watch::Receiver<StatusSnapshot>,
        disconnect_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            pending: Some((coordinator, inbox)),
            task: None,
            shutdown_timeout,
            events,
            service_events,
            status,
            disconnect_lock,
        }
    }

    pub fn event_sender(&self) -> PbapEventSender {
        PbapEventSender {
            events: self.events.clone(),
        }
    }

    pub fn query_handle(&self) -> PbapQueryHandle {
        PbapQueryHandle {
            events: self.events.clone(),
            status: self.status.clone(),
            disconnect_lock: Arc::clone(&self.disconnect_lock),
        }
    }

    /// Receive outbound service events from now on
    pub fn subscribe(&self) -> ServiceEventReceiver {
        self.service_events.subscribe()
    }

    /// Latest published coordinator state
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// Watch channel carrying every published snapshot
    pub fn status_watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

#[async_trait]
impl ProfileLifecycle for PbapService {
    /// Spawn the coordinator, open the listener and load contacts
    ///
    /// Starting a running service is a no-op. A stopped service cannot be
    /// restarted; build a new one.
    async fn start(&mut self) -> PbapResult<()> {
        if self.task.is_some() {
            warn!("Phonebook access server already started");
            return Ok(());
        }
        let Some((coordinator, inbox)) = self.pending.take() else {
            return Err(PbapError::config_error(
                "service was stopped and cannot be restarted",
            ));
        };

        info!("Starting phonebook access server");
        self.task = Some(tokio::spawn(coordinator.run(inbox)));
        send_event(&self.events, CoordinatorEvent::StartListening)?;
        send_event(&self.events, CoordinatorEvent::LoadContacts)?;
        Ok(())
    }

    /// Shut the coordinator down, waiting up to the configured timeout
    async fn stop(&mut self) -> PbapResult<()> {
        let Some(mut task) = self.task.take() else {
            debug!("Phonebook access server not running");
            self.pending = None;
            return Ok(());
        };

        if send_event(&self.events, CoordinatorEvent::Shutdown).is_err() {
            debug!("Coordinator inbox already closed");
        }

        match timeout(self.shutdown_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PbapError::task_failed(format!(
                "coordinator task failed: {}",
                e
            ))),
            Err(_) => {
                warn!(
                    "Coordinator did not stop within {:?}, aborting",
                    self.shutdown_timeout
                );
                task.abort();
                Err(PbapError::task_failed("coordinator shutdown timed out"))
            }
        }
    }
}

impl Drop for PbapService {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Notification Entry Points
// ----------------------------------------------------------------------------

/// Typed entry points for notifications from the surrounding process
#[derive(Debug, Clone)]
pub struct PbapEventSender {
    events: EventSender,
}

impl PbapEventSender {
    pub fn notify_connection_accepted(
        &self,
        remote: RemoteId,
        session: SessionHandle,
    ) -> PbapResult<()> {
        self.send(CoordinatorEvent::NewConnection { remote, session })
    }

    pub fn notify_authorization_reply(
        &self,
        remote: RemoteId,
        kind: AccessRequestKind,
        granted: bool,
        persist: bool,
    ) -> PbapResult<()> {
        self.send(CoordinatorEvent::AuthorizationReply {
            remote,
            kind,
            granted,
            persist,
        })
    }

    pub fn notify_authorization_cancelled(&self, remote: RemoteId) -> PbapResult<()> {
        self.send(CoordinatorEvent::AuthorizationCancelled { remote })
    }

    pub fn notify_transport_disconnected(&self, remote: RemoteId) -> PbapResult<()> {
        self.send(CoordinatorEvent::Disconnect { remote })
    }

    pub fn notify_session_completed(&self, session: SessionHandle) -> PbapResult<()> {
        self.send(CoordinatorEvent::SessionCompleted { session })
    }

    pub fn notify_contacts_changed(&self) -> PbapResult<()> {
        self.send(CoordinatorEvent::ContentChanged)
    }

    pub fn notify_accept_failed(&self) -> PbapResult<()> {
        self.send(CoordinatorEvent::AcceptFailed)
    }

    /// The session layer is about to do protocol work
    pub fn notify_wake_acquire(&self) -> PbapResult<()> {
        self.send(CoordinatorEvent::AcquireWakeResource)
    }

    pub fn notify_rollover(&self) -> PbapResult<()> {
        self.send(CoordinatorEvent::RolloverCounters)
    }

    pub fn notify_auth_challenge_response(
        &self,
        remote: RemoteId,
        session_key: impl Into<String>,
    ) -> PbapResult<()> {
        self.send(CoordinatorEvent::AuthChallengeResponse {
            remote,
            session_key: session_key.into(),
        })
    }

    pub fn notify_auth_challenge_cancelled(&self, remote: RemoteId) -> PbapResult<()> {
        self.send(CoordinatorEvent::AuthChallengeCancelled { remote })
    }

    fn send(&self, event: CoordinatorEvent) -> PbapResult<()> {
        send_event(&self.events, event)
    }
}

// ----------------------------------------------------------------------------
// Query Surface
// ----------------------------------------------------------------------------

/// Read-mostly view of the service for platform callers
#[derive(Debug, Clone)]
pub struct PbapQueryHandle {
    events: EventSender,
    status: watch::Receiver<StatusSnapshot>,
    disconnect_lock: Arc<Mutex<()>>,
}

impl PbapQueryHandle {
    pub fn connection_state(
        &self,
        caller: &CallerContext,
        remote: RemoteId,
    ) -> PbapResult<ConnectionState> {
        caller.enforce(Permission::Bluetooth)?;
        Ok(self
            .visible_snapshot(caller)
            .map_or(ConnectionState::Disconnected, |snapshot| {
                snapshot.connection_state(remote)
            }))
    }

    /// The remote holding the slot, whatever its state
    pub fn connected_devices(&self, caller: &CallerContext) -> PbapResult<Vec<RemoteId>> {
        caller.enforce(Permission::Bluetooth)?;
        Ok(self
            .visible_snapshot(caller)
            .and_then(|snapshot| snapshot.connection)
            .map(|connection| vec![connection.remote])
            .unwrap_or_default())
    }

    /// The slot remote if its state is one of `states`
    pub fn devices_matching(
        &self,
        caller: &CallerContext,
        states: &[ConnectionState],
    ) -> PbapResult<Vec<RemoteId>> {
        caller.enforce(Permission::Bluetooth)?;
        Ok(self
            .visible_snapshot(caller)
            .and_then(|snapshot| snapshot.connection)
            .filter(|connection| states.contains(&connection.state))
            .map(|connection| vec![connection.remote])
            .unwrap_or_default())
    }

    /// Ask the coordinator to close the connection to `remote`
    ///
    /// Returns whether a disconnect was enqueued, which only happens when
    /// `remote` holds the connection.
    pub async fn disconnect(&self, caller: &CallerContext, remote: RemoteId) -> PbapResult<bool> {
        caller.enforce(Permission::BluetoothAdmin)?;

        let _guard = self.disconnect_lock.lock().await;
        let Some(snapshot) = self.visible_snapshot(caller) else {
            return Ok(false);
        };
        if snapshot.connection.map(|c| c.remote) != Some(remote) {
            debug!("Disconnect for {} which does not hold the connection", remote);
            return Ok(false);
        }

        send_event(&self.events, CoordinatorEvent::Disconnect { remote })?;
        Ok(true)
    }

    pub fn local_identity(&self) -> LocalIdentity {
        self.status.borrow().identity.clone()
    }

    pub fn version_counters(&self) -> VersionCounters {
        self.status.borrow().counters
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// The current snapshot, or `None` when the caller gets the empty answer
    fn visible_snapshot(&self, caller: &CallerContext) -> Option<StatusSnapshot> {
        if !caller.active_user {
            warn!("Query from a non-active user");
            return None;
        }
        let snapshot = self.status.borrow().clone();
        snapshot.running.then_some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceBuilder;
    use pbap_core::PbapConfig;
    use pbap_harness::Harness;
    use tokio_test::{assert_pending, assert_ready, task};

    fn service(harness: &Harness) -> PbapService {
        ServiceBuilder::new()
            .with_config(PbapConfig::testing())
            .with_permission_store(harness.permissions.clone())
            .with_prompt(harness.prompt.clone())
            .with_sdp_registrar(harness.sdp.clone())
            .with_transport(harness.listener.clone())
            .with_session_layer(harness.sessions.clone())
            .with_wake_locks(harness.wake_locks.clone())
            .with_contact_store(harness.contacts.clone())
            .with_version_store(harness.versions.clone())
            .with_telephony(harness.telephony.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_disconnect_waits_for_coordinator_lock() {
        let harness = Harness::new();
        let service = service(&harness);
        let queries = service.query_handle();
        let caller = CallerContext::privileged();

        let guard = Arc::clone(&service.disconnect_lock).lock_owned().await;
        let mut disconnect = task::spawn(queries.disconnect(&caller, RemoteId::new([1; 6])));
        assert_pending!(disconnect.poll());

        drop(guard);
        assert!(disconnect.is_woken());
        let enqueued = assert_ready!(disconnect.poll()).unwrap();
        assert!(!enqueued);
    }

    #[test]
    fn test_notifications_fail_once_service_is_gone() {
        let harness = Harness::new();
        let service = service(&harness);
        let sender = service.event_sender();
        assert!(sender.notify_contacts_changed().is_ok());

        drop(service);
        let err = sender.notify_contacts_changed().unwrap_err();
        assert!(matches!(err, PbapError::Channel { .. }));
    }
}
