//! Event Coordinator
//!
//! The single actor that owns the connection slot, the authorization gate,
//! the listener, the wake guard and the version tracker. Every trigger
//! (platform callbacks, user replies, timers, worker completions) arrives as
//! a [`CoordinatorEvent`] on one inbox and is handled to completion before the
//! next one is taken, so no two state changes ever interleave.

use std::sync::Arc;

use pbap_core::{
    send_event, AccessRequestKind, AuthorizationOutcome, ConnectionState, CoordinatorEvent,
    EventReceiver, EventSender, LocalIdentity, PbapConfig, PbapResult, RemoteId, ServiceEvent,
    ServiceEventSender, SessionHandle, SessionLayer, TelephonyInfo, TimerToken,
};
use smallvec::SmallVec;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::managers::{
    Admission, AuthorizationGate, ConnectionSlot, ListenerManager, RecomputeRequest, SlotState,
    StartOutcome, VersionTracker, WakeGuard,
};
use crate::scheduler::Scheduler;
use crate::status::{ConnectionStatus, EndpointAddress, StatusSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Everything the coordinator owns, assembled by the service builder
pub struct CoordinatorParts {
    pub config: PbapConfig,
    pub sessions: Arc<dyn SessionLayer>,
    pub telephony: Arc<dyn TelephonyInfo>,
    pub scheduler: Scheduler,
    pub gate: AuthorizationGate,
    pub listener: ListenerManager,
    pub wake: WakeGuard,
    pub version: VersionTracker,
    pub events: EventSender,
    pub service_events: ServiceEventSender,
    pub status: watch::Sender<StatusSnapshot>,
    pub disconnect_lock: Arc<Mutex<()>>,
}

pub struct EventCoordinator {
    config: PbapConfig,
    sessions: Arc<dyn SessionLayer>,
    telephony: Arc<dyn TelephonyInfo>,
    scheduler: Scheduler,
    slot: ConnectionSlot,
    gate: AuthorizationGate,
    listener: ListenerManager,
    wake: WakeGuard,
    version: VersionTracker,
    identity: LocalIdentity,

    events: EventSender,
    service_events: ServiceEventSender,
    status: watch::Sender<StatusSnapshot>,
    disconnect_lock: Arc<Mutex<()>>,
    outbox: SmallVec<[ServiceEvent; 4]>,

    /// A CheckVersion is sitting in the inbox
    check_queued: bool,
    /// Cleared once Shutdown was handled
    running: bool,
}

impl EventCoordinator {
    pub fn new(parts: CoordinatorParts) -> Self {
        Self {
            config: parts.config,
            sessions: parts.sessions,
            telephony: parts.telephony,
            scheduler: parts.scheduler,
            slot: ConnectionSlot::new(),
            gate: parts.gate,
            listener: parts.listener,
            wake: parts.wake,
            version: parts.version,
            identity: LocalIdentity::default(),
            events: parts.events,
            service_events: parts.service_events,
            status: parts.status,
            disconnect_lock: parts.disconnect_lock,
            outbox: SmallVec::new(),
            check_queued: false,
            running: false,
        }
    }

    /// Process the inbox until a Shutdown event is handled
    pub async fn run(mut self, mut inbox: EventReceiver) -> PbapResult<()> {
        info!("Event coordinator starting");
        self.running = true;
        if let Err(e) = self.version.adopt() {
            error!("Failed to load persisted version counters: {}", e);
        }
        self.load_identity();
        self.publish();

        while let Some(event) = inbox.recv().await {
            debug!(event = event.name(), "Processing event");
            let flow = self.handle(event).await;
            self.publish();
            if flow == Flow::Stop {
                break;
            }
        }

        inbox.close();
        info!("Event coordinator stopped");
        Ok(())
    }

    async fn handle(&mut self, event: CoordinatorEvent) -> Flow {
        match event {
            CoordinatorEvent::StartListening => self.start_listening().await,
            CoordinatorEvent::LoadContacts => {
                self.version.request_load();
            }
            CoordinatorEvent::NewConnection { remote, session } => {
                self.new_connection(remote, session).await
            }
            CoordinatorEvent::AuthorizationReply {
                remote,
                kind,
                granted,
                persist,
            } => {
                if kind != AccessRequestKind::Phonebook {
                    debug!("Ignoring {:?} authorization reply for {}", kind, remote);
                    return Flow::Continue;
                }
                if let Some(outcome) =
                    self.gate
                        .on_reply(remote, granted, persist, &mut self.scheduler)
                {
                    self.complete_authorization(remote, outcome).await;
                }
            }
            CoordinatorEvent::AuthorizationCancelled { remote } => {
                if let Some(outcome) = self.gate.on_cancelled(remote, &mut self.scheduler) {
                    self.complete_authorization(remote, outcome).await;
                }
            }
            CoordinatorEvent::AuthorizationTimeout { remote, token } => {
                self.authorization_timeout(remote, token).await
            }
            CoordinatorEvent::AuthChallengeResponse {
                remote,
                session_key,
            } => match self.slot.session_for(remote) {
                Some(session) => self.sessions.auth_key_input(session, &session_key),
                None => warn!("Auth challenge response for {} without a session", remote),
            },
            CoordinatorEvent::AuthChallengeCancelled { remote } => {
                match self.slot.session_for(remote) {
                    Some(session) => self.sessions.auth_cancelled(session),
                    None => warn!("Auth challenge cancel for {} without a session", remote),
                }
            }
            CoordinatorEvent::AcquireWakeResource => match self.wake.acquire(&mut self.scheduler)
            {
                Ok(true) => self.emit(ServiceEvent::WakeLockChanged { held: true }),
                Ok(false) => {}
                Err(e) => error!("Failed to acquire wake lock: {}", e),
            },
            CoordinatorEvent::ReleaseWakeResource { token } => {
                if self.wake.on_countdown_elapsed(token, &mut self.scheduler) {
                    self.emit(ServiceEvent::WakeLockChanged { held: false });
                }
            }
            CoordinatorEvent::Disconnect { remote } => self.disconnect(remote).await,
            CoordinatorEvent::SessionCompleted { session } => self.session_completed(session).await,
            CoordinatorEvent::ContentChanged => self.content_changed(),
            CoordinatorEvent::CheckVersion => {
                self.check_queued = false;
                if self.version.request_recompute() == RecomputeRequest::NotLoaded {
                    debug!("Version check skipped, contacts not loaded");
                }
            }
            CoordinatorEvent::RolloverCounters => {
                let counters = self.version.rollover();
                self.emit(ServiceEvent::VersionCountersChanged(counters));
            }
            CoordinatorEvent::ContactsLoaded(result) => {
                if let Some(total_contacts) = self.version.finish_load(result) {
                    self.emit(ServiceEvent::ContactsLoaded { total_contacts });
                }
            }
            CoordinatorEvent::VersionRecomputed(result) => {
                if let Some(counters) = self.version.finish_recompute(result) {
                    self.emit(ServiceEvent::VersionCountersChanged(counters));
                }
            }
            CoordinatorEvent::AcceptFailed => {
                warn!("Accept failed, restarting listener");
                self.teardown().await;
                self.enqueue(CoordinatorEvent::StartListening);
            }
            CoordinatorEvent::Shutdown => {
                self.shutdown().await;
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    // ------------------------------------------------------------------------
    // Listener
    // ------------------------------------------------------------------------

    async fn start_listening(&mut self) {
        match self.listener.start().await {
            Ok(StartOutcome::Started {
                rfcomm_channel,
                l2cap_psm,
            }) => {
                self.emit(ServiceEvent::ListenerStarted {
                    rfcomm_channel,
                    l2cap_psm,
                });
                match self.version.refresh() {
                    Ok(counters) => self.emit(ServiceEvent::VersionCountersChanged(counters)),
                    Err(e) => error!("Failed to refresh version counters: {}", e),
                }
            }
            Ok(StartOutcome::AlreadyStarted) => {}
            Err(e) => error!("Failed to start listener: {}", e),
        }
    }

    /// Close the session, stop the listener, drop the wake lock and all timers
    async fn teardown(&mut self) {
        let session = self.slot.clear().map(|active| {
            self.outbox.push(ServiceEvent::ConnectionStateChanged {
                remote: active.remote,
                state: ConnectionState::Disconnected,
            });
            active.session
        });
        self.gate.abandon(&mut self.scheduler);

        if self.listener.stop(session, true).await {
            self.emit(ServiceEvent::ListenerStopped);
        }
        if self.wake.release(&mut self.scheduler) {
            self.emit(ServiceEvent::WakeLockChanged { held: false });
        }
        self.scheduler.cancel_all();
    }

    async fn shutdown(&mut self) {
        info!("Shutting down phonebook access server");
        if let Err(e) = self.version.persist() {
            error!("Failed to persist version counters: {}", e);
        }
        self.teardown().await;
        self.version.detach_workers();
        self.running = false;
        self.emit(ServiceEvent::ServiceStopped);
    }

    // ------------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------------

    async fn new_connection(&mut self, remote: RemoteId, session: SessionHandle) {
        if !self.slot.occupy(remote, session) {
            self.sessions.deny(session);
            return;
        }
        info!("Incoming connection from {} ({})", remote, session);
        self.listener.pause();
        self.emit(ServiceEvent::ConnectionStateChanged {
            remote,
            state: ConnectionState::Connecting,
        });

        match self.gate.begin(remote, &mut self.scheduler) {
            Admission::Resolved(outcome) => self.complete_authorization(remote, outcome).await,
            Admission::Prompted => {}
        }
    }

    async fn authorization_timeout(&mut self, remote: RemoteId, token: TimerToken) {
        if let Some(outcome) = self.gate.on_timeout(remote, token, &mut self.scheduler) {
            self.complete_authorization(remote, outcome).await;
        }
    }

    async fn complete_authorization(&mut self, remote: RemoteId, outcome: AuthorizationOutcome) {
        self.emit(ServiceEvent::AuthorizationResolved { remote, outcome });

        let Some(session) = self.slot.session_for(remote) else {
            warn!("Authorization for {} resolved without a session", remote);
            return;
        };

        if outcome.admits() {
            info!("Admitting {} ({})", remote, session);
            self.sessions.admit(session);
            self.slot.set_state(SlotState::Connected);
            self.emit(ServiceEvent::ConnectionStateChanged {
                remote,
                state: ConnectionState::Connected,
            });
        } else {
            info!("Denying {} ({}): {:?}", remote, session, outcome);
            self.sessions.deny(session);
            self.slot.clear();
            self.emit(ServiceEvent::ConnectionStateChanged {
                remote,
                state: ConnectionState::Disconnected,
            });
            self.listener.resume().await;
        }
    }

    async fn disconnect(&mut self, remote: RemoteId) {
        let lock = Arc::clone(&self.disconnect_lock);
        let _guard = lock.lock().await;

        let Some(active) = self.slot.active().copied() else {
            warn!("Disconnect for {} but no connection is active", remote);
            return;
        };
        if active.remote != remote {
            warn!(
                "Disconnect for {} but the active connection is {}",
                remote, active.remote
            );
            return;
        }
        if active.state == SlotState::Disconnecting {
            debug!("Disconnect for {} already in progress", remote);
            return;
        }

        self.gate.discard(remote, &mut self.scheduler);
        info!("Closing {} ({})", remote, active.session);
        self.sessions.close(active.session);
        self.slot.set_state(SlotState::Disconnecting);
    }

    async fn session_completed(&mut self, session: SessionHandle) {
        let Some(active) = self.slot.clear_session(session) else {
            debug!("{} completed after its slot was released", session);
            return;
        };

        self.gate.discard(active.remote, &mut self.scheduler);
        info!("{} ({}) finished", active.remote, session);
        self.emit(ServiceEvent::ConnectionStateChanged {
            remote: active.remote,
            state: ConnectionState::Disconnected,
        });
        self.listener.resume().await;
    }

    // ------------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------------

    fn content_changed(&mut self) {
        if !self.version.is_loaded() {
            debug!("Contact change before initial load, ignoring");
            return;
        }
        if self.check_queued {
            debug!("Version check already queued");
            return;
        }
        self.check_queued = true;
        self.enqueue(CoordinatorEvent::CheckVersion);
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn load_identity(&mut self) {
        let phone_number = self
            .telephony
            .line1_number()
            .filter(|number| !number.trim().is_empty());
        let phone_name = self
            .telephony
            .line1_alpha_tag()
            .filter(|tag| !tag.trim().is_empty())
            .unwrap_or_else(|| self.config.identity.default_local_name.clone());

        debug!("Local identity '{}'", phone_name);
        self.identity = LocalIdentity {
            phone_number,
            phone_name,
        };
    }

    fn enqueue(&self, event: CoordinatorEvent) {
        if let Err(e) = send_event(&self.events, event) {
            error!("Failed to enqueue follow-up event: {}", e);
        }
    }

    fn emit(&mut self, event: ServiceEvent) {
        self.outbox.push(event);
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.running,
            endpoint: self
                .listener
                .endpoint_address()
                .map(|(rfcomm_channel, l2cap_psm)| EndpointAddress {
                    rfcomm_channel,
                    l2cap_psm,
                }),
            connection: self.slot.active().map(|active| ConnectionStatus {
                remote: active.remote,
                state: active.state.into(),
                closing: active.state == SlotState::Disconnecting,
            }),
            authorization_pending: self.gate.pending_remote(),
            wake_held: self.wake.is_held(),
            contacts_loaded: self.version.is_loaded(),
            counters: self.version.counters(),
            identity: self.identity.clone(),
        }
    }

    /// Publish the snapshot, then the service events produced by the last event
    fn publish(&mut self) {
        self.status.send_replace(self.snapshot());
        for event in self.outbox.drain(..) {
            // No subscribers is fine
            let _ = self.service_events.send(event);
        }
    }
}
