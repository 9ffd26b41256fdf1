//! Service Builder API
//!
//! Assembles a [`PbapService`] from its collaborators. Every collaborator is
//! required; the clock defaults to the system time.

use std::sync::Arc;

use pbap_core::{
    create_event_channel, create_service_event_channel, ConfirmationPrompt, ContactStore,
    PbapConfig, PbapError, PbapResult, PermissionStore, SdpRegistrar, SessionLayer,
    SystemTimeSource, TelephonyInfo, TimeSource, TransportListener, VersionStore,
    WakeLockProvider,
};
use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::coordinator::{CoordinatorParts, EventCoordinator};
use crate::managers::{AuthorizationGate, ListenerManager, VersionTracker, WakeGuard};
use crate::scheduler::Scheduler;
use crate::service::PbapService;
use crate::status::StatusSnapshot;

// ----------------------------------------------------------------------------
// Service Builder
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct ServiceBuilder {
    config: PbapConfig,
    permissions: Option<Arc<dyn PermissionStore>>,
    prompt: Option<Arc<dyn ConfirmationPrompt>>,
    registrar: Option<Arc<dyn SdpRegistrar>>,
    transport: Option<Arc<dyn TransportListener>>,
    sessions: Option<Arc<dyn SessionLayer>>,
    wake_locks: Option<Arc<dyn WakeLockProvider>>,
    contacts: Option<Arc<dyn ContactStore>>,
    versions: Option<Arc<dyn VersionStore>>,
    telephony: Option<Arc<dyn TelephonyInfo>>,
    time: Option<Arc<dyn TimeSource>>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: PbapConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_permission_store(mut self, store: Arc<dyn PermissionStore>) -> Self {
        self.permissions = Some(store);
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn ConfirmationPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_sdp_registrar(mut self, registrar: Arc<dyn SdpRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn TransportListener>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_session_layer(mut self, sessions: Arc<dyn SessionLayer>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_wake_locks(mut self, provider: Arc<dyn WakeLockProvider>) -> Self {
        self.wake_locks = Some(provider);
        self
    }

    pub fn with_contact_store(mut self, contacts: Arc<dyn ContactStore>) -> Self {
        self.contacts = Some(contacts);
        self
    }

    pub fn with_version_store(mut self, versions: Arc<dyn VersionStore>) -> Self {
        self.versions = Some(versions);
        self
    }

    pub fn with_telephony(mut self, telephony: Arc<dyn TelephonyInfo>) -> Self {
        self.telephony = Some(telephony);
        self
    }

    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = Some(time);
        self
    }

    /// Validate the configuration and wire up the coordinator
    ///
    /// The coordinator does not run until the service is started.
    pub fn build(self) -> PbapResult<PbapService> {
        self.config.validate()?;

        let permissions = required(self.permissions, "permission store")?;
        let prompt = required(self.prompt, "confirmation prompt")?;
        let registrar = required(self.registrar, "SDP registrar")?;
        let transport = required(self.transport, "transport listener")?;
        let sessions = required(self.sessions, "session layer")?;
        let wake_locks = required(self.wake_locks, "wake lock provider")?;
        let contacts = required(self.contacts, "contact store")?;
        let versions = required(self.versions, "version store")?;
        let telephony = required(self.telephony, "telephony info")?;
        let time = self
            .time
            .unwrap_or_else(|| Arc::new(SystemTimeSource) as Arc<dyn TimeSource>);

        let config = self.config;
        let (events, inbox) = create_event_channel();
        let (service_events, _) = create_service_event_channel(&config.runtime);

        let version = VersionTracker::new(contacts, versions, time, events.clone());
        let (status, status_rx) = watch::channel(StatusSnapshot::idle(version.counters()));
        let disconnect_lock = Arc::new(Mutex::new(()));

        let coordinator = EventCoordinator::new(CoordinatorParts {
            scheduler: Scheduler::new(events.clone()),
            gate: AuthorizationGate::new(
                permissions,
                prompt,
                config.authorization.user_confirm_timeout,
            ),
            listener: ListenerManager::new(
                transport,
                registrar,
                Arc::clone(&sessions),
                config.sdp.clone(),
            ),
            wake: WakeGuard::new(
                wake_locks,
                config.wake.lock_tag.clone(),
                config.wake.release_delay,
            ),
            version,
            sessions,
            telephony,
            events: events.clone(),
            service_events: service_events.clone(),
            status,
            disconnect_lock: Arc::clone(&disconnect_lock),
            config: config.clone(),
        });

        info!("Built phonebook access server '{}'", config.sdp.service_name);
        Ok(PbapService::new(
            coordinator,
            inbox,
            config.runtime.shutdown_timeout,
            events,
            service_events,
            status_rx,
            disconnect_lock,
        ))
    }
}

fn required<T: ?Sized>(value: Option<Arc<T>>, name: &str) -> PbapResult<Arc<T>> {
    value.ok_or_else(|| PbapError::config_error(format!("missing {}", name)))
}
