//! Listening endpoint and discovery record management
//!
//! The endpoint and its discovery record are created and removed together:
//! a record is published only while an endpoint is open.

use std::sync::Arc;

use pbap_core::{
    ListenerEndpoint, PbapResult, SdpConfig, SdpHandle, SdpRecord, SdpRegistrar, SessionHandle,
    SessionLayer, TransportListener,
};
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Listener Manager
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { rfcomm_channel: u8, l2cap_psm: u16 },
    AlreadyStarted,
}

struct Registration {
    endpoint: Box<dyn ListenerEndpoint>,
    record: SdpHandle,
}

pub struct ListenerManager {
    transport: Arc<dyn TransportListener>,
    registrar: Arc<dyn SdpRegistrar>,
    sessions: Arc<dyn SessionLayer>,
    sdp: SdpConfig,
    registration: Option<Registration>,
    paused: bool,
}

impl ListenerManager {
    pub fn new(
        transport: Arc<dyn TransportListener>,
        registrar: Arc<dyn SdpRegistrar>,
        sessions: Arc<dyn SessionLayer>,
        sdp: SdpConfig,
    ) -> Self {
        Self {
            transport,
            registrar,
            sessions,
            sdp,
            registration: None,
            paused: false,
        }
    }

    /// Open the endpoint and publish its discovery record
    pub async fn start(&mut self) -> PbapResult<StartOutcome> {
        if self.registration.is_some() {
            warn!("Listener already started");
            return Ok(StartOutcome::AlreadyStarted);
        }

        let mut endpoint = self.transport.open().await?;
        let record = SdpRecord {
            service_name: self.sdp.service_name.clone(),
            rfcomm_channel: endpoint.rfcomm_channel(),
            l2cap_psm: endpoint.l2cap_psm(),
            version: self.sdp.version,
            supported_repositories: self.sdp.supported_repositories,
            supported_features: self.sdp.supported_features,
        };

        let handle = match self.registrar.register(&record).await {
            Ok(handle) => handle,
            Err(e) => {
                endpoint.shutdown(true).await;
                return Err(e);
            }
        };

        info!(
            "Listening on channel {} / psm {:#06x}, record {}",
            record.rfcomm_channel, record.l2cap_psm, handle
        );
        self.registration = Some(Registration {
            endpoint,
            record: handle,
        });
        self.paused = false;

        Ok(StartOutcome::Started {
            rfcomm_channel: record.rfcomm_channel,
            l2cap_psm: record.l2cap_psm,
        })
    }

    /// Close `active_session`, remove the record and close the endpoint
    ///
    /// Returns whether a registration was torn down.
    pub async fn stop(&mut self, active_session: Option<SessionHandle>, force: bool) -> bool {
        if let Some(session) = active_session {
            debug!("Closing {} before stopping the listener", session);
            self.sessions.close(session);
        }

        let Some(mut registration) = self.registration.take() else {
            debug!("Listener already stopped");
            return false;
        };

        if !self.registrar.unregister(registration.record).await {
            warn!("Failed to remove discovery record {}", registration.record);
        }
        registration.endpoint.shutdown(force).await;
        self.paused = false;

        info!("Listener stopped");
        true
    }

    /// The endpoint handed out its single connection
    pub fn pause(&mut self) {
        if self.registration.is_some() {
            self.paused = true;
        }
    }

    /// Re-arm the endpoint if it was paused; returns whether it was
    pub async fn resume(&mut self) -> bool {
        if !self.paused {
            return false;
        }
        self.paused = false;

        match self.registration.as_mut() {
            Some(registration) => {
                registration.endpoint.prepare_for_new_connection().await;
                debug!("Listener ready for a new connection");
                true
            }
            None => false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.registration.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn record_handle(&self) -> Option<SdpHandle> {
        self.registration.as_ref().map(|r| r.record)
    }

    /// Channel and PSM of the open endpoint
    pub fn endpoint_address(&self) -> Option<(u8, u16)> {
        self.registration
            .as_ref()
            .map(|r| (r.endpoint.rfcomm_channel(), r.endpoint.l2cap_psm()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbap_harness::{
        ListenerCall, MemorySdpRegistrar, MockTransportListener, RecordingSessionLayer,
        SessionCall,
    };

    struct Fixture {
        manager: ListenerManager,
        transport: Arc<MockTransportListener>,
        registrar: Arc<MemorySdpRegistrar>,
        sessions: Arc<RecordingSessionLayer>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(MockTransportListener::default());
        let registrar = Arc::new(MemorySdpRegistrar::new());
        let sessions = Arc::new(RecordingSessionLayer::new());
        Fixture {
            manager: ListenerManager::new(
                transport.clone(),
                registrar.clone(),
                sessions.clone(),
                SdpConfig::default(),
            ),
            transport,
            registrar,
            sessions,
        }
    }

    #[tokio::test]
    async fn test_start_publishes_record_with_endpoint_address() {
        let mut f = fixture();

        let outcome = f.manager.start().await.unwrap();

        let (channel, psm) = f.manager.endpoint_address().unwrap();
        assert_eq!(
            outcome,
            StartOutcome::Started {
                rfcomm_channel: channel,
                l2cap_psm: psm
            }
        );
        let records = f.registrar.active_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rfcomm_channel, channel);
        assert_eq!(records[0].l2cap_psm, psm);
        assert_eq!(records[0].service_name, "OBEX Phonebook Access Server");
        assert_eq!(records[0].supported_features, 0x021F);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let mut f = fixture();
        f.manager.start().await.unwrap();

        assert_eq!(f.manager.start().await.unwrap(), StartOutcome::AlreadyStarted);
        assert_eq!(f.transport.open_attempts(), 1);
        assert_eq!(f.registrar.registration_count(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_leaves_nothing_registered() {
        let mut f = fixture();
        f.transport.fail_next_opens(1);

        assert!(f.manager.start().await.is_err());
        assert!(!f.manager.is_started());
        assert!(f.registrar.active_records().is_empty());

        assert!(f.manager.start().await.is_ok());
    }

    #[tokio::test]
    async fn test_registration_failure_closes_endpoint() {
        let mut f = fixture();
        f.registrar.set_fail_register(true);

        assert!(f.manager.start().await.is_err());
        assert!(!f.manager.is_started());
        assert_eq!(f.transport.open_endpoints(), 0);
    }

    #[tokio::test]
    async fn test_stop_order_and_idempotence() {
        let mut f = fixture();
        f.manager.start().await.unwrap();
        let handle = f.manager.record_handle().unwrap();

        assert!(f.manager.stop(Some(SessionHandle::new(4)), true).await);
        assert_eq!(f.sessions.calls(), vec![SessionCall::Close(SessionHandle::new(4))]);
        assert_eq!(f.registrar.removals(), vec![handle]);
        assert_eq!(f.transport.open_endpoints(), 0);
        assert!(f.manager.record_handle().is_none());

        assert!(!f.manager.stop(None, true).await);
        assert_eq!(f.registrar.removals().len(), 1);
    }

    #[tokio::test]
    async fn test_record_removal_failure_still_clears_handle() {
        let mut f = fixture();
        f.manager.start().await.unwrap();
        f.registrar.set_fail_unregister(true);

        assert!(f.manager.stop(None, false).await);
        assert!(!f.manager.is_started());
        assert!(f
            .transport
            .calls()
            .contains(&ListenerCall::Shutdown { block: false }));
    }

    #[tokio::test]
    async fn test_resume_only_after_pause() {
        let mut f = fixture();
        f.manager.start().await.unwrap();

        assert!(!f.manager.resume().await);
        f.manager.pause();
        assert!(f.manager.resume().await);
        assert!(!f.manager.resume().await);
        assert_eq!(f.transport.rearm_count(), 1);
    }
}
