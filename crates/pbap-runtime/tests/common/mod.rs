//! Shared setup for the coordinator integration tests

#![allow(dead_code)]

use pbap_harness::Harness;
use pbap_runtime::{
    PbapConfig, PbapEventSender, PbapQueryHandle, PbapService, ProfileLifecycle, RemoteId,
    ServiceBuilder, ServiceEvent, ServiceEventReceiver,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, timeout, Duration};

pub fn remote(n: u8) -> RemoteId {
    RemoteId::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, n])
}

pub fn build_service(harness: &Harness, config: PbapConfig) -> PbapService {
    ServiceBuilder::new()
        .with_config(config)
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
        .expect("Failed to build service")
}

pub struct TestService {
    pub service: PbapService,
    pub harness: Harness,
    pub sender: PbapEventSender,
    pub queries: PbapQueryHandle,
    pub notifications: ServiceEventReceiver,
    rollovers: u64,
}

impl TestService {
    /// Start the service and wait until it listens and has loaded contacts
    pub async fn start(harness: Harness, config: PbapConfig) -> Self {
        let mut service = build_service(&harness, config);
        let notifications = service.subscribe();
        let sender = service.event_sender();
        let queries = service.query_handle();
        service.start().await.expect("Failed to start service");

        let mut test = Self {
            service,
            harness,
            sender,
            queries,
            notifications,
            rollovers: 0,
        };
        test.expect_event(|e| matches!(e, ServiceEvent::ListenerStarted { .. }))
            .await;
        test.expect_event(|e| matches!(e, ServiceEvent::ContactsLoaded { .. }))
            .await;
        test
    }

    /// Wait for the next notification matching `predicate`, skipping others
    pub async fn expect_event(
        &mut self,
        predicate: impl Fn(&ServiceEvent) -> bool,
    ) -> ServiceEvent {
        let wait = async {
            loop {
                match self.notifications.recv().await {
                    Ok(event) if predicate(&event) => return event,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("service event channel closed"),
                }
            }
        };
        timeout(Duration::from_secs(60), wait)
            .await
            .expect("Timed out waiting for service event")
    }

    /// Return once every event sent before this call has been processed
    ///
    /// Relies on the inbox being FIFO: the rollover is handled after
    /// everything queued ahead of it.
    pub async fn barrier(&mut self) {
        self.rollovers += 1;
        let expected = self.rollovers;
        self.sender.notify_rollover().expect("Failed to send rollover");
        self.expect_event(move |e| {
            matches!(e, ServiceEvent::VersionCountersChanged(c) if c.primary == expected)
        })
        .await;
    }

    pub async fn stop(mut self) -> Harness {
        self.service.stop().await.expect("Failed to stop service");
        self.harness
    }
}

/// Poll `condition` in real time until it holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let wait = async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    };
    timeout(Duration::from_secs(5), wait)
        .await
        .expect("Condition not reached in time");
}
