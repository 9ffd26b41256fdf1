//! Listener, discovery record and session layer doubles
//!
//! Each double records the calls it receives and supports failure injection
//! so recovery paths can be driven deterministically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pbap_core::{
    ListenerEndpoint, ListenerError, PbapResult, SdpError, SdpHandle, SdpRecord, SdpRegistrar,
    SessionHandle, SessionLayer, TransportListener,
};
use tracing::{debug, info};

use crate::recorder::{lock, CallLog};

// ----------------------------------------------------------------------------
// Transport Listener
// ----------------------------------------------------------------------------

/// Channel and PSM handed out by the mock listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockListenerConfig {
    pub rfcomm_channel: u8,
    pub l2cap_psm: u16,
}

impl Default for MockListenerConfig {
    fn default() -> Self {
        Self {
            rfcomm_channel: 19,
            l2cap_psm: 0x1025,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerCall {
    OpenFailed,
    Opened { rfcomm_channel: u8, l2cap_psm: u16 },
    PreparedForNewConnection,
    Shutdown { block: bool },
}

/// Listener whose endpoints exist only in memory
#[derive(Debug, Default)]
pub struct MockTransportListener {
    config: MockListenerConfig,
    calls: CallLog<ListenerCall>,
    open_attempts: AtomicU64,
    failures_remaining: AtomicU32,
    open_endpoints: Arc<AtomicU32>,
}

impl MockTransportListener {
    pub fn new(config: MockListenerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Make the next `count` calls to `open` fail
    pub fn fail_next_opens(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn open_attempts(&self) -> u64 {
        self.open_attempts.load(Ordering::SeqCst)
    }

    /// Endpoints opened and not yet shut down
    pub fn open_endpoints(&self) -> u32 {
        self.open_endpoints.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ListenerCall> {
        self.calls.entries()
    }

    pub fn rearm_count(&self) -> usize {
        self.calls
            .count(|call| matches!(call, ListenerCall::PreparedForNewConnection))
    }
}

#[async_trait]
impl TransportListener for MockTransportListener {
    async fn open(&self) -> PbapResult<Box<dyn ListenerEndpoint>> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            self.calls.record(ListenerCall::OpenFailed);
            return Err(ListenerError::OpenFailed {
                reason: "injected open failure".to_string(),
            }
            .into());
        }

        self.open_endpoints.fetch_add(1, Ordering::SeqCst);
        self.calls.record(ListenerCall::Opened {
            rfcomm_channel: self.config.rfcomm_channel,
            l2cap_psm: self.config.l2cap_psm,
        });
        info!(
            "Mock endpoint open on channel {} / psm {:#06x}",
            self.config.rfcomm_channel, self.config.l2cap_psm
        );

        Ok(Box::new(MockEndpoint {
            config: self.config,
            calls: self.calls.clone(),
            open_endpoints: Arc::clone(&self.open_endpoints),
            closed: false,
        }))
    }
}

struct MockEndpoint {
    config: MockListenerConfig,
    calls: CallLog<ListenerCall>,
    open_endpoints: Arc<AtomicU32>,
    closed: bool,
}

#[async_trait]
impl ListenerEndpoint for MockEndpoint {
    fn rfcomm_channel(&self) -> u8 {
        self.config.rfcomm_channel
    }

    fn l2cap_psm(&self) -> u16 {
        self.config.l2cap_psm
    }

    async fn prepare_for_new_connection(&mut self) {
        self.calls.record(ListenerCall::PreparedForNewConnection);
    }

    async fn shutdown(&mut self, block: bool) {
        self.calls.record(ListenerCall::Shutdown { block });
        if !self.closed {
            self.closed = true;
            self.open_endpoints.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ----------------------------------------------------------------------------
// Discovery Record Registrar
// ----------------------------------------------------------------------------

/// Registrar keeping published records in a map
#[derive(Debug)]
pub struct MemorySdpRegistrar {
    records: Mutex<BTreeMap<u32, SdpRecord>>,
    next_handle: AtomicU32,
    registrations: AtomicU64,
    removals: CallLog<SdpHandle>,
    fail_register: AtomicBool,
    fail_unregister: AtomicBool,
}

impl Default for MemorySdpRegistrar {
    fn default() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            next_handle: AtomicU32::new(0x0001_0001),
            registrations: AtomicU64::new(0),
            removals: CallLog::new(),
            fail_register: AtomicBool::new(false),
            fail_unregister: AtomicBool::new(false),
        }
    }
}

impl MemorySdpRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_unregister(&self, fail: bool) {
        self.fail_unregister.store(fail, Ordering::SeqCst);
    }

    /// Records currently published
    pub fn active_records(&self) -> Vec<SdpRecord> {
        lock(&self.records).values().cloned().collect()
    }

    pub fn registration_count(&self) -> u64 {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn removals(&self) -> Vec<SdpHandle> {
        self.removals.entries()
    }
}

#[async_trait]
impl SdpRegistrar for MemorySdpRegistrar {
    async fn register(&self, record: &SdpRecord) -> PbapResult<SdpHandle> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(SdpError::RegistrationFailed {
                reason: "injected registration failure".to_string(),
            }
            .into());
        }

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        lock(&self.records).insert(handle, record.clone());
        self.registrations.fetch_add(1, Ordering::SeqCst);
        debug!("Registered '{}' as {:#010x}", record.service_name, handle);
        Ok(SdpHandle(handle))
    }

    async fn unregister(&self, handle: SdpHandle) -> bool {
        self.removals.record(handle);
        if self.fail_unregister.load(Ordering::SeqCst) {
            return false;
        }
        lock(&self.records).remove(&handle.0).is_some()
    }
}

// ----------------------------------------------------------------------------
// Session Layer
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Admit(SessionHandle),
    Deny(SessionHandle),
    Close(SessionHandle),
    AuthKey { session: SessionHandle, key: String },
    AuthCancelled(SessionHandle),
}

/// Session layer that only records what it was told
#[derive(Debug, Default)]
pub struct RecordingSessionLayer {
    calls: CallLog<SessionCall>,
}

impl RecordingSessionLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.entries()
    }

    pub fn admitted(&self) -> Vec<SessionHandle> {
        self.calls
            .entries()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::Admit(session) => Some(session),
                _ => None,
            })
            .collect()
    }

    pub fn denied(&self) -> Vec<SessionHandle> {
        self.calls
            .entries()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::Deny(session) => Some(session),
                _ => None,
            })
            .collect()
    }

    pub fn closed(&self) -> Vec<SessionHandle> {
        self.calls
            .entries()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::Close(session) => Some(session),
                _ => None,
            })
            .collect()
    }
}

impl SessionLayer for RecordingSessionLayer {
    fn admit(&self, session: SessionHandle) {
        self.calls.record(SessionCall::Admit(session));
    }

    fn deny(&self, session: SessionHandle) {
        self.calls.record(SessionCall::Deny(session));
    }

    fn close(&self, session: SessionHandle) {
        self.calls.record(SessionCall::Close(session));
    }

    fn auth_key_input(&self, session: SessionHandle, key: &str) {
        self.calls.record(SessionCall::AuthKey {
            session,
            key: key.to_string(),
        });
    }

    fn auth_cancelled(&self, session: SessionHandle) {
        self.calls.record(SessionCall::AuthCancelled(session));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SdpRecord {
        SdpRecord {
            service_name: "OBEX Phonebook Access Server".to_string(),
            rfcomm_channel: 19,
            l2cap_psm: 0x1025,
            version: 0x0102,
            supported_repositories: 0x01,
            supported_features: 0x021F,
        }
    }

    #[tokio::test]
    async fn test_open_failure_injection() {
        let listener = MockTransportListener::default();
        listener.fail_next_opens(1);

        assert!(listener.open().await.is_err());
        let mut endpoint = listener.open().await.unwrap();
        assert_eq!(listener.open_attempts(), 2);
        assert_eq!(listener.open_endpoints(), 1);

        endpoint.shutdown(true).await;
        endpoint.shutdown(true).await;
        assert_eq!(listener.open_endpoints(), 0);
    }

    #[tokio::test]
    async fn test_registrar_tracks_active_records() {
        let registrar = MemorySdpRegistrar::new();
        let handle = registrar.register(&record()).await.unwrap();
        assert_eq!(registrar.active_records().len(), 1);

        assert!(registrar.unregister(handle).await);
        assert!(!registrar.unregister(handle).await);
        assert!(registrar.active_records().is_empty());
        assert_eq!(registrar.removals(), vec![handle, handle]);
    }
}
