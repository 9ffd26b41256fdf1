//! Bundle of recording collaborators sharing one lifetime

use std::sync::Arc;

use pbap_core::{ContactRecord, VersionCounters};

use crate::{
    CountingWakeLockProvider, MemoryContactStore, MemoryPermissionStore, MemorySdpRegistrar,
    MemoryVersionStore, MockListenerConfig, MockTransportListener, RecordingPrompt,
    RecordingSessionLayer, StaticTelephony,
};

/// Every collaborator the coordinator needs, each kept behind an `Arc` so
/// the test can inspect it while the service owns a clone
#[derive(Debug, Clone)]
pub struct Harness {
    pub permissions: Arc<MemoryPermissionStore>,
    pub prompt: Arc<RecordingPrompt>,
    pub sdp: Arc<MemorySdpRegistrar>,
    pub listener: Arc<MockTransportListener>,
    pub sessions: Arc<RecordingSessionLayer>,
    pub wake_locks: Arc<CountingWakeLockProvider>,
    pub contacts: Arc<MemoryContactStore>,
    pub versions: Arc<MemoryVersionStore>,
    pub telephony: Arc<StaticTelephony>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self {
            permissions: Arc::new(MemoryPermissionStore::new()),
            prompt: Arc::new(RecordingPrompt::new()),
            sdp: Arc::new(MemorySdpRegistrar::new()),
            listener: Arc::new(MockTransportListener::new(MockListenerConfig::default())),
            sessions: Arc::new(RecordingSessionLayer::new()),
            wake_locks: Arc::new(CountingWakeLockProvider::new()),
            contacts: Arc::new(MemoryContactStore::new()),
            versions: Arc::new(MemoryVersionStore::new()),
            telephony: Arc::new(StaticTelephony::new()),
        }
    }

    pub fn with_contacts(mut self, records: impl IntoIterator<Item = ContactRecord>) -> Self {
        self.contacts = Arc::new(MemoryContactStore::with_records(records));
        self
    }

    pub fn with_persisted_counters(mut self, counters: VersionCounters) -> Self {
        self.versions = Arc::new(MemoryVersionStore::with_counters(counters));
        self
    }

    pub fn with_telephony(mut self, telephony: StaticTelephony) -> Self {
        self.telephony = Arc::new(telephony);
        self
    }

    pub fn with_listener(mut self, config: MockListenerConfig) -> Self {
        self.listener = Arc::new(MockTransportListener::new(config));
        self
    }
}
