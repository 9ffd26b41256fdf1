//! Published coordinator state
//!
//! The coordinator republishes a [`StatusSnapshot`] after every event it
//! processes. Readers get a consistent view of one point in time but no
//! guarantee that it still holds when they act on it.

use pbap_core::{ConnectionState, LocalIdentity, RemoteId, VersionCounters};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub rfcomm_channel: u8,
    pub l2cap_psm: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub remote: RemoteId,
    pub state: ConnectionState,
    /// A close was requested and the session has not completed yet
    pub closing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// The coordinator is processing events
    pub running: bool,
    pub endpoint: Option<EndpointAddress>,
    pub connection: Option<ConnectionStatus>,
    pub authorization_pending: Option<RemoteId>,
    pub wake_held: bool,
    pub contacts_loaded: bool,
    pub counters: VersionCounters,
    pub identity: LocalIdentity,
}

impl StatusSnapshot {
    /// Snapshot of a coordinator that has not started yet
    pub fn idle(counters: VersionCounters) -> Self {
        Self {
            running: false,
            endpoint: None,
            connection: None,
            authorization_pending: None,
            wake_held: false,
            contacts_loaded: false,
            counters,
            identity: LocalIdentity::default(),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn connection_state(&self, remote: RemoteId) -> ConnectionState {
        match self.connection {
            Some(status) if status.remote == remote => status.state,
            _ => ConnectionState::Disconnected,
        }
    }
}
