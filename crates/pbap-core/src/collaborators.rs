//! Contracts of the external collaborators
//!
//! The coordinator only ever talks to the outside world through these traits.
//! Implementations wrap the platform (permission database, pairing UI, SDP
//! server, RFCOMM/L2CAP sockets, power manager, contacts provider) or, in
//! tests, record the calls they receive.

use async_trait::async_trait;
use core::fmt;
use serde::{Deserialize, Serialize};

use crate::errors::PbapResult;
use crate::types::{
    AccessPermission, AccessRequestKind, ContactRecord, RemoteId, SessionHandle, VersionCounters,
};

// ----------------------------------------------------------------------------
// Authorization
// ----------------------------------------------------------------------------

/// Per-device phonebook access decisions that outlive a connection
pub trait PermissionStore: Send + Sync {
    fn get(&self, remote: &RemoteId) -> AccessPermission;
    fn set(&self, remote: &RemoteId, permission: AccessPermission) -> PbapResult<()>;
}

/// The user-facing confirmation dialog
pub trait ConfirmationPrompt: Send + Sync {
    fn request_confirmation(&self, remote: &RemoteId, kind: AccessRequestKind);
    fn cancel_confirmation(&self, remote: &RemoteId, kind: AccessRequestKind);
}

// ----------------------------------------------------------------------------
// Discovery Record
// ----------------------------------------------------------------------------

/// Handle returned by the discovery service for a published record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SdpHandle(pub u32);

impl fmt::Display for SdpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Parameters of the phonebook server discovery record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpRecord {
    pub service_name: String,
    pub rfcomm_channel: u8,
    pub l2cap_psm: u16,
    pub version: u16,
    pub supported_repositories: u8,
    pub supported_features: u32,
}

#[async_trait]
pub trait SdpRegistrar: Send + Sync {
    async fn register(&self, record: &SdpRecord) -> PbapResult<SdpHandle>;
    /// Returns `false` if the record could not be removed
    async fn unregister(&self, handle: SdpHandle) -> bool;
}

// ----------------------------------------------------------------------------
// Transport Listener
// ----------------------------------------------------------------------------

/// An open listening endpoint (RFCOMM channel plus L2CAP PSM)
#[async_trait]
pub trait ListenerEndpoint: Send {
    fn rfcomm_channel(&self) -> u8;
    fn l2cap_psm(&self) -> u16;
    /// Re-arm the accept loop after the single allowed connection finished
    async fn prepare_for_new_connection(&mut self);
    /// Close the sockets; `block` waits for the accept threads to exit
    async fn shutdown(&mut self, block: bool);
}

/// Opens listening endpoints
#[async_trait]
pub trait TransportListener: Send + Sync {
    async fn open(&self) -> PbapResult<Box<dyn ListenerEndpoint>>;
}

// ----------------------------------------------------------------------------
// Session Layer
// ----------------------------------------------------------------------------

/// The protocol session that serves an accepted connection
pub trait SessionLayer: Send + Sync {
    fn admit(&self, session: SessionHandle);
    fn deny(&self, session: SessionHandle);
    fn close(&self, session: SessionHandle);
    /// Session key typed by the user for an OBEX authentication challenge
    fn auth_key_input(&self, session: SessionHandle, key: &str);
    fn auth_cancelled(&self, session: SessionHandle);
}

// ----------------------------------------------------------------------------
// Wake Lock
// ----------------------------------------------------------------------------

/// A held wake lock; dropping it without `release` leaks the reservation
pub trait WakeLock: Send {
    fn release(self: Box<Self>);
}

pub trait WakeLockProvider: Send + Sync {
    fn acquire(&self, tag: &str) -> PbapResult<Box<dyn WakeLock>>;
}

// ----------------------------------------------------------------------------
// Contact Store and Persistence
// ----------------------------------------------------------------------------

/// Read-only aggregate view of the contact store; called from worker threads
pub trait ContactStore: Send + Sync {
    fn snapshot(&self) -> PbapResult<Vec<ContactRecord>>;
}

/// Persistence of the version counters across restarts
pub trait VersionStore: Send + Sync {
    fn load(&self) -> PbapResult<Option<VersionCounters>>;
    fn save(&self, counters: &VersionCounters) -> PbapResult<()>;
}

// ----------------------------------------------------------------------------
// Telephony
// ----------------------------------------------------------------------------

pub trait TelephonyInfo: Send + Sync {
    fn line1_number(&self) -> Option<String>;
    fn line1_alpha_tag(&self) -> Option<String>;
}
