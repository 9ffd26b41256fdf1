//! Coordinator Communication Protocol Types
//!
//! Every trigger the coordinator reacts to is a [`CoordinatorEvent`] on its
//! single inbox; everything it announces is a [`ServiceEvent`] on the
//! outbound broadcast.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::errors::PbapResult;
use crate::types::{
    AccessRequestKind, AuthorizationOutcome, ConnectionState, ContactIndex, FieldCounts, RemoteId,
    SessionHandle, Timestamp, VersionCounters,
};

// ----------------------------------------------------------------------------
// Timer Tokens
// ----------------------------------------------------------------------------

/// Generation token of a scheduled event; a fired event whose token is no
/// longer current is ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Worker Results
// ----------------------------------------------------------------------------

/// Result of a background contact load
#[derive(Debug, Clone, PartialEq)]
pub struct ContactLoad {
    pub index: ContactIndex,
    pub field_counts: FieldCounts,
}

/// Result of a background version recompute
///
/// Carries an increment rather than an absolute counter so that a rollover
/// processed while the worker ran is preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionDelta {
    pub secondary_increment: u64,
    pub index: ContactIndex,
    pub field_counts: FieldCounts,
    pub last_updated: Timestamp,
    pub added: usize,
    pub deleted: usize,
    pub updated: usize,
}

impl VersionDelta {
    pub fn is_change(&self) -> bool {
        self.secondary_increment > 0
    }
}

// ----------------------------------------------------------------------------
// Coordinator Events: external triggers, timers, workers → Coordinator
// ----------------------------------------------------------------------------

/// Events processed by the coordinator, strictly one at a time
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// Open the listening endpoint and publish the discovery record
    StartListening,
    /// Build the contact baseline on a worker
    LoadContacts,
    /// The transport accepted a connection
    NewConnection {
        remote: RemoteId,
        session: SessionHandle,
    },
    /// The user answered the confirmation prompt
    AuthorizationReply {
        remote: RemoteId,
        kind: AccessRequestKind,
        granted: bool,
        persist: bool,
    },
    /// The user dismissed the confirmation prompt
    AuthorizationCancelled { remote: RemoteId },
    /// The confirmation prompt was not answered in time
    AuthorizationTimeout { remote: RemoteId, token: TimerToken },
    /// Session key entered for an OBEX authentication challenge
    AuthChallengeResponse { remote: RemoteId, session_key: String },
    /// Session key entry for an OBEX authentication challenge was cancelled
    AuthChallengeCancelled { remote: RemoteId },
    /// Protocol traffic is happening; keep the device awake
    AcquireWakeResource,
    /// The wake release countdown elapsed
    ReleaseWakeResource { token: TimerToken },
    /// The link to `remote` went away or a disconnect was requested
    Disconnect { remote: RemoteId },
    /// The session layer finished with `session`
    SessionCompleted { session: SessionHandle },
    /// The contact store reported a change
    ContentChanged,
    /// Recompute the version counters
    CheckVersion,
    /// Secondary → 0, primary + 1
    RolloverCounters,
    /// Contact load worker finished
    ContactsLoaded(PbapResult<ContactLoad>),
    /// Version recompute worker finished
    VersionRecomputed(PbapResult<VersionDelta>),
    /// The accept loop of the listening endpoint died
    AcceptFailed,
    /// Persist state, tear everything down and stop processing
    Shutdown,
}

impl CoordinatorEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            CoordinatorEvent::StartListening => "StartListening",
            CoordinatorEvent::LoadContacts => "LoadContacts",
            CoordinatorEvent::NewConnection { .. } => "NewConnection",
            CoordinatorEvent::AuthorizationReply { .. } => "AuthorizationReply",
            CoordinatorEvent::AuthorizationCancelled { .. } => "AuthorizationCancelled",
            CoordinatorEvent::AuthorizationTimeout { .. } => "AuthorizationTimeout",
            CoordinatorEvent::AuthChallengeResponse { .. } => "AuthChallengeResponse",
            CoordinatorEvent::AuthChallengeCancelled { .. } => "AuthChallengeCancelled",
            CoordinatorEvent::AcquireWakeResource => "AcquireWakeResource",
            CoordinatorEvent::ReleaseWakeResource { .. } => "ReleaseWakeResource",
            CoordinatorEvent::Disconnect { .. } => "Disconnect",
            CoordinatorEvent::SessionCompleted { .. } => "SessionCompleted",
            CoordinatorEvent::ContentChanged => "ContentChanged",
            CoordinatorEvent::CheckVersion => "CheckVersion",
            CoordinatorEvent::RolloverCounters => "RolloverCounters",
            CoordinatorEvent::ContactsLoaded(_) => "ContactsLoaded",
            CoordinatorEvent::VersionRecomputed(_) => "VersionRecomputed",
            CoordinatorEvent::AcceptFailed => "AcceptFailed",
            CoordinatorEvent::Shutdown => "Shutdown",
        }
    }
}

// ----------------------------------------------------------------------------
// Service Events: Coordinator → host process
// ----------------------------------------------------------------------------

/// Notifications broadcast by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServiceEvent {
    ListenerStarted { rfcomm_channel: u8, l2cap_psm: u16 },
    ListenerStopped,
    ConnectionStateChanged {
        remote: RemoteId,
        state: ConnectionState,
    },
    AuthorizationResolved {
        remote: RemoteId,
        outcome: AuthorizationOutcome,
    },
    WakeLockChanged { held: bool },
    ContactsLoaded { total_contacts: u64 },
    VersionCountersChanged(VersionCounters),
    ServiceStopped,
}
