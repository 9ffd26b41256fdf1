//! Phonebook Access Server Core
//!
//! This crate provides the stable API definitions for the phonebook access
//! server coordinator: identity and state types, the version counter model,
//! the events the coordinator consumes and emits, the collaborator contracts
//! and the configuration.
//!
//! The coordinator itself lives in `pbap-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod caller;
pub mod channel;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use caller::{CallerContext, Permission};
pub use channel::{
    create_event_channel, create_service_event_channel, send_event, ContactLoad,
    CoordinatorEvent, EventReceiver, EventSender, ServiceEvent, ServiceEventReceiver,
    ServiceEventSender, TimerToken, VersionDelta,
};
pub use collaborators::{
    ConfirmationPrompt, ContactStore, ListenerEndpoint, PermissionStore, SdpHandle, SdpRecord,
    SdpRegistrar, SessionLayer, TelephonyInfo, TransportListener, VersionStore, WakeLock,
    WakeLockProvider,
};
pub use config::{
    AuthorizationConfig, IdentityConfig, PbapConfig, RuntimeConfig, SdpConfig, WakeConfig,
};
pub use errors::{ListenerError, PbapError, PbapResult, SdpError, StoreError};
pub use types::{
    AccessPermission, AccessRequestKind, AuthorizationOutcome, ConnectionState, ContactId,
    ContactIndex, ContactRecord, ContactSummary, FieldCounts, LocalIdentity, RemoteId,
    SessionHandle, SystemTimeSource, TimeSource, Timestamp, VersionCounters,
};
