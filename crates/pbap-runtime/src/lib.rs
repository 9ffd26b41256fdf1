//! Phonebook Access Server Runtime
//!
//! This crate contains the lifecycle coordinator for a single-connection
//! phonebook access server:
//! - `EventCoordinator`: the actor that serializes every trigger
//! - `managers`: authorization gate, connection slot, listener, wake guard
//!   and version tracker
//! - `Scheduler`: cancellable delayed events with generation tokens
//! - `PbapService`: lifecycle, notification entry points and query surface
//!
//! `pbap-core` provides the domain types and collaborator traits this crate
//! drives.

pub mod builder;
pub mod coordinator;
pub mod managers;
pub mod scheduler;
pub mod service;
pub mod status;

pub use builder::ServiceBuilder;
pub use coordinator::{CoordinatorParts, EventCoordinator};
pub use managers::*;
pub use scheduler::{Scheduler, TimerKey};
pub use service::{PbapEventSender, PbapQueryHandle, PbapService, ProfileLifecycle};
pub use status::{ConnectionStatus, EndpointAddress, StatusSnapshot};

// Re-export core types for convenience
pub use pbap_core::{
    AccessPermission, AccessRequestKind, AuthorizationOutcome, CallerContext, ConnectionState,
    LocalIdentity, PbapConfig, PbapError, PbapResult, Permission, RemoteId, ServiceEvent,
    ServiceEventReceiver, SessionHandle, VersionCounters,
};
