//! Phonebook Access Server Harness
//!
//! In-memory implementations of every collaborator contract in `pbap-core`.
//! They record the calls the coordinator makes and allow failures to be
//! injected, which is what the runtime tests and the `pbapd` simulator drive
//! the coordinator with.

pub mod authorization;
pub mod contacts;
pub mod persistence;
pub mod recorder;
pub mod resources;
pub mod transport;

mod test_harness;

pub use authorization::{MemoryPermissionStore, PromptCall, RecordingPrompt};
pub use contacts::{contact, MemoryContactStore};
pub use persistence::{FileVersionStore, MemoryVersionStore};
pub use recorder::CallLog;
pub use resources::{CountingWakeLockProvider, StaticTelephony};
pub use test_harness::Harness;
pub use transport::{
    ListenerCall, MemorySdpRegistrar, MockListenerConfig, MockTransportListener,
    RecordingSessionLayer, SessionCall,
};
