//! Stateful managers owned by the event coordinator
//!
//! Each manager holds one concern of the server lifecycle. None of them is
//! shared: the coordinator owns them and calls into them from its single
//! event loop, passing the scheduler where a manager arms or cancels timers.

pub mod authorization;
pub mod listener;
pub mod slot;
pub mod version;
pub mod wake;

pub use authorization::{Admission, AuthorizationGate};
pub use listener::{ListenerManager, StartOutcome};
pub use slot::{ActiveConnection, ConnectionSlot, SlotState};
pub use version::{build_index, diff_contacts, RecomputeRequest, VersionTracker};
pub use wake::WakeGuard;
