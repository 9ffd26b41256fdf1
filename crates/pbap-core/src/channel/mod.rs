//! Channel Module
//!
//! - `communication`: coordinator inbox events and outbound service events
//! - `utils`: channel type aliases and constructors

pub mod communication;
pub mod utils;

pub use communication::{ContactLoad, CoordinatorEvent, ServiceEvent, TimerToken, VersionDelta};

pub use utils::{
    create_event_channel, create_service_event_channel, send_event, EventReceiver, EventSender,
    ServiceEventReceiver, ServiceEventSender,
};
