//! Channel utilities for the coordinator
//!
//! The inbox is unbounded so that notification sources (timers, worker
//! threads, platform callbacks) never block on a busy coordinator; the
//! outbound broadcast drops the oldest events for slow subscribers.

use tokio::sync::{broadcast, mpsc};

use crate::channel::communication::{CoordinatorEvent, ServiceEvent};
use crate::config::RuntimeConfig;
use crate::errors::{PbapError, PbapResult};

pub type EventSender = mpsc::UnboundedSender<CoordinatorEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<CoordinatorEvent>;
pub type ServiceEventSender = broadcast::Sender<ServiceEvent>;
pub type ServiceEventReceiver = broadcast::Receiver<ServiceEvent>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create the coordinator inbox (many producers → coordinator)
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Create the outbound broadcast (coordinator → many subscribers)
pub fn create_service_event_channel(
    config: &RuntimeConfig,
) -> (ServiceEventSender, ServiceEventReceiver) {
    broadcast::channel(config.event_buffer_size)
}

/// Enqueue an event, mapping a closed inbox to a channel error
pub fn send_event(sender: &EventSender, event: CoordinatorEvent) -> PbapResult<()> {
    let name = event.name();
    sender
        .send(event)
        .map_err(|_| PbapError::channel_error(format!("coordinator inbox closed, dropped {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_event_fails_after_receiver_dropped() {
        let (sender, receiver) = create_event_channel();
        assert!(send_event(&sender, CoordinatorEvent::ContentChanged).is_ok());

        drop(receiver);
        let err = send_event(&sender, CoordinatorEvent::CheckVersion).unwrap_err();
        assert!(matches!(err, PbapError::Channel { .. }));
        assert!(err.to_string().contains("CheckVersion"));
    }

    #[tokio::test]
    async fn test_service_events_fan_out() {
        let (sender, mut first) = create_service_event_channel(&RuntimeConfig::default());
        let mut second = sender.subscribe();

        sender.send(ServiceEvent::ListenerStopped).unwrap();

        assert_eq!(first.recv().await.unwrap(), ServiceEvent::ListenerStopped);
        assert_eq!(second.recv().await.unwrap(), ServiceEvent::ListenerStopped);
    }
}
