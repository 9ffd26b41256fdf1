//! Single connection slot
//!
//! The server serves one remote at a time. The slot is the only place a
//! session handle lives; it is filled on accept and emptied when the session
//! is denied or completes.

use pbap_core::{ConnectionState, RemoteId, SessionHandle};
use tracing::warn;

/// Lifecycle of the occupied slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Authorization pending
    Connecting,
    /// Session admitted
    Connected,
    /// Close requested, waiting for the session layer to finish
    Disconnecting,
}

impl From<SlotState> for ConnectionState {
    fn from(state: SlotState) -> Self {
        match state {
            SlotState::Connecting => ConnectionState::Connecting,
            SlotState::Connected | SlotState::Disconnecting => ConnectionState::Connected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveConnection {
    pub remote: RemoteId,
    pub session: SessionHandle,
    pub state: SlotState,
}

#[derive(Debug, Default)]
pub struct ConnectionSlot {
    active: Option<ActiveConnection>,
}

impl ConnectionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill the slot; refuses if it is already occupied
    pub fn occupy(&mut self, remote: RemoteId, session: SessionHandle) -> bool {
        if let Some(active) = &self.active {
            warn!(
                "Slot held by {} ({}), refusing {} ({})",
                active.remote, active.session, remote, session
            );
            return false;
        }
        self.active = Some(ActiveConnection {
            remote,
            session,
            state: SlotState::Connecting,
        });
        true
    }

    pub fn active(&self) -> Option<&ActiveConnection> {
        self.active.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_none()
    }

    pub fn remote(&self) -> Option<RemoteId> {
        self.active.map(|a| a.remote)
    }

    pub fn session(&self) -> Option<SessionHandle> {
        self.active.map(|a| a.session)
    }

    /// Session of the slot if it belongs to `remote`
    pub fn session_for(&self, remote: RemoteId) -> Option<SessionHandle> {
        self.active
            .filter(|a| a.remote == remote)
            .map(|a| a.session)
    }

    pub fn set_state(&mut self, state: SlotState) {
        if let Some(active) = self.active.as_mut() {
            active.state = state;
        }
    }

    pub fn clear(&mut self) -> Option<ActiveConnection> {
        self.active.take()
    }

    /// Empty the slot only if it still holds `session`
    pub fn clear_session(&mut self, session: SessionHandle) -> Option<ActiveConnection> {
        match self.active {
            Some(active) if active.session == session => self.active.take(),
            _ => None,
        }
    }

    /// Connection state of `remote` as seen by the query surface
    pub fn connection_state(&self, remote: RemoteId) -> ConnectionState {
        match self.active {
            Some(active) if active.remote == remote => active.state.into(),
            _ => ConnectionState::Disconnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(n: u8) -> RemoteId {
        RemoteId::new([n; 6])
    }

    #[test]
    fn test_second_occupant_is_refused() {
        let mut slot = ConnectionSlot::new();
        assert!(slot.occupy(remote(1), SessionHandle::new(1)));
        assert!(!slot.occupy(remote(2), SessionHandle::new(2)));
        assert_eq!(slot.remote(), Some(remote(1)));
    }

    #[test]
    fn test_state_reported_only_for_owner() {
        let mut slot = ConnectionSlot::new();
        slot.occupy(remote(1), SessionHandle::new(1));
        assert_eq!(slot.connection_state(remote(1)), ConnectionState::Connecting);
        assert_eq!(slot.connection_state(remote(2)), ConnectionState::Disconnected);

        slot.set_state(SlotState::Disconnecting);
        assert_eq!(slot.connection_state(remote(1)), ConnectionState::Connected);
    }

    #[test]
    fn test_clear_session_ignores_stale_handle() {
        let mut slot = ConnectionSlot::new();
        slot.occupy(remote(1), SessionHandle::new(7));

        assert!(slot.clear_session(SessionHandle::new(6)).is_none());
        assert!(!slot.is_empty());
        assert_eq!(
            slot.clear_session(SessionHandle::new(7)).map(|a| a.remote),
            Some(remote(1))
        );
        assert!(slot.is_empty());
    }
}
