//! Error types for the phonebook access server
//!
//! Collaborator faults are grouped by the collaborator that raised them and
//! unified under [`PbapError`]. Inside the coordinator every variant except
//! [`PbapError::PermissionDenied`] and [`PbapError::Channel`] is handled
//! locally (logged and recovered); those two are the only ones that reach
//! callers of the query surface.

use thiserror::Error;

use crate::caller::Permission;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Listening endpoint faults
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to open listening endpoint: {reason}")]
    OpenFailed { reason: String },
    #[error("Listening endpoint is not open")]
    NotOpen,
    #[error("Accept thread failed: {reason}")]
    AcceptFailed { reason: String },
}

/// Service discovery record faults
#[derive(Debug, Error)]
pub enum SdpError {
    #[error("Failed to register discovery record: {reason}")]
    RegistrationFailed { reason: String },
    #[error("Discovery record {handle} could not be removed")]
    RemovalFailed { handle: u32 },
    #[error("Discovery service unavailable")]
    Unavailable,
}

/// Contact store, permission store and counter persistence faults
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Contact store query failed: {reason}")]
    ContactQuery { reason: String },
    #[error("Failed to load persisted version counters: {reason}")]
    Load { reason: String },
    #[error("Failed to save version counters: {reason}")]
    Save { reason: String },
    #[error("Permission store unavailable: {reason}")]
    Permission { reason: String },
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for the phonebook access server
#[derive(Debug, Error)]
pub enum PbapError {
    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("Discovery record error: {0}")]
    Sdp(#[from] SdpError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Wake lock error: {reason}")]
    WakeLock { reason: String },

    #[error("Permission denied: {required} required")]
    PermissionDenied { required: Permission },

    /// Coordinator inbox or outbound channel is closed
    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Background task failed: {reason}")]
    Task { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl PbapError {
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        PbapError::Channel {
            message: message.into(),
        }
    }

    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        PbapError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn invalid_input<T: Into<String>>(reason: T) -> Self {
        PbapError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn wake_lock<T: Into<String>>(reason: T) -> Self {
        PbapError::WakeLock {
            reason: reason.into(),
        }
    }

    pub fn task_failed<T: Into<String>>(reason: T) -> Self {
        PbapError::Task {
            reason: reason.into(),
        }
    }

    pub fn permission_denied(required: Permission) -> Self {
        PbapError::PermissionDenied { required }
    }

    pub fn contact_query<T: Into<String>>(reason: T) -> Self {
        PbapError::Store(StoreError::ContactQuery {
            reason: reason.into(),
        })
    }

    /// Whether this error is a transient collaborator fault that recovery handles
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PbapError::Listener(_) | PbapError::Sdp(_) | PbapError::Store(_) | PbapError::WakeLock { .. }
        )
    }
}

/// Result type for phonebook access server operations
pub type PbapResult<T> = core::result::Result<T, PbapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_errors_convert() {
        let err: PbapError = ListenerError::OpenFailed {
            reason: "no adapter".to_string(),
        }
        .into();
        assert!(err.is_transient());
        assert!(err.to_string().contains("no adapter"));
    }

    #[test]
    fn test_permission_denied_is_not_transient() {
        let err = PbapError::permission_denied(Permission::BluetoothAdmin);
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "Permission denied: BLUETOOTH_ADMIN required"
        );
    }
}
