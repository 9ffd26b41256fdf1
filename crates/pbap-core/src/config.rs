//! Centralized Configuration Management
//!
//! Every tunable of the coordinator lives here. Defaults reproduce the
//! behaviour of the platform phonebook access service.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{PbapError, PbapResult};

// ----------------------------------------------------------------------------
// Authorization Configuration
// ----------------------------------------------------------------------------

/// Configuration for the user authorization handshake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// How long a confirmation prompt may stay unanswered
    #[serde(with = "duration_millis")]
    pub user_confirm_timeout: Duration,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            user_confirm_timeout: Duration::from_millis(30_000),
        }
    }
}

// ----------------------------------------------------------------------------
// Wake Lock Configuration
// ----------------------------------------------------------------------------

/// Configuration for the wake guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Trailing delay between the last activity and the release
    #[serde(with = "duration_millis")]
    pub release_delay: Duration,
    /// Tag the wake lock is acquired under
    pub lock_tag: String,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            release_delay: Duration::from_millis(10_000),
            lock_tag: "StartingObexPbapTransaction".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Discovery Record Configuration
// ----------------------------------------------------------------------------

/// Static parameters of the published discovery record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdpConfig {
    pub service_name: String,
    /// Profile version (major in the high byte, minor in the low byte)
    pub version: u16,
    /// Bitmask of supported repositories (0x01 = local phonebook)
    pub supported_repositories: u8,
    /// Bitmask of supported profile features
    pub supported_features: u32,
}

impl Default for SdpConfig {
    fn default() -> Self {
        Self {
            service_name: "OBEX Phonebook Access Server".to_string(),
            version: 0x0102,
            supported_repositories: 0x01,
            supported_features: 0x021F,
        }
    }
}

// ----------------------------------------------------------------------------
// Identity and Runtime Configuration
// ----------------------------------------------------------------------------

/// Local identity fallbacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Used when telephony reports no alpha tag for line 1
    pub default_local_name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            default_local_name: "My phone".to_string(),
        }
    }
}

/// Runtime behaviour of the service wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How long `stop()` waits for the coordinator to drain
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
    /// Capacity of the outbound service event broadcast
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
            event_buffer_size: 64,
        }
    }
}

// ----------------------------------------------------------------------------
// Unified Configuration
// ----------------------------------------------------------------------------

/// Complete configuration of the phonebook access server
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PbapConfig {
    pub authorization: AuthorizationConfig,
    pub wake: WakeConfig,
    pub sdp: SdpConfig,
    pub identity: IdentityConfig,
    pub runtime: RuntimeConfig,
}

impl PbapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timers for tests
    pub fn testing() -> Self {
        Self {
            authorization: AuthorizationConfig {
                user_confirm_timeout: Duration::from_millis(500),
            },
            wake: WakeConfig {
                release_delay: Duration::from_millis(200),
                ..WakeConfig::default()
            },
            runtime: RuntimeConfig {
                shutdown_timeout: Duration::from_secs(2),
                event_buffer_size: 256,
            },
            ..Self::default()
        }
    }

    pub fn with_user_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.authorization.user_confirm_timeout = timeout;
        self
    }

    pub fn with_wake_release_delay(mut self, delay: Duration) -> Self {
        self.wake.release_delay = delay;
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.sdp.service_name = name.into();
        self
    }

    pub fn with_default_local_name(mut self, name: impl Into<String>) -> Self {
        self.identity.default_local_name = name.into();
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.runtime.shutdown_timeout = timeout;
        self
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> PbapResult<()> {
        if self.authorization.user_confirm_timeout.is_zero() {
            return Err(PbapError::config_error(
                "user confirmation timeout must be greater than 0",
            ));
        }
        if self.wake.release_delay.is_zero() {
            return Err(PbapError::config_error(
                "wake release delay must be greater than 0",
            ));
        }
        if self.sdp.service_name.trim().is_empty() {
            return Err(PbapError::config_error("service name must not be empty"));
        }
        if self.runtime.event_buffer_size == 0 {
            return Err(PbapError::config_error(
                "event buffer size must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Serialize durations as integer milliseconds
mod duration_millis {
    use core::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_platform_service() {
        let config = PbapConfig::default();
        assert_eq!(
            config.authorization.user_confirm_timeout,
            Duration::from_millis(30_000)
        );
        assert_eq!(config.wake.release_delay, Duration::from_millis(10_000));
        assert_eq!(config.sdp.version, 0x0102);
        assert_eq!(config.sdp.supported_repositories, 0x01);
        assert_eq!(config.sdp.supported_features, 0x021F);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let config = PbapConfig::default().with_user_confirm_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = PbapConfig::default().with_service_name("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PbapConfig =
            serde_json::from_str(r#"{ "wake": { "release_delay": 2500 } }"#).unwrap();
        assert_eq!(config.wake.release_delay, Duration::from_millis(2500));
        assert_eq!(config.wake.lock_tag, "StartingObexPbapTransaction");
        assert_eq!(
            config.authorization.user_confirm_timeout,
            Duration::from_secs(30)
        );
    }
}
