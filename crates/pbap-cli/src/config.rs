//! pbapd configuration
//!
//! The server section is the coordinator's own `PbapConfig`; the simulator
//! section describes the in-memory collaborators the daemon runs against.
//! Lookup order is an explicit `--config` path, then
//! `<config dir>/pbapd/config.toml`, then built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pbap_core::PbapConfig;

use crate::error::{CliError, Result};

const APP_DIR: &str = "pbapd";

/// Complete configuration of the pbapd daemon
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: PbapConfig,
    pub simulator: SimulatorConfig,
}

/// Behaviour of the simulated device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Prompt printed before each interactive command
    pub prompt: String,
    /// Number of synthetic contacts present at startup
    pub seed_contacts: u32,
    /// Line 1 phone number reported by telephony
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Line 1 alpha tag reported by telephony
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha_tag: Option<String>,
    /// Where version counters are persisted; defaults to the data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counters_file: Option<PathBuf>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            prompt: "pbap> ".to_string(),
            seed_contacts: 3,
            phone_number: None,
            alpha_tag: None,
            counters_file: None,
        }
    }
}

impl AppConfig {
    /// Resolve the configuration the way the daemon does at startup
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            info!("Loading configuration from: {}", path.display());
            return Self::load_from_file(path);
        }

        if let Some(path) = Self::default_path().filter(|p| p.exists()) {
            info!("Loading configuration from: {}", path.display());
            return Self::load_from_file(&path);
        }

        info!("Using default configuration");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        if self.simulator.prompt.is_empty() {
            return Err(CliError::Config("simulator prompt must not be empty".into()));
        }
        Ok(())
    }

    /// `<config dir>/pbapd/config.toml`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// Counters file to use, falling back to `<data dir>/pbapd/counters.bin`
    pub fn counters_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.simulator.counters_file {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join("counters.bin"))
            .ok_or_else(|| CliError::Config("no data directory for the counters file".into()))
    }

    /// Example configuration file content
    pub fn example_toml() -> Result<String> {
        let example = Self {
            simulator: SimulatorConfig {
                phone_number: Some("+15550100".to_string()),
                alpha_tag: Some("Simulated phone".to_string()),
                ..SimulatorConfig::default()
            },
            ..Self::default()
        };
        Ok(toml::to_string_pretty(&example)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.server.authorization.user_confirm_timeout = Duration::from_secs(12);
        config.simulator.seed_contacts = 7;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[server.wake]\nrelease_delay = 2500\n\n[simulator]\nseed_contacts = 0\n",
        )
        .unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.server.wake.release_delay, Duration::from_millis(2_500));
        assert_eq!(
            config.server.authorization.user_confirm_timeout,
            Duration::from_secs(30)
        );
        assert_eq!(config.simulator.seed_contacts, 0);
        assert_eq!(config.simulator.prompt, "pbap> ");
    }

    #[test]
    fn test_invalid_server_section_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server.authorization]\nuser_confirm_timeout = 0\n").unwrap();

        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(CliError::Pbap(_))
        ));
    }

    #[test]
    fn test_explicit_counters_file_wins() {
        let mut config = AppConfig::default();
        config.simulator.counters_file = Some(PathBuf::from("/var/lib/pbapd/v.bin"));
        assert_eq!(
            config.counters_path().unwrap(),
            PathBuf::from("/var/lib/pbapd/v.bin")
        );
    }

    #[test]
    fn test_example_config_parses() {
        let example = AppConfig::example_toml().unwrap();
        assert!(example.contains("[server.authorization]"));
        assert!(example.contains("[simulator]"));

        let parsed: AppConfig = toml::from_str(&example).unwrap();
        assert_eq!(parsed.simulator.alpha_tag.as_deref(), Some("Simulated phone"));
    }
}
