//! Hub configuration
//!
//! Loaded from `~/.hubup/config.toml`. Declares the tracked adapter
//! libraries, the hub's capability set (used by the compatibility
//! evaluator), the remote version source, and per-step pipeline timeouts.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Base URL of the remote version source.
    #[serde(default = "default_source_url")]
    pub source_url: String,

    /// Capabilities this hub actually uses. A breaking change tagged with a
    /// capability the hub does not declare does not block an upgrade.
    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default)]
    pub timeouts: StepTimeouts,

    /// Adapter libraries under update management.
    #[serde(default, rename = "library")]
    pub libraries: Vec<TrackedLibrary>,
}

/// One tracked adapter library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedLibrary {
    pub name: String,
    /// Version present on the hub before hubup first records an update.
    pub installed_version: String,
}

/// Per-step timeouts for the update pipeline, in seconds. A fired timeout is
/// treated exactly like the step's native failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTimeouts {
    #[serde(default = "default_check_secs")]
    pub check_secs: u64,
    #[serde(default = "default_download_secs")]
    pub download_secs: u64,
    #[serde(default = "default_install_secs")]
    pub install_secs: u64,
    #[serde(default = "default_verify_secs")]
    pub verify_secs: u64,
    #[serde(default = "default_rollback_secs")]
    pub rollback_secs: u64,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            check_secs: default_check_secs(),
            download_secs: default_download_secs(),
            install_secs: default_install_secs(),
            verify_secs: default_verify_secs(),
            rollback_secs: default_rollback_secs(),
        }
    }
}

impl StepTimeouts {
    pub fn check(&self) -> Duration {
        Duration::from_secs(self.check_secs)
    }
    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }
    pub fn install(&self) -> Duration {
        Duration::from_secs(self.install_secs)
    }
    pub fn verify(&self) -> Duration {
        Duration::from_secs(self.verify_secs)
    }
    pub fn rollback(&self) -> Duration {
        Duration::from_secs(self.rollback_secs)
    }
}

fn default_source_url() -> String {
    "https://updates.hubup.dev".to_string()
}
fn default_check_secs() -> u64 {
    30
}
fn default_download_secs() -> u64 {
    300
}
fn default_install_secs() -> u64 {
    120
}
fn default_verify_secs() -> u64 {
    60
}
fn default_rollback_secs() -> u64 {
    120
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            source_url: default_source_url(),
            capabilities: Vec::new(),
            timeouts: StepTimeouts::default(),
            libraries: Vec::new(),
        }
    }
}

impl HubConfig {
    /// Load configuration from a toml file. A missing file yields defaults
    /// so read-only commands work on a fresh hub.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config: {}", path.display()))
    }

    /// Look up a tracked library by name.
    pub fn library(&self, name: &str) -> Option<&TrackedLibrary> {
        self.libraries.iter().find(|l| l.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = HubConfig::load(&dir.path().join("config.toml")).unwrap();
        assert!(cfg.libraries.is_empty());
        assert_eq!(cfg.timeouts.check_secs, 30);
    }

    #[test]
    fn test_parse_full() {
        let raw = r#"
            source_url = "http://127.0.0.1:9999"
            capabilities = ["zigbee", "mqtt"]

            [timeouts]
            download_secs = 10

            [[library]]
            name = "zigbee-herdsman"
            installed_version = "0.14.0"

            [[library]]
            name = "mqtt-lib"
            installed_version = "2.1.0"
        "#;
        let cfg: HubConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.libraries.len(), 2);
        assert_eq!(cfg.timeouts.download_secs, 10);
        assert_eq!(cfg.timeouts.install_secs, 120); // default survives partial table
        assert_eq!(cfg.capabilities, vec!["zigbee", "mqtt"]);
        assert_eq!(
            cfg.library("zigbee-herdsman").unwrap().installed_version,
            "0.14.0"
        );
    }
}
