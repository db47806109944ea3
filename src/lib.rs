//! hubup - adapter-library update orchestration for an IoT hub
//!
//! # Overview
//!
//! The hub aggregates Zigbee, WiFi, and MQTT devices through protocol adapter
//! libraries. hubup checks a remote version source for new adapter releases,
//! evaluates upgrade compatibility against the hub's declared capabilities,
//! and drives a staged install pipeline (checking → downloading → installing
//! → testing) with progress reporting, automatic rollback on mutation-phase
//! failure, and an append-only audit history.
//!
//! # Architecture
//!
//! - **Single worker**: one background task drives the pipeline and is the
//!   only writer of the in-flight operation; everything else is a read path.
//! - **Actor pattern**: SQLite access is serialized through `DbHandle` for
//!   thread safety.
//! - **Trait seams**: the remote version source and the artifact installer
//!   are traits, so tests script failures at every stage boundary.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.hubup/
//! ├── config.toml   # tracked libraries, capabilities, source URL
//! ├── store/        # staged library bundles by name/version
//! ├── cache/        # downloaded artifacts
//! └── state.db      # SQLite: catalog, current operation, history
//! ```

pub mod cmd;
pub mod config;
pub mod core;
pub mod notify;
pub mod ops;
pub mod remote;
pub mod store;

// Re-exports for convenience
pub use config::HubConfig;
pub use ops::orchestrator::Orchestrator;
pub use store::DbHandle;

use dirs::home_dir;
use std::path::PathBuf;

/// Returns the primary configuration directory, or None if the user's home
/// cannot be resolved.
pub fn try_hubup_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("HUBUP_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".hubup"))
}

/// Returns the canonical hubup home directory (`~/.hubup`).
///
/// # Panics
/// Panics if the home directory cannot be determined.
pub fn hubup_home() -> PathBuf {
    try_hubup_home().expect("Could not determine home directory")
}

/// SQLite database path: ~/.hubup/state.db
pub fn db_path() -> PathBuf {
    hubup_home().join("state.db")
}

/// Hub configuration path: ~/.hubup/config.toml
pub fn config_path() -> PathBuf {
    hubup_home().join("config.toml")
}

/// Staged library bundles: ~/.hubup/store
pub fn store_path() -> PathBuf {
    hubup_home().join("store")
}

/// Downloaded artifacts: ~/.hubup/cache
pub fn cache_path() -> PathBuf {
    hubup_home().join("cache")
}

/// User Agent string
pub const USER_AGENT: &str = concat!("hubup/", env!("CARGO_PKG_VERSION"));
