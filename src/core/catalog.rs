//! Version catalog
//!
//! Holds one entry per tracked library: the installed version, the latest
//! known remote version, and the compatibility verdict. Refreshed by
//! [`check`], which replaces the persisted entries in a single transaction
//! so readers never observe a partially refreshed catalog.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::HubConfig;
use crate::core::compat;
use crate::remote::VersionSource;
use crate::store::db::DbError;
use crate::store::DbHandle;

/// One catalog entry, keyed by library name. Immutable between checks;
/// superseded wholesale by the next refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryVersion {
    pub name: String,
    pub current_version: String,
    pub latest_version: String,
    /// Derived by the compatibility evaluator on every refresh.
    pub compatible: bool,
    pub release_date: Option<String>,
    pub changelog_url: Option<String>,
    /// Breaking changes that block this upgrade. Empty iff compatible.
    pub breaking_changes: Vec<String>,
    /// Set when the last remote lookup for this library failed. The entry
    /// then still carries the previous versions; the failure is reported,
    /// not fatal.
    pub check_error: Option<String>,
    /// Unix seconds of the refresh that produced this entry.
    pub checked_at: i64,
}

impl LibraryVersion {
    /// True when a newer version than the installed one is known.
    pub fn update_pending(&self) -> bool {
        compat::is_newer(&self.current_version, &self.latest_version)
    }
}

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("unknown library: {0}")]
    UnknownLibrary(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Refresh the catalog from the remote version source.
///
/// Re-reads the source for every tracked library (or the supplied subset),
/// re-runs the compatibility evaluator, and replaces the refreshed entries
/// atomically. Each lookup is bounded by the configured check timeout. A
/// library whose remote lookup fails or times out keeps its previous
/// versions and is marked with `check_error`; the rest of the check
/// proceeds.
pub async fn check(
    db: &DbHandle,
    source: &dyn VersionSource,
    config: &HubConfig,
    subset: Option<&[String]>,
) -> Result<Vec<LibraryVersion>, CheckError> {
    let tracked: Vec<&crate::config::TrackedLibrary> = match subset {
        None => config.libraries.iter().collect(),
        Some(names) => {
            let mut picked = Vec::with_capacity(names.len());
            for name in names {
                let lib = config
                    .library(name)
                    .ok_or_else(|| CheckError::UnknownLibrary(name.clone()))?;
                picked.push(lib);
            }
            picked
        }
    };

    let now = Utc::now().timestamp();
    let mut refreshed = Vec::with_capacity(tracked.len());

    for lib in tracked {
        let previous = db.get_library(lib.name.clone()).await?;
        let current_version = previous
            .as_ref()
            .map(|p| p.current_version.clone())
            .unwrap_or_else(|| lib.installed_version.clone());

        let fetched = match timeout(config.timeouts.check(), source.latest_release(&lib.name)).await
        {
            Ok(Ok(release)) => Ok(release),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "lookup timed out after {}s",
                config.timeouts.check_secs
            )),
        };

        let entry = match fetched {
            Ok(release) => {
                let verdict = compat::evaluate(
                    &current_version,
                    &release.latest_version,
                    &release.breaking_changes,
                    &config.capabilities,
                );
                debug!(
                    library = %lib.name,
                    current = %current_version,
                    latest = %release.latest_version,
                    compatible = verdict.compatible,
                    "refreshed catalog entry"
                );
                LibraryVersion {
                    name: lib.name.clone(),
                    current_version,
                    latest_version: release.latest_version,
                    compatible: verdict.compatible,
                    release_date: release.release_date,
                    changelog_url: release.changelog_url,
                    breaking_changes: verdict.breaking_changes,
                    check_error: None,
                    checked_at: now,
                }
            }
            Err(err) => {
                warn!(library = %lib.name, error = %err, "remote lookup failed, keeping previous entry");
                match previous {
                    Some(prev) => LibraryVersion {
                        check_error: Some(err),
                        checked_at: now,
                        ..prev
                    },
                    // never seen before: all we know is the installed version
                    None => LibraryVersion {
                        name: lib.name.clone(),
                        latest_version: current_version.clone(),
                        current_version,
                        compatible: true,
                        release_date: None,
                        changelog_url: None,
                        breaking_changes: Vec::new(),
                        check_error: Some(err),
                        checked_at: now,
                    },
                }
            }
        };
        refreshed.push(entry);
    }

    db.replace_catalog(refreshed.clone()).await?;
    Ok(refreshed)
}
