//! Remote version source
//!
//! The hub only consumes this collaborator through the `VersionSource`
//! trait: per library name it answers with the latest published release and
//! its metadata. Individual libraries may be unreachable; the catalog check
//! tolerates that per entry.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::compat::BreakingChange;

mod http;

pub use http::HttpVersionSource;

/// Latest-release metadata for one library, as published by the source.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ReleaseInfo {
    pub latest_version: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub changelog_url: Option<String>,
    /// Where the release bundle can be downloaded. Absent when the source
    /// only announces the version (the pipeline fails checking in that case).
    #[serde(default)]
    pub artifact_url: Option<String>,
    #[serde(default)]
    pub breaking_changes: Vec<BreakingChange>,
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("version source returned HTTP {status} for '{library}'")]
    Status {
        library: String,
        status: reqwest::StatusCode,
    },

    #[error("library '{0}' is not published by the version source")]
    NotPublished(String),
}

/// Read-only view of the remote release feed.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Fetch the latest release record for `library`.
    async fn latest_release(&self, library: &str) -> Result<ReleaseInfo, SourceError>;
}
