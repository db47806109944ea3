//! Domain-specific errors for update operations.
//!
//! Precondition errors (`StartError`, `CancelError`) are returned
//! synchronously and never mutate state. Step errors are absorbed into the
//! state machine and surfaced through the polled status and the history
//! entry, never thrown at callers.

use thiserror::Error;

use crate::ops::operation::UpdatePhase;
use crate::remote::SourceError;
use crate::store::db::DbError;

/// Synchronous rejections of `start_update`.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("an update of '{0}' is already in progress")]
    OperationInProgress(String),

    #[error("library '{library}' has breaking changes and cannot be updated")]
    IncompatibleLibrary {
        library: String,
        breaking_changes: Vec<String>,
    },

    #[error("unknown library: {0}")]
    UnknownLibrary(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Synchronous rejection of `cancel_update`.
#[derive(Error, Debug)]
pub enum CancelError {
    #[error("{}", render_not_cancellable(.phase))]
    NotCancellable { phase: Option<UpdatePhase> },
}

fn render_not_cancellable(phase: &Option<UpdatePhase>) -> String {
    match phase {
        Some(phase) => format!("update cannot be cancelled during {phase}"),
        None => "no update operation is in progress".to_string(),
    }
}

/// Failures inside the pipeline. Which phase they occur in decides whether
/// they drive `failed` directly (nothing mutated yet) or `rolling_back`.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("version source error: {0}")]
    Source(#[from] SourceError),

    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{step} timed out after {secs}s")]
    Timeout { step: &'static str, secs: u64 },

    #[error("no artifact published for {library} {version}")]
    NoArtifact { library: String, version: String },

    #[error("install step failed: {0}")]
    Install(String),

    #[error("verification failed: {0}")]
    Verify(String),

    #[error("rollback failed: {0}")]
    Rollback(String),

    #[error("update cancelled by operator")]
    Cancelled,
}
