//! The in-flight update operation and its state machine.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Progress baselines per phase. Download ramps from `CHECKING` to
/// `DOWNLOAD_DONE` as bytes arrive; the later phases jump to their baseline
/// on entry. Progress never decreases within a run; it freezes on rollback.
pub mod progress {
    pub const CHECKING: u8 = 10;
    pub const DOWNLOAD_DONE: u8 = 40;
    pub const INSTALLING: u8 = 70;
    pub const TESTING: u8 = 90;
    pub const COMPLETE: u8 = 100;
}

/// Phases of the staged update pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    Checking,
    Downloading,
    Installing,
    Testing,
    RollingBack,
    Completed,
    Failed,
}

impl UpdatePhase {
    /// Terminal phases produce a history entry and release the slot.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Cancellation is only honored before anything has been mutated.
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Checking | Self::Downloading)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Installing => "installing",
            Self::Testing => "testing",
            Self::RollingBack => "rolling_back",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdatePhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(Self::Checking),
            "downloading" => Ok(Self::Downloading),
            "installing" => Ok(Self::Installing),
            "testing" => Ok(Self::Testing),
            "rolling_back" => Ok(Self::RollingBack),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown update phase: {other}")),
        }
    }
}

/// The singleton current operation. At most one exists system-wide; it lives
/// in the orchestrator's slot and is mirrored to a nullable database row on
/// every phase transition.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOperation {
    pub library: String,
    pub target_version: String,
    pub status: UpdatePhase,
    /// 0-100, monotonically non-decreasing within a run.
    pub progress: u8,
    /// Set only in `failed` / `rolling_back`.
    pub error: Option<String>,
    /// Unix seconds.
    pub started_at: i64,
    #[serde(skip)]
    cancel: Arc<AtomicBool>,
}

impl UpdateOperation {
    pub fn new(library: &str, target_version: &str) -> Self {
        Self {
            library: library.to_string(),
            target_version: target_version.to_string(),
            status: UpdatePhase::Checking,
            progress: 0,
            error: None,
            started_at: chrono::Utc::now().timestamp(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Rehydrate a snapshot read back from the database. The cancel flag is
    /// fresh; snapshots are display-only.
    pub fn from_snapshot(
        library: String,
        target_version: String,
        status: UpdatePhase,
        progress: u8,
        error: Option<String>,
        started_at: i64,
    ) -> Self {
        Self {
            library,
            target_version,
            status,
            progress,
            error,
            started_at,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Shared flag the download step polls between chunks.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_roundtrip() {
        for phase in [
            UpdatePhase::Checking,
            UpdatePhase::Downloading,
            UpdatePhase::Installing,
            UpdatePhase::Testing,
            UpdatePhase::RollingBack,
            UpdatePhase::Completed,
            UpdatePhase::Failed,
        ] {
            assert_eq!(phase.as_str().parse::<UpdatePhase>().unwrap(), phase);
        }
    }

    #[test]
    fn test_terminal_and_cancellable() {
        assert!(UpdatePhase::Completed.is_terminal());
        assert!(UpdatePhase::Failed.is_terminal());
        assert!(!UpdatePhase::RollingBack.is_terminal());

        assert!(UpdatePhase::Checking.is_cancellable());
        assert!(UpdatePhase::Downloading.is_cancellable());
        assert!(!UpdatePhase::Installing.is_cancellable());
        assert!(!UpdatePhase::Testing.is_cancellable());
        assert!(!UpdatePhase::RollingBack.is_cancellable());
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let op = UpdateOperation::new("zigbee-herdsman", "0.15.0");
        let clone = op.clone();
        clone.request_cancel();
        assert!(op.cancel_requested());
    }
}
