//! The background worker driving one update through the staged pipeline.
//!
//! Exactly one worker exists per operation and it is the only writer of
//! operation state. Every external I/O boundary carries a timeout; a fired
//! timeout takes the same transition as the step's native failure. Failures
//! before anything was mutated (checking/downloading) go straight to
//! `failed`; failures during installing/testing roll back first. Terminal
//! states durably append a history entry before the slot is released.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::ops::error::StepError;
use crate::ops::operation::{progress, UpdateOperation, UpdatePhase};
use crate::ops::orchestrator::Shared;
use crate::store::history::HistoryEntry;

const HISTORY_APPEND_ATTEMPTS: u32 = 10;

pub(crate) async fn run(shared: Arc<Shared>, op: UpdateOperation) {
    let library = op.library.clone();
    let target = op.target_version.clone();

    info!(library, target, "update pipeline started");
    let outcome = drive(&shared, &op).await;

    let (success, reason) = match outcome {
        Ok(()) => {
            transition(&shared, UpdatePhase::Completed, Some(progress::COMPLETE), None).await;
            info!(library, target, "update completed");
            (true, None)
        }
        Err(reason) => {
            transition(&shared, UpdatePhase::Failed, None, Some(reason.clone())).await;
            warn!(library, target, reason, "update failed");
            (false, Some(reason))
        }
    };

    // The update truly happened; losing the record would be a correctness
    // defect, so the slot is not released until the append sticks.
    let entry = HistoryEntry::new(&library, &target, success, reason, Utc::now().timestamp());
    if !append_with_retry(&shared, entry).await {
        error!(
            library,
            "history entry could not be recorded; slot left occupied pending operator action"
        );
        return;
    }

    if let Err(err) = shared.db.clear_operation().await {
        warn!(library, error = %err, "failed to clear operation snapshot row");
    }
    *shared.slot.lock().expect("operation slot poisoned") = None;
}

/// Run the pipeline stages. Returns the failure reason on any terminal
/// failure, with rollback already performed where required.
async fn drive(shared: &Shared, op: &UpdateOperation) -> Result<(), String> {
    let timeouts = &shared.timeouts;
    let library = op.library.as_str();
    let target = op.target_version.as_str();

    // -- checking: resolve the artifact location ---------------------------
    transition(shared, UpdatePhase::Checking, Some(progress::CHECKING), None).await;

    let release = match timeout(timeouts.check(), shared.source.latest_release(library)).await {
        Err(_) => {
            return Err(StepError::Timeout {
                step: "checking",
                secs: timeouts.check_secs,
            }
            .to_string())
        }
        Ok(Err(err)) => return Err(StepError::Source(err).to_string()),
        Ok(Ok(release)) => release,
    };
    if op.cancel_requested() {
        return Err(StepError::Cancelled.to_string());
    }
    let url = release.artifact_url.ok_or_else(|| {
        StepError::NoArtifact {
            library: library.to_string(),
            version: target.to_string(),
        }
        .to_string()
    })?;

    // -- downloading: progress ramps 10 -> 40 ------------------------------
    transition(shared, UpdatePhase::Downloading, None, None).await;

    let on_bytes = |downloaded: u64, total: Option<u64>| {
        let pct = match total {
            Some(total) if total > 0 => {
                let span = u64::from(progress::DOWNLOAD_DONE - progress::CHECKING);
                progress::CHECKING + ((downloaded.min(total) * span) / total) as u8
            }
            _ => progress::CHECKING,
        };
        bump_progress(shared, pct);
    };

    let cancel = op.cancel_flag();
    let bundle = match timeout(
        timeouts.download(),
        shared
            .installer
            .download(library, target, &url, &on_bytes, cancel.as_ref()),
    )
    .await
    {
        Err(_) => {
            return Err(StepError::Timeout {
                step: "downloading",
                secs: timeouts.download_secs,
            }
            .to_string())
        }
        Ok(Err(err)) => return Err(err.to_string()),
        Ok(Ok(path)) => path,
    };
    bump_progress(shared, progress::DOWNLOAD_DONE);

    // last point where cancellation is honored
    if op.cancel_requested() {
        return Err(StepError::Cancelled.to_string());
    }

    // -- installing: mutation begins, failures roll back -------------------
    transition(shared, UpdatePhase::Installing, Some(progress::INSTALLING), None).await;

    match timeout(
        timeouts.install(),
        shared.installer.install(library, target, &bundle),
    )
    .await
    {
        Err(_) => {
            let cause = StepError::Timeout {
                step: "installing",
                secs: timeouts.install_secs,
            }
            .to_string();
            return Err(rollback_and_fail(shared, library, cause).await);
        }
        Ok(Err(err)) => return Err(rollback_and_fail(shared, library, err.to_string()).await),
        Ok(Ok(())) => {}
    }

    // -- testing: post-install verification --------------------------------
    transition(shared, UpdatePhase::Testing, Some(progress::TESTING), None).await;

    match timeout(timeouts.verify(), shared.installer.verify(library, target)).await {
        Err(_) => {
            let cause = StepError::Timeout {
                step: "testing",
                secs: timeouts.verify_secs,
            }
            .to_string();
            return Err(rollback_and_fail(shared, library, cause).await);
        }
        Ok(Err(err)) => return Err(rollback_and_fail(shared, library, err.to_string()).await),
        Ok(Ok(())) => {}
    }

    // the installed version is now live; record it in the catalog
    if let Err(err) = shared
        .db
        .set_current_version(library.to_string(), target.to_string())
        .await
    {
        let cause = format!("failed to record installed version: {err}");
        return Err(rollback_and_fail(shared, library, cause).await);
    }

    Ok(())
}

/// Enter `rolling_back`, attempt recovery, and compose the terminal failure
/// reason. Rollback always exits to `failed`; whether rollback itself
/// succeeded is the operator-visible distinction.
async fn rollback_and_fail(shared: &Shared, library: &str, cause: String) -> String {
    warn!(library, cause, "mutation-phase failure, rolling back");
    transition(shared, UpdatePhase::RollingBack, None, Some(cause.clone())).await;

    match timeout(shared.timeouts.rollback(), shared.installer.rollback(library)).await {
        Ok(Ok(())) => format!("update failed ({cause}); rolled back successfully"),
        Ok(Err(err)) => {
            error!(library, error = %err, "rollback failed, manual intervention required");
            format!("update failed ({cause}); rollback failed: {err}; manual intervention required")
        }
        Err(_) => {
            error!(library, "rollback timed out, manual intervention required");
            format!("update failed ({cause}); rollback timed out; manual intervention required")
        }
    }
}

/// Apply a phase change to the slot, publish the snapshot, and mirror it to
/// the database row other processes poll.
async fn transition(
    shared: &Shared,
    phase: UpdatePhase,
    progress_value: Option<u8>,
    error_msg: Option<String>,
) {
    let snapshot = {
        let mut slot = shared.slot.lock().expect("operation slot poisoned");
        let Some(op) = slot.as_mut() else { return };
        op.status = phase;
        if let Some(value) = progress_value {
            if value > op.progress {
                op.progress = value;
            }
        }
        if error_msg.is_some() {
            op.error = error_msg;
        }
        op.clone()
    };

    shared.notifier.publish(&snapshot);
    if let Err(err) = shared.db.write_operation(snapshot).await {
        warn!(phase = %phase, error = %err, "failed to mirror operation snapshot");
    }
}

/// Raise progress within the current phase. Never decreases; publishes only
/// on an actual change.
fn bump_progress(shared: &Shared, value: u8) {
    let snapshot = {
        let mut slot = shared.slot.lock().expect("operation slot poisoned");
        let Some(op) = slot.as_mut() else { return };
        if value <= op.progress {
            return;
        }
        op.progress = value;
        op.clone()
    };
    shared.notifier.publish(&snapshot);
}

/// Retry the ledger append with capped exponential backoff. Returns false
/// only after exhausting all attempts.
async fn append_with_retry(shared: &Shared, entry: HistoryEntry) -> bool {
    let mut delay = Duration::from_millis(200);
    for attempt in 1..=HISTORY_APPEND_ATTEMPTS {
        match shared.db.append_history(entry.clone()).await {
            Ok(_) => return true,
            Err(err) => {
                warn!(attempt, error = %err, "history append failed, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(5));
            }
        }
    }
    false
}
