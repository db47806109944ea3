//! Update orchestrator
//!
//! Owns the single mutable "current operation" slot and the collaborator
//! handles the pipeline needs. All mutation of in-flight state is routed
//! through here and the one background worker it spawns; status reads and
//! subscriptions are side-effect free.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::StepTimeouts;
use crate::notify::StatusBroadcaster;
use crate::ops::error::{CancelError, StartError};
use crate::ops::installer::LibraryInstaller;
use crate::ops::operation::UpdateOperation;
use crate::ops::pipeline;
use crate::remote::VersionSource;
use crate::store::DbHandle;

/// State shared between the orchestrator and its worker task.
pub(crate) struct Shared {
    pub(crate) db: DbHandle,
    pub(crate) source: Arc<dyn VersionSource>,
    pub(crate) installer: Arc<dyn LibraryInstaller>,
    pub(crate) timeouts: StepTimeouts,
    pub(crate) slot: Mutex<Option<UpdateOperation>>,
    pub(crate) notifier: StatusBroadcaster,
}

/// Handle returned by [`Orchestrator::start_update`]. The update runs to a
/// terminal state whether or not the handle is awaited.
#[derive(Debug)]
pub struct OperationHandle {
    pub library: String,
    pub target_version: String,
    join: JoinHandle<()>,
}

impl OperationHandle {
    /// Wait for the pipeline to reach a terminal state and release the slot.
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        db: DbHandle,
        source: Arc<dyn VersionSource>,
        installer: Arc<dyn LibraryInstaller>,
        timeouts: StepTimeouts,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                db,
                source,
                installer,
                timeouts,
                slot: Mutex::new(None),
                notifier: StatusBroadcaster::new(),
            }),
        }
    }

    /// Begin an update of `library` to its latest catalog version.
    ///
    /// Preconditions are checked synchronously and violating them mutates
    /// nothing: the slot must be free (a terminal occupant whose outcome has
    /// not yet been durably recorded also blocks), the library must exist in
    /// the catalog, and its latest entry must be compatible.
    pub async fn start_update(&self, library: &str) -> Result<OperationHandle, StartError> {
        // fail fast before touching the catalog
        if let Some(active) = self.status() {
            return Err(StartError::OperationInProgress(active.library));
        }

        let entry = self
            .shared
            .db
            .get_library(library.to_string())
            .await?
            .ok_or_else(|| StartError::UnknownLibrary(library.to_string()))?;

        if !entry.compatible {
            return Err(StartError::IncompatibleLibrary {
                library: library.to_string(),
                breaking_changes: entry.breaking_changes,
            });
        }

        let op = {
            let mut slot = self.shared.slot.lock().expect("operation slot poisoned");
            // re-check under the lock: claiming the slot must be atomic
            if let Some(active) = slot.as_ref() {
                return Err(StartError::OperationInProgress(active.library.clone()));
            }
            let op = UpdateOperation::new(library, &entry.latest_version);
            *slot = Some(op.clone());
            op
        };

        info!(library, target = %op.target_version, "update operation created");
        if let Err(err) = self.shared.db.write_operation(op.clone()).await {
            // no worker is running yet; release the slot or nothing could
            // ever start again
            *self.shared.slot.lock().expect("operation slot poisoned") = None;
            return Err(err.into());
        }
        self.shared.notifier.publish(&op);

        let join = tokio::spawn(pipeline::run(Arc::clone(&self.shared), op.clone()));
        Ok(OperationHandle {
            library: op.library,
            target_version: op.target_version,
            join,
        })
    }

    /// Request cancellation of the in-flight update.
    ///
    /// Honored only while nothing has been mutated (checking/downloading);
    /// later phases must resolve naturally, rolling back on failure.
    pub fn cancel_update(&self) -> Result<(), CancelError> {
        let slot = self.shared.slot.lock().expect("operation slot poisoned");
        match slot.as_ref() {
            None => Err(CancelError::NotCancellable { phase: None }),
            Some(op) if op.status.is_cancellable() => {
                op.request_cancel();
                info!(library = %op.library, phase = %op.status, "cancellation requested");
                Ok(())
            }
            Some(op) => Err(CancelError::NotCancellable {
                phase: Some(op.status),
            }),
        }
    }

    /// Snapshot of the current operation, or `None` when idle. Read-only and
    /// safe to poll frequently.
    pub fn status(&self) -> Option<UpdateOperation> {
        self.shared
            .slot
            .lock()
            .expect("operation slot poisoned")
            .clone()
    }

    /// Subscribe to best-effort push notifications of state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateOperation> {
        self.shared.notifier.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;
    use tempfile::tempdir;

    use crate::core::catalog::LibraryVersion;
    use crate::ops::error::StepError;
    use crate::ops::installer::ProgressFn;
    use crate::remote::{ReleaseInfo, SourceError};
    use crate::store::db::StateDb;

    struct IdleSource;

    #[async_trait]
    impl VersionSource for IdleSource {
        async fn latest_release(&self, library: &str) -> Result<ReleaseInfo, SourceError> {
            Err(SourceError::NotPublished(library.to_string()))
        }
    }

    struct NoopInstaller;

    #[async_trait]
    impl LibraryInstaller for NoopInstaller {
        async fn download(
            &self,
            _library: &str,
            _version: &str,
            _url: &str,
            _progress: ProgressFn<'_>,
            _cancel: &AtomicBool,
        ) -> Result<PathBuf, StepError> {
            Ok(PathBuf::new())
        }

        async fn install(
            &self,
            _library: &str,
            _version: &str,
            _bundle: &std::path::Path,
        ) -> Result<(), StepError> {
            Ok(())
        }

        async fn verify(&self, _library: &str, _version: &str) -> Result<(), StepError> {
            Ok(())
        }

        async fn rollback(&self, _library: &str) -> Result<(), StepError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_releases_the_slot() {
        let dir = tempdir().unwrap();
        let mut state = StateDb::open_at(&dir.path().join("state.db")).unwrap();
        state
            .replace_catalog(&[LibraryVersion {
                name: "mqtt-lib".to_string(),
                current_version: "2.0.0".to_string(),
                latest_version: "2.1.0".to_string(),
                compatible: true,
                release_date: None,
                changelog_url: None,
                breaking_changes: vec![],
                check_error: None,
                checked_at: 0,
            }])
            .unwrap();
        state.fail_writes = true;
        let db = DbHandle::spawn_with(state);

        let orchestrator = Orchestrator::new(
            db,
            Arc::new(IdleSource),
            Arc::new(NoopInstaller),
            crate::config::StepTimeouts::default(),
        );

        let err = orchestrator.start_update("mqtt-lib").await.unwrap_err();
        assert!(matches!(err, StartError::Db(_)));

        // the claim was rolled back; a retry reaches the write again instead
        // of bouncing off a phantom in-progress operation
        assert!(orchestrator.status().is_none());
        let err = orchestrator.start_update("mqtt-lib").await.unwrap_err();
        assert!(matches!(err, StartError::Db(_)));
    }
}
