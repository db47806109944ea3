//! DB Actor - Thread-safe access to SQLite
//!
//! SQLite connections are not `Sync`, so the database handle lives in a
//! dedicated background thread and async callers communicate with it via
//! message passing.

use std::path::Path;
use std::sync::mpsc;
use std::thread;
use tokio::sync::oneshot;

use super::db::{DbError, StateDb};
use super::history::{HistoryEntry, HistoryFilter};
use crate::core::catalog::LibraryVersion;
use crate::ops::operation::UpdateOperation;

/// Events that can be sent to the DB actor
enum DbEvent {
    GetLibrary {
        name: String,
        resp: oneshot::Sender<Result<Option<LibraryVersion>, DbError>>,
    },
    ListLibraries {
        resp: oneshot::Sender<Result<Vec<LibraryVersion>, DbError>>,
    },
    ReplaceCatalog {
        entries: Vec<LibraryVersion>,
        resp: oneshot::Sender<Result<(), DbError>>,
    },
    SetCurrentVersion {
        name: String,
        version: String,
        resp: oneshot::Sender<Result<(), DbError>>,
    },
    WriteOperation {
        op: UpdateOperation,
        resp: oneshot::Sender<Result<(), DbError>>,
    },
    ReadOperation {
        resp: oneshot::Sender<Result<Option<UpdateOperation>, DbError>>,
    },
    ClearOperation {
        resp: oneshot::Sender<Result<(), DbError>>,
    },
    AppendHistory {
        entry: HistoryEntry,
        resp: oneshot::Sender<Result<i64, DbError>>,
    },
    GetHistory {
        limit: usize,
        filter: HistoryFilter,
        resp: oneshot::Sender<Result<Vec<HistoryEntry>, DbError>>,
    },
}

/// A handle to the database actor that is Send + Sync and Clone.
#[derive(Debug, Clone)]
pub struct DbHandle {
    sender: mpsc::Sender<DbEvent>,
}

impl DbHandle {
    /// Spawn the actor against the canonical database path.
    pub fn spawn() -> Result<Self, DbError> {
        let db = StateDb::open()?;
        Ok(Self::spawn_with(db))
    }

    /// Spawn the actor against a specific path (for testing).
    pub fn spawn_at(path: &Path) -> Result<Self, DbError> {
        let db = StateDb::open_at(path)?;
        Ok(Self::spawn_with(db))
    }

    pub(crate) fn spawn_with(db: StateDb) -> Self {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            run_db_event_loop(db, receiver);
        });
        Self { sender }
    }

    /// Helper to send a request and wait for the response
    async fn request<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(oneshot::Sender<Result<T, DbError>>) -> DbEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender.send(f(tx)).map_err(|_| DbError::ActorDied)?;
        rx.await.map_err(|_| DbError::ActorDied)?
    }

    pub async fn get_library(&self, name: String) -> Result<Option<LibraryVersion>, DbError> {
        self.request(|resp| DbEvent::GetLibrary { name, resp }).await
    }

    pub async fn list_libraries(&self) -> Result<Vec<LibraryVersion>, DbError> {
        self.request(|resp| DbEvent::ListLibraries { resp }).await
    }

    pub async fn replace_catalog(&self, entries: Vec<LibraryVersion>) -> Result<(), DbError> {
        self.request(|resp| DbEvent::ReplaceCatalog { entries, resp })
            .await
    }

    pub async fn set_current_version(&self, name: String, version: String) -> Result<(), DbError> {
        self.request(|resp| DbEvent::SetCurrentVersion { name, version, resp })
            .await
    }

    pub async fn write_operation(&self, op: UpdateOperation) -> Result<(), DbError> {
        self.request(|resp| DbEvent::WriteOperation { op, resp })
            .await
    }

    pub async fn read_operation(&self) -> Result<Option<UpdateOperation>, DbError> {
        self.request(|resp| DbEvent::ReadOperation { resp }).await
    }

    pub async fn clear_operation(&self) -> Result<(), DbError> {
        self.request(|resp| DbEvent::ClearOperation { resp }).await
    }

    pub async fn append_history(&self, entry: HistoryEntry) -> Result<i64, DbError> {
        self.request(|resp| DbEvent::AppendHistory { entry, resp })
            .await
    }

    pub async fn get_history(
        &self,
        limit: usize,
        filter: HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, DbError> {
        self.request(|resp| DbEvent::GetHistory { limit, filter, resp })
            .await
    }
}

/// The actual event loop running in the background thread
fn run_db_event_loop(mut db: StateDb, receiver: mpsc::Receiver<DbEvent>) {
    while let Ok(event) = receiver.recv() {
        match event {
            DbEvent::GetLibrary { name, resp } => {
                let _ = resp.send(db.get_library(&name));
            }
            DbEvent::ListLibraries { resp } => {
                let _ = resp.send(db.list_libraries());
            }
            DbEvent::ReplaceCatalog { entries, resp } => {
                let _ = resp.send(db.replace_catalog(&entries));
            }
            DbEvent::SetCurrentVersion { name, version, resp } => {
                let _ = resp.send(db.set_current_version(&name, &version));
            }
            DbEvent::WriteOperation { op, resp } => {
                let _ = resp.send(db.write_operation(&op));
            }
            DbEvent::ReadOperation { resp } => {
                let _ = resp.send(db.read_operation());
            }
            DbEvent::ClearOperation { resp } => {
                let _ = resp.send(db.clear_operation());
            }
            DbEvent::AppendHistory { entry, resp } => {
                let _ = resp.send(db.append_history(&entry));
            }
            DbEvent::GetHistory { limit, filter, resp } => {
                let _ = resp.send(db.get_history(limit, &filter));
            }
        }
    }
}
