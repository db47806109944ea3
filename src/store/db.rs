//! SQLite state database
//!
//! Three tables: the version catalog keyed by library name, the current
//! operation as a single nullable row, and the append-only history ledger.

use std::path::Path;
use std::str::FromStr;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::core::catalog::LibraryVersion;
use crate::db_path;
use crate::ops::operation::{UpdateOperation, UpdatePhase};
use crate::store::history::{HistoryEntry, HistoryFilter};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("library not found: {0}")]
    LibraryNotFound(String),

    #[error("database actor terminated")]
    ActorDied,
}

/// State database. Not `Sync`; accessed through the `DbHandle` actor.
pub struct StateDb {
    conn: Connection,
    /// Test hook: makes `write_operation` fail.
    #[cfg(test)]
    pub(crate) fail_writes: bool,
}

impl std::fmt::Debug for StateDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDb").finish_non_exhaustive()
    }
}

impl StateDb {
    /// Open or create the state database at the canonical path.
    pub fn open() -> Result<Self, DbError> {
        let path = db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::open_at(&path)
    }

    /// Open database at a specific path (for testing).
    pub fn open_at(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;

        // WAL keeps status/history reads concurrent with the worker's writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self {
            conn,
            #[cfg(test)]
            fail_writes: false,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS libraries (
                name TEXT PRIMARY KEY,
                current_version TEXT NOT NULL,
                latest_version TEXT NOT NULL,
                compatible INTEGER NOT NULL,
                release_date TEXT,
                changelog_url TEXT,
                breaking_changes TEXT NOT NULL DEFAULT '[]',
                check_error TEXT,
                checked_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS current_operation (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                library TEXT NOT NULL,
                target_version TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL,
                error TEXT,
                started_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                library TEXT NOT NULL,
                version TEXT NOT NULL,
                success INTEGER NOT NULL,
                failure_reason TEXT,
                timestamp INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_library ON history(library);
            ",
        )?;
        Ok(())
    }

    /// Replace catalog entries in one transaction so a check is never
    /// partially visible.
    pub fn replace_catalog(&mut self, entries: &[LibraryVersion]) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        for entry in entries {
            let breaking = serde_json::to_string(&entry.breaking_changes)
                .unwrap_or_else(|_| "[]".to_string());
            tx.execute(
                "INSERT OR REPLACE INTO libraries
                 (name, current_version, latest_version, compatible, release_date,
                  changelog_url, breaking_changes, check_error, checked_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.name,
                    entry.current_version,
                    entry.latest_version,
                    entry.compatible,
                    entry.release_date,
                    entry.changelog_url,
                    breaking,
                    entry.check_error,
                    entry.checked_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_library(&self, name: &str) -> Result<Option<LibraryVersion>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, current_version, latest_version, compatible, release_date,
                    changelog_url, breaking_changes, check_error, checked_at
             FROM libraries WHERE name = ?1",
        )?;
        let mut rows = stmt.query(params![name])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row_to_library(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_libraries(&self) -> Result<Vec<LibraryVersion>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, current_version, latest_version, compatible, release_date,
                    changelog_url, breaking_changes, check_error, checked_at
             FROM libraries ORDER BY name",
        )?;
        let entries = stmt.query_map([], row_to_library)?;
        entries.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Advance the installed version after a completed update.
    pub fn set_current_version(&self, name: &str, version: &str) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE libraries SET current_version = ?2 WHERE name = ?1",
            params![name, version],
        )?;
        if updated == 0 {
            return Err(DbError::LibraryNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Write the current-operation snapshot (single nullable row).
    pub fn write_operation(&self, op: &UpdateOperation) -> Result<(), DbError> {
        #[cfg(test)]
        if self.fail_writes {
            return Err(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO current_operation
             (id, library, target_version, status, progress, error, started_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                op.library,
                op.target_version,
                op.status.as_str(),
                op.progress,
                op.error,
                op.started_at,
            ],
        )?;
        Ok(())
    }

    pub fn read_operation(&self) -> Result<Option<UpdateOperation>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT library, target_version, status, progress, error, started_at
             FROM current_operation WHERE id = 1",
        )?;
        let mut rows = stmt.query([])?;

        if let Some(row) = rows.next()? {
            let status: String = row.get(2)?;
            let status = UpdatePhase::from_str(&status).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    e.into(),
                )
            })?;
            Ok(Some(UpdateOperation::from_snapshot(
                row.get(0)?,
                row.get(1)?,
                status,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            )))
        } else {
            Ok(None)
        }
    }

    pub fn clear_operation(&self) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM current_operation WHERE id = 1", [])?;
        Ok(())
    }

    /// Append one ledger row. Rows are never updated or deleted.
    pub fn append_history(&self, entry: &HistoryEntry) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO history (library, version, success, failure_reason, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.library,
                entry.version,
                entry.success,
                entry.failure_reason,
                entry.timestamp,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Query the ledger, most recent first.
    pub fn get_history(
        &self,
        limit: usize,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, DbError> {
        let mut sql = String::from(
            "SELECT id, library, version, success, failure_reason, timestamp FROM history",
        );
        let mut clauses: Vec<&str> = Vec::new();
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(library) = &filter.library {
            clauses.push("library = ?");
            bound.push(Box::new(library.clone()));
        }
        if let Some(outcome) = filter.outcome {
            clauses.push("success = ?");
            bound.push(Box::new(outcome));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
        bound.push(Box::new(limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt.query_map(
            rusqlite::params_from_iter(bound.iter().map(|p| p.as_ref())),
            |row| {
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    library: row.get(1)?,
                    version: row.get(2)?,
                    success: row.get(3)?,
                    failure_reason: row.get(4)?,
                    timestamp: row.get(5)?,
                })
            },
        )?;
        entries.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn row_to_library(row: &rusqlite::Row<'_>) -> rusqlite::Result<LibraryVersion> {
    let breaking_raw: String = row.get(6)?;
    let breaking_changes = serde_json::from_str(&breaking_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(LibraryVersion {
        name: row.get(0)?,
        current_version: row.get(1)?,
        latest_version: row.get(2)?,
        compatible: row.get(3)?,
        release_date: row.get(4)?,
        changelog_url: row.get(5)?,
        breaking_changes,
        check_error: row.get(7)?,
        checked_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(name: &str, current: &str, latest: &str, compatible: bool) -> LibraryVersion {
        LibraryVersion {
            name: name.to_string(),
            current_version: current.to_string(),
            latest_version: latest.to_string(),
            compatible,
            release_date: None,
            changelog_url: None,
            breaking_changes: if compatible {
                vec![]
            } else {
                vec!["api changed".to_string()]
            },
            check_error: None,
            checked_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_catalog_replace_and_read() {
        let dir = tempdir().unwrap();
        let mut db = StateDb::open_at(&dir.path().join("state.db")).unwrap();

        db.replace_catalog(&[
            entry("zigbee-herdsman", "0.14.0", "0.15.0", true),
            entry("mqtt-lib", "2.0.0", "3.0.0", false),
        ])
        .unwrap();

        let libs = db.list_libraries().unwrap();
        assert_eq!(libs.len(), 2);
        assert_eq!(libs[0].name, "mqtt-lib");
        assert!(!libs[0].compatible);
        assert_eq!(libs[0].breaking_changes, vec!["api changed"]);

        // refresh supersedes by key
        db.replace_catalog(&[entry("mqtt-lib", "2.0.0", "3.1.0", false)])
            .unwrap();
        let lib = db.get_library("mqtt-lib").unwrap().unwrap();
        assert_eq!(lib.latest_version, "3.1.0");
        assert_eq!(db.list_libraries().unwrap().len(), 2);
    }

    #[test]
    fn test_set_current_version() {
        let dir = tempdir().unwrap();
        let mut db = StateDb::open_at(&dir.path().join("state.db")).unwrap();
        db.replace_catalog(&[entry("wifi-scanner", "1.0.0", "1.1.0", true)])
            .unwrap();

        db.set_current_version("wifi-scanner", "1.1.0").unwrap();
        let lib = db.get_library("wifi-scanner").unwrap().unwrap();
        assert_eq!(lib.current_version, "1.1.0");

        assert!(matches!(
            db.set_current_version("ghost", "1.0.0"),
            Err(DbError::LibraryNotFound(_))
        ));
    }

    #[test]
    fn test_operation_row_is_nullable_singleton() {
        let dir = tempdir().unwrap();
        let db = StateDb::open_at(&dir.path().join("state.db")).unwrap();

        assert!(db.read_operation().unwrap().is_none());

        let mut op = UpdateOperation::new("zigbee-herdsman", "0.15.0");
        db.write_operation(&op).unwrap();
        op.status = UpdatePhase::Downloading;
        op.progress = 25;
        db.write_operation(&op).unwrap();

        let read = db.read_operation().unwrap().unwrap();
        assert_eq!(read.library, "zigbee-herdsman");
        assert_eq!(read.status, UpdatePhase::Downloading);
        assert_eq!(read.progress, 25);

        db.clear_operation().unwrap();
        assert!(db.read_operation().unwrap().is_none());
    }

    #[test]
    fn test_history_append_and_filters() {
        let dir = tempdir().unwrap();
        let db = StateDb::open_at(&dir.path().join("state.db")).unwrap();

        db.append_history(&HistoryEntry::new("zigbee-herdsman", "0.15.0", true, None, 100))
            .unwrap();
        db.append_history(&HistoryEntry::new(
            "mqtt-lib",
            "3.0.0",
            false,
            Some("rolled back successfully".to_string()),
            200,
        ))
        .unwrap();
        db.append_history(&HistoryEntry::new("zigbee-herdsman", "0.15.1", true, None, 300))
            .unwrap();

        // most recent first
        let all = db.get_history(10, &HistoryFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].version, "0.15.1");

        let limited = db.get_history(1, &HistoryFilter::default()).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].version, "0.15.1");

        let by_library = db
            .get_history(
                10,
                &HistoryFilter {
                    library: Some("mqtt-lib".to_string()),
                    outcome: None,
                },
            )
            .unwrap();
        assert_eq!(by_library.len(), 1);
        assert!(!by_library[0].success);

        let failures = db
            .get_history(
                10,
                &HistoryFilter {
                    library: None,
                    outcome: Some(false),
                },
            )
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].failure_reason.as_deref(),
            Some("rolled back successfully")
        );
    }
}
