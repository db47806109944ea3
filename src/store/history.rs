//! History ledger record types.

use serde::{Deserialize, Serialize};

/// One audit record. Created exactly once per terminal update operation;
/// never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Option<i64>,
    pub library: String,
    pub version: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    /// Unix seconds.
    pub timestamp: i64,
}

impl HistoryEntry {
    pub fn new(
        library: &str,
        version: &str,
        success: bool,
        failure_reason: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: None,
            library: library.to_string(),
            version: version.to_string(),
            success,
            failure_reason,
            timestamp,
        }
    }
}

/// Query filters for the ledger. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub library: Option<String>,
    /// `Some(true)` for successes only, `Some(false)` for failures only.
    pub outcome: Option<bool>,
}
