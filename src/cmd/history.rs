//! History command - the audit ledger of past updates

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::store::history::HistoryFilter;
use crate::store::DbHandle;

pub async fn history(
    library: Option<String>,
    failed: bool,
    ok: bool,
    limit: usize,
) -> Result<()> {
    let db = DbHandle::spawn().context("Failed to open state database")?;

    let filter = HistoryFilter {
        library,
        outcome: if failed {
            Some(false)
        } else if ok {
            Some(true)
        } else {
            None
        },
    };

    let entries = db.get_history(limit, filter).await?;
    if entries.is_empty() {
        println!("No update history.");
        return Ok(());
    }

    for entry in entries {
        let time = DateTime::from_timestamp(entry.timestamp, 0)
            .unwrap_or_default()
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S");

        let outcome = if entry.success { "OK    " } else { "FAILED" };
        match &entry.failure_reason {
            Some(reason) => println!(
                "[{time}] {outcome} {} {} - {reason}",
                entry.library, entry.version
            ),
            None => println!("[{time}] {outcome} {} {}", entry.library, entry.version),
        }
    }
    Ok(())
}
