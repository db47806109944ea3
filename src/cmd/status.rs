//! Status command - what is happening now, and what happened last

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::store::history::HistoryFilter;
use crate::store::DbHandle;

/// Show the current operation snapshot (or "idle") plus the most recent
/// history entry. Works even when no pipeline is running; these are read
/// paths separate from the worker.
pub async fn status() -> Result<()> {
    let db = DbHandle::spawn().context("Failed to open state database")?;

    match db.read_operation().await? {
        Some(op) => {
            println!("Update in progress:");
            println!("  library:  {}", op.library);
            println!("  target:   {}", op.target_version);
            println!("  phase:    {}", op.status);
            println!("  progress: {}%", op.progress);
            if let Some(err) = &op.error {
                println!("  error:    {err}");
            }
            println!("  started:  {}", format_time(op.started_at));
        }
        None => println!("No update operation in progress."),
    }

    let last = db.get_history(1, HistoryFilter::default()).await?;
    if let Some(entry) = last.first() {
        let outcome = if entry.success { "ok" } else { "failed" };
        println!(
            "Last update: {} {} ({outcome}, {})",
            entry.library,
            entry.version,
            format_time(entry.timestamp)
        );
    }
    Ok(())
}

fn format_time(unix_secs: i64) -> String {
    DateTime::from_timestamp(unix_secs, 0)
        .unwrap_or_default()
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
