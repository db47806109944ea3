//! Check command - refresh the version catalog

use anyhow::{Context, Result};

use crate::config::HubConfig;
use crate::core::catalog::{self, LibraryVersion};
use crate::remote::HttpVersionSource;
use crate::store::DbHandle;

/// Refresh the catalog (all tracked libraries, or a subset) and render it.
pub async fn check(libraries: &[String]) -> Result<()> {
    let config = HubConfig::load(&crate::config_path())?;
    if config.libraries.is_empty() {
        println!(
            "No libraries tracked. Add [[library]] entries to {}",
            crate::config_path().display()
        );
        return Ok(());
    }

    let db = DbHandle::spawn().context("Failed to open state database")?;
    let source = HttpVersionSource::new(&config.source_url);
    let subset = if libraries.is_empty() {
        None
    } else {
        Some(libraries)
    };

    let entries = catalog::check(&db, &source, &config, subset).await?;
    render(&entries);
    Ok(())
}

fn render(entries: &[LibraryVersion]) {
    println!(
        "{:<24} {:<12} {:<12} STATUS",
        "LIBRARY", "CURRENT", "LATEST"
    );
    println!("{}", "-".repeat(72));

    for entry in entries {
        let status = if let Some(err) = &entry.check_error {
            format!("check failed: {err}")
        } else if !entry.update_pending() {
            "up to date".to_string()
        } else if entry.compatible {
            "update available".to_string()
        } else {
            format!(
                "incompatible ({} breaking change{})",
                entry.breaking_changes.len(),
                if entry.breaking_changes.len() == 1 { "" } else { "s" }
            )
        };

        println!(
            "{:<24} {:<12} {:<12} {status}",
            entry.name, entry.current_version, entry.latest_version
        );
        for change in &entry.breaking_changes {
            println!("{:<24} ! {change}", "");
        }
    }
}
