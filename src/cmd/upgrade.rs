//! Upgrade command - run one library update through the staged pipeline

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast::error::RecvError;

use crate::config::HubConfig;
use crate::core::catalog;
use crate::ops::installer::StagedInstaller;
use crate::ops::orchestrator::Orchestrator;
use crate::remote::HttpVersionSource;
use crate::store::DbHandle;

/// Start an update of `library` and stay attached until it reaches a
/// terminal state. Ctrl-C requests cancellation (honored only while nothing
/// has been mutated yet).
pub async fn upgrade(library: &str) -> Result<()> {
    let config = HubConfig::load(&crate::config_path())?;
    let db = DbHandle::spawn().context("Failed to open state database")?;
    let source = Arc::new(HttpVersionSource::new(&config.source_url));

    // refresh this entry first so the compatibility decision uses fresh data
    let names = vec![library.to_string()];
    let entries = catalog::check(&db, source.as_ref(), &config, Some(&names)).await?;
    let entry = entries
        .first()
        .with_context(|| format!("no catalog entry for '{library}'"))?;

    if let Some(err) = &entry.check_error {
        bail!("could not reach the version source for '{library}': {err}");
    }
    if !entry.update_pending() {
        println!("'{library}' is up to date ({})", entry.current_version);
        return Ok(());
    }

    let installer = Arc::new(StagedInstaller::new(crate::store_path(), crate::cache_path()));
    let orchestrator = Orchestrator::new(db, source, installer, config.timeouts.clone());

    let mut updates = orchestrator.subscribe();
    let handle = orchestrator.start_update(library).await?;
    println!(
        "Updating {library}: {} -> {}",
        entry.current_version, handle.target_version
    );

    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                match orchestrator.cancel_update() {
                    Ok(()) => eprintln!("cancellation requested"),
                    Err(err) => eprintln!("{err}"),
                }
            }
        });
    }

    let mut last_phase = None;
    let mut last_printed: u8 = 0;
    let failure = loop {
        match updates.recv().await {
            Ok(op) => {
                if Some(op.status) != last_phase || op.progress >= last_printed + 10 {
                    println!("  {:<12} {:>3}%", op.status.to_string(), op.progress);
                    last_phase = Some(op.status);
                    last_printed = op.progress;
                }
                if op.status.is_terminal() {
                    break op.error;
                }
            }
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break None,
        }
    };
    handle.wait().await;

    match failure {
        None => {
            println!("✓ {library} updated");
            Ok(())
        }
        Some(reason) => bail!("{reason}"),
    }
}
