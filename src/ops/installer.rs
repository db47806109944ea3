//! Library installer
//!
//! The seam between the orchestrator and the machinery that actually places
//! a library release on disk. The shipped implementation treats a release
//! as an opaque bundle: it streams the artifact into the cache, stages it
//! under the store, and activates it by retargeting the library's `current`
//! symlink, keeping the previous target around for rollback.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::ops::error::StepError;

/// Byte-progress callback: `(downloaded, total)`.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Stage-level operations of the update pipeline.
#[async_trait]
pub trait LibraryInstaller: Send + Sync {
    /// Retrieve the release bundle, reporting byte progress. Must stop
    /// promptly and clean up when `cancel` is set.
    async fn download(
        &self,
        library: &str,
        version: &str,
        url: &str,
        progress: ProgressFn<'_>,
        cancel: &AtomicBool,
    ) -> Result<PathBuf, StepError>;

    /// Stage the bundle and make it the active version.
    async fn install(&self, library: &str, version: &str, bundle: &Path) -> Result<(), StepError>;

    /// Post-install verification of the activated version.
    async fn verify(&self, library: &str, version: &str) -> Result<(), StepError>;

    /// Restore the pre-update state after an install/verify failure.
    async fn rollback(&self, library: &str) -> Result<(), StepError>;
}

/// Filesystem-staging installer used on the hub.
#[derive(Debug)]
pub struct StagedInstaller {
    client: Client,
    store_root: PathBuf,
    cache_root: PathBuf,
}

const VERSION_MARKER: &str = ".version";
const PREVIOUS_MARKER: &str = ".previous";
const CURRENT_LINK: &str = "current";

impl StagedInstaller {
    pub fn new(store_root: PathBuf, cache_root: PathBuf) -> Self {
        Self {
            client: Client::new(),
            store_root,
            cache_root,
        }
    }

    fn library_root(&self, library: &str) -> PathBuf {
        self.store_root.join(library)
    }

    fn version_dir(&self, library: &str, version: &str) -> PathBuf {
        self.library_root(library).join(version)
    }
}

#[async_trait]
impl LibraryInstaller for StagedInstaller {
    async fn download(
        &self,
        library: &str,
        version: &str,
        url: &str,
        progress: ProgressFn<'_>,
        cancel: &AtomicBool,
    ) -> Result<PathBuf, StepError> {
        tokio::fs::create_dir_all(&self.cache_root).await?;
        let dest = self.cache_root.join(format!("{library}-{version}.bundle"));
        // stream into a partial file; the final name only ever holds a
        // complete bundle, even if this future is dropped mid-write
        let partial = dest.with_extension("bundle.part");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?
            .error_for_status()?;

        let total = response.content_length();
        let mut file = File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            if cancel.load(Ordering::SeqCst) {
                drop(file);
                tokio::fs::remove_file(&partial).await.ok();
                return Err(StepError::Cancelled);
            }
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            progress(downloaded, total);
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, &dest).await?;

        Ok(dest)
    }

    async fn install(&self, library: &str, version: &str, bundle: &Path) -> Result<(), StepError> {
        let version_dir = self.version_dir(library, version);
        tokio::fs::create_dir_all(&version_dir)
            .await
            .map_err(|e| StepError::Install(format!("failed to stage {library}: {e}")))?;

        tokio::fs::copy(bundle, version_dir.join("bundle"))
            .await
            .map_err(|e| StepError::Install(format!("failed to copy bundle: {e}")))?;
        tokio::fs::write(version_dir.join(VERSION_MARKER), version)
            .await
            .map_err(|e| StepError::Install(format!("failed to write version marker: {e}")))?;

        let root = self.library_root(library);
        let link = root.join(CURRENT_LINK);

        // remember the previously active version so rollback can restore it
        match tokio::fs::read_link(&link).await {
            Ok(previous) => {
                tokio::fs::write(root.join(PREVIOUS_MARKER), previous.display().to_string())
                    .await
                    .map_err(|e| {
                        StepError::Install(format!("failed to record previous version: {e}"))
                    })?;
                tokio::fs::remove_file(&link)
                    .await
                    .map_err(|e| StepError::Install(format!("failed to unlink current: {e}")))?;
            }
            Err(_) => {
                tokio::fs::remove_file(root.join(PREVIOUS_MARKER)).await.ok();
            }
        }

        tokio::fs::symlink(&version_dir, &link)
            .await
            .map_err(|e| StepError::Install(format!("failed to activate {version}: {e}")))?;
        Ok(())
    }

    async fn verify(&self, library: &str, version: &str) -> Result<(), StepError> {
        let link = self.library_root(library).join(CURRENT_LINK);
        let target = tokio::fs::read_link(&link)
            .await
            .map_err(|e| StepError::Verify(format!("active link missing for {library}: {e}")))?;

        let marker = tokio::fs::read_to_string(target.join(VERSION_MARKER))
            .await
            .map_err(|e| StepError::Verify(format!("version marker unreadable: {e}")))?;
        if marker.trim() != version {
            return Err(StepError::Verify(format!(
                "active version is '{}', expected '{version}'",
                marker.trim()
            )));
        }
        Ok(())
    }

    async fn rollback(&self, library: &str) -> Result<(), StepError> {
        let root = self.library_root(library);
        let link = root.join(CURRENT_LINK);
        let previous_marker = root.join(PREVIOUS_MARKER);

        tokio::fs::remove_file(&link).await.ok();

        match tokio::fs::read_to_string(&previous_marker).await {
            Ok(previous) => {
                let previous = PathBuf::from(previous.trim());
                tokio::fs::symlink(&previous, &link).await.map_err(|e| {
                    StepError::Rollback(format!(
                        "failed to restore {} for {library}: {e}",
                        previous.display()
                    ))
                })?;
                tokio::fs::remove_file(&previous_marker).await.ok();
                Ok(())
            }
            // first install of this library: restoring means "nothing active"
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StepError::Rollback(format!(
                "previous version unreadable for {library}: {err}"
            ))),
        }
    }
}
