// src/services/sync.rs

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    config::StorageConfig, error::AppError, store::BlobStore, utils::checksum::md5_file,
};

/// Why a sync attempt ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// No local file existed, so the dataset was downloaded.
    Downloaded,
    /// The local checksum differed from the published one; re-downloaded.
    Replaced,
    /// Checksums matched; nothing was transferred.
    UpToDate,
}

impl SyncOutcome {
    /// True when the local file changed and held datasets are stale.
    pub fn changed(self) -> bool {
        !matches!(self, SyncOutcome::UpToDate)
    }
}

/// Keeps the local dataset file in step with the remote bucket.
///
/// Only the file is touched; callers decide whether to invalidate a
/// [`DatasetCache`](crate::services::dataset_cache::DatasetCache) based on the
/// returned outcome.
pub struct RemoteSync {
    store: Arc<dyn BlobStore>,
    dataset_object: String,
    checksum_object: String,
    local_path: PathBuf,
    block_size: usize,
    in_flight: Mutex<()>,
}

impl RemoteSync {
    pub fn new(
        store: Arc<dyn BlobStore>,
        storage: &StorageConfig,
        local_path: impl Into<PathBuf>,
        block_size: usize,
    ) -> Self {
        Self {
            store,
            dataset_object: storage.dataset_object.clone(),
            checksum_object: storage.checksum_object.clone(),
            local_path: local_path.into(),
            block_size,
            in_flight: Mutex::new(()),
        }
    }

    /// Downloads the dataset if it is absent locally or its checksum no
    /// longer matches the published one. Concurrent calls run one at a time.
    pub async fn synchronize(&self) -> Result<SyncOutcome, AppError> {
        self.synchronize_with(|_| std::future::ready(())).await
    }

    /// Like [`RemoteSync::synchronize`], but runs `on_change` after a download
    /// and before the next caller may start, so nobody observes the new file
    /// alongside state derived from the old one.
    pub async fn synchronize_with<F, Fut>(&self, on_change: F) -> Result<SyncOutcome, AppError>
    where
        F: FnOnce(SyncOutcome) -> Fut,
        Fut: Future<Output = ()>,
    {
        let _guard = self.in_flight.lock().await;
        let outcome = self.synchronize_locked().await?;
        if outcome.changed() {
            on_change(outcome).await;
        }
        Ok(outcome)
    }

    async fn synchronize_locked(&self) -> Result<SyncOutcome, AppError> {
        let outcome = if tokio::fs::try_exists(&self.local_path).await? {
            let local_md5 = self.local_checksum().await?;
            let remote_md5 = self.store.fetch_text(&self.checksum_object).await?;
            let remote_md5 = remote_md5.trim();
            tracing::info!("'{}' vs '{}'", local_md5, remote_md5);

            if local_md5 == remote_md5 {
                tracing::info!("md5 hash is the same, so no need to download the file");
                return Ok(SyncOutcome::UpToDate);
            }
            tracing::info!("md5 hash differs, downloading the new file");
            SyncOutcome::Replaced
        } else {
            tracing::info!(
                "No local file at '{}', downloading",
                self.local_path.display()
            );
            SyncOutcome::Downloaded
        };

        let bytes = self
            .store
            .download_to(&self.dataset_object, &self.local_path)
            .await?;
        tracing::info!(
            "Downloaded {} bytes from {} to '{}'",
            bytes,
            self.store.backend_tag(),
            self.local_path.display()
        );
        Ok(outcome)
    }

    async fn local_checksum(&self) -> Result<String, AppError> {
        let path = self.local_path.clone();
        let block_size = self.block_size;
        let digest = tokio::task::spawn_blocking(move || md5_file(&path, block_size)).await??;
        Ok(digest)
    }
}
