use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    error::AppError,
    models::record::Dataset,
    services::{dataset_cache::DatasetCache, sync::RemoteSync},
    store::BlobStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub cache: Arc<DatasetCache>,
    pub sync: Arc<RemoteSync>,
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<DatasetCache> {
    fn from_ref(state: &AppState) -> Self {
        state.cache.clone()
    }
}

/// The dataset to serve, plus a warning when the freshness check failed
/// and a previously downloaded copy is being used instead.
pub struct CurrentDataset {
    pub dataset: Arc<Dataset>,
    pub warning: Option<String>,
}

impl AppState {
    /// Wires the cache and sync around `store`.
    /// Fails if any remote storage setting is missing.
    pub fn new(config: Config, store: Arc<dyn BlobStore>) -> Result<Self, AppError> {
        let storage = config.storage.require()?;
        let cache = Arc::new(DatasetCache::new(config.local_data_path.clone()));
        let sync = Arc::new(RemoteSync::new(
            store,
            &storage,
            config.local_data_path.clone(),
            config.checksum_block_size,
        ));
        Ok(Self {
            config,
            cache,
            sync,
        })
    }

    /// Syncs with the bucket, invalidating the cache when the file changed.
    /// The invalidation happens before another sync can report the file as
    /// up to date.
    pub async fn sync_and_invalidate(&self) -> Result<bool, AppError> {
        let cache = &self.cache;
        let outcome = self
            .sync
            .synchronize_with(|_| cache.invalidate())
            .await?;
        Ok(outcome.changed())
    }

    /// Fetches new data if there is any, then returns the dataset.
    ///
    /// A failed sync is not fatal while a local copy exists: the request is
    /// served from it and the failure is reported as a warning.
    pub async fn current_dataset(&self) -> Result<CurrentDataset, AppError> {
        let warning = match self.sync_and_invalidate().await {
            Ok(_) => None,
            Err(e) => {
                tracing::error!("Sync failed, falling back to local data: {}", e);
                Some(e)
            }
        };

        match (self.cache.get().await, warning) {
            (Ok(dataset), warning) => Ok(CurrentDataset {
                dataset,
                warning: warning.map(|e| format!("Could not check for new data: {}", e)),
            }),
            // Nothing local to fall back on; the sync failure is the real cause.
            (Err(AppError::NotFound(_)), Some(sync_error)) => Err(sync_error),
            (Err(e), _) => Err(e),
        }
    }
}
