// src/services/dataset_cache.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use crate::{error::AppError, models::record::Dataset};

/// Memoizes the parsed local dataset file until explicitly invalidated.
///
/// Readers share one `Arc<Dataset>`; invalidation only drops the slot, so a
/// reader holding the previous dataset keeps a consistent view.
pub struct DatasetCache {
    path: PathBuf,
    slot: RwLock<Option<Arc<Dataset>>>,
    loads: AtomicUsize,
}

impl DatasetCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slot: RwLock::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the held dataset, reading the file first if nothing is held.
    pub async fn get(&self) -> Result<Arc<Dataset>, AppError> {
        if let Some(dataset) = self.slot.read().await.as_ref() {
            return Ok(dataset.clone());
        }

        let mut slot = self.slot.write().await;
        // Another request may have loaded it while we waited for the lock.
        if let Some(dataset) = slot.as_ref() {
            return Ok(dataset.clone());
        }

        tracing::info!("Reading data from '{}'", self.path.display());
        let path = self.path.clone();
        let dataset = tokio::task::spawn_blocking(move || Dataset::from_path(&path)).await??;
        self.loads.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Loaded {} rows", dataset.len());

        let dataset = Arc::new(dataset);
        *slot = Some(dataset.clone());
        Ok(dataset)
    }

    /// Drops the held dataset; the next `get` re-reads the file.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
        tracing::info!("Dataset cache cleared");
    }

    /// How many times the file has been read.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "username,qnumber,score,scoremax,trycount,hasreference,datetime\n";

    fn write_rows(path: &Path, rows: &[&str]) {
        let mut content = HEADER.to_string();
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn file_is_read_once_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        write_rows(&path, &["alice,1,5,10,1,False,"]);
        let cache = DatasetCache::new(&path);

        assert_eq!(cache.get().await.unwrap().len(), 1);
        write_rows(&path, &["alice,1,5,10,1,False,", "bob,1,7,10,1,False,"]);
        assert_eq!(cache.get().await.unwrap().len(), 1);
        assert_eq!(cache.load_count(), 1);

        cache.invalidate().await;
        assert_eq!(cache.get().await.unwrap().len(), 2);
        assert_eq!(cache.load_count(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let cache = DatasetCache::new(&path);

        assert!(matches!(cache.get().await, Err(AppError::NotFound(_))));

        write_rows(&path, &["alice,1,5,10,1,False,"]);
        assert_eq!(cache.get().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot_across_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        write_rows(&path, &["alice,1,5,10,1,False,"]);
        let cache = DatasetCache::new(&path);

        let before = cache.get().await.unwrap();
        write_rows(&path, &[]);
        cache.invalidate().await;

        assert_eq!(before.len(), 1);
        assert!(cache.get().await.unwrap().is_empty());
    }
}
