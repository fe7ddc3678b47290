// src/store/mod.rs

pub mod gcs;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::AppError;

pub use gcs::GcsStore;

/// Read-only access to the remote bucket holding the dataset and its
/// published checksum.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    fn backend_tag(&self) -> &'static str {
        "unknown"
    }

    /// Downloads a whole object into memory.
    async fn fetch_bytes(&self, object: &str) -> Result<Vec<u8>, AppError>;

    /// Downloads a small text object, such as the checksum record.
    async fn fetch_text(&self, object: &str) -> Result<String, AppError> {
        let bytes = self.fetch_bytes(object).await?;
        String::from_utf8(bytes).map_err(|e| {
            AppError::Storage(format!("object '{}' is not valid UTF-8: {}", object, e))
        })
    }

    /// Downloads an object to `dest`, replacing any existing file.
    /// Returns the number of bytes written.
    async fn download_to(&self, object: &str, dest: &Path) -> Result<u64, AppError> {
        let bytes = self.fetch_bytes(object).await?;
        write_atomically(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

/// Sibling path used while a download is in flight.
pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Writes to a `.part` sibling, then renames it over `dest`, so readers
/// see either the old file or the complete new one.
pub(crate) async fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let tmp = partial_path(dest);
    let written = tokio::fs::write(&tmp, bytes).await.map_err(AppError::from);
    discard_on_error(&tmp, written).await?;
    tokio::fs::rename(&tmp, dest).await?;
    Ok(())
}

/// Removes the `.part` file left by a failed write, then hands the result back.
pub(crate) async fn discard_on_error<T>(
    tmp: &Path,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(tmp).await {
            tracing::warn!("Could not remove '{}': {}", tmp.display(), e);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_keeps_directory_and_extension() {
        let p = partial_path(Path::new("/srv/quiz/data.csv.gz"));
        assert_eq!(p, PathBuf::from("/srv/quiz/data.csv.gz.part"));
    }

    #[tokio::test]
    async fn write_atomically_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.csv.gz");
        std::fs::write(&dest, b"old").unwrap();

        write_atomically(&dest, b"new content").await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new content");
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn failed_download_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = partial_path(&dir.path().join("data.csv.gz"));
        std::fs::write(&tmp, b"half a fi").unwrap();

        let result: Result<u64, AppError> =
            discard_on_error(&tmp, Err(AppError::Storage("connection reset".to_string()))).await;

        assert!(matches!(result, Err(AppError::Storage(_))));
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn successful_download_keeps_partial_file_for_rename() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = partial_path(&dir.path().join("data.csv.gz"));
        std::fs::write(&tmp, b"complete").unwrap();

        assert_eq!(discard_on_error(&tmp, Ok(8u64)).await.unwrap(), 8);
        assert!(tmp.exists());
    }
}
