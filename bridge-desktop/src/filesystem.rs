//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Tokio-based file system implementation
///
/// Backs existence checks and directory scans for downloaded FIT files with
/// `tokio::fs`. The type is stateless; all paths come from the caller.
#[derive(Debug, Clone, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(Self::map_io_error)?;

        Ok(FileMetadata {
            size: metadata.len(),
            created_at: metadata
                .created()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(Self::map_io_error)?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(Self::map_io_error)?
        {
            entries.push(entry.path());
        }

        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exists_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("WELLNESS_1.fit");
        std::fs::write(&file, b"fit").unwrap();

        let fs = TokioFileSystem::new();
        assert!(fs.exists(&file).await.unwrap());
        assert!(!fs.exists(&dir.path().join("missing.fit")).await.unwrap());

        let meta = fs.metadata(&file).await.unwrap();
        assert_eq!(meta.size, 3);
        assert!(!meta.is_directory);
    }

    #[tokio::test]
    async fn test_recursive_listing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("monitoring").join("2024");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("a_MONITORING.fit"), b"x").unwrap();
        std::fs::write(dir.path().join("monitoring").join("b.fit"), b"x").unwrap();

        let fs = TokioFileSystem::new();
        let mut files = fs
            .list_files_recursive(&dir.path().join("monitoring"))
            .await
            .unwrap();
        files.sort();

        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|p| p.ends_with("2024/a_MONITORING.fit")));
    }

    #[tokio::test]
    async fn test_create_dir_all() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("user").join("downloads");

        let fs = TokioFileSystem::new();
        fs.create_dir_all(&target).await.unwrap();
        assert!(fs.exists(&target).await.unwrap());
        assert!(fs.metadata(&target).await.unwrap().is_directory);
    }
}
