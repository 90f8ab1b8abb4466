//! Storage and File System Abstractions
//!
//! Provides platform-agnostic traits for local file access and for the
//! document store that holds processed fitness data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts the handful of file operations the sync engine needs so that
/// tests can run against an in-memory tree and production against disk.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn ensure_output(fs: &dyn FileSystemAccess, dir: &Path) -> Result<()> {
///     if !fs.exists(dir).await? {
///         fs.create_dir_all(dir).await?;
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Recursively list every regular file below `path`.
    ///
    /// Missing directories yield an empty list.
    async fn list_files_recursive(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.exists(path).await? {
            return Ok(files);
        }

        let mut pending = vec![path.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for entry in self.list_directory(&dir).await? {
                if self.metadata(&entry).await?.is_directory {
                    pending.push(entry);
                } else {
                    files.push(entry);
                }
            }
        }

        Ok(files)
    }
}

/// Kinds of documents the processors write for an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Session,
    Record,
    Lap,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Session => "sessions",
            DocumentKind::Record => "records",
            DocumentKind::Lap => "laps",
        }
    }
}

/// Query for activity ids already ingested for a user inside a time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingIdsQuery {
    pub user_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Upper bound on returned ids.
    pub limit: usize,
}

/// Document store holding processed activity and wellness data.
///
/// Writes are performed by the processors themselves; the sync engine only
/// needs to bring the store up and read back what is already there.
/// Implementations are expected to upsert by `(user_id, activity_id)` so that
/// re-delivered work stays idempotent.
#[async_trait]
pub trait ActivityStorage: Send + Sync {
    /// Connect and make sure indices exist.
    async fn initialize(&self) -> Result<()>;

    /// Activity ids whose session documents fall inside the query window.
    async fn existing_activity_ids(&self, query: &ExistingIdsQuery) -> Result<HashSet<String>>;

    /// Number of documents of `kind` stored for an activity, capped at `limit`.
    async fn count_documents(
        &self,
        kind: DocumentKind,
        user_id: &str,
        activity_id: &str,
        limit: usize,
    ) -> Result<usize>;

    /// Release connections. Default is a no-op.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use std::collections::HashMap;

    /// In-memory tree: directories map to their children.
    struct MemoryFs {
        dirs: HashMap<PathBuf, Vec<PathBuf>>,
    }

    #[async_trait]
    impl FileSystemAccess for MemoryFs {
        async fn exists(&self, path: &Path) -> Result<bool> {
            Ok(self.dirs.contains_key(path) || self.dirs.values().flatten().any(|p| p == path))
        }

        async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
            Ok(FileMetadata {
                size: 0,
                created_at: None,
                modified_at: None,
                is_directory: self.dirs.contains_key(path),
            })
        }

        async fn create_dir_all(&self, _path: &Path) -> Result<()> {
            Err(BridgeError::NotAvailable("read-only".to_string()))
        }

        async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
            Ok(self.dirs.get(path).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_list_files_recursive_walks_nested_directories() {
        let mut dirs = HashMap::new();
        dirs.insert(
            PathBuf::from("/m"),
            vec![PathBuf::from("/m/2024"), PathBuf::from("/m/a.fit")],
        );
        dirs.insert(PathBuf::from("/m/2024"), vec![PathBuf::from("/m/2024/b.fit")]);
        let fs = MemoryFs { dirs };

        let mut files = fs.list_files_recursive(Path::new("/m")).await.unwrap();
        files.sort();
        assert_eq!(
            files,
            vec![PathBuf::from("/m/2024/b.fit"), PathBuf::from("/m/a.fit")]
        );
    }

    #[tokio::test]
    async fn test_list_files_recursive_missing_dir_is_empty() {
        let fs = MemoryFs {
            dirs: HashMap::new(),
        };
        let files = fs.list_files_recursive(Path::new("/nope")).await.unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_document_kind_names() {
        assert_eq!(DocumentKind::Session.as_str(), "sessions");
        assert_eq!(DocumentKind::Record.as_str(), "records");
        assert_eq!(DocumentKind::Lap.as_str(), "laps");
    }
}
