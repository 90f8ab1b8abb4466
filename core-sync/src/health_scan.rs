//! Health directory scan.
//!
//! Wellness files are not taken from the download stream. They are picked
//! up from the user's data directory after the download finishes:
//! `sleep/*.fit` directly and everything below `monitoring/`.

use crate::classifier::is_health_file;
use crate::error::Result;
use bridge_traits::storage::FileSystemAccess;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SLEEP_DIR: &str = "sleep";
pub const MONITORING_DIR: &str = "monitoring";

/// Wellness FIT files under `user_data_dir`, sorted.
pub async fn find_health_files(
    fs: &dyn FileSystemAccess,
    user_data_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();

    let sleep_dir = user_data_dir.join(SLEEP_DIR);
    if fs.exists(&sleep_dir).await? {
        for entry in fs.list_directory(&sleep_dir).await? {
            if !fs.metadata(&entry).await?.is_directory {
                candidates.push(entry);
            }
        }
    }

    let monitoring_dir = user_data_dir.join(MONITORING_DIR);
    candidates.extend(fs.list_files_recursive(&monitoring_dir).await?);

    let mut files: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|path| is_health_file(path))
        .collect();
    files.sort();
    files.dedup();

    debug!(count = files.len(), "Found health files");
    Ok(files)
}
