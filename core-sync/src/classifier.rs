//! File Classifier
//!
//! Decides from a file name alone whether a downloaded FIT file carries an
//! activity or wellness data. Anything without a wellness marker is treated
//! as an activity.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Case-insensitive substrings that mark a wellness file.
const HEALTH_KEYWORDS: &[&str] = &[
    "wellness",
    "sleep",
    "hrv",
    "monitoring",
    "metrics",
    "health",
    "body battery",
    "body_battery",
    "stress",
];

const FIT_EXTENSION: &str = "fit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Activity,
    Health,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Activity => "activity",
            FileCategory::Health => "health",
        }
    }
}

/// Classify a path by its file name. Directories are ignored.
pub fn classify(path: &Path) -> FileCategory {
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy().to_lowercase(),
        None => return FileCategory::Activity,
    };

    if HEALTH_KEYWORDS.iter().any(|keyword| name.contains(keyword)) {
        FileCategory::Health
    } else {
        FileCategory::Activity
    }
}

/// `true` for FIT files
pub fn is_fit_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(FIT_EXTENSION))
        .unwrap_or(false)
}

/// A wellness FIT file, as picked up by the health directory scan.
pub fn is_health_file(path: &Path) -> bool {
    is_fit_file(path) && classify(path) == FileCategory::Health
}
