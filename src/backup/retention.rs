//! Retention policy for snapshot directories.

use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Composite retention policy. All configured limits apply together: a
/// snapshot survives only if it is within the count limit, younger than
/// the age limit, and fits in the byte budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Keep at most this many snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_count: Option<usize>,
    /// Keep only snapshots younger than this many days.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<i64>,
    /// Keep at most this many bytes in total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_bytes: Option<u64>,
}

impl RetentionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_count(mut self, count: usize) -> Self {
        self.max_count = Some(count);
        self
    }

    pub fn with_max_age_days(mut self, days: i64) -> Self {
        self.max_age_days = Some(days);
        self
    }

    pub fn with_max_total_bytes(mut self, bytes: u64) -> Self {
        self.max_total_bytes = Some(bytes);
        self
    }
}

/// Outcome of applying a retention policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub kept: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub bytes_freed: u64,
}

struct SnapshotFile {
    path: PathBuf,
    size: u64,
    modified: DateTime<Utc>,
}

/// Apply a retention policy to the snapshot files in a directory.
///
/// Only files with the given extension are considered. Newest snapshots
/// are kept first; deletion proceeds from the oldest.
pub fn apply_retention(
    dir: &Path,
    extension: &str,
    policy: &RetentionPolicy,
) -> Result<RetentionReport> {
    let mut files: Vec<SnapshotFile> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified: DateTime<Utc> = meta.modified()?.into();
        files.push(SnapshotFile {
            path,
            size: meta.len(),
            modified,
        });
    }

    // Newest first
    files.sort_by(|a, b| b.modified.cmp(&a.modified));

    let now = Utc::now();
    let mut report = RetentionReport::default();
    let mut total_bytes: u64 = 0;

    for (index, file) in files.iter().enumerate() {
        let mut keep = true;

        if let Some(max_count) = policy.max_count {
            if index >= max_count {
                keep = false;
            }
        }
        if let Some(max_age_days) = policy.max_age_days {
            if now - file.modified > Duration::days(max_age_days) {
                keep = false;
            }
        }
        if let Some(max_total_bytes) = policy.max_total_bytes {
            if total_bytes + file.size > max_total_bytes {
                keep = false;
            }
        }

        if keep {
            total_bytes += file.size;
            report.kept.push(file.path.clone());
        } else {
            debug!(path = %file.path.display(), "retention deleting snapshot");
            std::fs::remove_file(&file.path)?;
            report.bytes_freed += file.size;
            report.deleted.push(file.path.clone());
        }
    }

    Ok(report)
}
