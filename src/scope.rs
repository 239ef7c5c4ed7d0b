//! On-disk layout of a scope.
//!
//! Each scope lives in one `.floop` directory:
//!
//! ```text
//! <root>/behaviors.db        relational graph store
//! <root>/corrections.jsonl   append-only corrections log
//! <root>/manifest.yaml       version + creation timestamp
//! <root>/sessions/           per-session state (global scope only)
//! <root>/backups/            snapshots
//! ```
//!
//! The global root defaults to `~/.floop`; a local root is
//! `<project>/.floop`, discovered by walking up from a starting
//! directory.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the scope directory.
pub const SCOPE_DIR_NAME: &str = ".floop";

/// Current manifest version.
pub const MANIFEST_VERSION: u32 = 1;

/// Per-scope manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
        }
    }
}

/// Filesystem layout of one scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopePaths {
    root: PathBuf,
}

impl ScopePaths {
    /// A scope rooted at an explicit directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The user-global scope: `~/.floop` (tilde-expanded).
    pub fn global() -> Self {
        let home = shellexpand::tilde("~").into_owned();
        Self {
            root: PathBuf::from(home).join(SCOPE_DIR_NAME),
        }
    }

    /// The local scope of a project root: `<project>/.floop`.
    pub fn local(project_root: impl AsRef<Path>) -> Self {
        Self {
            root: project_root.as_ref().join(SCOPE_DIR_NAME),
        }
    }

    /// Walk up from `start` looking for an existing `.floop` directory.
    pub fn discover_local(start: impl AsRef<Path>) -> Option<Self> {
        let mut current = Some(start.as_ref());
        while let Some(dir) = current {
            let candidate = dir.join(SCOPE_DIR_NAME);
            if candidate.is_dir() {
                return Some(Self { root: candidate });
            }
            current = dir.parent();
        }
        None
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn behaviors_db(&self) -> PathBuf {
        self.root.join("behaviors.db")
    }

    pub fn corrections_log(&self) -> PathBuf {
        self.root.join("corrections.jsonl")
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join("manifest.yaml")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// Create the scope directory and write the manifest if absent.
    /// Session directories are created lazily with owner-only
    /// permissions by the session store.
    pub fn initialize(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;

        let manifest_path = self.manifest();
        if !manifest_path.exists() {
            let manifest = Manifest::default();
            let yaml = serde_yaml::to_string(&manifest)
                .map_err(|e| Error::Internal(format!("manifest serialization failed: {}", e)))?;
            std::fs::write(&manifest_path, yaml)?;
        }
        Ok(())
    }

    /// Read the manifest, tolerating absence and damage.
    pub fn read_manifest(&self) -> Option<Manifest> {
        let path = self.manifest();
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "manifest unreadable");
                    None
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "manifest unreadable");
                None
            }
        }
    }
}
