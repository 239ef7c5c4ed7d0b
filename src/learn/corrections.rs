//! Append-only corrections log.
//!
//! One JSON object per line. Appends go straight to the end of the file;
//! rewrites (reprocessing updates the `processed` flags) go through a
//! temp file and an atomic rename so the flags always reflect ground
//! truth even across a crash.

use crate::error::{Error, Result};
use crate::fsio::atomic_write;
use crate::learn::types::Correction;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A JSONL corrections log at a fixed path.
pub struct CorrectionLog {
    path: PathBuf,
}

impl CorrectionLog {
    /// Open a log at the given path. The file is created lazily on first
    /// append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one correction.
    pub fn append(&self, correction: &Correction) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(correction)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Read every correction in the log.
    ///
    /// Unparseable lines are skipped with a warning rather than failing
    /// the whole read; a damaged line must not take the log down with it.
    pub fn read_all(&self) -> Result<Vec<Correction>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let mut corrections = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Correction>(line) {
                Ok(correction) => corrections.push(correction),
                Err(e) => {
                    warn!(line = number + 1, error = %e, "skipping unreadable corrections line");
                }
            }
        }
        Ok(corrections)
    }

    /// Corrections not yet turned into behaviors.
    pub fn unprocessed(&self) -> Result<Vec<Correction>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|c| !c.processed)
            .collect())
    }

    /// Replace the whole log atomically.
    pub fn rewrite(&self, corrections: &[Correction]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut data = String::new();
        for correction in corrections {
            data.push_str(&serde_json::to_string(correction)?);
            data.push('\n');
        }
        atomic_write(&self.path, data.as_bytes())
    }

    /// Find one correction by id.
    pub fn get(&self, id: &str) -> Result<Correction> {
        self.read_all()?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found("correction", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learn::types::ContextSnapshot;

    fn log() -> (tempfile::TempDir, CorrectionLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = CorrectionLog::new(dir.path().join("corrections.jsonl"));
        (dir, log)
    }

    #[test]
    fn test_append_and_read() {
        let (_dir, log) = log();
        let a = Correction::new("wrong a", "right a", ContextSnapshot::default());
        let b = Correction::new("wrong b", "right b", ContextSnapshot::default());
        log.append(&a).unwrap();
        log.append(&b).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[1].id, b.id);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let (_dir, log) = log();
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_unprocessed_filter() {
        let (_dir, log) = log();
        let mut done = Correction::new("w", "r", ContextSnapshot::default());
        done.mark_processed();
        let pending = Correction::new("w2", "r2", ContextSnapshot::default());
        log.append(&done).unwrap();
        log.append(&pending).unwrap();

        let unprocessed = log.unprocessed().unwrap();
        assert_eq!(unprocessed.len(), 1);
        assert_eq!(unprocessed[0].id, pending.id);
    }

    #[test]
    fn test_rewrite_replaces_flags() {
        let (_dir, log) = log();
        let correction = Correction::new("w", "r", ContextSnapshot::default());
        log.append(&correction).unwrap();

        let mut updated = log.read_all().unwrap();
        updated[0].mark_processed();
        log.rewrite(&updated).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].processed);
    }

    #[test]
    fn test_damaged_line_skipped() {
        let (_dir, log) = log();
        let correction = Correction::new("w", "r", ContextSnapshot::default());
        log.append(&correction).unwrap();

        // Corrupt the log with a half-written line
        let mut content = std::fs::read_to_string(log.path()).unwrap();
        content.push_str("{\"id\": \"truncated");
        std::fs::write(log.path(), content).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_get_by_id() {
        let (_dir, log) = log();
        let correction = Correction::new("w", "r", ContextSnapshot::default());
        log.append(&correction).unwrap();

        assert_eq!(log.get(&correction.id).unwrap().id, correction.id);
        assert!(log.get("missing").is_err());
    }
}
