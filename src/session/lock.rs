//! Advisory per-session lock.
//!
//! Activation invocations for one session are serialized through an
//! exclusive lock on a file in the session directory. The lock is
//! advisory: it coordinates cooperating floop processes, nothing else.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::File;
use std::path::Path;

/// An exclusive lock held for the lifetime of the value.
pub struct SessionLock {
    file: File,
}

impl SessionLock {
    /// Acquire the lock, blocking until the current holder releases it.
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        let file = open_lock_file(lock_path)?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| Error::Locked(format!("{}: {}", lock_path.display(), e)))?;
        Ok(Self { file })
    }

    /// Acquire the lock without blocking; fails if another invocation
    /// holds it.
    pub fn try_acquire(lock_path: &Path) -> Result<Self> {
        let file = open_lock_file(lock_path)?;
        FileExt::try_lock_exclusive(&file)
            .map_err(|_| Error::Locked(format!("session busy: {}", lock_path.display())))?;
        Ok(Self { file })
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    Ok(file)
}
