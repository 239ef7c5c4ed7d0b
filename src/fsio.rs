//! Filesystem helpers shared by the persisted stores.

use crate::error::Result;
use std::io::Write;
use std::path::Path;

/// Atomic file write: temp file in the same directory, fsync, rename.
///
/// The temp name embeds a UUID so concurrent writers cannot collide, and
/// rename is atomic on POSIX so readers see either the old or the new
/// content, never a partial write.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        uuid::Uuid::new_v4()
    );
    let temp_path = path.with_file_name(&temp_name);

    let mut file = std::fs::File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, path)?;

    // Rename durability requires fsyncing the parent directory on some
    // filesystems; best effort.
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
    }

    Ok(())
}

/// Create a directory (and parents) readable only by the owner.
pub fn create_private_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}

/// Restrict a file to owner read/write.
#[cfg(unix)]
pub fn restrict_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn restrict_file(_path: &Path) -> Result<()> {
    Ok(())
}
