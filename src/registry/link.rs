//! Filesystem helpers for linking raw files into run directories.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::info;

use crate::error::RegistryError;

/// Creates `dir` (and parents) if missing. New directories are made
/// world-writable so the DAQ and analysis accounts can share them.
pub fn create_run_dir(dir: &Path) -> Result<(), RegistryError> {
    if dir.exists() {
        return Ok(());
    }
    info!(dir = %dir.display(), "Creating directory");
    fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o777))
            .map_err(|source| io_error(dir, source))?;
    }
    Ok(())
}

/// Symlinks `target` at `link`, replacing whatever `link` pointed to.
pub fn link_file(target: &Path, link: &Path) -> Result<(), RegistryError> {
    match fs::remove_file(link) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(source) => return Err(io_error(link, source)),
    }
    symlink(target, link).map_err(|source| io_error(link, source))
}

#[cfg(unix)]
pub(crate) fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

fn io_error(path: &Path, source: std::io::Error) -> RegistryError {
    RegistryError::Io {
        path: path.to_path_buf(),
        source,
    }
}
