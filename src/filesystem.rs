//! Filesystem helpers for mirrors and deployment targets.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Recursively delete `path` if it exists. `reason` is logged.
pub fn purge_dir(path: &Path, reason: &str) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    debug!("Purging {} ({})", path.display(), reason);
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Ensure `path` exists as a directory. `reason` is logged.
pub fn ensure_dir(path: &Path, reason: &str) -> Result<()> {
    if !path.is_dir() {
        debug!("Creating {} ({})", path.display(), reason);
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Replace `path` with an empty directory.
pub fn create_or_purge_dir(path: &Path, reason: &str) -> Result<()> {
    purge_dir(path, reason)?;
    ensure_dir(path, reason)
}

/// Delete everything under `root` that is neither listed in `desired` nor an
/// ancestor of a listed path. Returns the removed paths.
///
/// Subtrees in `preserved` are left alone entirely, along with their
/// ancestors. Removed directories are not descended into, so only their
/// top-level path is reported.
pub fn purge_unmanaged(
    root: &Path,
    desired: &[PathBuf],
    preserved: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    if !root.is_dir() || preserved.iter().any(|p| root.starts_with(p)) {
        return Ok(Vec::new());
    }

    let mut keep: HashSet<&Path> = HashSet::new();
    for path in desired.iter().chain(preserved).filter(|p| p.starts_with(root)) {
        for ancestor in path.ancestors() {
            if !ancestor.starts_with(root) || !keep.insert(ancestor) {
                break;
            }
        }
    }

    let mut removed = Vec::new();
    let mut entries = WalkDir::new(root).min_depth(1).into_iter();
    while let Some(entry) = entries.next() {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if preserved.iter().any(|p| p.as_path() == entry.path()) {
            debug!("Keeping {} untouched", entry.path().display());
            if entry.file_type().is_dir() {
                entries.skip_current_dir();
            }
            continue;
        }
        if keep.contains(entry.path()) {
            continue;
        }
        if entry.file_type().is_dir() {
            fs::remove_dir_all(entry.path())?;
            entries.skip_current_dir();
        } else {
            fs::remove_file(entry.path())?;
        }
        info!("Removed unmanaged {}", entry.path().display());
        removed.push(entry.path().to_path_buf());
    }
    Ok(removed)
}
