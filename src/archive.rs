//! Extraction of a revision's tree into a target directory.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use log::debug;

use crate::error::{Error, Result};
use crate::git;

/// Trait for exporting a revision into a directory - allows mocking in tests
pub trait ArchiveExtractor: Send + Sync {
    /// Unpack the tree of `revision` from `mirror` into `target`, preserving
    /// relative paths. `target` must already exist.
    fn extract(&self, mirror: &Path, revision: &str, target: &Path) -> Result<()>;
}

/// Streams `git archive` output through [`tar::Archive`] into the target,
/// never buffering the archive on disk or in memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitArchiveExtractor;

impl ArchiveExtractor for GitArchiveExtractor {
    fn extract(&self, mirror: &Path, revision: &str, target: &Path) -> Result<()> {
        let failure = |message: String| Error::Extraction {
            mirror: mirror.to_path_buf(),
            tree: revision.to_string(),
            target: target.to_path_buf(),
            message,
        };

        if !target.is_dir() {
            return Err(failure("target directory does not exist".to_string()));
        }

        debug!(
            "Executing git --git-dir {} archive {}",
            mirror.display(),
            revision
        );
        let mut archive = Command::new("git")
            .args(git::archive_args(mirror, revision))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failure(format!("failed to start git archive: {}", e)))?;

        // Drained concurrently so a noisy git cannot stall on a full pipe.
        let stderr = archive.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let unpacked = match archive.stdout.take() {
            Some(stream) => tar::Archive::new(stream)
                .unpack(target)
                .map_err(|e| format!("failed to unpack archive: {}", e)),
            None => Err("git archive produced no stdout".to_string()),
        };
        if unpacked.is_err() {
            let _ = archive.kill();
        }

        let status = archive
            .wait()
            .map_err(|e| failure(format!("git archive did not finish: {}", e)))?;
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        unpacked.map_err(&failure)?;
        if !status.success() {
            return Err(failure(format!(
                "git archive exited with {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
