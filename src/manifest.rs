//! Delta manifest: the paths a revision is expected to produce in a target.
//!
//! In delta mode targets are not wiped before extraction, so stale files
//! linger until a purge pass removes everything outside the desired-content
//! set. This module's only job is to make that set complete for one target.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::RunConfig;
use crate::context::SyncContext;
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::git;
use crate::signature::LEGACY_MARKER;

/// Expand a flat file listing into every path expected under `target_dir`:
/// the signature file, the legacy marker, each file, and each intermediate
/// directory implied by a file's relative path.
pub fn desired_paths<'a, I>(target_dir: &Path, signature_file: &Path, files: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut paths = vec![signature_file.to_path_buf(), target_dir.join(LEGACY_MARKER)];
    let mut dirs = BTreeSet::new();
    for file in files.into_iter().filter(|f| !f.is_empty()) {
        paths.push(target_dir.join(file));
        let mut parts: Vec<&str> = file.split('/').collect();
        parts.pop();
        let mut dir = target_dir.to_path_buf();
        for part in parts {
            dir.push(part);
            if dirs.insert(dir.clone()) {
                paths.push(dir.clone());
            }
        }
    }
    paths
}

/// Builds desired-content manifests from a mirror.
pub struct ManifestBuilder<'a> {
    config: &'a RunConfig,
    runner: &'a dyn CommandRunner,
    context: &'a SyncContext,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(
        config: &'a RunConfig,
        runner: &'a dyn CommandRunner,
        context: &'a SyncContext,
    ) -> Self {
        Self {
            config,
            runner,
            context,
        }
    }

    /// List the files tracked by `revision` in `mirror` and append the
    /// resulting paths under `target_dir` to the run's desired content.
    ///
    /// A failed listing is an error: an incomplete manifest would let the
    /// purge step delete deployed files.
    pub fn collect(
        &self,
        mirror: &Path,
        revision: &str,
        target_dir: &Path,
        signature_file: &Path,
    ) -> Result<usize> {
        let command = git::ls_tree_command(mirror, revision);
        let result = self.runner.run(&command, self.config.timeout(), false)?;
        if !result.success() {
            return Err(Error::GitCommand {
                command,
                url: mirror.display().to_string(),
                stderr: result.stderr.trim().to_string(),
            });
        }

        let paths = desired_paths(target_dir, signature_file, result.output.split('\0'));
        let count = paths.len();
        self.context.extend_desired_content(paths)?;
        Ok(count)
    }
}
