//! Target materialization: export one revision of a mirror into a directory.
//!
//! A target is only rewritten when the commit signature persisted in it
//! differs from what the revision resolves to now. The signature is written
//! after a successful extraction and never for a revision that failed to
//! extract, so it always describes the tree actually on disk.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use log::{debug, info, warn};

use crate::archive::ArchiveExtractor;
use crate::config::RunConfig;
use crate::context::SyncContext;
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::filesystem;
use crate::git;
use crate::manifest::ManifestBuilder;
use crate::signature::SignatureKind;

/// One binding of a mirror revision to a destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub mirror: PathBuf,
    pub revision: String,
    pub target_dir: PathBuf,
    /// Extraction failures are reported instead of aborting the run.
    pub allow_fail: bool,
    /// Together with `allow_fail`, an unresolvable revision purges the target.
    pub ignore_unreachable: bool,
    /// Environment owning the target, for needs-sync bookkeeping.
    pub environment: String,
}

/// Materializes targets from mirrors, recording run-wide accounting.
pub struct Materializer<'a> {
    config: &'a RunConfig,
    runner: &'a dyn CommandRunner,
    extractor: &'a dyn ArchiveExtractor,
    context: &'a SyncContext,
}

impl<'a> Materializer<'a> {
    pub fn new(
        config: &'a RunConfig,
        runner: &'a dyn CommandRunner,
        extractor: &'a dyn ArchiveExtractor,
        context: &'a SyncContext,
    ) -> Self {
        Self {
            config,
            runner,
            extractor,
            context,
        }
    }

    /// Bring `target.target_dir` up to date with `target.revision`.
    ///
    /// Returns whether the target was judged stale, which in dry-run mode
    /// means it *would* have been rewritten. Errors are limited to the
    /// unrecoverable cases: a missing mirror without cache fallback, and an
    /// extraction failure on a target that does not allow failure.
    pub fn materialize(&self, target: &TargetSpec) -> Result<bool> {
        let started_at = Utc::now();
        self.context.record_attempt()?;

        let mirror = target.mirror.as_path();
        let target_dir = target.target_dir.as_path();

        if !mirror.is_dir() {
            if !self.config.use_cache_fallback {
                return Err(Error::MissingMirror {
                    path: mirror.to_path_buf(),
                });
            }
            warn!(
                "WARN: cached git mirror {} is missing, continuing with cache fallback",
                mirror.display()
            );
        }

        let rev_parse = git::rev_parse_command(
            mirror,
            &target.revision,
            self.config.git_object_syntax_not_supported,
        );
        let Some(signature) = self.resolve_signature(&rev_parse, target.allow_fail)? else {
            warn!(
                "WARN: could not resolve revision {} in {} for {}",
                target.revision,
                mirror.display(),
                target_dir.display()
            );
            if target.allow_fail && target.ignore_unreachable {
                debug!(
                    "Failed to populate {} but ignore-unreachable is set. Continuing...",
                    target_dir.display()
                );
                filesystem::purge_dir(
                    target_dir,
                    "revision unresolvable and ignore-unreachable is set",
                )?;
            } else {
                // Nothing was listed for this target, so keep whatever an
                // earlier run deployed there out of the delta purge.
                self.context.preserve_subtree(target_dir)?;
            }
            return Ok(false);
        };

        let kind = if self.config.is_environment_mirror(mirror) {
            SignatureKind::DeployRecord
        } else {
            SignatureKind::HashFile
        };
        let needs_sync = !kind.matches(target_dir, &signature);

        if self.config.delta {
            ManifestBuilder::new(self.config, self.runner, self.context).collect(
                mirror,
                &target.revision,
                target_dir,
                &kind.path(target_dir),
            )?;
        }

        if !needs_sync {
            debug!(
                "Skipping {}, already at {} ({})",
                target_dir.display(),
                signature,
                target.revision
            );
            return Ok(false);
        }

        info!("Need to sync {}", target_dir.display());
        self.context
            .record_needs_sync(target_dir, &target.environment)?;

        if self.config.dry_run {
            return Ok(true);
        }

        if let Err(e) = self.populate(target) {
            if !target.allow_fail {
                return Err(e);
            }
            warn!(
                "WARN: failed to populate {} but allow-fail is set. Continuing... ({})",
                target_dir.display(),
                e
            );
            return Ok(true);
        }

        match self.resolve_signature(&rev_parse, false)? {
            Some(commit) => kind.write(target_dir, &target.revision, &commit, started_at)?,
            None => warn!(
                "WARN: revision {} vanished from {} after extraction, not recording a signature",
                target.revision,
                mirror.display()
            ),
        }
        Ok(true)
    }

    /// Prepare the destination and stream the revision's tree into it.
    fn populate(&self, target: &TargetSpec) -> Result<()> {
        let target_dir = target.target_dir.as_path();
        let prepared = if self.config.delta {
            filesystem::ensure_dir(target_dir, "delta sync target")
        } else {
            filesystem::create_or_purge_dir(target_dir, "full sync target")
        };
        prepared.map_err(|e| extraction_error(target, e.to_string()))?;

        let before = Instant::now();
        let extracted = self
            .extractor
            .extract(&target.mirror, &target.revision, target_dir);
        let elapsed = before.elapsed();
        self.context.add_io_time(elapsed)?;
        debug!(
            "Extracting {} from {} took {:.5}s",
            target.revision,
            target.mirror.display(),
            elapsed.as_secs_f64()
        );
        extracted
    }

    fn resolve_signature(&self, rev_parse: &str, allow_fail: bool) -> Result<Option<String>> {
        let result = self
            .runner
            .run(rev_parse, self.config.timeout(), allow_fail)?;
        let signature = result.output.trim();
        if !result.success() || signature.is_empty() {
            return Ok(None);
        }
        Ok(Some(signature.to_string()))
    }
}

fn extraction_error(target: &TargetSpec, message: String) -> Error {
    Error::Extraction {
        mirror: target.mirror.clone(),
        tree: target.revision.clone(),
        target: target.target_dir.clone(),
        message,
    }
}

/// Convenience for building a [`TargetSpec`] from borrowed parts.
pub fn target_spec(
    mirror: &Path,
    revision: &str,
    target_dir: &Path,
    environment: &str,
) -> TargetSpec {
    TargetSpec {
        mirror: mirror.to_path_buf(),
        revision: revision.to_string(),
        target_dir: target_dir.to_path_buf(),
        allow_fail: false,
        ignore_unreachable: false,
        environment: environment.to_string(),
    }
}
