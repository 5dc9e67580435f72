//! Bounded, parallel resolution of many mirrors.
//!
//! Every unique repository gets one unit of work: a call to
//! [`MirrorSynchronizer::sync_mirror`]. Units run on a dedicated rayon pool
//! sized to the configured worker ceiling, so at most `workers` git
//! processes are in flight at once. A pool thread holds its slot until the
//! synchronization it picked up has finished, and `resolve` only returns once
//! every unit has run, acting as the barrier over all dispatched work.
//!
//! No ordering is guaranteed between repositories.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;

use crate::config::{RepositorySpec, RunConfig};
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::git;
use crate::mirror::MirrorSynchronizer;

/// Summary of one resolution pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveReport {
    /// Unique repositories handed in.
    pub total: usize,
    /// Repositories whose synchronization ran to completion.
    pub completed: usize,
    /// Repositories mirrored successfully.
    pub succeeded: usize,
    /// Repositories that failed but were tolerated.
    pub failed: Vec<String>,
    pub elapsed: Duration,
}

/// Drives mirror synchronization for a set of repositories under a
/// worker ceiling.
pub struct BoundedResolver<'a> {
    config: &'a RunConfig,
    runner: &'a dyn CommandRunner,
    show_progress: bool,
}

impl<'a> BoundedResolver<'a> {
    pub fn new(config: &'a RunConfig, runner: &'a dyn CommandRunner) -> Self {
        Self {
            config,
            runner,
            show_progress: false,
        }
    }

    /// Draw a progress bar while resolving.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Mirror every repository in `repos` under `cache_root`.
    ///
    /// Returns [`Error::Unreachable`] for the first repository that could not
    /// be mirrored when cache fallback is disabled and the repository is not
    /// marked tolerable. That check happens after all units have finished;
    /// in-flight siblings are never interrupted.
    pub fn resolve(
        &self,
        repos: &BTreeMap<String, RepositorySpec>,
        cache_root: &Path,
    ) -> Result<ResolveReport> {
        let start = Instant::now();
        let total = repos.len();
        if total == 0 || self.config.workers == 0 {
            debug!(
                "Nothing to resolve ({} repositories, {} workers), skipping...",
                total, self.config.workers
            );
            return Ok(ResolveReport {
                total,
                ..Default::default()
            });
        }

        debug!(
            "Resolving {} git repositories with {} workers",
            total, self.config.workers
        );
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.min(total))
            .thread_name(|i| format!("mirror-worker-{}", i))
            .build()?;

        let bar = self.progress_bar(total);
        let synchronizer = MirrorSynchronizer::new(self.config, self.runner);
        let retries = self.config.retry_count;

        let outcomes: Vec<(&String, &RepositorySpec, bool)> = pool.install(|| {
            repos
                .par_iter()
                .map(|(url, spec)| {
                    debug!("git repo url {}", url);
                    let mirror = git::mirror_path(cache_root, url);
                    let ok = synchronizer.sync_mirror(
                        url,
                        &mirror,
                        spec.private_key.as_deref(),
                        spec.ignore_unreachable,
                        retries,
                    );
                    bar.inc(1);
                    (url, spec, ok)
                })
                .collect()
        });
        bar.finish_and_clear();

        let mut report = ResolveReport {
            total,
            completed: outcomes.len(),
            elapsed: start.elapsed(),
            ..Default::default()
        };
        let mut fatal = None;
        for (url, spec, ok) in outcomes {
            if ok {
                report.succeeded += 1;
                continue;
            }
            if !self.config.use_cache_fallback && !spec.ignore_unreachable && fatal.is_none() {
                fatal = Some(url.clone());
            }
            report.failed.push(url.clone());
        }

        if let Some(url) = fatal {
            return Err(Error::Unreachable { url });
        }
        info!(
            "Resolved {}/{} git repositories in {:.2}s",
            report.succeeded,
            total,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "Resolving git mirrors ({pos}/{len}) [{elapsed_precise}] {bar:40.cyan/blue} {percent}%",
        ) {
            bar.set_style(style);
        }
        bar
    }
}
