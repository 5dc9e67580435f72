//! Orchestrator for a complete deployment run.
//!
//! A run goes through four steps:
//! 1. Resolve the environments' control repositories into the environment
//!    cache.
//! 2. Resolve every module repository into the module cache.
//! 3. Materialize each environment target, then every module target of every
//!    environment in parallel under the same worker ceiling.
//! 4. In delta mode, purge everything under each environment target that the
//!    run did not list as desired content.
//!
//! Environments go first because a whole-tree sync of an environment wipes
//! the module directories nested inside it.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::info;
use rayon::prelude::*;

use crate::archive::ArchiveExtractor;
use crate::config::{Deployment, RunConfig};
use crate::context::{SyncAccounting, SyncContext};
use crate::error::Result;
use crate::exec::CommandRunner;
use crate::filesystem;
use crate::git;
use crate::materialize::{Materializer, TargetSpec};
use crate::resolver::{BoundedResolver, ResolveReport};

/// What a deployment run did.
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub environments: ResolveReport,
    pub modules: ResolveReport,
    pub accounting: SyncAccounting,
    /// Paths removed by the delta purge.
    pub purged: Vec<PathBuf>,
    pub elapsed: Duration,
}

/// Runs deployments with injectable process and extraction collaborators.
pub struct Deployer<'a> {
    config: &'a RunConfig,
    runner: &'a dyn CommandRunner,
    extractor: &'a dyn ArchiveExtractor,
    show_progress: bool,
}

impl<'a> Deployer<'a> {
    pub fn new(
        config: &'a RunConfig,
        runner: &'a dyn CommandRunner,
        extractor: &'a dyn ArchiveExtractor,
    ) -> Self {
        Self {
            config,
            runner,
            extractor,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Execute every step of `deployment`. Any `Err` is unrecoverable and
    /// should abort the run.
    pub fn run(&self, deployment: &Deployment) -> Result<DeployReport> {
        let start = Instant::now();
        let config = self.config;
        let context = SyncContext::new();

        let resolver =
            BoundedResolver::new(config, self.runner).with_progress(self.show_progress);
        let environments =
            resolver.resolve(&deployment.environment_repositories(), &config.env_cache_dir)?;
        let modules =
            resolver.resolve(&deployment.module_repositories(), &config.mirror_cache_dir)?;

        let materializer = Materializer::new(config, self.runner, self.extractor, &context);
        for env in &deployment.environments {
            materializer.materialize(&TargetSpec {
                mirror: git::mirror_path(&config.env_cache_dir, &env.url),
                revision: env.revision.clone(),
                target_dir: env.target.clone(),
                allow_fail: env.allow_fail,
                ignore_unreachable: env.ignore_unreachable,
                environment: env.name.clone(),
            })?;
        }

        let module_targets: Vec<TargetSpec> = deployment
            .environments
            .iter()
            .flat_map(|env| {
                env.modules.iter().map(move |module| TargetSpec {
                    mirror: git::mirror_path(&config.mirror_cache_dir, &module.url),
                    revision: module.revision.clone(),
                    target_dir: env.module_target(module),
                    allow_fail: module.allow_fail,
                    ignore_unreachable: module.ignore_unreachable,
                    environment: env.name.clone(),
                })
            })
            .collect();
        if !module_targets.is_empty() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.workers.clamp(1, module_targets.len()))
                .thread_name(|i| format!("materialize-worker-{}", i))
                .build()?;
            pool.install(|| {
                module_targets
                    .par_iter()
                    .map(|target| materializer.materialize(target))
                    .collect::<Result<Vec<bool>>>()
            })?;
        }

        let mut purged = Vec::new();
        if config.delta && !config.dry_run {
            let desired = context.desired_content()?;
            let preserved = context.preserved_subtrees()?;
            for env in &deployment.environments {
                purged.extend(filesystem::purge_unmanaged(
                    &env.target,
                    &desired,
                    &preserved,
                )?);
            }
        }

        let accounting = context.accounting()?;
        let report = DeployReport {
            environments,
            modules,
            accounting,
            purged,
            elapsed: start.elapsed(),
        };
        info!(
            "Synced {} targets ({} needed sync) across {} environments in {:.2}s, extraction I/O {:.2}s",
            report.accounting.sync_attempts,
            report.accounting.needed_sync,
            deployment.environments.len(),
            report.elapsed.as_secs_f64(),
            report.accounting.io_time.as_secs_f64()
        );
        Ok(report)
    }
}

/// Run `deployment` with `config` in one call.
pub fn run(
    deployment: &Deployment,
    config: &RunConfig,
    runner: &dyn CommandRunner,
    extractor: &dyn ArchiveExtractor,
    show_progress: bool,
) -> Result<DeployReport> {
    Deployer::new(config, runner, extractor)
        .with_progress(show_progress)
        .run(deployment)
}
