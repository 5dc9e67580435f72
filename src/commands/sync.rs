//! # Sync Command Implementation
//!
//! `mirrorsync sync` loads a deployment file, applies command-line overrides
//! to its settings and runs the whole deployment: mirror resolution, target
//! materialization and, in delta mode, the purge of unmanaged files.
//!
//! A fatal condition (an unreachable repository without fallback, a missing
//! mirror, a failed extraction) aborts with a non-zero exit code.

use anyhow::{bail, Context, Result};
use clap::Args;
use console::Term;
use log::debug;
use std::path::PathBuf;

use mirrorsync::archive::GitArchiveExtractor;
use mirrorsync::config::{self, Deployment, RunConfig};
use mirrorsync::defaults;
use mirrorsync::deploy::{self, DeployReport};
use mirrorsync::exec::ShellRunner;
use mirrorsync::output::{status_line, OutputConfig, Status};

use crate::cli::GlobalOptions;

/// Deploy every environment described by a deployment file
#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Path to the deployment file
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "MIRRORSYNC_CONFIG",
        default_value = defaults::DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,

    /// Only deploy the named environment (repeatable)
    #[arg(short, long = "environment", value_name = "NAME")]
    pub environments: Vec<String>,

    /// Maximum number of concurrent git operations
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Timeout for each git command, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Directory holding module mirrors
    #[arg(long, value_name = "DIR", env = "MIRRORSYNC_CACHE")]
    pub cache_dir: Option<PathBuf>,

    /// Directory holding environment mirrors
    #[arg(long, value_name = "DIR")]
    pub env_cache_dir: Option<PathBuf>,

    /// Keep going with the cached mirror when a remote is unreachable
    #[arg(long)]
    pub use_cache_fallback: bool,

    /// Purge and reclone a mirror when a git command fails
    #[arg(long)]
    pub retry_git_commands: bool,

    /// Report what would change without writing any target
    #[arg(long)]
    pub dry_run: bool,

    /// Update targets in place and purge files no revision lists
    #[arg(long)]
    pub delta: bool,
}

impl SyncArgs {
    /// Layer command-line overrides on top of the file's settings.
    fn apply_overrides(&self, settings: &mut RunConfig) {
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = timeout;
        }
        if let Some(dir) = &self.cache_dir {
            settings.mirror_cache_dir = dir.clone();
        }
        if let Some(dir) = &self.env_cache_dir {
            settings.env_cache_dir = dir.clone();
        }
        settings.use_cache_fallback |= self.use_cache_fallback;
        settings.retry_git_commands |= self.retry_git_commands;
        settings.dry_run |= self.dry_run;
        settings.delta |= self.delta;
    }

    fn select_environments(&self, deployment: &mut Deployment) -> Result<()> {
        if self.environments.is_empty() {
            return Ok(());
        }
        for name in &self.environments {
            if !deployment.environments.iter().any(|env| &env.name == name) {
                bail!(
                    "Environment '{}' is not defined in {}",
                    name,
                    self.config.display()
                );
            }
        }
        deployment
            .environments
            .retain(|env| self.environments.contains(&env.name));
        Ok(())
    }
}

/// Execute the `sync` command.
pub fn execute(args: SyncArgs, globals: &GlobalOptions) -> Result<()> {
    let mut deployment = config::from_file(&args.config).with_context(|| {
        format!(
            "Failed to load deployment file: {}",
            args.config.display()
        )
    })?;
    args.apply_overrides(&mut deployment.settings);
    args.select_environments(&mut deployment)?;
    debug!("Effective settings: {:?}", deployment.settings);

    let show_progress = !globals.quiet && Term::stderr().is_term();
    let report = deploy::run(
        &deployment,
        &deployment.settings,
        &ShellRunner,
        &GitArchiveExtractor,
        show_progress,
    )?;

    if !globals.quiet {
        for line in summary_lines(&globals.output, &deployment, &report) {
            println!("{}", line);
        }
    }
    Ok(())
}

/// Human-readable summary of a finished run.
fn summary_lines(
    output: &OutputConfig,
    deployment: &Deployment,
    report: &DeployReport,
) -> Vec<String> {
    let accounting = &report.accounting;
    let mut lines = Vec::new();

    let headline = format!(
        "Synced {} targets across {} environments in {:.2}s ({} needed sync, I/O {:.2}s)",
        accounting.sync_attempts,
        deployment.environments.len(),
        report.elapsed.as_secs_f64(),
        accounting.needed_sync,
        accounting.io_time.as_secs_f64()
    );
    let status = if accounting.needed_sync > 0 {
        Status::Changed
    } else {
        Status::Ok
    };
    lines.push(status_line(output, status, &headline));

    if !accounting.need_sync_envs.is_empty() {
        let envs: Vec<&str> = accounting.need_sync_envs.iter().map(String::as_str).collect();
        lines.push(format!("   environments changed: {}", envs.join(", ")));
    }

    for url in report
        .environments
        .failed
        .iter()
        .chain(&report.modules.failed)
    {
        lines.push(status_line(
            output,
            Status::Warning,
            &format!("{} was unreachable; cached mirror used", url),
        ));
    }

    if !report.purged.is_empty() {
        lines.push(status_line(
            output,
            Status::Changed,
            &format!("Purged {} unmanaged paths", report.purged.len()),
        ));
    }

    if deployment.settings.dry_run {
        lines.push(status_line(
            output,
            Status::DryRun,
            "Dry run: no target was written",
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorsync::config::EnvironmentSpec;
    use std::path::Path;

    fn env(name: &str) -> EnvironmentSpec {
        EnvironmentSpec {
            name: name.to_string(),
            url: "https://git.example.com/control.git".to_string(),
            revision: name.to_string(),
            target: Path::new("/srv/envs").join(name),
            private_key: None,
            ignore_unreachable: false,
            allow_fail: false,
            modules: Vec::new(),
        }
    }

    #[test]
    fn test_overrides_replace_file_settings() {
        let args = SyncArgs {
            workers: Some(3),
            timeout: Some(10),
            cache_dir: Some(PathBuf::from("/c/modules")),
            delta: true,
            ..Default::default()
        };
        let mut settings = RunConfig::default();

        args.apply_overrides(&mut settings);

        assert_eq!(settings.workers, 3);
        assert_eq!(settings.timeout_secs, 10);
        assert_eq!(settings.mirror_cache_dir, PathBuf::from("/c/modules"));
        assert!(settings.delta);
        assert!(!settings.dry_run);
    }

    #[test]
    fn test_flags_never_clear_file_settings() {
        let args = SyncArgs::default();
        let mut settings = RunConfig {
            use_cache_fallback: true,
            ..RunConfig::default()
        };

        args.apply_overrides(&mut settings);

        assert!(settings.use_cache_fallback);
    }

    #[test]
    fn test_select_environments() {
        let mut deployment = Deployment {
            environments: vec![env("production"), env("staging")],
            ..Default::default()
        };
        let args = SyncArgs {
            environments: vec!["staging".to_string()],
            ..Default::default()
        };

        args.select_environments(&mut deployment).unwrap();

        assert_eq!(deployment.environments.len(), 1);
        assert_eq!(deployment.environments[0].name, "staging");
    }

    #[test]
    fn test_select_unknown_environment_fails() {
        let mut deployment = Deployment {
            environments: vec![env("production")],
            ..Default::default()
        };
        let args = SyncArgs {
            environments: vec!["qa".to_string()],
            ..Default::default()
        };

        let err = args.select_environments(&mut deployment).unwrap_err();
        assert!(err.to_string().contains("'qa'"));
    }

    #[test]
    fn test_summary_mentions_changes_and_fallbacks() {
        let deployment = Deployment {
            environments: vec![env("production")],
            ..Default::default()
        };
        let mut report = DeployReport::default();
        report.accounting.sync_attempts = 3;
        report.accounting.needed_sync = 1;
        report
            .accounting
            .need_sync_envs
            .insert("production".to_string());
        report.modules.failed.push("https://x.org/gone.git".to_string());

        let lines = summary_lines(&OutputConfig { use_color: false }, &deployment, &report);

        assert!(lines[0].starts_with("[SYNC] Synced 3 targets across 1 environments"));
        assert!(lines[1].contains("production"));
        assert!(lines[2].starts_with("[WARN] https://x.org/gone.git"));
    }
}
