//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// mirrorsync - Deploy environments from cached git mirrors
#[derive(Parser, Debug)]
#[command(name = "mirrorsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Suppress progress bars and the run summary
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mirror every repository and materialize all environment targets
    Sync(commands::sync::SyncArgs),

    /// Inspect or purge cached mirrors
    Cache(commands::cache::CacheArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub output: mirrorsync::output::OutputConfig,
    pub quiet: bool,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let output = mirrorsync::output::OutputConfig::from_env_and_flag(&self.color);
        console::set_colors_enabled(output.use_color);
        console::set_colors_enabled_stderr(output.use_color);
        let globals = GlobalOptions {
            output,
            quiet: self.quiet,
        };

        match self.command {
            Commands::Sync(args) => commands::sync::execute(args, &globals),
            Commands::Cache(args) => commands::cache::execute(args, &globals),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

/// Initialise `env_logger` with `level` unless `RUST_LOG` is set.
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A second initialisation only happens in tests driving `execute` twice.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
