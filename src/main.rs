//! # mirrorsync CLI
//!
//! Binary entry point. Parses arguments with `clap` and dispatches to the
//! command implementations; all deployment logic lives in the library.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
