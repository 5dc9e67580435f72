//! # CLI Command Implementations
//!
//! One file per `mirrorsync` subcommand. Each holds a clap `Args` struct and
//! an `execute` function that calls into the `mirrorsync` library.

pub mod cache;
pub mod completions;
pub mod sync;
