//! # mirrorsync
//!
//! Library behind the `mirrorsync` command-line tool, which keeps a set of
//! deployment environments in step with the git repositories that define
//! them.
//!
//! ## Quick Example
//!
//! ```
//! use mirrorsync::{config, git};
//! use std::path::Path;
//!
//! let deployment = config::parse(r#"
//! environments:
//!   - name: production
//!     url: https://git.example.com/control.git
//!     revision: production
//!     target: /srv/envs/production
//!     modules:
//!       - name: ntp
//!         url: https://git.example.com/ntp.git
//!         revision: v1.2.0
//! "#).unwrap();
//!
//! assert_eq!(deployment.environments.len(), 1);
//! assert_eq!(
//!     git::mirror_path(Path::new("/cache"), "https://git.example.com/ntp.git"),
//!     Path::new("/cache/https-__git.example.com_ntp.git")
//! );
//! ```
//!
//! ## Core Concepts
//!
//! - **Mirrors (`mirror`, `resolver`)**: every unique remote is kept as a bare
//!   `clone --mirror` under a cache directory and refreshed in parallel under a
//!   worker ceiling.
//! - **Targets (`materialize`, `signature`)**: a target directory receives a
//!   `git archive` of one revision and records the commit it was built from,
//!   so unchanged targets are skipped on the next run.
//! - **Delta mode (`manifest`, `filesystem`)**: targets are updated in place
//!   and anything no revision asked for is purged at the end of the run.
//! - **Processes (`exec`, `git`, `archive`)**: all git work shells out to the
//!   system `git`, behind traits that tests replace with mocks.
//!
//! The entry point is [`deploy::Deployer::run`].

pub mod archive;
pub mod config;
pub mod context;
pub mod defaults;
pub mod deploy;
pub mod error;
pub mod exec;
pub mod filesystem;
pub mod git;
pub mod manifest;
pub mod materialize;
pub mod mirror;
pub mod output;
pub mod resolver;
pub mod signature;

#[cfg(test)]
mod mirror_proptest;
#[cfg(test)]
mod test_support;
