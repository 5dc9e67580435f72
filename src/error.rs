//! # Error Handling
//!
//! This module defines the centralized error type for `mirrorsync`. It uses
//! the `thiserror` library to build an `Error` enum covering every failure a
//! deployment run can surface, each variant carrying the URL or path that
//! caused it.
//!
//! ## Recoverable vs. unrecoverable
//!
//! Most per-repository and per-target failures never become an `Error`: the
//! resolver and materializer log a warning and carry on with sibling work.
//! Only a small set of conditions escalate to an `Err` that reaches the
//! top-level caller, which then aborts the run:
//!
//! - an unreachable repository with cache fallback disabled
//!   ([`Error::Unreachable`]),
//! - a missing mirror at materialization time with cache fallback disabled
//!   ([`Error::MissingMirror`]),
//! - an archive/extract pipeline failure for a target that does not allow
//!   failure ([`Error::Extraction`]).
//!
//! Inner components return these as values instead of terminating the
//! process so they stay testable in isolation.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for mirrorsync operations
#[derive(Error, Debug)]
pub enum Error {
    /// The deployment file could not be parsed or failed validation.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A git command that must succeed exited non-zero.
    #[error("Git command failed for {url}: {command} - {stderr}")]
    GitCommand {
        command: String,
        url: String,
        stderr: String,
    },

    /// A repository could not be mirrored and cache fallback is disabled.
    #[error("Fatal: could not reach git repository {url}")]
    Unreachable { url: String },

    /// A mirror needed for materialization does not exist on disk.
    #[error("Fatal: could not find cached git mirror {}", path.display())]
    MissingMirror { path: PathBuf },

    /// Streaming `git archive` into a target failed.
    #[error("Fatal: failed to extract {tree} from {} into {}: {message}", mirror.display(), target.display())]
    Extraction {
        mirror: PathBuf,
        tree: String,
        target: PathBuf,
        message: String,
    },

    /// A persisted sync signature could not be read or written.
    #[error("Signature error for {}: {message}", path.display())]
    Signature { path: PathBuf, message: String },

    /// A process could not be spawned or waited on.
    #[error("Failed to execute command: {command} - {message}")]
    Process { command: String, message: String },

    /// The bounded worker pool could not be created.
    #[error("Worker pool error: {message}")]
    ThreadPool { message: String },

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether this error belongs to the explicit set of conditions that
    /// terminate a deployment run.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            Error::Unreachable { .. } | Error::MissingMirror { .. } | Error::Extraction { .. }
        )
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Error::ThreadPool {
            message: err.to_string(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
