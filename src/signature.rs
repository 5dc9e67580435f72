//! Persisted sync signatures.
//!
//! A target remembers which commit was last extracted into it, in one of two
//! forms:
//!
//! - module targets keep the bare commit hash in `.latest_commit`;
//! - environment targets keep a JSON deploy record in `.deploy.json`.
//!
//! A missing, unreadable or mismatching signature always means "needs sync";
//! it is never an error.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Plain-text commit hash file for module targets.
pub const HASH_FILE: &str = ".latest_commit";

/// JSON deploy record for environment targets.
pub const DEPLOY_FILE: &str = ".deploy.json";

/// Marker file name written by older deployments. Always whitelisted.
pub const LEGACY_MARKER: &str = ".last_commit";

/// What was last deployed into an environment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRecord {
    /// Revision name as requested (branch, tag or commit).
    pub name: String,
    /// Resolved commit signature.
    pub signature: String,
    /// When the materialization that produced this record started.
    pub started_at: DateTime<Utc>,
}

/// Which representation a target uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    HashFile,
    DeployRecord,
}

impl SignatureKind {
    /// File under `target_dir` holding the signature.
    pub fn path(self, target_dir: &Path) -> PathBuf {
        match self {
            SignatureKind::HashFile => target_dir.join(HASH_FILE),
            SignatureKind::DeployRecord => target_dir.join(DEPLOY_FILE),
        }
    }

    /// The persisted signature for `target_dir`, if one can be read.
    pub fn read(self, target_dir: &Path) -> Option<String> {
        let path = self.path(target_dir);
        match self {
            SignatureKind::HashFile => read_hash_file(&path),
            SignatureKind::DeployRecord => read_deploy_record(&path).map(|r| r.signature),
        }
    }

    /// Whether `target_dir` already holds `signature`.
    pub fn matches(self, target_dir: &Path, signature: &str) -> bool {
        self.read(target_dir)
            .is_some_and(|persisted| persisted == signature.trim())
    }

    /// Persist `signature` for `target_dir`.
    pub fn write(
        self,
        target_dir: &Path,
        revision: &str,
        signature: &str,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let path = self.path(target_dir);
        match self {
            SignatureKind::HashFile => write_hash_file(&path, signature),
            SignatureKind::DeployRecord => write_deploy_record(
                &path,
                &DeployRecord {
                    name: revision.to_string(),
                    signature: signature.trim().to_string(),
                    started_at,
                },
            ),
        }
    }
}

/// Read a hash file, ignoring surrounding whitespace.
pub fn read_hash_file(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let hash = content.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}

/// Write `hash` to `path`, flushed to disk before returning.
pub fn write_hash_file(path: &Path, hash: &str) -> Result<()> {
    debug!("Writing hash {} to {}", hash.trim(), path.display());
    let mut file = fs::File::create(path).map_err(|e| Error::Signature {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    file.write_all(hash.trim().as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Read a deploy record. A corrupt record is logged and treated as absent.
pub fn read_deploy_record(path: &Path) -> Option<DeployRecord> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("WARN: ignoring unreadable deploy record {}: {}", path.display(), e);
            None
        }
    }
}

/// Serialize `record` as pretty JSON to `path`.
pub fn write_deploy_record(path: &Path, record: &DeployRecord) -> Result<()> {
    debug!("Writing to deploy file {}", path.display());
    let json = serde_json::to_string_pretty(record)?;
    fs::write(path, json).map_err(|e| Error::Signature {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
