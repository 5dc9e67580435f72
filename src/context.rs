//! Run-wide accumulators shared by concurrent workers.
//!
//! Sync counters, the needs-sync lists, the extraction I/O time and the
//! desired-content set all live behind one lock. Critical sections only
//! append or increment; no I/O happens while the lock is held. Everything
//! here is append-only for the lifetime of a run and is read back once all
//! concurrent work has finished.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Error, Result};

/// Counters and lists describing what a run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncAccounting {
    /// Materializations attempted.
    pub sync_attempts: usize,
    /// Materializations whose target was stale.
    pub needed_sync: usize,
    /// Stale target directories, in the order they were found.
    pub need_sync_dirs: Vec<PathBuf>,
    /// Environments owning at least one stale target.
    pub need_sync_envs: BTreeSet<String>,
    /// Time spent streaming archives into targets.
    pub io_time: Duration,
}

#[derive(Debug, Default)]
struct RunState {
    accounting: SyncAccounting,
    desired_content: Vec<PathBuf>,
    preserved: Vec<PathBuf>,
}

/// Shared context handed by reference to every worker of a run.
#[derive(Debug, Default)]
pub struct SyncContext {
    state: Mutex<RunState>,
}

impl SyncContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RunState>> {
        self.state.lock().map_err(|_| Error::LockPoisoned {
            context: "sync context".to_string(),
        })
    }

    /// Count one materialization attempt.
    pub fn record_attempt(&self) -> Result<()> {
        self.lock()?.accounting.sync_attempts += 1;
        Ok(())
    }

    /// Record that `target_dir`, owned by `environment`, is stale.
    pub fn record_needs_sync(&self, target_dir: &Path, environment: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.accounting.needed_sync += 1;
        state.accounting.need_sync_dirs.push(target_dir.to_path_buf());
        state
            .accounting
            .need_sync_envs
            .insert(environment.to_string());
        Ok(())
    }

    /// Add extraction time to the run total.
    pub fn add_io_time(&self, elapsed: Duration) -> Result<()> {
        self.lock()?.accounting.io_time += elapsed;
        Ok(())
    }

    /// Append paths to the desired-content set in one critical section.
    pub fn extend_desired_content<I>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.lock()?.desired_content.extend(paths);
        Ok(())
    }

    /// Exempt `dir` from the delta purge. Used for targets that were not
    /// materialized this run, so whatever they held before is kept.
    pub fn preserve_subtree(&self, dir: &Path) -> Result<()> {
        self.lock()?.preserved.push(dir.to_path_buf());
        Ok(())
    }

    /// Snapshot of the accounting counters.
    pub fn accounting(&self) -> Result<SyncAccounting> {
        Ok(self.lock()?.accounting.clone())
    }

    /// Snapshot of every path expected to exist after this run.
    pub fn desired_content(&self) -> Result<Vec<PathBuf>> {
        Ok(self.lock()?.desired_content.clone())
    }

    pub fn preserved_subtrees(&self) -> Result<Vec<PathBuf>> {
        Ok(self.lock()?.preserved.clone())
    }
}
