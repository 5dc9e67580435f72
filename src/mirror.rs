//! Mirror synchronization for a single remote repository.
//!
//! A mirror is a bare `clone --mirror` kept under the cache root. The first
//! resolution clones it; later ones run `remote update --prune` against it.
//! Interrupted clones leave corrupt mirrors behind, so when retries are
//! enabled a failed operation purges the mirror and clones it again, a
//! bounded number of times.

use std::path::Path;

use log::{debug, warn};

use crate::config::RunConfig;
use crate::exec::CommandRunner;
use crate::filesystem;
use crate::git;

/// Keeps local mirrors of remote repositories up to date.
pub struct MirrorSynchronizer<'a> {
    config: &'a RunConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> MirrorSynchronizer<'a> {
    pub fn new(config: &'a RunConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Clone or update the mirror of `url` at `mirror`.
    ///
    /// Returns `false` when the remote could not be mirrored. With cache
    /// fallback enabled the failure is reported immediately and the mirror
    /// on disk is left as it is. Otherwise, with retries enabled, the
    /// mirror is purged and recloned up to `retries` more times; retries
    /// never tolerate failure silently.
    pub fn sync_mirror(
        &self,
        url: &str,
        mirror: &Path,
        private_key: Option<&Path>,
        allow_fail: bool,
        retries: u32,
    ) -> bool {
        let use_agent = git::needs_ssh_key(url, private_key, &self.config.keyless_hosts);
        let mut attempts_remaining = retries;
        let mut failure_tolerated = allow_fail;

        loop {
            let git_cmd = git::mirror_command(url, mirror, mirror.is_dir());
            let command = match private_key {
                Some(key) if use_agent => {
                    debug!("git repo url {} with ssh key {}", url, key.display());
                    git::with_ssh_agent(&git_cmd, key)
                }
                _ => {
                    debug!("git repo url {} without ssh key", url);
                    git_cmd.clone()
                }
            };

            let succeeded = match self
                .runner
                .run(&command, self.config.timeout(), failure_tolerated)
            {
                Ok(result) => result.success(),
                Err(e) => {
                    warn!("WARN: {}", e);
                    false
                }
            };
            if succeeded {
                return true;
            }

            if self.config.use_cache_fallback {
                warn!(
                    "WARN: git repository {} does not exist or is unreachable at this moment!",
                    url
                );
                warn!("WARN: Trying to use cache for {} git repository", url);
                return false;
            }

            if self.config.retry_git_commands && attempts_remaining > 0 {
                warn!(
                    "WARN: git command failed: {} deleting local cached repository and retrying...",
                    git_cmd
                );
                if let Err(e) = filesystem::purge_dir(
                    mirror,
                    "git command failed, purging mirror before retrying",
                ) {
                    warn!("WARN: could not purge mirror {}: {}", mirror.display(), e);
                    return false;
                }
                attempts_remaining -= 1;
                failure_tolerated = false;
                continue;
            }

            warn!(
                "WARN: git repository {} does not exist or is unreachable at this moment!",
                url
            );
            return false;
        }
    }
}
