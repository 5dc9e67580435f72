//! Default values for mirrorsync configuration.
//!
//! This module provides centralized default values used by the run
//! configuration and the CLI, ensuring consistency and avoiding duplication.

use std::path::PathBuf;
use std::time::Duration;

/// Default per-command timeout for git invocations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of corrective purge-and-reclone attempts per mirror.
pub const DEFAULT_RETRY_COUNT: u32 = 1;

/// Default deployment file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "mirrorsync.yaml";

/// Returns the default cache root directory.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/mirrorsync` (XDG Base Directory)
/// - macOS: `~/Library/Caches/mirrorsync`
/// - Windows: `{FOLDERID_LocalAppData}\mirrorsync`
///
/// Falls back to `.mirrorsync-cache` in the current directory if the
/// platform cache directory cannot be determined.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".mirrorsync-cache"))
        .join("mirrorsync")
}

/// Mirror cache for module repositories.
pub fn default_mirror_cache_dir() -> PathBuf {
    default_cache_root().join("modules")
}

/// Mirror cache for environment (control) repositories.
pub fn default_env_cache_dir() -> PathBuf {
    default_cache_root().join("environments")
}

/// One worker per available CPU, or a single worker if that is unknown.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_root_returns_path() {
        assert!(default_cache_root().ends_with("mirrorsync"));
    }

    #[test]
    fn test_mirror_and_env_caches_are_distinct() {
        let modules = default_mirror_cache_dir();
        let envs = default_env_cache_dir();
        assert_ne!(modules, envs);
        assert!(modules.starts_with(default_cache_root()));
        assert!(envs.starts_with(default_cache_root()));
    }

    #[test]
    fn test_default_workers_is_positive() {
        assert!(default_workers() >= 1);
    }
}
