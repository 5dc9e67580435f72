//! Git command construction.
//!
//! mirrorsync never speaks the git protocol itself; it shells out to the
//! system `git`, which picks up credential helpers and `~/.gitconfig`. This
//! module builds the command lines used by the synchronizer, materializer
//! and manifest builder, plus the URL-derived mirror directory names.

use std::path::{Path, PathBuf};

/// Filesystem-safe directory name for a mirror of `url`.
///
/// Path separators become `_` and colons become `-`, so
/// `git@host:org/repo.git` maps to `git@host-org_repo.git`.
pub fn mirror_dir_name(url: &str) -> String {
    url.replace('/', "_").replace(':', "-")
}

/// Location of the mirror for `url` under `cache_root`.
pub fn mirror_path(cache_root: &Path, url: &str) -> PathBuf {
    cache_root.join(mirror_dir_name(url))
}

/// Host component of a repository URL.
///
/// Handles scheme URLs (`https://`, `ssh://`, `git://`) and scp-like
/// `user@host:path` remotes. Local paths have no host.
pub fn url_host(url: &str) -> Option<String> {
    if url.contains("://") {
        return url::Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_string));
    }
    let (authority, _) = url.split_once(':')?;
    if authority.contains('/') {
        return None;
    }
    let host = authority.rsplit('@').next().unwrap_or(authority);
    (!host.is_empty()).then(|| host.to_string())
}

/// Whether git invocations for `url` must run inside an ssh-agent with
/// `private_key` loaded.
pub fn needs_ssh_key(url: &str, private_key: Option<&Path>, keyless_hosts: &[String]) -> bool {
    let Some(key) = private_key else {
        return false;
    };
    if key.as_os_str().is_empty() {
        return false;
    }
    match url_host(url) {
        Some(host) => !keyless_hosts.iter().any(|k| k.eq_ignore_ascii_case(&host)),
        None => true,
    }
}

/// Quote `value` for safe interpolation into an `sh` command line.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-^{}".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// `clone --mirror` for a missing mirror, `remote update --prune` otherwise.
pub fn mirror_command(url: &str, mirror: &Path, mirror_exists: bool) -> String {
    if mirror_exists {
        format!("git --git-dir {} remote update --prune", quote_path(mirror))
    } else {
        format!(
            "git clone --mirror {} {}",
            shell_quote(url),
            quote_path(mirror)
        )
    }
}

/// Wrap `command` so it runs with `private_key` added to a fresh ssh-agent.
pub fn with_ssh_agent(command: &str, private_key: &Path) -> String {
    let inner = format!("ssh-add {}; {}", quote_path(private_key), command);
    format!("ssh-agent bash -c {}", shell_quote(&inner))
}

/// Resolve `revision` to a commit signature.
///
/// Uses the `<rev>^{object}` syntax unless the installed git predates it.
pub fn rev_parse_command(mirror: &Path, revision: &str, legacy_syntax: bool) -> String {
    let rev = if legacy_syntax {
        revision.to_string()
    } else {
        format!("{}^{{object}}", revision)
    };
    format!(
        "git --git-dir {} rev-parse --verify {}",
        quote_path(mirror),
        shell_quote(&rev)
    )
}

/// List every file tracked by `revision`, with paths relative to the root.
///
/// Entries are NUL-terminated and verbatim. Without `-z` git C-quotes names
/// holding spaces or non-ASCII bytes.
pub fn ls_tree_command(mirror: &Path, revision: &str) -> String {
    format!(
        "git --git-dir {} ls-tree -z --full-tree -r --name-only {}",
        quote_path(mirror),
        shell_quote(revision)
    )
}

/// Arguments for `git archive` of `revision` from `mirror`.
pub fn archive_args(mirror: &Path, revision: &str) -> Vec<String> {
    vec![
        "--git-dir".to_string(),
        mirror.to_string_lossy().into_owned(),
        "archive".to_string(),
        revision.to_string(),
    ]
}
