//! # Run Configuration and Deployment Schema
//!
//! This module defines the data structures read from a `mirrorsync.yaml`
//! deployment file, as well as the logic for parsing and validating it.
//!
//! ## Key Components
//!
//! - **`RunConfig`**: the immutable run-wide settings (worker ceiling,
//!   timeouts, cache roots and the fallback/retry/dry-run toggles). It is
//!   built once and passed by reference into every component.
//!
//! - **`Deployment`**: the environments to deploy, each bound to a control
//!   repository revision and a list of modules.
//!
//! - **`RepositorySpec`**: the de-duplicated view of a remote repository.
//!   Many modules may point at the same URL; they collapse into one spec so
//!   the mirror is fetched once per run.
//!
//! ## Example
//!
//! ```yaml
//! settings:
//!   workers: 8
//!   use_cache_fallback: true
//! environments:
//!   - name: production
//!     url: git@git.example.com:ops/control.git
//!     revision: production
//!     target: /srv/code/environments/production
//!     modules:
//!       - name: apache
//!         url: https://github.com/example/apache.git
//!         revision: v1.2.0
//! ```

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Run-wide settings shared read-only by every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Maximum number of concurrent git operations. Zero disables resolution.
    pub workers: usize,
    /// Timeout applied to each external command, in seconds.
    pub timeout_secs: u64,
    /// Cache root holding module mirrors.
    pub mirror_cache_dir: PathBuf,
    /// Cache root holding environment mirrors. Targets materialized from a
    /// mirror under this root persist a JSON deploy record.
    pub env_cache_dir: PathBuf,
    /// Proceed with whatever mirror is on disk when a remote is unreachable.
    pub use_cache_fallback: bool,
    /// Purge and reclone a mirror when a git command fails.
    pub retry_git_commands: bool,
    /// How many times a failed mirror is purged and recloned.
    pub retry_count: u32,
    /// Use `rev-parse --verify <rev>` instead of `<rev>^{object}`.
    pub git_object_syntax_not_supported: bool,
    /// Report what would change without writing to targets.
    pub dry_run: bool,
    /// Keep existing target content and track a manifest for later purge.
    pub delta: bool,
    /// Hosts that never need SSH key wrapping.
    pub keyless_hosts: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: defaults::default_workers(),
            timeout_secs: defaults::DEFAULT_TIMEOUT.as_secs(),
            mirror_cache_dir: defaults::default_mirror_cache_dir(),
            env_cache_dir: defaults::default_env_cache_dir(),
            use_cache_fallback: false,
            retry_git_commands: false,
            retry_count: defaults::DEFAULT_RETRY_COUNT,
            git_object_syntax_not_supported: false,
            dry_run: false,
            delta: false,
            keyless_hosts: vec!["github.com".to_string()],
        }
    }
}

impl RunConfig {
    /// Per-command timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether targets built from `mirror` use the deploy-record signature.
    pub fn is_environment_mirror(&self, mirror: &Path) -> bool {
        mirror.starts_with(&self.env_cache_dir)
    }
}

/// A unique remote repository, keyed by its URL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepositorySpec {
    pub url: String,
    /// Private key added to an ssh-agent around git invocations.
    pub private_key: Option<PathBuf>,
    /// Whether failing to reach this repository is tolerable.
    pub ignore_unreachable: bool,
}

/// A module materialized inside an environment target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSpec {
    pub name: String,
    pub url: String,
    /// Branch, tag or commit to deploy.
    pub revision: String,
    /// Destination relative to the environment target. Defaults to
    /// `modules/<name>`.
    #[serde(default)]
    pub target: Option<PathBuf>,
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    #[serde(default)]
    pub ignore_unreachable: bool,
    #[serde(default)]
    pub allow_fail: bool,
}

/// An environment: one control repository revision plus its modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSpec {
    pub name: String,
    pub url: String,
    pub revision: String,
    pub target: PathBuf,
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    #[serde(default)]
    pub ignore_unreachable: bool,
    #[serde(default)]
    pub allow_fail: bool,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

impl EnvironmentSpec {
    /// Absolute destination of `module` within this environment.
    pub fn module_target(&self, module: &ModuleSpec) -> PathBuf {
        match &module.target {
            Some(target) => self.target.join(target),
            None => self.target.join("modules").join(&module.name),
        }
    }
}

/// Root of a deployment file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deployment {
    #[serde(default)]
    pub settings: RunConfig,
    #[serde(default)]
    pub environments: Vec<EnvironmentSpec>,
}

impl Deployment {
    /// Unique control repositories across all environments.
    pub fn environment_repositories(&self) -> BTreeMap<String, RepositorySpec> {
        let mut repos = BTreeMap::new();
        for env in &self.environments {
            merge_repository(
                &mut repos,
                &env.url,
                env.private_key.as_deref(),
                env.ignore_unreachable,
            );
        }
        repos
    }

    /// Unique module repositories across all environments.
    pub fn module_repositories(&self) -> BTreeMap<String, RepositorySpec> {
        let mut repos = BTreeMap::new();
        for module in self.environments.iter().flat_map(|env| &env.modules) {
            merge_repository(
                &mut repos,
                &module.url,
                module.private_key.as_deref(),
                module.ignore_unreachable,
            );
        }
        repos
    }

    fn validate(&self) -> Result<()> {
        let mut names = std::collections::HashSet::new();
        for env in &self.environments {
            if env.name.trim().is_empty() {
                return Err(Error::ConfigParse {
                    message: "Environment with empty name".to_string(),
                    hint: Some("Give every environment a unique 'name:'".to_string()),
                });
            }
            if !names.insert(env.name.as_str()) {
                return Err(Error::ConfigParse {
                    message: format!("Duplicate environment '{}'", env.name),
                    hint: None,
                });
            }
            if env.url.trim().is_empty() {
                return Err(Error::ConfigParse {
                    message: format!("Environment '{}' has no url", env.name),
                    hint: Some("Add 'url:' to the environment".to_string()),
                });
            }
            for module in &env.modules {
                if module.url.trim().is_empty() || module.revision.trim().is_empty() {
                    return Err(Error::ConfigParse {
                        message: format!(
                            "Module '{}' in environment '{}' needs both url and revision",
                            module.name, env.name
                        ),
                        hint: None,
                    });
                }
                if !is_single_component(&module.name) {
                    return Err(Error::ConfigParse {
                        message: format!(
                            "Module name '{}' in environment '{}' is not a plain directory name",
                            module.name, env.name
                        ),
                        hint: Some(
                            "Module names may not contain '/' or be '.' or '..'".to_string(),
                        ),
                    });
                }
                if let Some(target) = &module.target {
                    if !is_contained_relative(target) {
                        return Err(Error::ConfigParse {
                            message: format!(
                                "Module '{}' in environment '{}' has target '{}' outside the environment",
                                module.name,
                                env.name,
                                target.display()
                            ),
                            hint: Some(
                                "Use a relative 'target:' below the environment, without '..'"
                                    .to_string(),
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// True when `name` is exactly one normal path component.
fn is_single_component(name: &str) -> bool {
    if name.contains('/') || name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// True when `path` is relative, never climbs with `..`, and names at least
/// one directory below its base.
fn is_contained_relative(path: &Path) -> bool {
    let mut normal = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            _ => return false,
        }
    }
    normal > 0
}

/// Collapse a consumer of `url` into the spec map. The first non-empty
/// private key wins; the repository stays tolerable only while every
/// consumer tolerates it.
fn merge_repository(
    repos: &mut BTreeMap<String, RepositorySpec>,
    url: &str,
    private_key: Option<&Path>,
    ignore_unreachable: bool,
) {
    let private_key = private_key
        .filter(|key| !key.as_os_str().is_empty())
        .map(Path::to_path_buf);
    repos
        .entry(url.to_string())
        .and_modify(|spec| {
            if spec.private_key.is_none() {
                spec.private_key = private_key.clone();
            }
            spec.ignore_unreachable &= ignore_unreachable;
        })
        .or_insert_with(|| RepositorySpec {
            url: url.to_string(),
            private_key,
            ignore_unreachable,
        });
}

/// Parse and validate a deployment from YAML.
pub fn parse(yaml_content: &str) -> Result<Deployment> {
    let deployment: Deployment = serde_yaml::from_str(yaml_content)?;
    deployment.validate()?;
    Ok(deployment)
}

/// Read and parse a deployment file.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Deployment> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
settings:
  workers: 4
  timeout_secs: 60
  mirror_cache_dir: /tmp/cache/modules
  env_cache_dir: /tmp/cache/environments
  use_cache_fallback: true
environments:
  - name: production
    url: git@git.example.com:ops/control.git
    revision: production
    target: /srv/envs/production
    private_key: /root/.ssh/deploy
    modules:
      - name: apache
        url: https://github.com/example/apache.git
        revision: v1.2.0
      - name: ntp
        url: https://github.com/example/ntp.git
        revision: main
        target: site/ntp
        ignore_unreachable: true
  - name: staging
    url: git@git.example.com:ops/control.git
    revision: staging
    target: /srv/envs/staging
    modules:
      - name: apache
        url: https://github.com/example/apache.git
        revision: v1.3.0
"#;

    #[test]
    fn test_parse_sample() {
        let deployment = parse(SAMPLE).unwrap();
        assert_eq!(deployment.settings.workers, 4);
        assert_eq!(deployment.settings.timeout(), Duration::from_secs(60));
        assert!(deployment.settings.use_cache_fallback);
        assert!(!deployment.settings.retry_git_commands);
        assert_eq!(deployment.environments.len(), 2);
        assert_eq!(deployment.environments[0].modules.len(), 2);
    }

    #[test]
    fn test_repositories_are_deduplicated_by_url() {
        let deployment = parse(SAMPLE).unwrap();

        let envs = deployment.environment_repositories();
        assert_eq!(envs.len(), 1);
        let control = &envs["git@git.example.com:ops/control.git"];
        assert_eq!(control.private_key, Some(PathBuf::from("/root/.ssh/deploy")));

        let modules = deployment.module_repositories();
        assert_eq!(modules.len(), 2);
        assert!(modules.contains_key("https://github.com/example/apache.git"));
        assert!(modules["https://github.com/example/ntp.git"].ignore_unreachable);
    }

    #[test]
    fn test_tolerance_requires_every_consumer() {
        let mut repos = BTreeMap::new();
        merge_repository(&mut repos, "https://x/r.git", None, true);
        merge_repository(&mut repos, "https://x/r.git", None, false);
        assert!(!repos["https://x/r.git"].ignore_unreachable);
    }

    #[test]
    fn test_module_target_defaults() {
        let deployment = parse(SAMPLE).unwrap();
        let env = &deployment.environments[0];
        assert_eq!(
            env.module_target(&env.modules[0]),
            PathBuf::from("/srv/envs/production/modules/apache")
        );
        assert_eq!(
            env.module_target(&env.modules[1]),
            PathBuf::from("/srv/envs/production/site/ntp")
        );
    }

    #[test]
    fn test_environment_mirror_detection() {
        let config = parse(SAMPLE).unwrap().settings;
        assert!(config.is_environment_mirror(Path::new("/tmp/cache/environments/x")));
        assert!(!config.is_environment_mirror(Path::new("/tmp/cache/modules/x")));
    }

    #[test]
    fn test_defaults_when_settings_missing() {
        let deployment = parse("environments: []").unwrap();
        assert_eq!(deployment.settings.retry_count, 1);
        assert_eq!(deployment.settings.keyless_hosts, vec!["github.com"]);
        assert!(deployment.environments.is_empty());
    }

    #[test]
    fn test_duplicate_environment_rejected() {
        let yaml = r#"
environments:
  - { name: a, url: u, revision: r, target: /t1 }
  - { name: a, url: u, revision: r, target: /t2 }
"#;
        let err = parse(yaml).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    fn module_yaml(module: &str) -> String {
        format!(
            "environments:\n  - name: production\n    url: u\n    revision: r\n    \
             target: /srv/envs/production\n    modules:\n      - {}\n",
            module
        )
    }

    #[test]
    fn test_module_target_escaping_environment_rejected() {
        for target in ["/etc", "../other", "modules/../../etc", "."] {
            let yaml = module_yaml(&format!(
                "{{ name: apache, url: u, revision: r, target: '{}' }}",
                target
            ));
            match parse(&yaml).unwrap_err() {
                Error::ConfigParse { hint, .. } => assert!(hint.is_some(), "{}", target),
                other => panic!("unexpected error for {}: {:?}", target, other),
            }
        }
    }

    #[test]
    fn test_module_name_must_be_plain_directory() {
        for name in ["../apache", "a/b", "..", "."] {
            let yaml = module_yaml(&format!("{{ name: '{}', url: u, revision: r }}", name));
            let err = parse(&yaml).unwrap_err();
            assert!(matches!(err, Error::ConfigParse { .. }), "{}", name);
        }
    }

    #[test]
    fn test_nested_relative_module_target_accepted() {
        let yaml = module_yaml("{ name: ntp, url: u, revision: r, target: ./site/ntp }");
        let deployment = parse(&yaml).unwrap();
        assert_eq!(
            deployment.environments[0].module_target(&deployment.environments[0].modules[0]),
            PathBuf::from("/srv/envs/production/site/ntp")
        );
    }

    #[test]
    fn test_unknown_setting_rejected() {
        let err = parse("settings:\n  wokrers: 3\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }
}
