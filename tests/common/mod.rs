//! Shared test utilities for integration and E2E tests.
//!
//! Add `mod common;` to a test file, then `use common::prelude::*;`.
//!
//! Everything here drives the system `git`; tests using it are gated on the
//! `integration-tests` feature.

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{Origin, TestFixture};
}

/// Run git in `dir` with a fixed identity, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=mirrorsync tests",
            "-c",
            "user.email=tests@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A local repository standing in for a remote.
pub struct Origin {
    path: PathBuf,
}

#[allow(dead_code)]
impl Origin {
    /// Create a repository at `path` with `files` committed on `main`.
    pub fn create(path: &Path, files: &[(&str, &str)]) -> Self {
        std::fs::create_dir_all(path).expect("Failed to create origin dir");
        git(path, &["init", "-q"]);
        git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        let origin = Self {
            path: path.to_path_buf(),
        };
        origin.commit(files, "initial");
        origin
    }

    /// Write `files` and commit them, returning the new commit hash.
    pub fn commit(&self, files: &[(&str, &str)], message: &str) -> String {
        for (name, content) in files {
            let file = self.path.join(name);
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create parent dir");
            }
            std::fs::write(&file, content).expect("Failed to write file");
        }
        git(&self.path, &["add", "-A"]);
        git(&self.path, &["commit", "-q", "-m", message]);
        self.head()
    }

    /// Delete `name` and commit, returning the new commit hash.
    pub fn remove(&self, name: &str) -> String {
        git(&self.path, &["rm", "-q", name]);
        git(&self.path, &["commit", "-q", "-m", &format!("remove {}", name)]);
        self.head()
    }

    pub fn head(&self) -> String {
        git(&self.path, &["rev-parse", "HEAD"])
    }

    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Temporary workspace holding origins, caches, targets and a deployment
/// file.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn origin(&self, name: &str, files: &[(&str, &str)]) -> Origin {
        Origin::create(&self.path().join("origins").join(name), files)
    }

    pub fn env_target(&self, name: &str) -> PathBuf {
        self.path().join("envs").join(name)
    }

    pub fn module_cache(&self) -> PathBuf {
        self.path().join("cache/modules")
    }

    pub fn env_cache(&self) -> PathBuf {
        self.path().join("cache/environments")
    }

    /// Deployment YAML for one environment `name` tracking `control` at
    /// `main`, with one module per entry in `modules`.
    pub fn deployment_yaml(
        &self,
        name: &str,
        control: &Origin,
        modules: &[(&str, &Origin)],
    ) -> String {
        let mut yaml = format!(
            "settings:\n  workers: 2\n  mirror_cache_dir: '{}'\n  env_cache_dir: '{}'\n\
             environments:\n  - name: {}\n    url: '{}'\n    revision: main\n    target: '{}'\n",
            self.module_cache().display(),
            self.env_cache().display(),
            name,
            control.url(),
            self.env_target(name).display()
        );
        if modules.is_empty() {
            yaml.push_str("    modules: []\n");
            return yaml;
        }
        yaml.push_str("    modules:\n");
        for (module, origin) in modules {
            yaml.push_str(&format!(
                "      - name: {}\n        url: '{}'\n        revision: main\n",
                module,
                origin.url()
            ));
        }
        yaml
    }

    /// Write `content` as the deployment file and return its path.
    pub fn write_config(&self, content: &str) -> PathBuf {
        let child = self.temp_dir.child("mirrorsync.yaml");
        child
            .write_str(content)
            .expect("Failed to write config file");
        child.path().to_path_buf()
    }

    /// The `mirrorsync` binary, run from the fixture directory with no
    /// inherited configuration.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("mirrorsync");
        cmd.current_dir(self.path())
            .env_remove("MIRRORSYNC_CONFIG")
            .env_remove("MIRRORSYNC_CACHE")
            .env_remove("RUST_LOG");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
