//! Mock collaborators shared by unit tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::archive::ArchiveExtractor;
use crate::error::{Error, Result};
use crate::exec::{CommandRunner, ExecResult};

/// Mock runner scripted by a closure over the command line.
pub(crate) struct MockRunner<F> {
    pub calls: Mutex<Vec<(String, bool)>>,
    respond: F,
}

impl<F> MockRunner<F> {
    pub fn new(respond: F) -> Self
    where
        F: Fn(&str) -> ExecResult + Send + Sync,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            respond,
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(needle)).count()
    }
}

impl<F> CommandRunner for MockRunner<F>
where
    F: Fn(&str) -> ExecResult + Send + Sync,
{
    fn run(&self, command: &str, _timeout: Duration, allow_fail: bool) -> Result<ExecResult> {
        self.calls
            .lock()
            .unwrap()
            .push((command.to_string(), allow_fail));
        Ok((self.respond)(command))
    }
}

pub(crate) fn exit(code: i32) -> ExecResult {
    ExecResult {
        exit_code: code,
        ..Default::default()
    }
}

pub(crate) fn output(text: &str) -> ExecResult {
    ExecResult {
        exit_code: 0,
        output: text.to_string(),
        stderr: String::new(),
    }
}

/// Mock extractor that writes a fixed set of files into the target.
#[derive(Default)]
pub(crate) struct MockExtractor {
    pub files: Vec<&'static str>,
    pub fail: bool,
    pub calls: Mutex<Vec<(PathBuf, String, PathBuf)>>,
}

impl MockExtractor {
    pub fn with_files(files: &[&'static str]) -> Self {
        Self {
            files: files.to_vec(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ArchiveExtractor for MockExtractor {
    fn extract(&self, mirror: &Path, revision: &str, target: &Path) -> Result<()> {
        self.calls.lock().unwrap().push((
            mirror.to_path_buf(),
            revision.to_string(),
            target.to_path_buf(),
        ));
        if self.fail {
            return Err(Error::Extraction {
                mirror: mirror.to_path_buf(),
                tree: revision.to_string(),
                target: target.to_path_buf(),
                message: "mock extraction failure".to_string(),
            });
        }
        for file in &self.files {
            let path = target.join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, revision)?;
        }
        Ok(())
    }
}
