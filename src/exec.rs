//! Process execution with timeouts.
//!
//! Every git invocation goes through a [`CommandRunner`]. The default
//! [`ShellRunner`] hands the command line to `sh -c`, which is required for
//! the `ssh-agent bash -c '...'` wrapping used with private keys. Tests
//! substitute their own runner to script exit codes and output.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{Error, Result};

/// Exit code reported for a command killed by its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Outcome of one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub exit_code: i32,
    pub output: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for running shell commands - allows mocking in tests
pub trait CommandRunner: Send + Sync {
    /// Run `command` through a shell, killing it once `timeout` elapses.
    ///
    /// A non-zero exit is reported in the result, not as an error. With
    /// `allow_fail` the failure is only logged at debug level.
    fn run(&self, command: &str, timeout: Duration, allow_fail: bool) -> Result<ExecResult>;
}

/// Runs commands with the system `sh`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, timeout: Duration, allow_fail: bool) -> Result<ExecResult> {
        debug!("Executing {}", command);
        let start = Instant::now();

        let mut shell = Command::new("sh");
        shell
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // The shell leads its own process group so a timeout can take down
        // every process it started, not just `sh`.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            shell.process_group(0);
        }
        let mut child = shell.spawn().map_err(|e| Error::Process {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        let (exit_code, stdout, mut stderr, timed_out) =
            wait_with_timeout(&mut child, timeout).map_err(|e| Error::Process {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        if timed_out {
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(&format!("Process timed out after {:?}.", timeout));
        }

        debug!(
            "Executing {} took {:.5}s",
            command,
            start.elapsed().as_secs_f64()
        );

        if exit_code != 0 {
            if allow_fail {
                debug!("Command {} exited with {}: {}", command, exit_code, stderr.trim());
            } else {
                warn!("WARN: command {} exited with {}: {}", command, exit_code, stderr.trim());
            }
        }

        Ok(ExecResult {
            exit_code,
            output: stdout,
            stderr,
        })
    }
}

/// How long to wait for the pipes to close after a timeout kill.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Poll `child` until it exits or `timeout` elapses, draining both pipes on
/// reader threads so a chatty process cannot block on a full pipe.
///
/// After a timeout the readers get [`DRAIN_GRACE`] to finish. A descendant
/// that survived the kill may still hold a pipe open; its reader is then
/// left behind and the output collected so far is dropped.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<(i32, String, String, bool)> {
    let start = Instant::now();
    let stdout_handle = child
        .stdout
        .take()
        .map(|mut stdout| thread::spawn(move || read_to_string(&mut stdout)));
    let stderr_handle = child
        .stderr
        .take()
        .map(|mut stderr| thread::spawn(move || read_to_string(&mut stderr)));

    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if start.elapsed() >= timeout {
            timed_out = true;
            kill_process_group(child);
            break child.wait().ok();
        }
        thread::sleep(Duration::from_millis(10));
    };

    let deadline = timed_out.then(|| Instant::now() + DRAIN_GRACE);
    let stdout = join_output(stdout_handle, deadline);
    let stderr = join_output(stderr_handle, deadline);
    let exit_code = if timed_out {
        TIMEOUT_EXIT_CODE
    } else {
        status.and_then(|s| s.code()).unwrap_or(-1)
    };
    Ok((exit_code, stdout, stderr, timed_out))
}

fn read_to_string<R: Read>(reader: &mut R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    let group = format!("-{}", child.id());
    let _ = Command::new("kill")
        .args(["-s", "KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

fn join_output(handle: Option<thread::JoinHandle<String>>, deadline: Option<Instant>) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    if let Some(deadline) = deadline {
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return String::new();
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
    handle.join().unwrap_or_default()
}
