//! Child process execution for the package manager executable.
//!
//! The [`CommandRunner`] trait is the seam the facade is tested through;
//! [`SystemRunner`] is the real implementation backed by `duct`.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::common::shell::shell_quote;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exit code and captured output of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `-1` when the child was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout and stderr joined, lowercased for keyword matching.
    pub fn combined_lowercase(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).to_lowercase()
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Executable not found: {0}")]
    NotFound(String),

    #[error("Command timed out after {}s: {command}", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], timeout: Duration)
    -> Result<CommandOutput, RunError>;
}

/// Runs commands on the host and kills them once the timeout expires.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RunError> {
        let handle = duct::cmd(program, args)
            .stdin_null()
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .start()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => RunError::NotFound(program.to_string()),
                _ => RunError::Io(e),
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(output) = handle.try_wait()? {
                return Ok(CommandOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                });
            }
            if Instant::now() >= deadline {
                if let Err(e) = handle.kill() {
                    log::warn!("Failed to kill timed out {}: {}", program, e);
                }
                return Err(RunError::Timeout {
                    command: command_line(program, args),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Render a program and its arguments as a copy-pasteable shell line.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}
