//! Scripted [`CommandRunner`] for exercising the facade without a real
//! package manager.

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use super::runner::{CommandOutput, CommandRunner, RunError};

pub enum Scripted {
    Exit(i32, &'static str, &'static str),
    Timeout,
    Missing,
    SpawnError,
}

/// Answers `--version` from `version` and every other invocation from the
/// queued responses, recording the argument lists it was called with.
pub struct ScriptedRunner {
    version: Mutex<Scripted>,
    responses: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self {
            version: Mutex::new(Scripted::Exit(0, "v1.9.25200", "")),
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_version(self, version: Scripted) -> Self {
        *self.version.lock().unwrap() = version;
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than the availability check.
    pub fn command_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|args| args.first().map(String::as_str) != Some("--version"))
            .collect()
    }

    fn answer(step: &Scripted, program: &str, args: &[String]) -> Result<CommandOutput, RunError> {
        match step {
            Scripted::Exit(code, stdout, stderr) => Ok(CommandOutput {
                exit_code: *code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
            Scripted::Timeout => Err(RunError::Timeout {
                command: format!("{} {}", program, args.join(" ")),
                timeout: Duration::from_secs(1),
            }),
            Scripted::Missing => Err(RunError::NotFound(program.to_string())),
            Scripted::SpawnError => Err(RunError::Io(io::Error::other("spawn failed"))),
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<CommandOutput, RunError> {
        self.calls.lock().unwrap().push(args.to_vec());
        if args.first().map(String::as_str) == Some("--version") {
            return Self::answer(&self.version.lock().unwrap(), program, args);
        }
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Scripted::Exit(0, "", ""));
        Self::answer(&next, program, args)
    }
}
