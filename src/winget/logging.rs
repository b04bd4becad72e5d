use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::PathBuf;

use super::runner::{CommandOutput, RunError};

/// One line of the command audit log.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub args: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Appends every package manager invocation to a JSON-lines file.
#[derive(Debug, Clone)]
pub struct CommandLogger {
    log_dir: PathBuf,
}

impl CommandLogger {
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    pub fn log_command(
        &self,
        command: &str,
        args: &[String],
        outcome: &Result<CommandOutput, RunError>,
    ) -> Result<()> {
        let entry = match outcome {
            Ok(output) => CommandLogEntry {
                timestamp: Utc::now(),
                command: command.to_string(),
                args: args.to_vec(),
                stdout: output.stdout.clone(),
                stderr: output.stderr.clone(),
                exit_code: Some(output.exit_code),
                success: output.success(),
                error: None,
            },
            Err(e) => CommandLogEntry {
                timestamp: Utc::now(),
                command: command.to_string(),
                args: args.to_vec(),
                stdout: String::new(),
                stderr: String::new(),
                exit_code: None,
                success: false,
                error: Some(e.to_string()),
            },
        };

        create_dir_all(&self.log_dir).context("Failed to create command log directory")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file_path())
            .context("Failed to open command log file")?;

        let json_line =
            serde_json::to_string(&entry).context("Failed to serialize command log entry")?;
        writeln!(file, "{json_line}").context("Failed to write to command log file")?;

        Ok(())
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.log_dir.join("winget_commands.jsonl")
    }

    /// Entries newest first.
    pub fn get_logs(&self) -> Result<Vec<CommandLogEntry>> {
        let log_file = self.log_file_path();
        if !log_file.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&log_file).context("Failed to read command log")?;

        let mut logs = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: CommandLogEntry =
                serde_json::from_str(line).context("Failed to parse command log entry")?;
            logs.push(entry);
        }

        logs.reverse();
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_entries_are_appended_as_json_lines() {
        let dir = tempdir().unwrap();
        let logger = CommandLogger::new(dir.path().join("logs"));
        let args = vec!["--version".to_string()];

        let ok = Ok(CommandOutput {
            exit_code: 0,
            stdout: "v1.9".into(),
            stderr: String::new(),
        });
        let timed_out = Err(RunError::Timeout {
            command: "winget --version".into(),
            timeout: Duration::from_secs(5),
        });
        logger.log_command("winget", &args, &ok).unwrap();
        logger.log_command("winget", &args, &timed_out).unwrap();

        let raw = std::fs::read_to_string(logger.log_file_path()).unwrap();
        assert_eq!(raw.lines().count(), 2);

        let logs = logger.get_logs().unwrap();
        assert!(!logs[0].success);
        assert!(logs[0].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(logs[1].exit_code, Some(0));
        assert_eq!(logs[1].stdout, "v1.9");
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempdir().unwrap();
        let logger = CommandLogger::new(dir.path().to_path_buf());
        assert!(logger.get_logs().unwrap().is_empty());
    }
}
