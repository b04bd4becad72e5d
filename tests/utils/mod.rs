use anyhow::Result;
use std::process::Command;

use crate::common::TestEnvironment;

#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Parsed JSON events printed to stdout.
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.stdout
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn event(&self, code: &str) -> Option<serde_json::Value> {
        self.events().into_iter().find(|e| e["code"] == code)
    }

    /// JSON warning and error events printed to stderr.
    pub fn stderr_event(&self, code: &str) -> Option<serde_json::Value> {
        self.stderr
            .lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .find(|e| e["code"] == code)
    }
}

/// Run the built binary against the environment's config.
pub fn run_winstall_command(env: &TestEnvironment, args: &[&str]) -> Result<CommandOutput> {
    let output = Command::new(env!("CARGO_BIN_EXE_winstall"))
        .arg("--config")
        .arg(env.config_path())
        .arg("--no-color")
        .args(args)
        .current_dir(env.path())
        .env_remove("RUST_LOG")
        .output()?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}
