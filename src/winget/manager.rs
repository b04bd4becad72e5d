use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::error::WingetError;
use super::logging::CommandLogger;
use super::parser::{PackageRecord, parse_search_output};
use super::runner::{CommandOutput, CommandRunner, RunError, SystemRunner, command_line};
use crate::config::WingetConfig;

/// Any of these in the output means the installer wants elevation.
const ADMIN_KEYWORDS: &[&str] = &["administrator", "admin", "elevated", "privilege"];

/// Failures that another attempt cannot fix.
const PERMANENT_ERRORS: &[&str] = &[
    "package already installed",
    "newer version already installed",
    "architecture mismatch",
];

const NOT_FOUND_PHRASE: &str = "not found";

#[derive(Debug, Clone)]
pub struct WingetSettings {
    pub command: String,
    /// Per invocation, not per batch.
    pub timeout: Duration,
    pub retry_attempts: u32,
    /// Retry `n` waits `retry_backoff * n`.
    pub retry_backoff: Duration,
}

impl Default for WingetSettings {
    fn default() -> Self {
        Self::from(&WingetConfig::default())
    }
}

impl From<&WingetConfig> for WingetSettings {
    fn from(config: &WingetConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            retry_attempts: config.retry_attempts,
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
        }
    }
}

/// A successful install and what it took to get there.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub package_id: String,
    pub command: String,
    pub attempts: u32,
    pub output: CommandOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
    AdminRequired,
    NotFound,
    Permanent,
    Transient,
}

fn classify_failure(output: &CommandOutput) -> FailureClass {
    let text = output.combined_lowercase();
    if ADMIN_KEYWORDS.iter().any(|k| text.contains(k)) {
        FailureClass::AdminRequired
    } else if text.contains(NOT_FOUND_PHRASE) {
        FailureClass::NotFound
    } else if PERMANENT_ERRORS.iter().any(|e| text.contains(e)) {
        FailureClass::Permanent
    } else {
        FailureClass::Transient
    }
}

pub fn install_args(package_id: &str, silent: bool) -> Vec<String> {
    let mut args: Vec<String> = [
        "install",
        "--id",
        package_id,
        "--exact",
        "--disable-interactivity",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if silent {
        args.extend(
            [
                "--silent",
                "--accept-package-agreements",
                "--accept-source-agreements",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }
    args
}

pub fn search_args(query: &str) -> Vec<String> {
    let mut args = vec!["search".to_string()];
    if !query.is_empty() {
        args.push("--query".to_string());
        args.push(query.to_string());
    }
    args.push("--accept-source-agreements".to_string());
    args
}

/// Typed front for the external package manager.
pub struct WingetManager<R = SystemRunner> {
    runner: R,
    settings: WingetSettings,
    logger: Option<CommandLogger>,
}

impl WingetManager<SystemRunner> {
    pub fn new(settings: WingetSettings) -> Self {
        Self::with_runner(SystemRunner, settings)
    }
}

impl<R: CommandRunner> WingetManager<R> {
    pub fn with_runner(runner: R, settings: WingetSettings) -> Self {
        Self {
            runner,
            settings,
            logger: None,
        }
    }

    pub fn with_command_log(mut self, logger: CommandLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn settings(&self) -> &WingetSettings {
        &self.settings
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn execute(&self, args: &[String]) -> Result<CommandOutput, RunError> {
        debug!(
            "Executing command: {}",
            command_line(&self.settings.command, args)
        );
        let outcome = self
            .runner
            .run(&self.settings.command, args, self.settings.timeout);

        if let Some(logger) = &self.logger {
            if let Err(e) = logger.log_command(&self.settings.command, args, &outcome) {
                warn!("Failed to log package manager command: {e}");
            }
        }
        outcome
    }

    fn version_output(&self) -> Result<CommandOutput, WingetError> {
        debug!("Checking {} availability...", self.settings.command);
        self.execute(&["--version".to_string()]).map_err(|e| match e {
            RunError::Timeout { .. } => {
                error!("{} availability check timed out", self.settings.command);
                WingetError::ManagerUnavailable(format!(
                    "{} availability check timed out",
                    self.settings.command
                ))
            }
            RunError::NotFound(program) => {
                error!("{program} executable not found");
                WingetError::ManagerUnavailable(format!("{program} executable not found"))
            }
            RunError::Io(e) => {
                error!("Unexpected error checking availability: {e}");
                WingetError::ManagerUnavailable(format!("Unexpected error: {e}"))
            }
        })
    }

    /// `Ok(false)` when the tool ran but reported failure; `Err` when it could
    /// not be run at all.
    pub fn is_available(&self) -> Result<bool, WingetError> {
        let output = self.version_output()?;
        if output.success() {
            info!(
                "{} is available. Version output: {}",
                self.settings.command,
                output.stdout.trim()
            );
        } else {
            warn!(
                "{} check failed with return code {}: {}",
                self.settings.command, output.exit_code, output.stderr
            );
        }
        Ok(output.success())
    }

    fn ensure_available(&self) -> Result<(), WingetError> {
        if self.is_available()? {
            Ok(())
        } else {
            Err(WingetError::unavailable())
        }
    }

    pub fn version(&self) -> Result<String, WingetError> {
        let output = self.version_output()?;
        if !output.success() {
            return Err(WingetError::unavailable());
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Best effort; any failure reads as not elevated.
    pub fn is_elevated(&self) -> bool {
        crate::elevate::current().is_elevated()
    }

    pub fn search(&self, query: &str) -> Result<Vec<PackageRecord>, WingetError> {
        debug!("Searching packages with query: '{query}'");
        self.ensure_available()?;

        let args = search_args(query);
        let command = command_line(&self.settings.command, &args);

        match self.execute(&args) {
            Ok(output) if output.success() => {
                let packages = parse_search_output(&output.stdout);
                info!("Found {} packages for query '{}'", packages.len(), query);
                Ok(packages)
            }
            Ok(output) => {
                let message = format!(
                    "Search command failed with return code {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                );
                error!("{message}");
                Err(WingetError::ExecutionFailed {
                    message,
                    command: Some(command),
                    return_code: Some(output.exit_code),
                })
            }
            Err(RunError::Timeout { timeout, .. }) => {
                let message = format!(
                    "Search command timed out after {} seconds",
                    timeout.as_secs()
                );
                error!("{message}");
                Err(WingetError::ExecutionFailed {
                    message,
                    command: Some(command),
                    return_code: None,
                })
            }
            Err(e) => {
                error!("Unexpected error during package search: {e}");
                Err(WingetError::ExecutionFailed {
                    message: format!("Unexpected error: {e}"),
                    command: Some(command),
                    return_code: None,
                })
            }
        }
    }

    /// Install one package, retrying transient failures.
    ///
    /// `retry_count` extra attempts are made after the first; `None` uses the
    /// configured `retry_attempts`.
    pub fn install(
        &self,
        package_id: &str,
        silent: bool,
        retry_count: Option<u32>,
    ) -> Result<InstallOutcome, WingetError> {
        let retry_count = retry_count.unwrap_or(self.settings.retry_attempts);
        info!("Starting installation of package: {package_id}");

        self.ensure_available()?;

        let args = install_args(package_id, silent);
        let command = command_line(&self.settings.command, &args);
        let mut last_output: Option<CommandOutput> = None;
        let mut attempts = 0;

        for attempt in 0..=retry_count {
            if attempt > 0 {
                info!("Retry attempt {attempt} for package: {package_id}");
                thread::sleep(self.settings.retry_backoff * attempt);
            }
            attempts = attempt + 1;

            let output = match self.execute(&args) {
                Ok(output) => output,
                Err(e) => {
                    let message = match e {
                        RunError::Timeout { timeout, .. } => format!(
                            "Installation timed out after {} seconds for package: {}",
                            timeout.as_secs(),
                            package_id
                        ),
                        other => format!("Unexpected error installing {package_id}: {other}"),
                    };
                    error!("{message}");
                    if attempt < retry_count {
                        info!("Will retry installation of {package_id}...");
                        continue;
                    }
                    return Err(WingetError::ExecutionFailed {
                        message,
                        command: Some(command),
                        return_code: None,
                    });
                }
            };

            if output.success() {
                info!("Successfully installed package: {package_id}");
                return Ok(InstallOutcome {
                    package_id: package_id.to_string(),
                    command,
                    attempts,
                    output,
                });
            }

            match classify_failure(&output) {
                FailureClass::AdminRequired => {
                    error!("Admin privileges required for package: {package_id}");
                    return Err(WingetError::AdminRequired {
                        message: format!(
                            "Installation of {package_id} requires administrator privileges"
                        ),
                        attempts,
                    });
                }
                FailureClass::NotFound => {
                    error!("Package not found: {package_id}");
                    return Err(WingetError::PackageNotFound {
                        package_id: package_id.to_string(),
                        attempts,
                    });
                }
                FailureClass::Permanent => {
                    info!("Permanent error detected for {package_id}, not retrying");
                    last_output = Some(output);
                    break;
                }
                FailureClass::Transient => {
                    warn!(
                        "Installation attempt {} failed for {}: {}",
                        attempts,
                        package_id,
                        output.stderr.trim()
                    );
                    last_output = Some(output);
                }
            }
        }

        error!("Failed to install {package_id} after {attempts} attempts");
        let reason = match &last_output {
            Some(output) if output.stderr.trim().is_empty() => "Unknown error".to_string(),
            Some(output) => output.stderr.trim().to_string(),
            None => "No result".to_string(),
        };
        Err(WingetError::InstallationFailed {
            package_id: package_id.to_string(),
            reason,
            attempts,
        })
    }
}
