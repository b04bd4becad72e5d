use serde::Serialize;

use crate::winget::{InstallOutcome, WingetError};

/// Why a package did not install. Serialized names are what progress
/// consumers and the JSON output see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ManagerUnavailable,
    AdminRequired,
    NotFound,
    ExecutionFailed,
    InstallationFailed,
    UnexpectedError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ManagerUnavailable => "manager_unavailable",
            ErrorKind::AdminRequired => "admin_required",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ExecutionFailed => "execution_failed",
            ErrorKind::InstallationFailed => "installation_failed",
            ErrorKind::UnexpectedError => "unexpected_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error_kind", rename_all = "snake_case")]
pub enum InstallStatus {
    Succeeded,
    /// Counted as a failure.
    Failed(ErrorKind),
    /// Needs outside intervention (elevation, a different id); counted apart
    /// from failures.
    Skipped(ErrorKind),
}

/// Outcome of one package within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallResult {
    pub package_id: String,
    #[serde(flatten)]
    pub status: InstallStatus,
    pub message: Option<String>,
    pub attempts: u32,
    pub stdout: String,
    pub stderr: String,
    pub return_code: Option<i32>,
}

impl InstallResult {
    pub fn succeeded(outcome: InstallOutcome) -> Self {
        Self {
            package_id: outcome.package_id,
            status: InstallStatus::Succeeded,
            message: None,
            attempts: outcome.attempts,
            return_code: Some(outcome.output.exit_code),
            stdout: outcome.output.stdout,
            stderr: outcome.output.stderr,
        }
    }

    pub fn from_error(package_id: &str, error: &WingetError) -> Self {
        let status = if error.is_skippable() {
            InstallStatus::Skipped(error.kind())
        } else {
            InstallStatus::Failed(error.kind())
        };
        let stderr = match error {
            WingetError::InstallationFailed { reason, .. } => reason.clone(),
            _ => String::new(),
        };
        Self {
            package_id: package_id.to_string(),
            status,
            message: Some(error.to_string()),
            attempts: error.attempts(),
            stdout: String::new(),
            stderr,
            return_code: error.return_code(),
        }
    }

    pub fn unexpected(package_id: &str, message: impl Into<String>) -> Self {
        Self {
            package_id: package_id.to_string(),
            status: InstallStatus::Failed(ErrorKind::UnexpectedError),
            message: Some(message.into()),
            attempts: 0,
            stdout: String::new(),
            stderr: String::new(),
            return_code: None,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self.status, InstallStatus::Succeeded)
    }

    pub fn skipped(&self) -> bool {
        matches!(self.status, InstallStatus::Skipped(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.status {
            InstallStatus::Succeeded => None,
            InstallStatus::Failed(kind) | InstallStatus::Skipped(kind) => Some(kind),
        }
    }
}
