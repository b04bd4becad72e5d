use thiserror::Error;

use crate::install::ErrorKind;

/// Failures surfaced by the package manager facade.
///
/// [`code`](Self::code) values are stable; logs and scripts match on them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WingetError {
    #[error("{0}")]
    ManagerUnavailable(String),

    #[error("{message}")]
    AdminRequired { message: String, attempts: u32 },

    #[error("Package '{package_id}' not found")]
    PackageNotFound { package_id: String, attempts: u32 },

    #[error("{message}")]
    ExecutionFailed {
        message: String,
        command: Option<String>,
        return_code: Option<i32>,
    },

    #[error("Installation of '{package_id}' failed: {reason}")]
    InstallationFailed {
        package_id: String,
        reason: String,
        attempts: u32,
    },
}

impl WingetError {
    pub fn unavailable() -> Self {
        WingetError::ManagerUnavailable("Package manager is not available on this system".into())
    }

    pub fn code(&self) -> u32 {
        match self {
            WingetError::ManagerUnavailable(_) => 1001,
            WingetError::ExecutionFailed { .. } => 1002,
            WingetError::AdminRequired { .. } => 1003,
            WingetError::PackageNotFound { .. } => 1004,
            WingetError::InstallationFailed { .. } => 1005,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WingetError::ManagerUnavailable(_) => ErrorKind::ManagerUnavailable,
            WingetError::AdminRequired { .. } => ErrorKind::AdminRequired,
            WingetError::PackageNotFound { .. } => ErrorKind::NotFound,
            WingetError::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
            WingetError::InstallationFailed { .. } => ErrorKind::InstallationFailed,
        }
    }

    /// Attempts consumed before the error was raised, when they are known.
    pub fn attempts(&self) -> u32 {
        match self {
            WingetError::AdminRequired { attempts, .. }
            | WingetError::PackageNotFound { attempts, .. }
            | WingetError::InstallationFailed { attempts, .. } => *attempts,
            WingetError::ManagerUnavailable(_) | WingetError::ExecutionFailed { .. } => 0,
        }
    }

    /// Admin and not-found failures cannot be fixed by retrying.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            WingetError::AdminRequired { .. } | WingetError::PackageNotFound { .. }
        )
    }

    pub fn return_code(&self) -> Option<i32> {
        match self {
            WingetError::ExecutionFailed { return_code, .. } => *return_code,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(WingetError::unavailable().code(), 1001);
        let not_found = WingetError::PackageNotFound {
            package_id: "Foo.Bar".into(),
            attempts: 1,
        };
        assert_eq!(not_found.code(), 1004);
        assert_eq!(not_found.to_string(), "Package 'Foo.Bar' not found");
        assert!(not_found.is_skippable());
    }

    #[test]
    fn test_installation_failed_message() {
        let err = WingetError::InstallationFailed {
            package_id: "Foo.Bar".into(),
            reason: "hash mismatch".into(),
            attempts: 4,
        };
        assert_eq!(err.to_string(), "Installation of 'Foo.Bar' failed: hash mismatch");
        assert_eq!(err.kind(), ErrorKind::InstallationFailed);
        assert_eq!(err.attempts(), 4);
        assert!(!err.is_skippable());
    }
}
