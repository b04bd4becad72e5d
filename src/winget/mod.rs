//! Wrapper around the external package manager executable.
//!
//! - [`runner`]: spawning with a timeout
//! - [`parser`]: the fixed-width search table
//! - [`manager`]: availability, search and retrying installs
//! - [`error`]: the failure taxonomy callers branch on

pub mod error;
pub mod logging;
pub mod manager;
pub mod parser;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use error::WingetError;
pub use logging::CommandLogger;
pub use manager::{InstallOutcome, WingetManager, WingetSettings};
pub use parser::PackageRecord;
