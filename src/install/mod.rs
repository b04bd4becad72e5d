//! Batch installs on top of the package manager facade.

pub mod batch;
pub mod progress;
pub mod result;
pub mod script;

pub use batch::{BatchError, BatchHandle, BatchInstaller, BatchRequest, PackageInstaller};
pub use progress::{InstallationProgress, InstallationSummary, ProgressSnapshot};
pub use result::{ErrorKind, InstallResult, InstallStatus};
pub use script::render_install_script;
