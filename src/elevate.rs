//! Privilege detection and the `--elevate` relaunch.
//!
//! On Windows elevation means an administrator token, queried through the
//! shell API. Elsewhere it means running as root, as reported by `sudo`.

use anyhow::Result;
use log::{debug, info};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Privileges {
    Elevated,
    Standard,
}

impl Privileges {
    pub fn is_elevated(self) -> bool {
        self == Privileges::Elevated
    }

    pub fn describe(self) -> &'static str {
        match self {
            Privileges::Elevated => "elevated",
            Privileges::Standard => "not elevated",
        }
    }
}

#[cfg(unix)]
pub fn from_running_as(running_as: &sudo::RunningAs) -> Privileges {
    match running_as {
        sudo::RunningAs::Root | sudo::RunningAs::Suid => Privileges::Elevated,
        sudo::RunningAs::User => Privileges::Standard,
    }
}

/// Privileges of the current process. Never fails; an unanswerable query
/// reads as [`Privileges::Standard`].
pub fn current() -> Privileges {
    #[cfg(unix)]
    {
        from_running_as(&sudo::check())
    }
    #[cfg(windows)]
    {
        windows::current()
    }
    #[cfg(not(any(unix, windows)))]
    {
        Privileges::Standard
    }
}

/// Relaunch the current process with elevated privileges unless it already
/// has them. After a successful relaunch this does not return.
pub fn elevate_if_needed() -> Result<()> {
    let privileges = current();
    if privileges.is_elevated() {
        debug!("Already running {}", privileges.describe());
        return Ok(());
    }
    info!("Relaunching with elevated privileges");
    relaunch_elevated()
}

#[cfg(unix)]
fn relaunch_elevated() -> Result<()> {
    sudo::escalate_if_needed()
        .map_err(|e| anyhow::anyhow!("Failed to elevate privileges: {e}"))?;
    Ok(())
}

#[cfg(windows)]
fn relaunch_elevated() -> Result<()> {
    windows::relaunch_as_admin()
}

#[cfg(not(any(unix, windows)))]
fn relaunch_elevated() -> Result<()> {
    anyhow::bail!("Elevation is not supported on this platform")
}

#[cfg(windows)]
mod windows {
    use anyhow::{Context, Result, bail};
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use std::ptr;

    use windows_sys::Win32::UI::Shell::{IsUserAnAdmin, ShellExecuteW};
    use windows_sys::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;

    use super::Privileges;
    use crate::common::shell::windows_arg_quote;

    fn wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    pub fn current() -> Privileges {
        // SAFETY: takes no arguments and only reads the process token.
        if unsafe { IsUserAnAdmin() } != 0 {
            Privileges::Elevated
        } else {
            Privileges::Standard
        }
    }

    /// Start an elevated copy of this process with the same arguments via the
    /// `runas` verb, then exit.
    pub fn relaunch_as_admin() -> Result<()> {
        let exe = std::env::current_exe().context("Failed to get current executable")?;
        let params: Vec<String> = std::env::args()
            .skip(1)
            .map(|arg| windows_arg_quote(&arg))
            .collect();

        let verb = wide(OsStr::new("runas"));
        let file = wide(exe.as_os_str());
        let params = wide(OsStr::new(&params.join(" ")));

        // SAFETY: every pointer is a NUL-terminated UTF-16 buffer that
        // outlives the call; null window and directory are permitted.
        let result = unsafe {
            ShellExecuteW(
                ptr::null_mut(),
                verb.as_ptr(),
                file.as_ptr(),
                params.as_ptr(),
                ptr::null(),
                SW_SHOWNORMAL,
            )
        };
        // Values above 32 mean the elevated process was started.
        if result as usize <= 32 {
            bail!("Failed to relaunch as administrator (ShellExecute code {})", result as usize);
        }
        std::process::exit(0);
    }
}
