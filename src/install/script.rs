use chrono::Utc;

use crate::common::shell::cmd_quote;

/// Flags every exported line carries; exported scripts always run unattended.
const SCRIPT_INSTALL_FLAGS: &[&str] = &[
    "--exact",
    "--silent",
    "--accept-package-agreements",
    "--accept-source-agreements",
];

/// Render a Windows batch script that installs `package_ids` in order with
/// `tool`.
pub fn render_install_script<S: AsRef<str>>(tool: &str, package_ids: &[S]) -> String {
    let mut script = format!(
        "REM Generated by winstall {} on {} ({} packages)\n",
        env!("CARGO_PKG_VERSION"),
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        package_ids.len()
    );
    for id in package_ids {
        script.push_str(&cmd_quote(tool));
        script.push_str(" install --id ");
        script.push_str(&cmd_quote(id.as_ref()));
        for flag in SCRIPT_INSTALL_FLAGS {
            script.push(' ');
            script.push_str(flag);
        }
        script.push('\n');
    }
    script
}
