use anyhow::Result;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CATALOG: &str = r#"[
  {"id": "Good.App", "name": "Good App", "category": "Utilities", "description": "Installs fine"},
  {"id": "Other.App", "name": "Other App", "category": "Utilities"},
  {"id": "Admin.App", "name": "Admin App", "category": "System", "description": "Needs elevation"}
]"#;

/// A temp directory holding a config, a catalog and a fake package manager
/// script that records every invocation.
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let env = Self {
            temp_dir: tempfile::tempdir()?,
        };
        env.write_fake_manager()?;
        fs::write(env.catalog_path(), CATALOG)?;
        env.write_config(&env.fake_manager_path())?;
        Ok(env)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("winstall.toml")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.path().join("catalog.json")
    }

    pub fn database_path(&self) -> PathBuf {
        self.path().join("data").join("profiles.db")
    }

    pub fn fake_manager_path(&self) -> PathBuf {
        self.path().join("fake-winget")
    }

    pub fn logs_path(&self) -> PathBuf {
        self.path().join("logs")
    }

    pub fn invocations_path(&self) -> PathBuf {
        self.path().join("invocations.log")
    }

    /// Argument lines the fake package manager was called with.
    pub fn invocations(&self) -> Result<Vec<String>> {
        if !self.invocations_path().exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read_to_string(self.invocations_path())?
            .lines()
            .map(str::to_string)
            .collect())
    }

    /// Point the config at another package manager executable.
    pub fn write_config(&self, command: &Path) -> Result<()> {
        let config = format!(
            r#"[winget]
command = "{command}"
timeout_secs = 30
retry_attempts = 0
retry_backoff_secs = 0

[installer]
pacing_delay_ms = 0

[logging]
level = "warn"

[paths]
catalog = "{catalog}"
database = "{database}"
logs = "{logs}"
"#,
            command = command.display(),
            catalog = self.catalog_path().display(),
            database = self.database_path().display(),
            logs = self.logs_path().display(),
        );
        fs::write(self.config_path(), config)?;
        Ok(())
    }

    fn write_fake_manager(&self) -> Result<()> {
        let script = format!(
            r#"#!/bin/sh
echo "$*" >> "{log}"
case "$1" in
  --version)
    echo "v1.9.25200"
    exit 0
    ;;
  search)
    cat <<'TABLE'
Name            Id              Version  Source
-----------------------------------------------
Google Chrome   Google.Chrome   120.0    winget
Mozilla Firefox Mozilla.Firefox 121.0    winget
TABLE
    exit 0
    ;;
  install)
    case "$3" in
      Good.App|Other.App)
        echo "Successfully installed"
        exit 0
        ;;
      Missing.App)
        echo "Package not found" >&2
        exit 1
        ;;
      Admin.App)
        echo "This installer requires administrator privileges" >&2
        exit 1
        ;;
      *)
        echo "Installer failed with exit code 1603" >&2
        exit 1
        ;;
    esac
    ;;
esac
exit 2
"#,
            log = self.invocations_path().display()
        );
        let path = self.fake_manager_path();
        fs::write(&path, script)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }
}
