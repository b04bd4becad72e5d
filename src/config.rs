use anyhow::{Context, Result};
use log::{LevelFilter, debug};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::paths;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WingetConfig {
    /// Executable name or path of the package manager.
    pub command: String,
    pub timeout_secs: u64,
    /// Extra attempts after the first.
    pub retry_attempts: u32,
    pub retry_backoff_secs: u64,
    pub silent_install: bool,
}

impl Default for WingetConfig {
    fn default() -> Self {
        Self {
            command: "winget".to_string(),
            timeout_secs: 300,
            retry_attempts: 3,
            retry_backoff_secs: 2,
            silent_install: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct InstallerConfig {
    pub pacing_delay_ms: u64,
    pub stop_on_first_failure: bool,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            pacing_delay_ms: 500,
            stop_on_first_failure: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console level.
    pub level: String,
    /// Also write a daily `winstall_YYYYMMDD.log` in the logs directory.
    pub file: bool,
    pub file_level: String,
    /// Append every package manager invocation to a JSON lines file.
    pub log_commands: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
            file_level: "debug".to_string(),
            log_commands: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    /// Directory for the daily log and the command log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub winget: WingetConfig,
    pub installer: InstallerConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

impl AppConfig {
    /// Load from `path`, or the default location when `None`. A missing file
    /// is created with the defaults.
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => paths::default_config_path()?,
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            let default = AppConfig::default();
            default
                .save_to(path)
                .with_context(|| format!("writing default config to {}", path.display()))?;
            debug!("Created default config at {}", path.display());
            return Ok(default);
        }
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&s)
            .with_context(|| format!("parsing config toml {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let toml = toml::to_string_pretty(self).context("serializing config to toml")?;
        fs::write(path, toml).with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }

    pub fn catalog_path(&self) -> Result<PathBuf> {
        match &self.paths.catalog {
            Some(p) => Ok(p.clone()),
            None => paths::default_catalog_path(),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.paths.database {
            Some(p) => Ok(p.clone()),
            None => paths::default_database_path(),
        }
    }

    pub fn logs_dir(&self) -> Result<PathBuf> {
        match &self.paths.logs {
            Some(p) => Ok(p.clone()),
            None => paths::logs_dir(),
        }
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.installer.pacing_delay_ms)
    }

    /// `None` for a level name `log` does not know. Case-insensitive.
    pub fn log_level(&self) -> Option<LevelFilter> {
        self.logging.level.trim().parse().ok()
    }

    pub fn file_log_level(&self) -> Option<LevelFilter> {
        self.logging.file_level.trim().parse().ok()
    }
}
