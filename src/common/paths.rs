use anyhow::{Context, Result};
use std::path::PathBuf;

const APP_DIR: &str = "winstall";

/// `<config_dir>/winstall`, created if missing
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join(APP_DIR);

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

/// `<data_dir>/winstall`, created if missing
pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join(APP_DIR);

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory at {}", data_dir.display()))?;

    Ok(data_dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("winstall.toml"))
}

pub fn default_catalog_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("catalog.json"))
}

pub fn default_database_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("profiles.db"))
}

/// Default home of the daily log and the command audit log
pub fn logs_dir() -> Result<PathBuf> {
    let logs_dir = data_dir()?.join("logs");
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("creating logs directory at {}", logs_dir.display()))?;
    Ok(logs_dir)
}
