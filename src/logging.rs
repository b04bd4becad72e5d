//! Diagnostic logging: `env_logger` on stderr plus an optional daily file.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use env_logger::{Builder, Logger, Target, WriteStyle};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// `<dir>/winstall_YYYYMMDD.log`
pub fn log_file_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("winstall_{}.log", date.format("%Y%m%d")))
}

pub fn todays_log_file(dir: &Path) -> PathBuf {
    log_file_path(dir, Local::now().date_naive())
}

/// Stderr logger at `level`. With `from_env`, `RUST_LOG` overrides it.
pub fn console_logger(level: LevelFilter, from_env: bool) -> Logger {
    let mut builder = Builder::new();
    builder.filter_level(level);
    if from_env {
        builder.parse_default_env();
    }
    builder.build()
}

/// Appending file logger, one plain line per record:
/// `time - target - LEVEL - file:line - message`.
pub fn file_logger(path: &Path, level: LevelFilter) -> Result<Logger> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let mut builder = Builder::new();
    builder
        .filter_level(level)
        .write_style(WriteStyle::Never)
        .target(Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}:{} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.target(),
                record.level(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        });
    Ok(builder.build())
}

/// Sends every record to the console logger and, when present, the file
/// logger, each applying its own filter.
pub struct TeeLogger {
    console: Logger,
    file: Option<Logger>,
}

impl TeeLogger {
    pub fn new(console: Logger, file: Option<Logger>) -> Self {
        Self { console, file }
    }

    pub fn max_level(&self) -> LevelFilter {
        let console = self.console.filter();
        match &self.file {
            Some(file) => console.max(file.filter()),
            None => console,
        }
    }

    /// Install as the global logger. Fails if one is already set.
    pub fn install(self) -> Result<()> {
        let max_level = self.max_level();
        log::set_boxed_logger(Box::new(self)).context("installing logger")?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata) || self.file.as_ref().is_some_and(|f| f.enabled(metadata))
    }

    fn log(&self, record: &Record) {
        if self.console.matches(record) {
            self.console.log(record);
        }
        if let Some(file) = &self.file {
            if file.matches(record) {
                file.log(record);
            }
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(file) = &self.file {
            file.flush();
        }
    }
}
