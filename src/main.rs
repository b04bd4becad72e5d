use anyhow::Result;
use clap::Parser;
use log::{LevelFilter, debug};
use serde_json::json;
use std::process::ExitCode;

use winstall::cli::Cli;
use winstall::commands::{self, AppContext};
use winstall::config::AppConfig;
use winstall::elevate;
use winstall::logging::{self, TeeLogger};
use winstall::ui::prelude::*;
use winstall::winget::WingetError;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let renderer = Renderer::new(format, !cli.no_color, cli.debug);

    match run(cli, &renderer) {
        Ok(code) => code,
        Err(e) => {
            let data = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<WingetError>())
                .map(|w| json!({ "code": w.code() }));
            renderer.emit(Level::Error, "error", &format!("Error: {e:#}"), data);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, renderer: &Renderer) -> Result<ExitCode> {
    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config, cli.debug, renderer);
    debug!("Loaded configuration: {config:?}");

    if cli.elevate {
        elevate::elevate_if_needed()?;
    }

    let ctx = AppContext {
        config,
        renderer: renderer.clone(),
    };
    commands::dispatch(cli.command, &ctx)
}

/// `--debug` forces debug on the console; otherwise `RUST_LOG` overrides the
/// configured level. The daily file keeps its own level.
fn init_logging(config: &AppConfig, debug: bool, renderer: &Renderer) {
    let console = if debug {
        logging::console_logger(LevelFilter::Debug, false)
    } else {
        let level = config.log_level().unwrap_or_else(|| {
            unknown_level(renderer, &config.logging.level, LevelFilter::Info);
            LevelFilter::Info
        });
        logging::console_logger(level, true)
    };

    let file = if config.logging.file {
        let level = config.file_log_level().unwrap_or_else(|| {
            unknown_level(renderer, &config.logging.file_level, LevelFilter::Debug);
            LevelFilter::Debug
        });
        let opened = config
            .logs_dir()
            .and_then(|dir| logging::file_logger(&logging::todays_log_file(&dir), level));
        match opened {
            Ok(logger) => Some(logger),
            Err(e) => {
                renderer.emit(
                    Level::Warn,
                    "logging.file_unavailable",
                    &format!("File logging disabled: {e:#}"),
                    None,
                );
                None
            }
        }
    } else {
        None
    };

    if let Err(e) = TeeLogger::new(console, file).install() {
        renderer.emit(Level::Debug, "logging.init", &format!("{e:#}"), None);
    }
}

fn unknown_level(renderer: &Renderer, name: &str, fallback: LevelFilter) {
    renderer.emit(
        Level::Warn,
        "logging.unknown_level",
        &format!(
            "Unknown log level '{name}', using {}",
            fallback.as_str().to_lowercase()
        ),
        None,
    );
}
