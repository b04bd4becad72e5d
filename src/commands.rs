use anyhow::{Context, Result, bail};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use indicatif::ProgressBar;
use log::debug;
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::cli::{CatalogCommands, Commands, ProfileCommands};
use crate::common::progress;
use crate::config::AppConfig;
use crate::elevate;
use crate::install::{
    BatchInstaller, BatchRequest, InstallResult, InstallStatus, InstallationSummary,
    render_install_script,
};
use crate::profiles::ProfileStore;
use crate::ui::prelude::*;
use crate::winget::{CommandLogger, WingetError, WingetManager, WingetSettings};

/// What every command handler needs.
pub struct AppContext {
    pub config: AppConfig,
    pub renderer: Renderer,
}

impl AppContext {
    fn manager(&self, settings: WingetSettings) -> Result<WingetManager> {
        let manager = WingetManager::new(settings);
        if !self.config.logging.log_commands {
            return Ok(manager);
        }
        let logger = CommandLogger::new(self.config.logs_dir()?);
        debug!("Logging package manager commands to {}", logger.log_file_path().display());
        Ok(manager.with_command_log(logger))
    }

    fn catalog(&self) -> Result<Catalog> {
        Catalog::load(&self.config.catalog_path()?)
    }

    fn profiles(&self) -> Result<ProfileStore> {
        ProfileStore::open(&self.config.database_path()?)
    }

    /// Profile ids first, then explicit ids, without duplicates.
    fn selection(&self, ids: Vec<String>, profile: Option<&str>) -> Result<Vec<String>> {
        let profile_ids = match profile {
            Some(name) => {
                let ids = self.profiles()?.load(name)?;
                if ids.is_empty() {
                    bail!("Profile '{name}' does not exist or is empty");
                }
                ids
            }
            None => Vec::new(),
        };
        Ok(merge_ids(profile_ids, ids))
    }

    fn warn_unknown(&self, ids: &[String]) -> Result<()> {
        let catalog = self.catalog()?;
        if catalog.is_empty() {
            return Ok(());
        }
        for id in catalog.resolve(ids).unknown {
            self.renderer.emit(
                Level::Warn,
                "catalog.unknown_id",
                &format!("'{id}' is not in the catalog"),
                Some(json!({ "package_id": id })),
            );
        }
        Ok(())
    }
}

fn merge_ids(first: Vec<String>, then: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    first
        .into_iter()
        .chain(then)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

pub fn dispatch(command: Commands, ctx: &AppContext) -> Result<ExitCode> {
    match command {
        Commands::Check => check(ctx),
        Commands::Search { query } => search(ctx, &query),
        Commands::Install {
            ids,
            profile,
            no_silent,
            stop_on_failure,
            retries,
        } => install(
            ctx,
            ctx.selection(ids, profile.as_deref())?,
            !no_silent,
            stop_on_failure,
            retries,
        ),
        Commands::Catalog { command } => catalog(ctx, command),
        Commands::Profile { command } => profile(ctx, command),
        Commands::Export {
            ids,
            profile,
            output,
        } => export(
            ctx,
            &ctx.selection(ids, profile.as_deref())?,
            output.as_deref(),
        ),
    }
}

fn check(ctx: &AppContext) -> Result<ExitCode> {
    let command = &ctx.config.winget.command;
    let manager = ctx.manager(WingetSettings::from(&ctx.config.winget))?;
    let path = which::which(command).ok();
    let privileges = elevate::current();
    let version = manager.version();

    let data = json!({
        "command": command,
        "path": path.as_ref().map(|p| p.display().to_string()),
        "available": version.is_ok(),
        "version": version.as_ref().ok(),
        "elevated": privileges.is_elevated(),
    });

    let r = &ctx.renderer;
    match &version {
        Ok(v) => r.emit(
            Level::Success,
            "check.available",
            &format!("✓ {command} is available ({v})"),
            Some(data),
        ),
        Err(e) => r.emit(
            Level::Error,
            "check.unavailable",
            &format!("✗ {command} is not available: {e}"),
            Some(data),
        ),
    }
    if !r.is_json() {
        match &path {
            Some(p) => r.emit(Level::Info, "check.path", &format!("  path: {}", p.display()), None),
            None => r.emit(Level::Info, "check.path", "  path: not on PATH", None),
        }
        r.emit(
            Level::Info,
            "check.elevation",
            &format!("  privileges: {}", privileges.describe()),
            None,
        );
    }

    Ok(if version.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn search(ctx: &AppContext, query: &str) -> Result<ExitCode> {
    let manager = ctx.manager(WingetSettings::from(&ctx.config.winget))?;
    let spinner = if ctx.renderer.is_json() {
        ProgressBar::hidden()
    } else {
        progress::create_spinner(format!("Searching for '{query}'..."))
    };
    let packages = manager.search(query);
    spinner.finish_and_clear();
    let packages = packages.with_context(|| format!("searching for '{query}'"))?;

    let r = &ctx.renderer;
    if r.is_json() {
        r.emit(
            Level::Info,
            "search.results",
            &format!("{} packages found", packages.len()),
            Some(json!(packages)),
        );
        return Ok(ExitCode::SUCCESS);
    }
    if packages.is_empty() {
        r.emit(Level::Warn, "search.empty", &format!("No packages match '{query}'"), None);
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = new_table(&["Name", "Id", "Version", "Source"]);
    for p in &packages {
        table.add_row(vec![&p.name, &p.id, &p.version, &p.source]);
    }
    r.text(table);
    r.emit(
        Level::Info,
        "search.count",
        &format!("{} packages found", packages.len()),
        None,
    );
    Ok(ExitCode::SUCCESS)
}

fn install(
    ctx: &AppContext,
    ids: Vec<String>,
    silent: bool,
    stop_on_failure: bool,
    retries: Option<u32>,
) -> Result<ExitCode> {
    if ids.is_empty() {
        bail!("No packages selected; pass package ids or --profile");
    }
    ctx.warn_unknown(&ids)?;

    let mut settings = WingetSettings::from(&ctx.config.winget);
    if let Some(retries) = retries {
        settings.retry_attempts = retries;
    }
    let manager = ctx.manager(settings)?;
    // Fail the whole run up front instead of once per package.
    if !manager.is_available()? {
        return Err(WingetError::unavailable().into());
    }
    let installer = BatchInstaller::new(Arc::new(manager), ctx.config.pacing_delay());

    let bar = if ctx.renderer.is_json() {
        ProgressBar::hidden()
    } else {
        progress::create_batch_bar(ids.len() as u64)
    };
    let progress_bar = bar.clone();
    let result_bar = bar.clone();
    let renderer = ctx.renderer.clone();

    let order = ids.clone();
    let request = BatchRequest::new(ids)
        .silent(silent && ctx.config.winget.silent_install)
        .stop_on_first_failure(stop_on_failure || ctx.config.installer.stop_on_first_failure)
        .on_progress(move |snapshot| {
            progress_bar.set_position(snapshot.completed as u64);
            progress_bar.set_message(snapshot.current_package.clone());
        })
        .on_result(move |id, result| {
            result_bar.suspend(|| report_result(&renderer, id, result));
        });

    let handle = installer.install_packages(request)?;
    handle.wait(None);
    bar.finish_and_clear();

    let summary = installer
        .get_installation_summary()
        .context("installation batch produced no summary")?;
    print_summary(&ctx.renderer, &order, &summary);

    Ok(if summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn status_label(status: InstallStatus) -> String {
    match status {
        InstallStatus::Succeeded => "installed".to_string(),
        InstallStatus::Failed(kind) => format!("failed ({kind})"),
        InstallStatus::Skipped(kind) => format!("skipped ({kind})"),
    }
}

fn report_result(r: &Renderer, id: &str, result: &InstallResult) {
    let data = serde_json::to_value(result).ok();
    let detail = result.message.as_deref().unwrap_or_default();
    match result.status {
        InstallStatus::Succeeded => r.emit(
            Level::Success,
            "install.succeeded",
            &format!("✓ {id} installed (attempts: {})", result.attempts),
            data,
        ),
        InstallStatus::Skipped(kind) => r.emit(
            Level::Warn,
            "install.skipped",
            &format!("⚠ {id} skipped [{kind}]: {detail}"),
            data,
        ),
        InstallStatus::Failed(kind) => r.emit(
            Level::Error,
            "install.failed",
            &format!("✗ {id} failed [{kind}]: {detail}"),
            data,
        ),
    }
}

fn print_summary(r: &Renderer, order: &[String], summary: &InstallationSummary) {
    let headline = format!(
        "{} successful, {} failed, {} skipped of {} ({:.1}s)",
        summary.successful, summary.failed, summary.skipped, summary.total, summary.elapsed_secs
    );
    if r.is_json() {
        r.emit(
            Level::Info,
            "install.summary",
            &headline,
            serde_json::to_value(summary).ok(),
        );
        return;
    }

    let mut table = new_table(&["Package", "Status", "Attempts"]);
    for id in order {
        let Some(result) = summary.results.get(id) else {
            continue;
        };
        let color = match result.status {
            InstallStatus::Succeeded => Color::Green,
            InstallStatus::Skipped(_) => Color::Yellow,
            InstallStatus::Failed(_) => Color::Red,
        };
        let mut status = Cell::new(status_label(result.status));
        if r.color() {
            status = status.fg(color);
        }
        table.add_row(vec![
            Cell::new(id),
            status,
            Cell::new(result.attempts),
        ]);
    }
    r.separator();
    r.text(table);

    let level = if summary.failed > 0 {
        Level::Error
    } else if summary.skipped > 0 {
        Level::Warn
    } else {
        Level::Success
    };
    r.emit(level, "install.summary", &headline, None);
}

fn catalog(ctx: &AppContext, command: CatalogCommands) -> Result<ExitCode> {
    let catalog = ctx.catalog()?;
    let r = &ctx.renderer;
    match command {
        CatalogCommands::List { category } => {
            let apps: Vec<_> = match &category {
                Some(c) => catalog.in_category(c).collect(),
                None => catalog.apps().iter().collect(),
            };
            if apps.is_empty() {
                let message = match &category {
                    Some(c) => format!("No catalog apps in category '{c}'"),
                    None => "The catalog is empty".to_string(),
                };
                r.emit(Level::Warn, "catalog.empty", &message, Some(json!([])));
                return Ok(ExitCode::SUCCESS);
            }
            if r.is_json() {
                r.emit(
                    Level::Info,
                    "catalog.list",
                    &format!("{} apps", apps.len()),
                    Some(json!(apps)),
                );
                return Ok(ExitCode::SUCCESS);
            }
            let mut table = new_table(&["Id", "Name", "Category", "Description"]);
            for app in &apps {
                table.add_row(vec![&app.id, &app.name, &app.category, &app.description]);
            }
            r.text(table);
        }
        CatalogCommands::Categories => {
            let categories = catalog.categories();
            if r.is_json() {
                r.emit(
                    Level::Info,
                    "catalog.categories",
                    &format!("{} categories", categories.len()),
                    Some(json!(categories)),
                );
                return Ok(ExitCode::SUCCESS);
            }
            for category in categories {
                let count = catalog.in_category(category).count();
                r.emit(
                    Level::Info,
                    "catalog.category",
                    &format!("{category} ({count})"),
                    None,
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn profile(ctx: &AppContext, command: ProfileCommands) -> Result<ExitCode> {
    let store = ctx.profiles()?;
    let r = &ctx.renderer;
    match command {
        ProfileCommands::Save { name, ids } => {
            let ids = merge_ids(Vec::new(), ids);
            ctx.warn_unknown(&ids)?;
            store.save(&name, &ids)?;
            r.emit(
                Level::Success,
                "profile.saved",
                &format!("✓ Saved profile '{}' with {} packages", name.trim(), ids.len()),
                Some(json!({ "name": name.trim(), "package_ids": ids })),
            );
        }
        ProfileCommands::Show { name } => {
            if !store.exists(&name)? {
                bail!("Profile '{}' not found", name.trim());
            }
            let ids = store.load(&name)?;
            if r.is_json() {
                r.emit(
                    Level::Info,
                    "profile.show",
                    &format!("{} packages", ids.len()),
                    Some(json!({ "name": name.trim(), "package_ids": ids })),
                );
            } else {
                for id in &ids {
                    r.text(id);
                }
            }
        }
        ProfileCommands::List => {
            let names = store.list_names()?;
            if names.is_empty() {
                r.emit(Level::Info, "profile.none", "No saved profiles", Some(json!([])));
            } else if r.is_json() {
                r.emit(
                    Level::Info,
                    "profile.list",
                    &format!("{} profiles", names.len()),
                    Some(json!(names)),
                );
            } else {
                for name in &names {
                    r.text(name);
                }
            }
        }
        ProfileCommands::Delete { name } => {
            if !store.delete(&name)? {
                bail!("Profile '{}' not found", name.trim());
            }
            r.emit(
                Level::Success,
                "profile.deleted",
                &format!("✓ Deleted profile '{}'", name.trim()),
                None,
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn export(ctx: &AppContext, ids: &[String], output: Option<&Path>) -> Result<ExitCode> {
    if ids.is_empty() {
        bail!("No packages selected; pass package ids or --profile");
    }
    ctx.warn_unknown(ids)?;
    let script = render_install_script(&ctx.config.winget.command, ids);
    let r = &ctx.renderer;

    match output {
        Some(path) => {
            fs::write(path, &script)
                .with_context(|| format!("writing install script to {}", path.display()))?;
            r.emit(
                Level::Success,
                "export.written",
                &format!("✓ Wrote install script for {} packages to {}", ids.len(), path.display()),
                Some(json!({ "path": path.display().to_string(), "packages": ids.len() })),
            );
        }
        None if r.is_json() => r.emit(
            Level::Info,
            "export.script",
            &format!("Install script for {} packages", ids.len()),
            Some(json!({ "script": script })),
        ),
        None => print!("{script}"),
    }
    Ok(ExitCode::SUCCESS)
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}
