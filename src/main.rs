use std::fs;
use std::io::{IsTerminal, Write};
use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use clap::Parser;
use dialoguer::Confirm;

use msp_plugins::catalog::{Catalog, Category};
use msp_plugins::cli::{Cli, Commands};
use msp_plugins::config::Config;
use msp_plugins::error::PluginError;
use msp_plugins::plugin::{
    InstallOptions, InstallReport, ListFilter, PluginManager, UninstallOptions,
};
use msp_plugins::utils::paths::{get_crash_log_path, get_logs_dir};

/// Install a panic hook that appends a crash report to the crash log.
fn install_crash_handler() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        if let Ok(crash_log_path) = get_crash_log_path() {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            let mut crash_report = format!("=== CRASH at {} ===\n", timestamp);

            if let Some(message) = panic_info.payload().downcast_ref::<&str>() {
                crash_report.push_str(&format!("Message: {}\n", message));
            } else if let Some(message) = panic_info.payload().downcast_ref::<String>() {
                crash_report.push_str(&format!("Message: {}\n", message));
            }

            if let Some(location) = panic_info.location() {
                crash_report.push_str(&format!(
                    "Location: {}:{}:{}\n",
                    location.file(),
                    location.line(),
                    location.column()
                ));
            }

            crash_report.push_str(&format!(
                "\nBacktrace:\n{}\n\n",
                std::backtrace::Backtrace::force_capture()
            ));

            if let Some(parent) = crash_log_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Ok(mut file) = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log_path)
            {
                let _ = file.write_all(crash_report.as_bytes());
                eprintln!("\nCrash logged to: {}", crash_log_path.display());
            }
        }

        default_hook(panic_info);
    }));
}

fn init_file_logging(level: &str) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let logs_dir = get_logs_dir().ok()?;

    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Could not create logs directory: {}", e);
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&logs_dir, "msp-plugins.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    Some(guard)
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn load_catalog(cli: &Cli, config: &Config) -> Result<Catalog> {
    let path = cli.catalog.as_ref().or(config.catalog_path.as_ref());
    let catalog = match path {
        Some(path) => {
            tracing::info!(path = ?path, "loading catalog");
            Catalog::load(path).map_err(PluginError::from)?
        }
        None => Catalog::builtin().map_err(PluginError::from)?,
    };
    Ok(catalog)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli).context("Failed to load configuration")?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let _log_guard = init_file_logging(level);
    tracing::debug!(command = ?cli.command, "starting");

    let catalog = load_catalog(&cli, &config)?;
    let install_dir: PathBuf = cli
        .install_dir
        .clone()
        .unwrap_or_else(|| config.install.default_dir.clone());
    let manager = PluginManager::new(catalog, config, install_dir)?;

    // An unreadable state file stops every command, read-only ones included.
    manager.verify_state()?;

    match cli.command {
        Commands::List { category, installed } => handle_list(&manager, category, installed),
        Commands::Info { id } => handle_info(&manager, &id),
        Commands::Install { ids, force } => {
            let report = manager.install(&ids, InstallOptions { force })?;
            print_install_report(&manager, &report);
            Ok(())
        }
        Commands::Uninstall { id, force, yes } => handle_uninstall(&manager, &id, force, yes),
        Commands::Status => handle_status(&manager),
        Commands::Categories => {
            println!("{:<28} PLUGINS", "CATEGORY");
            println!("{}", "-".repeat(40));
            for (category, count) in manager.categories() {
                println!("{:<28} {}", category.display_name(), count);
            }
            Ok(())
        }
        Commands::Packs => {
            for pack in manager.packs() {
                println!("{:<22} {}", pack.name, pack.description);
                println!("{:<22} {}", "", pack.plugins.join(", "));
            }
            Ok(())
        }
        Commands::InstallPack { pack, force } => {
            let report = manager.install_pack(&pack, InstallOptions { force })?;
            print_install_report(&manager, &report);
            Ok(())
        }
    }
}

fn handle_list(manager: &PluginManager, category: Option<String>, installed_only: bool) -> Result<()> {
    let category = category
        .map(|c| {
            Category::from_str(&c).map_err(|_| {
                anyhow!(
                    "Unknown category '{}'. Run 'msp-plugins categories' to see available categories.",
                    c
                )
            })
        })
        .transpose()?;

    let listings = manager.list(&ListFilter {
        category,
        installed_only,
    })?;

    if listings.is_empty() {
        if installed_only {
            println!("No plugins installed.");
            println!("\nInstall plugins with: msp-plugins install <plugin-id>");
        } else {
            println!("No plugins found.");
        }
        return Ok(());
    }

    println!(
        "{:<24} {:<26} {:<14} {:<8} STATUS",
        "ID", "CATEGORY", "COMPLEXITY", "SIZE"
    );
    println!("{}", "-".repeat(90));
    for listing in listings {
        let def = listing.definition;
        let status = match &listing.installed {
            Some(record) => format!("installed (port {})", record.assigned_port),
            None => "available".to_string(),
        };
        println!(
            "{:<24} {:<26} {:<14} {:<8} {}",
            def.id,
            def.category.display_name(),
            def.complexity.to_string(),
            format!("{}MB", def.size_mb),
            status
        );
    }
    Ok(())
}

fn handle_info(manager: &PluginManager, id: &str) -> Result<()> {
    let details = manager.info(id)?;
    let def = details.definition;

    println!("\nPlugin: {} ({})", def.display_name, def.id);
    println!("Version: {}", def.version);
    println!("Category: {}", def.category);
    println!("Complexity: {}", def.complexity);
    println!("Size: {}MB", def.size_mb);
    println!("Description: {}", def.description);
    if !def.dependencies.is_empty() {
        println!("Dependencies: {}", def.dependencies.join(", "));
    }
    if !def.services.is_empty() {
        let services: Vec<String> = def
            .services
            .iter()
            .map(|s| format!("{} ({})", s.name, s.image))
            .collect();
        println!("Services: {}", services.join(", "));
    }
    if !def.required_env_vars.is_empty() {
        println!("Environment:");
        for var in &def.required_env_vars {
            println!("  {:<28} {}", var.name, var.description);
        }
    }
    if !def.metrics.is_empty() {
        println!("Metrics: {}", def.metrics.join(", "));
    }

    match &details.installed {
        Some(record) => {
            println!(
                "Status: installed {} on port {}",
                record.installed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                record.assigned_port
            );
        }
        None => {
            println!("Status: not installed");
            match details.planned_port {
                Some(port) => println!("Port on install: {}", port),
                None => println!("Port on install: none free near {}", def.base_port_hint),
            }
        }
    }
    if !details.missing_dependencies.is_empty() {
        println!(
            "Will also install: {}",
            details.missing_dependencies.join(", ")
        );
    }
    if !details.installed_dependents.is_empty() {
        println!(
            "Required by: {}",
            details.installed_dependents.join(", ")
        );
    }
    Ok(())
}

fn print_install_report(manager: &PluginManager, report: &InstallReport) {
    for warning in &report.warnings {
        println!("\x1b[33m[WARN]\x1b[0m {}", warning);
    }
    for id in &report.already_installed {
        println!("Plugin '{}' is already installed (use --force to reinstall)", id);
    }
    for entry in &report.installed {
        let verb = if entry.reinstalled { "Reinstalled" } else { "Installed" };
        println!(
            "\x1b[32m[OK]\x1b[0m {} plugin '{}' on port {} ({} files)",
            verb,
            entry.plugin_id,
            entry.port,
            entry.artifacts.len()
        );
    }
    if !report.installed.is_empty() {
        println!("\nNext steps:");
        for entry in &report.installed {
            println!(
                "  cd {} && ./setup.sh",
                manager
                    .install_dir()
                    .join("plugins")
                    .join(&entry.plugin_id)
                    .display()
            );
        }
    }
}

fn handle_uninstall(manager: &PluginManager, id: &str, force: bool, yes: bool) -> Result<()> {
    if force && !yes && std::io::stdin().is_terminal() {
        let details = manager.info(id)?;
        if !details.installed_dependents.is_empty() {
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "This also removes {}. Continue?",
                    details.installed_dependents.join(", ")
                ))
                .default(false)
                .interact()
                .context("Failed to read confirmation")?;
            if !confirmed {
                println!("Aborted.");
                return Ok(());
            }
        }
    }

    let report = manager.uninstall(id, UninstallOptions { force })?;
    for removed in &report.removed {
        println!("\x1b[32m[OK]\x1b[0m Removed plugin '{}'", removed);
    }
    Ok(())
}

fn handle_status(manager: &PluginManager) -> Result<()> {
    let status = manager.status()?;

    println!("Install directory: {}", status.install_dir.display());
    println!(
        "Base stack: {}",
        if status.base_stack_present { "found" } else { "missing" }
    );
    println!(
        "State file: {}{}",
        status.state_file.display(),
        if status.state_file_present { "" } else { " (none)" }
    );
    let base: Vec<String> = status.base_ports.iter().map(u16::to_string).collect();
    println!("Base ports: {}", base.join(", "));

    if status.plugins.is_empty() {
        println!("\nNo plugins installed.");
        return Ok(());
    }

    println!("\n{:<24} {:<10} {:<8} {:<18} FILES", "ID", "VERSION", "PORT", "INSTALLED");
    println!("{}", "-".repeat(76));
    for plugin in &status.plugins {
        let record = &plugin.record;
        let files = if plugin.missing_artifacts.is_empty() {
            format!("{} ok", record.artifact_paths.len())
        } else {
            format!("\x1b[33m{} missing\x1b[0m", plugin.missing_artifacts.len())
        };
        println!(
            "{:<24} {:<10} {:<8} {:<18} {}",
            record.plugin_id,
            record.version,
            record.assigned_port,
            record.installed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
            files
        );
        for missing in &plugin.missing_artifacts {
            println!("    missing: {}", missing.display());
        }
    }
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PluginError>())
        .map(PluginError::exit_code)
        .unwrap_or(1)
}

fn main() -> ExitCode {
    install_crash_handler();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31m[ERROR]\x1b[0m {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_found_through_context() {
        let err = anyhow::Error::new(PluginError::NotInstalled("redis".into())).context("uninstall");
        assert_eq!(exit_code_for(&err), 6);
    }

    #[test]
    fn test_exit_code_defaults_to_one() {
        assert_eq!(exit_code_for(&anyhow!("boom")), 1);
    }
}
