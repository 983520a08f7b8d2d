// Karabinex CLI Commands

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};

use karabinex_core::analysis::{find_sequence_prefix_races, find_variable_collisions};
use karabinex_core::config::{resolve_config_path, Config, ConfigSource, STARTER_CONFIG};
use karabinex_core::deploy::{
    default_config_path, list_backups, reload_karabiner, restore_config, save_config, SaveOptions,
};
use karabinex_core::docs::{save_cheat_sheet, save_cheat_sheet_html};
use karabinex_core::service::{
    install_watch_service, service_status, uninstall_watch_service, SERVICE_LABEL,
};
use karabinex_core::{compute_static_coverage, format_coverage_report, Document, Layer};

use super::ServiceCommand;

/// Resolve the config path, announcing it unless it was given explicitly
pub(super) fn config_path(arg: Option<&str>) -> Result<PathBuf> {
    let (path, source) = resolve_config_path(arg)?;
    if source != ConfigSource::Argument {
        println!("Using config path from {}: {}", source, path.display());
    }
    Ok(path)
}

pub(super) fn load(path: &Path) -> Result<(Config, Document)> {
    let config = Config::from_toml_path(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let document = config
        .to_document()
        .with_context(|| format!("Failed to build {}", path.display()))?;
    Ok((config, document))
}

pub fn build(config: Option<&str>, output: &Path) -> Result<i32> {
    let (_, document) = load(&config_path(config)?)?;
    let outcome = save_config(&document, &SaveOptions::new(output).backup(false))?;
    println!("Karabiner config written to {}", outcome.path.display());
    Ok(0)
}

pub fn apply(config: Option<&str>, backup: bool) -> Result<i32> {
    let (_, document) = load(&config_path(config)?)?;
    let options = SaveOptions::new(default_config_path()?)
        .backup(backup)
        .reload(true);
    let outcome = save_config(&document, &options)?;

    if let Some(backup) = &outcome.backup {
        println!("Backup saved to {}", backup.display());
    }
    println!("Karabiner config written to {}", outcome.path.display());
    if outcome.reloaded == Some(false) {
        eprintln!("Failed to reload Karabiner (try manually)");
        return Ok(1);
    }
    Ok(0)
}

pub fn dry_run(config: Option<&str>) -> Result<i32> {
    let (_, document) = load(&config_path(config)?)?;
    let options = SaveOptions::new(default_config_path()?).dry_run(true);
    let outcome = save_config(&document, &options)?;

    match outcome.preview.filter(|p| !p.is_empty()) {
        Some(preview) => println!("{}", preview),
        None => println!("No changes to {}", outcome.path.display()),
    }
    Ok(0)
}

pub fn list(config: Option<&str>) -> Result<i32> {
    let path = config_path(config)?;
    let (_, document) = load(&path)?;

    println!("Configuration from {}", path.display());
    for (index, profile) in document.profiles().iter().enumerate() {
        let status = if profile.is_selected() { " (selected)" } else { "" };
        println!("\nProfile {}: {}{}", index + 1, profile.name(), status);
        for (rule_index, rule) in profile.rules().iter().enumerate() {
            println!("  {}. {}", rule_index + 1, rule.description());
        }
    }
    Ok(0)
}

/// Variable collisions fail the check; everything else is a warning
pub fn check(config: Option<&str>) -> Result<i32> {
    let (config, document) = load(&config_path(config)?)?;
    let mut warnings = 0;

    let layers: Vec<&Layer> = config.layers().collect();
    let collisions = find_variable_collisions(&layers);
    for collision in &collisions {
        println!(
            "error: variable '{}' is set by layers {}",
            collision.variable,
            collision.layers.join(", ")
        );
    }

    for layer in &layers {
        for race in find_sequence_prefix_races(layer) {
            warnings += 1;
            let sequences: Vec<String> = race.sequences.iter().map(|s| s.join("+")).collect();
            println!(
                "warning: layer '{}' has sequences starting with '{}': {}",
                race.layer,
                race.first_key,
                sequences.join(", ")
            );
        }
    }

    let report = compute_static_coverage(&document.compile());
    for (signature, entries) in &report.potential_conflicts {
        warnings += 1;
        let rules: Vec<&str> = entries.iter().map(|e| e.rule.as_str()).collect();
        println!("warning: {} is bound by: {}", signature, rules.join("; "));
    }

    println!(
        "{} manipulators, {} errors, {} warnings",
        report.total_manipulators,
        collisions.len(),
        warnings
    );
    Ok(if collisions.is_empty() { 0 } else { 1 })
}

pub fn docs(config: Option<&str>, output: &Path, html: bool) -> Result<i32> {
    let (_, document) = load(&config_path(config)?)?;
    let compiled = document.compile();
    let written = if html {
        save_cheat_sheet_html(&compiled, output)
    } else {
        save_cheat_sheet(&compiled, output)
    }
    .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Cheat sheet written to {}", written.display());
    Ok(0)
}

pub fn stats(config: Option<&str>, json: bool) -> Result<i32> {
    let (_, document) = load(&config_path(config)?)?;
    let report = compute_static_coverage(&document.compile());
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_coverage_report(&report));
    }
    Ok(0)
}

pub fn restore(index: Option<usize>, apply: bool) -> Result<i32> {
    let target = default_config_path()?;
    let backups = list_backups(&target)?;
    if backups.is_empty() {
        println!("No backups found.");
        return Ok(0);
    }

    let selected = match index {
        Some(index) => match backups.get(index) {
            Some(backup) => backup.clone(),
            None => bail!(
                "Invalid index: {}. Available: 0 to {}",
                index,
                backups.len() - 1
            ),
        },
        None => match prompt_for_backup(&backups)? {
            Some(backup) => backup,
            None => return Ok(0),
        },
    };

    println!("Restoring from {}...", selected.display());
    restore_config(&selected, &target)?;
    println!("Configuration restored to {}", target.display());

    if apply {
        if !reload_karabiner() {
            bail!("Failed to reload Karabiner (try manually)");
        }
        println!("Karabiner configuration reloaded");
    }
    Ok(0)
}

fn prompt_for_backup(backups: &[PathBuf]) -> Result<Option<PathBuf>> {
    println!("Available backups (newest first):");
    for (index, backup) in backups.iter().enumerate() {
        let modified = fs::metadata(backup)
            .and_then(|m| m.modified())
            .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let name = backup.file_name().unwrap_or_default().to_string_lossy();
        println!("  [{}] {} ({})", index, name, modified);
    }

    print!("\nSelect backup index to restore (or 'q' to quit): ");
    io::stdout().flush()?;

    let mut choice = String::new();
    if io::stdin().lock().read_line(&mut choice)? == 0 {
        println!("\nCancelled.");
        return Ok(None);
    }
    let choice = choice.trim();
    if choice.eq_ignore_ascii_case("q") {
        return Ok(None);
    }

    match choice.parse::<usize>().ok().and_then(|i| backups.get(i)) {
        Some(backup) => Ok(Some(backup.clone())),
        None => bail!("Invalid selection."),
    }
}

pub fn init(file: &Path) -> Result<i32> {
    if file.exists() {
        bail!("File {} already exists.", file.display());
    }
    fs::write(file, STARTER_CONFIG).with_context(|| format!("Failed to write {}", file.display()))?;
    println!("Created starter config at {}", file.display());
    println!("Run 'karabinex apply' or 'karabinex watch' to start using it.");
    Ok(0)
}

pub fn service(action: ServiceCommand) -> Result<i32> {
    match action {
        ServiceCommand::Install { config } => {
            let path = config_path(config.as_deref())?;
            let plist = install_watch_service(&path)?;
            println!("Service installed: {}", plist.display());
            println!("Watching {}", path.display());
        }
        ServiceCommand::Uninstall => {
            if uninstall_watch_service()? {
                println!("Service uninstalled");
            } else {
                println!("Service not installed");
            }
        }
        ServiceCommand::Status => {
            println!("{}: {}", SERVICE_LABEL, service_status());
        }
    }
    Ok(0)
}
