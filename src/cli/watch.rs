// Karabinex Watch Loop
// Rebuild (and optionally apply) when the layer config changes

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};

use karabinex_core::deploy::{default_config_path, save_config, SaveOptions};

use super::commands::{config_path, load};

/// How often the loop checks the stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Reload Karabiner after each write
    pub apply: bool,
    pub dry_run: bool,
    pub debounce_ms: u64,
    pub backup: bool,
}

impl WatchSettings {
    fn save_options(&self, target: &Path) -> SaveOptions {
        SaveOptions::new(target)
            .backup(self.backup)
            .dry_run(self.dry_run)
            .reload(self.apply && !self.dry_run)
    }
}

pub fn run(config: Option<&str>, settings: WatchSettings) -> Result<i32> {
    let path = config_path(config)?;
    let target = default_config_path()?;

    // Editors often replace the file, so watch its directory
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("Not a file: {}", path.display()))?
        .to_os_string();

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))?;
    }

    let (tx, rx) = mpsc::channel::<DebounceEventResult>();
    let mut debouncer = new_debouncer(Duration::from_millis(settings.debounce_ms), tx)?;
    debouncer
        .watcher()
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;

    execute_once(&path, &target, &settings);
    println!("Watching: {}", path.display());
    log::debug!("Debounce {}ms, target {}", settings.debounce_ms, target.display());

    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(events)) => {
                if events.iter().any(|e| e.path.file_name() == Some(file_name.as_os_str())) {
                    execute_once(&path, &target, &settings);
                }
            }
            Ok(Err(e)) => log::warn!("File watcher error: {}", e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    println!("\nStopped watching {}", path.display());
    Ok(0)
}

/// Errors are reported and the loop keeps running
fn execute_once(path: &Path, target: &Path, settings: &WatchSettings) {
    let result = load(path).and_then(|(_, document)| {
        save_config(&document, &settings.save_options(target)).map_err(anyhow::Error::from)
    });

    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    match result {
        Ok(outcome) => {
            if let Some(preview) = outcome.preview.filter(|p| !p.is_empty()) {
                println!("{}", preview);
            }
            let mode = if outcome.dry_run { "Dry-run completed" } else { "Applied" };
            println!("{} at {}", mode, stamp);
            if outcome.reloaded == Some(false) {
                eprintln!("Failed to reload Karabiner (try manually)");
            }
        }
        Err(e) => eprintln!("Error at {}: {:#}", stamp, e),
    }
}
