// Karabinex Watch Service
// launchd agent that keeps `karabinex watch` running in the background

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::Serialize;
use strum_macros::Display;

/// launchd label of the watch agent
pub const SERVICE_LABEL: &str = "com.karabinex.watch";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Could not determine the home directory")]
    NoHomeDir,

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write property list: {0}")]
    Plist(#[from] plist::Error),

    #[error("launchctl {command} failed: {stderr}")]
    Launchctl { command: String, stderr: String },
}

/// Whether launchd currently knows about the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ServiceState {
    #[strum(serialize = "loaded")]
    Loaded,
    #[strum(serialize = "not loaded")]
    NotLoaded,
    /// `launchctl list` could not be queried
    #[strum(serialize = "unknown")]
    Unknown,
}

/// Where the agent's plist and log live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePaths {
    pub plist: PathBuf,
    pub log: PathBuf,
}

impl ServicePaths {
    /// `~/Library/LaunchAgents/<label>.plist` and `~/Library/Logs/karabinex-watch.log`
    pub fn under(home: &Path) -> Self {
        let library = home.join("Library");
        Self {
            plist: library
                .join("LaunchAgents")
                .join(format!("{}.plist", SERVICE_LABEL)),
            log: library.join("Logs").join("karabinex-watch.log"),
        }
    }

    pub fn for_current_user() -> Result<Self, ServiceError> {
        dirs::home_dir()
            .map(|home| Self::under(&home))
            .ok_or(ServiceError::NoHomeDir)
    }
}

/// launchd agent definition, serialized as an XML property list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchAgent {
    pub label: String,
    pub program_arguments: Vec<String>,
    pub run_at_load: bool,
    pub keep_alive: bool,
    pub standard_out_path: PathBuf,
    pub standard_error_path: PathBuf,
}

impl LaunchAgent {
    /// Always-on agent logging both streams to `log_path`
    pub fn watch(program_args: &[String], log_path: &Path) -> Self {
        Self {
            label: SERVICE_LABEL.to_string(),
            program_arguments: program_args.to_vec(),
            run_at_load: true,
            keep_alive: true,
            standard_out_path: log_path.to_path_buf(),
            standard_error_path: log_path.to_path_buf(),
        }
    }
}

/// Render the launchd property list for the watch agent
pub fn render_plist(program_args: &[String], log_path: &Path) -> Result<String, ServiceError> {
    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, &LaunchAgent::watch(program_args, log_path))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Command line the agent runs: this executable, `watch`, the config path
pub fn watch_program_args(config_path: &Path) -> Result<Vec<String>, ServiceError> {
    let exe = std::env::current_exe().map_err(|source| ServiceError::Io {
        path: PathBuf::from("<current executable>"),
        source,
    })?;
    Ok(vec![
        exe.to_string_lossy().into_owned(),
        "watch".to_string(),
        config_path.to_string_lossy().into_owned(),
    ])
}

/// Write the plist, creating the agent and log directories
pub fn write_plist(paths: &ServicePaths, program_args: &[String]) -> Result<(), ServiceError> {
    for dir in [paths.plist.parent(), paths.log.parent()].into_iter().flatten() {
        fs::create_dir_all(dir).map_err(|source| ServiceError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    plist::to_file_xml(&paths.plist, &LaunchAgent::watch(program_args, &paths.log))?;
    Ok(())
}

fn launchctl(args: &[&str]) -> Result<Output, ServiceError> {
    Command::new("launchctl")
        .args(args)
        .output()
        .map_err(|source| ServiceError::Io {
            path: PathBuf::from("launchctl"),
            source,
        })
}

fn launchctl_checked(args: &[&str]) -> Result<(), ServiceError> {
    let output = launchctl(args)?;
    if output.status.success() {
        return Ok(());
    }
    Err(ServiceError::Launchctl {
        command: args.join(" "),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Install, load and start the agent; returns the plist path
pub fn install_watch_service(config_path: &Path) -> Result<PathBuf, ServiceError> {
    let paths = ServicePaths::for_current_user()?;
    write_plist(&paths, &watch_program_args(config_path)?)?;
    log::info!("Installed plist: {}", paths.plist.display());

    let plist = paths.plist.to_string_lossy();
    launchctl_checked(&["load", &plist])?;
    launchctl_checked(&["start", SERVICE_LABEL])?;
    Ok(paths.plist)
}

/// Stop, unload and remove the agent; `false` if it was not installed
pub fn uninstall_watch_service() -> Result<bool, ServiceError> {
    let paths = ServicePaths::for_current_user()?;
    if !paths.plist.exists() {
        return Ok(false);
    }

    let plist = paths.plist.to_string_lossy();
    // Failures here mean the agent was not running
    if let Err(e) = launchctl_checked(&["stop", SERVICE_LABEL]) {
        log::debug!("{}", e);
    }
    if let Err(e) = launchctl_checked(&["unload", &plist]) {
        log::debug!("{}", e);
    }

    fs::remove_file(&paths.plist).map_err(|source| ServiceError::Io {
        path: paths.plist.clone(),
        source,
    })?;
    Ok(true)
}

pub fn service_status() -> ServiceState {
    match launchctl(&["list"]) {
        Ok(output) if output.status.success() => {
            if is_listed(&String::from_utf8_lossy(&output.stdout)) {
                ServiceState::Loaded
            } else {
                ServiceState::NotLoaded
            }
        }
        Ok(output) => {
            log::warn!(
                "launchctl list failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            ServiceState::Unknown
        }
        Err(e) => {
            log::warn!("{}", e);
            ServiceState::Unknown
        }
    }
}

/// `launchctl list` prints `PID<TAB>Status<TAB>Label` rows
fn is_listed(list_output: &str) -> bool {
    list_output
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .any(|label| label == SERVICE_LABEL)
}
