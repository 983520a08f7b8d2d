// Karabinex CLI
// Argument definitions and command dispatch

mod commands;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Compile TOML layer configs into Karabiner-Elements configuration
#[derive(Parser, Debug)]
#[command(name = "karabinex")]
#[command(version)]
#[command(about = "Karabiner-Elements config compiler with layers, combos and sequences", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Build karabiner.json from a layer config
    Build {
        /// Layer config (TOML)
        config: Option<String>,
        /// Output JSON path
        #[arg(short, long, default_value = "karabiner.json")]
        output: PathBuf,
    },

    /// Write to the Karabiner config and reload it
    Apply {
        config: Option<String>,
        /// Skip backup
        #[arg(long)]
        no_backup: bool,
    },

    /// Show a diff against the installed config without writing
    DryRun { config: Option<String> },

    /// List profiles and rules
    List { config: Option<String> },

    /// Report duplicate bindings, variable collisions and sequence races
    Check { config: Option<String> },

    /// Generate a Markdown cheat sheet
    Docs {
        config: Option<String>,
        #[arg(short, long, default_value = "CHEAT_SHEET.md")]
        output: PathBuf,
    },

    /// Generate an HTML cheat sheet
    DocsHtml {
        config: Option<String>,
        #[arg(short, long, default_value = "CHEAT_SHEET.html")]
        output: PathBuf,
    },

    /// Show the static coverage report
    Stats {
        config: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Restore the Karabiner config from a backup
    Restore {
        /// Backup index (newest first); prompts when omitted
        #[arg(long)]
        index: Option<usize>,
        /// Reload Karabiner after restoring
        #[arg(long)]
        apply: bool,
    },

    /// Create a starter layer config
    Init {
        #[arg(default_value = "karabinex.toml")]
        file: PathBuf,
    },

    /// Rebuild whenever the layer config changes
    Watch {
        config: Option<String>,
        #[arg(long)]
        apply: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        debounce_ms: Option<String>,
        #[arg(long)]
        no_backup: bool,
    },

    /// Manage the launchd watch service
    Service {
        #[command(subcommand)]
        action: ServiceCommand,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ServiceCommand {
    /// Install and start the service
    Install { config: Option<String> },
    /// Stop and remove the service
    Uninstall,
    /// Show whether the service is loaded
    Status,
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with --verbose
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

/// Run a command, returning the process exit code
pub fn run(cli: Cli) -> anyhow::Result<i32> {
    use Command::*;

    match cli.command {
        Build { config, output } => commands::build(config.as_deref(), &output),
        Apply { config, no_backup } => commands::apply(config.as_deref(), !no_backup),
        DryRun { config } => commands::dry_run(config.as_deref()),
        List { config } => commands::list(config.as_deref()),
        Check { config } => commands::check(config.as_deref()),
        Docs { config, output } => commands::docs(config.as_deref(), &output, false),
        DocsHtml { config, output } => commands::docs(config.as_deref(), &output, true),
        Stats { config, json } => commands::stats(config.as_deref(), json),
        Restore { index, apply } => commands::restore(index, apply),
        Init { file } => commands::init(&file),
        Watch {
            config,
            apply,
            dry_run,
            debounce_ms,
            no_backup,
        } => {
            let settings = watch::WatchSettings {
                apply: apply || !dry_run,
                dry_run,
                debounce_ms: karabinex_core::config::parse_debounce_ms(debounce_ms.as_deref())?,
                backup: !no_backup,
            };
            watch::run(config.as_deref(), settings)
        }
        Service { action } => commands::service(action),
    }
}
