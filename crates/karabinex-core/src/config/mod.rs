// Karabinex Config API
// TOML loading plus config path and watch settings resolution

pub mod parser;

use std::path::{Path, PathBuf};

use strum_macros::Display;

pub use parser::{Config, ConfigError, ConfigToml, ProfileConfig};

/// Environment variable naming the layer config file
pub const CONFIG_FILE_ENV: &str = "KARABINEX_CONFIG_FILE";

/// Environment variable with the watch debounce in milliseconds
pub const WATCH_DEBOUNCE_ENV: &str = "KARABINEX_WATCH_DEBOUNCE_MS";

pub const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 500;

/// Where a resolved config path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConfigSource {
    #[strum(serialize = "argument")]
    Argument,
    #[strum(serialize = "environment")]
    Env,
    #[strum(serialize = "default")]
    Default,
}

/// Resolve the config file: argument, then `KARABINEX_CONFIG_FILE`, then
/// `~/.config/karabiner/karabinex.toml`.
pub fn resolve_config_path(arg: Option<&str>) -> Result<(PathBuf, ConfigSource), ConfigError> {
    let env = std::env::var(CONFIG_FILE_ENV).ok();
    resolve_config_path_with(arg, env.as_deref(), dirs::home_dir().as_deref())
}

pub fn resolve_config_path_with(
    arg: Option<&str>,
    env: Option<&str>,
    home: Option<&Path>,
) -> Result<(PathBuf, ConfigSource), ConfigError> {
    if let Some(arg) = non_empty(arg) {
        return Ok((expand_tilde(arg, home), ConfigSource::Argument));
    }
    if let Some(env) = non_empty(env) {
        return Ok((expand_tilde(env, home), ConfigSource::Env));
    }

    let home = home.ok_or_else(|| ConfigError::InvalidValue {
        field: "config path".into(),
        value: "home directory not found".into(),
    })?;
    Ok((
        home.join(".config").join("karabiner").join("karabinex.toml"),
        ConfigSource::Default,
    ))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn expand_tilde(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home.to_path_buf(),
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

/// Debounce for `watch`: argument, then `KARABINEX_WATCH_DEBOUNCE_MS`, then 500.
/// Negative values clamp to 0.
pub fn parse_debounce_ms(arg: Option<&str>) -> Result<u64, ConfigError> {
    let env = std::env::var(WATCH_DEBOUNCE_ENV).ok();
    parse_debounce_ms_with(arg, env.as_deref())
}

pub fn parse_debounce_ms_with(arg: Option<&str>, env: Option<&str>) -> Result<u64, ConfigError> {
    let (field, raw) = match (arg, env) {
        (Some(arg), _) => ("--debounce-ms", arg),
        (None, Some(env)) => (WATCH_DEBOUNCE_ENV, env),
        (None, None) => return Ok(DEFAULT_WATCH_DEBOUNCE_MS),
    };

    let value: i64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
    })?;
    Ok(value.max(0) as u64)
}

/// Written by `karabinex init`
pub const STARTER_CONFIG: &str = r#"# karabinex layer configuration
# Build with `karabinex build`, install with `karabinex apply`.

[[profile]]
name = "Default"

# Hold caps lock for a navigation layer, tap it for escape
[[profile.layer]]
name = "nav"
trigger = "caps_lock"
tap_alone = "escape"
presets = ["vim_navigation"]

[profile.layer.map]
b = "delete_or_backspace"
f = "delete_forward"

[[profile.layer.combo]]
keys = ["j", "k"]
to = "return_or_enter"

[[profile.layer.sequence]]
keys = ["g", "g"]
to = "home"

# Press right command and right option together for a symbol layer
[[profile.layer]]
name = "sym"
trigger = ["right_command", "right_option"]

[profile.layer.map]
a = { key = "1", modifiers = ["left_shift"] }
t = { template = "open", params = { path = "/Applications/Utilities/Terminal.app" } }
"#;
