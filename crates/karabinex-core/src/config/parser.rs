// Karabinex Config Parser - TOML with Serde
// Parses the declarative layer configuration into builder values

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::BuildError;
use crate::key::resolve_alias;
use crate::layer::ComboOptions;
use crate::manipulator::{KeyUpWhen, SimultaneousOptions};
use crate::preset::preset_by_name;
use crate::template::{register_template, render_template, TemplateParams};
use crate::{Action, BasicManipulator, Device, Document, KeyAction, Layer, Profile, Rule};

/// Configuration parser errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid value for '{field}': {value}")]
    InvalidValue { field: String, value: String },
}

fn invalid(field: &str, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.into(),
    }
}

fn default_true() -> bool {
    true
}

/// Main configuration structure (root TOML table)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigToml {
    /// Overrides for the document's `global` flags
    #[serde(default)]
    pub global: IndexMap<String, bool>,

    /// Extra macro templates, registered before layers are built
    #[serde(default)]
    pub templates: IndexMap<String, String>,

    #[serde(default, rename = "profile")]
    pub profiles: Vec<ProfileToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileToml {
    pub name: String,

    #[serde(default = "default_true")]
    pub selected: bool,

    /// Global timing knobs (`basic.*_milliseconds`)
    #[serde(default)]
    pub parameters: IndexMap<String, i64>,

    pub virtual_keyboard_country_code: Option<i64>,

    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceToml>,

    #[serde(default, rename = "layer")]
    pub layers: Vec<LayerToml>,

    #[serde(default, rename = "remap")]
    pub remaps: Vec<RemapToml>,

    #[serde(default, rename = "rule")]
    pub rules: Vec<RawRuleToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceToml {
    pub vendor_id: i64,
    pub product_id: i64,
    #[serde(default = "default_true")]
    pub is_keyboard: bool,
    #[serde(default)]
    pub is_pointing_device: bool,
    #[serde(default)]
    pub disable_built_in_keyboard: bool,
    pub ignore: Option<bool>,
}

/// A single key name or a list of them
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeysToml {
    One(String),
    Many(Vec<String>),
}

impl KeysToml {
    fn resolved(&self) -> Vec<String> {
        match self {
            KeysToml::One(key) => vec![resolve_alias(key).to_string()],
            KeysToml::Many(keys) => resolve_keys(keys),
        }
    }
}

/// Output side of a binding (supports various formats)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TargetToml {
    /// Single key as string
    Key(String),
    KeyWith(KeyWithToml),
    Template(TemplateToml),
    Shell(ShellToml),
    Variable(VariableToml),
}

/// Key with output modifiers
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyWithToml {
    pub key: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

/// Named macro template
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateToml {
    pub template: String,
    #[serde(default)]
    pub params: TemplateParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellToml {
    pub shell: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableToml {
    pub variable: String,
    pub value: i64,
}

impl TargetToml {
    /// Convert into one action, rendering templates immediately
    fn to_action(&self) -> Result<Action, ConfigError> {
        Ok(match self {
            TargetToml::Key(key) => Action::key(resolve_alias(key)),
            TargetToml::KeyWith(with) => Action::Key(
                KeyAction::new(resolve_alias(&with.key))
                    .with_modifiers(resolve_keys(&with.modifiers)),
            ),
            TargetToml::Template(t) => Action::shell(
                render_template(&t.template, &t.params).map_err(BuildError::from)?,
            ),
            TargetToml::Shell(s) => Action::shell(s.shell.as_str()),
            TargetToml::Variable(v) => Action::set_variable(&v.variable, v.value),
        })
    }
}

/// One target or a list of targets
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TargetsToml {
    One(TargetToml),
    Many(Vec<TargetToml>),
}

impl TargetsToml {
    fn to_actions(&self) -> Result<Vec<Action>, ConfigError> {
        match self {
            TargetsToml::One(target) => Ok(vec![target.to_action()?]),
            TargetsToml::Many(targets) => targets.iter().map(TargetToml::to_action).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerToml {
    pub name: String,
    pub trigger: KeysToml,
    pub tap_alone: Option<TargetToml>,
    pub sequence_timeout_ms: Option<i64>,

    #[serde(default)]
    pub when_app: Vec<String>,
    #[serde(default)]
    pub unless_app: Vec<String>,
    /// Variables that must be 1 for the layer to apply
    #[serde(default)]
    pub when_variable: Vec<String>,
    /// Variables that disable the layer when 1
    #[serde(default)]
    pub unless_variable: Vec<String>,

    /// Named presets applied before `map`
    #[serde(default)]
    pub presets: Vec<String>,

    /// from key -> target, in file order
    #[serde(default)]
    pub map: IndexMap<String, TargetToml>,

    #[serde(default, rename = "combo")]
    pub combos: Vec<ComboToml>,

    #[serde(default, rename = "sequence")]
    pub sequences: Vec<SequenceToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComboToml {
    pub keys: Vec<String>,
    pub to: TargetsToml,
    #[serde(default)]
    pub detect_key_down_uninterruptedly: bool,
    pub key_down_order: Option<String>,
    pub key_up_order: Option<String>,
    pub key_up_when: Option<String>,
    pub to_after_key_up: Option<TargetsToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceToml {
    pub keys: Vec<String>,
    pub to: TargetToml,
}

/// A plain remap outside of any layer
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemapToml {
    pub description: Option<String>,
    pub from: String,
    #[serde(default)]
    pub mandatory: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
    pub to: Option<TargetsToml>,
    pub if_alone: Option<TargetsToml>,
    pub if_held: Option<TargetsToml>,
    #[serde(default)]
    pub when_app: Vec<String>,
    #[serde(default)]
    pub unless_app: Vec<String>,
}

/// A rule of verbatim manipulators
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRuleToml {
    pub description: String,
    #[serde(default)]
    pub manipulators: Vec<toml::Value>,
}

/// One profile's builder values, kept apart so layers stay inspectable
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    pub name: String,
    pub selected: bool,
    pub parameters: IndexMap<String, i64>,
    pub country_code: Option<i64>,
    pub devices: Vec<Device>,
    pub layers: Vec<Layer>,
    pub remaps: Vec<Rule>,
    pub rules: Vec<Rule>,
}

impl ProfileConfig {
    /// Build the profile: layer rules, then remaps, then raw rules
    pub fn to_profile(&self) -> Result<Profile, BuildError> {
        let mut profile = Profile::new(&self.name).selected(self.selected);
        for layer in &self.layers {
            profile = profile.add_layer(layer)?;
        }
        profile = profile
            .add_rules(self.remaps.iter().cloned())
            .add_rules(self.rules.iter().cloned());
        for device in &self.devices {
            profile = profile.add_device(device.clone());
        }
        for (name, value) in &self.parameters {
            profile = profile.set_parameter(name, *value);
        }
        if let Some(code) = self.country_code {
            profile = profile.set_virtual_keyboard(code);
        }
        Ok(profile)
    }
}

/// Parsed configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: IndexMap<String, bool>,
    pub templates: IndexMap<String, String>,
    pub profiles: Vec<ProfileConfig>,
}

impl Config {
    /// Parse a TOML configuration file
    pub fn from_toml_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// `[templates]` entries are registered in the default template registry
    /// before any layer is converted.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let toml_config: ConfigToml =
            toml::from_str(content).map_err(|e| ConfigError::TomlParse(e.to_string()))?;

        toml_config.to_config()
    }

    /// Every layer across all profiles
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.profiles.iter().flat_map(|p| p.layers.iter())
    }

    /// Build the document
    pub fn to_document(&self) -> Result<Document, BuildError> {
        let mut document = Document::new();
        for (name, value) in &self.global {
            document = document.set_global(name, *value);
        }
        for profile in &self.profiles {
            document = document.add_profile(profile.to_profile()?);
        }
        Ok(document)
    }
}

impl ConfigToml {
    fn to_config(&self) -> Result<Config, ConfigError> {
        for (name, template) in &self.templates {
            register_template(name, template).map_err(BuildError::from)?;
            log::debug!("Registered template '{}'", name);
        }

        let profiles = self
            .profiles
            .iter()
            .map(ProfileToml::to_profile_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Config {
            global: self.global.clone(),
            templates: self.templates.clone(),
            profiles,
        })
    }
}

impl ProfileToml {
    fn to_profile_config(&self) -> Result<ProfileConfig, ConfigError> {
        let layers = self
            .layers
            .iter()
            .map(LayerToml::to_layer)
            .collect::<Result<Vec<_>, _>>()?;
        let remaps = self
            .remaps
            .iter()
            .map(RemapToml::to_rule)
            .collect::<Result<Vec<_>, _>>()?;
        let rules = self
            .rules
            .iter()
            .map(RawRuleToml::to_rule)
            .collect::<Result<Vec<_>, _>>()?;

        let devices = self
            .devices
            .iter()
            .map(|d| {
                let device = Device::new(d.vendor_id, d.product_id)
                    .keyboard(d.is_keyboard)
                    .pointing_device(d.is_pointing_device)
                    .disable_built_in_keyboard(d.disable_built_in_keyboard);
                match d.ignore {
                    Some(ignore) => device.ignore(ignore),
                    None => device,
                }
            })
            .collect();

        log::debug!(
            "Profile '{}': {} layers, {} remaps, {} raw rules",
            self.name,
            layers.len(),
            remaps.len(),
            rules.len()
        );

        Ok(ProfileConfig {
            name: self.name.clone(),
            selected: self.selected,
            parameters: self.parameters.clone(),
            country_code: self.virtual_keyboard_country_code,
            devices,
            layers,
            remaps,
            rules,
        })
    }
}

impl LayerToml {
    fn to_layer(&self) -> Result<Layer, ConfigError> {
        let mut layer = Layer::new(&self.name, self.trigger.resolved())?;

        if let Some(tap) = &self.tap_alone {
            layer = layer.tap_alone(tap.to_action()?)?;
        }
        if let Some(ms) = self.sequence_timeout_ms {
            layer = layer.sequence_timeout(ms)?;
        }
        if !self.when_app.is_empty() {
            layer = layer.when_app(self.when_app.iter().cloned());
        }
        if !self.unless_app.is_empty() {
            layer = layer.unless_app(self.unless_app.iter().cloned());
        }
        for var in &self.when_variable {
            layer = layer.when_variable(var, 1);
        }
        for var in &self.unless_variable {
            layer = layer.unless_variable(var, 1);
        }

        for name in &self.presets {
            let preset = preset_by_name(name).ok_or_else(|| invalid("presets", name.as_str()))?;
            layer = preset(layer)?;
        }

        for (from, target) in &self.map {
            let from = resolve_alias(from);
            layer = match target {
                // Macros render when the layer is built
                TargetToml::Template(t) => {
                    layer.map_macro(from, &t.template, t.params.clone())?
                }
                other => layer.map(from, other.to_action()?)?,
            };
        }

        for combo in &self.combos {
            let options = ComboOptions {
                simultaneous: SimultaneousOptions {
                    detect_key_down_uninterruptedly: combo.detect_key_down_uninterruptedly,
                    key_down_order: parse_option("key_down_order", &combo.key_down_order)?,
                    key_up_order: parse_option("key_up_order", &combo.key_up_order)?,
                    key_up_when: parse_option::<KeyUpWhen>("key_up_when", &combo.key_up_when)?,
                },
                to_after_key_up: match &combo.to_after_key_up {
                    Some(targets) => targets.to_actions()?,
                    None => Vec::new(),
                },
            };
            layer = layer.map_combo_with(resolve_keys(&combo.keys), combo.to.to_actions()?, options)?;
        }

        for sequence in &self.sequences {
            layer = layer.map_sequence(resolve_keys(&sequence.keys), sequence.to.to_action()?)?;
        }

        Ok(layer)
    }
}

impl RemapToml {
    fn to_rule(&self) -> Result<Rule, ConfigError> {
        let mut manipulator = BasicManipulator::new(resolve_alias(&self.from))?
            .mandatory(resolve_keys(&self.mandatory))
            .optional(resolve_keys(&self.optional));

        let mut targets = Vec::new();
        if let Some(to) = &self.to {
            let actions = to.to_actions()?;
            targets.extend(actions.iter().map(ToString::to_string));
            manipulator = manipulator.to_actions(actions);
        }
        if let Some(alone) = &self.if_alone {
            for action in alone.to_actions()? {
                manipulator = manipulator.if_alone_action(action);
            }
        }
        if let Some(held) = &self.if_held {
            for action in held.to_actions()? {
                manipulator = manipulator.if_held_action(action);
            }
        }
        if !self.when_app.is_empty() {
            manipulator = manipulator.when_app(self.when_app.iter().cloned());
        }
        if !self.unless_app.is_empty() {
            manipulator = manipulator.unless_app(self.unless_app.iter().cloned());
        }

        let description = match &self.description {
            Some(description) => description.clone(),
            None => format!("Remap: {} -> {}", self.from, targets.join(", ")),
        };
        Ok(Rule::new(description).add(manipulator))
    }
}

impl RawRuleToml {
    fn to_rule(&self) -> Result<Rule, ConfigError> {
        let mut rule = Rule::new(&self.description);
        for manipulator in &self.manipulators {
            let value = serde_json::to_value(manipulator)
                .map_err(|e| invalid("rule.manipulators", e.to_string()))?;
            rule = rule.add_raw(value)?;
        }
        Ok(rule)
    }
}

fn resolve_keys(keys: &[String]) -> Vec<String> {
    keys.iter().map(|k| resolve_alias(k).to_string()).collect()
}

fn parse_option<T>(field: &str, value: &Option<String>) -> Result<T, ConfigError>
where
    T: FromStr + Default,
{
    match value {
        None => Ok(T::default()),
        Some(text) => text.parse().map_err(|_| invalid(field, text.as_str())),
    }
}
