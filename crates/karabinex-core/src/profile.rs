// Karabinex Profile
// Rules, device overrides and global timing parameters for one profile

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::error::BuildError;
use crate::{Layer, Rule};

/// Common `complex_modifications.parameters` keys
pub const SIMULTANEOUS_THRESHOLD_MS: &str = "basic.simultaneous_threshold_milliseconds";
pub const TO_IF_ALONE_TIMEOUT_MS: &str = "basic.to_if_alone_timeout_milliseconds";
pub const TO_IF_HELD_DOWN_THRESHOLD_MS: &str = "basic.to_if_held_down_threshold_milliseconds";
pub const TO_DELAYED_ACTION_DELAY_MS: &str = "basic.to_delayed_action_delay_milliseconds";

/// Per-device override in a profile
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub vendor_id: i64,
    pub product_id: i64,
    pub is_keyboard: bool,
    pub is_pointing_device: bool,
    pub disable_built_in_keyboard_if_exists: bool,
    pub ignore: Option<bool>,
}

impl Device {
    pub fn new(vendor_id: i64, product_id: i64) -> Self {
        Self {
            vendor_id,
            product_id,
            is_keyboard: true,
            is_pointing_device: false,
            disable_built_in_keyboard_if_exists: false,
            ignore: None,
        }
    }

    pub fn disable_built_in_keyboard(mut self, disable: bool) -> Self {
        self.disable_built_in_keyboard_if_exists = disable;
        self
    }

    pub fn pointing_device(mut self, is_pointing_device: bool) -> Self {
        self.is_pointing_device = is_pointing_device;
        self
    }

    pub fn keyboard(mut self, is_keyboard: bool) -> Self {
        self.is_keyboard = is_keyboard;
        self
    }

    pub fn ignore(mut self, ignore: bool) -> Self {
        self.ignore = Some(ignore);
        self
    }

    pub fn compile(&self) -> Value {
        let mut device = Map::new();
        device.insert(
            "identifiers".into(),
            json!({
                "vendor_id": self.vendor_id,
                "product_id": self.product_id,
                "is_keyboard": self.is_keyboard,
                "is_pointing_device": self.is_pointing_device,
            }),
        );
        device.insert(
            "disable_built_in_keyboard_if_exists".into(),
            Value::Bool(self.disable_built_in_keyboard_if_exists),
        );
        if let Some(ignore) = self.ignore {
            device.insert("ignore".into(), Value::Bool(ignore));
        }
        Value::Object(device)
    }
}

/// A Karabiner profile
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    name: String,
    selected: bool,
    rules: Vec<Rule>,
    devices: Vec<Device>,
    parameters: IndexMap<String, i64>,
    country_code: i64,
}

impl Profile {
    /// Create a selected profile with no rules
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selected: true,
            rules: Vec::new(),
            devices: Vec::new(),
            parameters: IndexMap::new(),
            country_code: 0,
        }
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn add_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Expand a layer and append its rules in build order
    pub fn add_layer(self, layer: &Layer) -> Result<Self, BuildError> {
        Ok(self.add_rules(layer.build_rules()?))
    }

    pub fn add_device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    /// Set a global timing knob; later values replace earlier ones
    pub fn set_parameter(mut self, name: impl Into<String>, value: i64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn set_virtual_keyboard(mut self, country_code: i64) -> Self {
        self.country_code = country_code;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn parameters(&self) -> &IndexMap<String, i64> {
        &self.parameters
    }

    pub fn compile(&self) -> Value {
        let rules: Vec<Value> = self.rules.iter().map(Rule::compile).collect();
        let mut complex = Map::new();
        complex.insert("rules".into(), Value::Array(rules));
        if !self.parameters.is_empty() {
            complex.insert("parameters".into(), json!(self.parameters));
        }

        let devices: Vec<Value> = self.devices.iter().map(Device::compile).collect();
        json!({
            "name": self.name,
            "selected": self.selected,
            "complex_modifications": complex,
            "devices": devices,
            "virtual_hid_keyboard": { "country_code": self.country_code },
        })
    }
}
