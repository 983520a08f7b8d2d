// Karabinex Document
// Top-level karabiner.json tree: global settings plus profiles

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::Profile;

pub const CHECK_FOR_UPDATES_ON_STARTUP: &str = "check_for_updates_on_startup";
pub const SHOW_IN_MENU_BAR: &str = "show_in_menu_bar";
pub const SHOW_PROFILE_NAME_IN_MENU_BAR: &str = "show_profile_name_in_menu_bar";

/// Top-level Karabiner configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    global_settings: IndexMap<String, bool>,
    profiles: Vec<Profile>,
}

impl Default for Document {
    fn default() -> Self {
        let mut global_settings = IndexMap::new();
        global_settings.insert(CHECK_FOR_UPDATES_ON_STARTUP.to_string(), true);
        global_settings.insert(SHOW_IN_MENU_BAR.to_string(), true);
        global_settings.insert(SHOW_PROFILE_NAME_IN_MENU_BAR.to_string(), false);
        Self {
            global_settings,
            profiles: Vec::new(),
        }
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_profile(mut self, profile: Profile) -> Self {
        self.profiles.push(profile);
        self
    }

    /// Override a `global` flag
    pub fn set_global(mut self, name: impl Into<String>, value: bool) -> Self {
        self.global_settings.insert(name.into(), value);
        self
    }

    pub fn global_settings(&self) -> &IndexMap<String, bool> {
        &self.global_settings
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Compile into a plain tree; `profiles` is always a list, possibly empty
    pub fn compile(&self) -> Value {
        let profiles: Vec<Value> = self.profiles.iter().map(Profile::compile).collect();
        json!({
            "global": self.global_settings,
            "profiles": profiles,
        })
    }

    /// Compile and serialize with two-space indentation
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.compile())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rule;

    #[test]
    fn test_empty_document_shape() {
        let result = Document::new().compile();
        assert_eq!(
            result["global"],
            json!({
                "check_for_updates_on_startup": true,
                "show_in_menu_bar": true,
                "show_profile_name_in_menu_bar": false,
            })
        );
        assert_eq!(result["profiles"], json!([]));
    }

    #[test]
    fn test_set_global_overrides() {
        let result = Document::new()
            .set_global(SHOW_PROFILE_NAME_IN_MENU_BAR, true)
            .compile();
        assert_eq!(result["global"]["show_profile_name_in_menu_bar"], true);
        assert_eq!(result["global"].as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_compile_is_repeatable() {
        let doc = Document::new().add_profile(Profile::new("Default").add_rule(Rule::new("Empty")));
        assert_eq!(doc.compile(), doc.compile());
    }

    #[test]
    fn test_to_json_pretty_round_trips() {
        let doc = Document::new().add_profile(Profile::new("Default"));
        let text = doc.to_json_pretty().unwrap();
        assert!(text.contains("\n  \"global\""));
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, doc.compile());
    }
}
