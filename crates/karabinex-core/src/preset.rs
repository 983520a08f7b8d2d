// Karabinex Presets
// Reusable layer mappings and standalone rules

use crate::error::BuildError;
use crate::key::{DOWN, END, HOME, LEFT, PGDN, PGUP, RIGHT, UP};
use crate::{BasicManipulator, Layer, Rule};

/// A function that adds mappings to a layer
pub type Preset = fn(Layer) -> Result<Layer, BuildError>;

/// Apply presets in order
pub fn apply_presets(layer: Layer, presets: &[Preset]) -> Result<Layer, BuildError> {
    presets.iter().try_fold(layer, |layer, preset| preset(layer))
}

/// Combine several presets into one
pub fn compose_presets(presets: Vec<Preset>) -> Box<dyn Fn(Layer) -> Result<Layer, BuildError>> {
    Box::new(move |layer| apply_presets(layer, &presets))
}

/// h/j/k/l arrows, u/d page up/down, 0 home, 4 end
pub fn vim_navigation(layer: Layer) -> Result<Layer, BuildError> {
    layer
        .map("h", LEFT)?
        .map("j", DOWN)?
        .map("k", UP)?
        .map("l", RIGHT)?
        .map("u", PGUP)?
        .map("d", PGDN)?
        .map("0", HOME)?
        // `$` is shift+4
        .map("4", END)
}

/// m mission control, s spotlight, c control center
pub fn common_system_shortcuts(layer: Layer) -> Result<Layer, BuildError> {
    layer
        .map("m", "mission_control")?
        .map("s", "spotlight")?
        .map("c", "control_center")
}

/// Look up a layer preset by its config name
pub fn preset_by_name(name: &str) -> Option<Preset> {
    match name {
        "vim_navigation" => Some(vim_navigation),
        "common_system_shortcuts" | "system_shortcuts" => Some(common_system_shortcuts),
        _ => None,
    }
}

/// Names accepted by [`preset_by_name`]
pub const PRESET_NAMES: &[&str] = &["vim_navigation", "common_system_shortcuts"];

/// Remap `from` to `to` while held, optionally sending `if_alone` on tap
pub fn hyper_key_rule(from: &str, to: &str, if_alone: Option<&str>) -> Result<Rule, BuildError> {
    let mut manipulator = BasicManipulator::new(from)?.to(to)?;
    if let Some(key) = if_alone {
        manipulator = manipulator.if_alone(key)?;
    }
    Ok(Rule::new(format!("Hyper Key: {} to {}", from, to)).add(manipulator))
}

/// Rebind `from` (with `modifiers` held) to `to`; defaults to left_command
pub fn app_switcher_enhancement(
    from: &str,
    to: &str,
    modifiers: &[&str],
) -> Result<Rule, BuildError> {
    let modifiers: &[&str] = if modifiers.is_empty() {
        &["left_command"]
    } else {
        modifiers
    };
    let manipulator = BasicManipulator::new(from)?
        .mandatory(modifiers.iter().copied())
        .to(to)?;
    Ok(Rule::new("App Switcher Enhancement").add(manipulator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nav() -> Layer {
        Layer::new("nav", ["spacebar"]).unwrap()
    }

    #[test]
    fn test_vim_navigation() {
        let layer = vim_navigation(nav()).unwrap();
        assert_eq!(layer.mappings().len(), 8);

        let rules = layer.build_rules().unwrap();
        assert_eq!(rules[1].description(), "nav: h -> left_arrow");
        assert_eq!(rules[8].description(), "nav: 4 -> end");
    }

    #[test]
    fn test_apply_presets_in_order() {
        let layer = apply_presets(nav(), &[vim_navigation, common_system_shortcuts]).unwrap();
        let rules = layer.build_rules().unwrap();
        assert_eq!(rules.len(), 1 + 8 + 3);
        assert_eq!(rules[9].description(), "nav: m -> mission_control");
    }

    #[test]
    fn test_compose_presets() {
        let both = compose_presets(vec![common_system_shortcuts, vim_navigation]);
        let layer = both(nav()).unwrap();
        assert_eq!(layer.mappings().len(), 11);
        assert_eq!(layer.mappings()[0].from, "m");
    }

    #[test]
    fn test_preset_by_name() {
        assert!(preset_by_name("vim_navigation").is_some());
        assert!(preset_by_name("common_system_shortcuts").is_some());
        assert!(preset_by_name("emacs").is_none());
        for name in PRESET_NAMES {
            assert!(preset_by_name(name).is_some());
        }
    }

    #[test]
    fn test_hyper_key_rule() {
        let rule = hyper_key_rule("caps_lock", "right_command", Some("escape")).unwrap();
        assert_eq!(rule.description(), "Hyper Key: caps_lock to right_command");

        let m = &rule.compile()["manipulators"][0];
        assert_eq!(m["from"]["key_code"], "caps_lock");
        assert_eq!(m["to"], json!([{"key_code": "right_command"}]));
        assert_eq!(m["to_if_alone"], json!([{"key_code": "escape"}]));

        let plain = hyper_key_rule("caps_lock", "right_command", None).unwrap();
        assert!(plain.compile()["manipulators"][0].get("to_if_alone").is_none());
    }

    #[test]
    fn test_app_switcher_enhancement() {
        let rule = app_switcher_enhancement("tab", "tab", &[]).unwrap();
        let m = &rule.compile()["manipulators"][0];
        assert_eq!(m["from"]["modifiers"]["mandatory"], json!(["left_command"]));

        let rule = app_switcher_enhancement("grave_accent_and_tilde", "tab", &["left_option"]).unwrap();
        let m = &rule.compile()["manipulators"][0];
        assert_eq!(m["from"]["modifiers"]["mandatory"], json!(["left_option"]));
        assert!(app_switcher_enhancement("", "tab", &[]).is_err());
    }
}
