// Karabinex Key Names
// Karabiner key_code / modifier names and short aliases

use std::sync::OnceLock;

// Modifiers
pub const CMD: &str = "command";
pub const ALT: &str = "option";
pub const OPT: &str = "option";
pub const CTRL: &str = "control";
pub const SHIFT: &str = "shift";
pub const ANY: &str = "any";

pub const R_CMD: &str = "right_command";
pub const L_CMD: &str = "left_command";
pub const R_ALT: &str = "right_option";
pub const L_ALT: &str = "left_option";
pub const R_OPT: &str = "right_option";
pub const L_OPT: &str = "left_option";
pub const R_CTRL: &str = "right_control";
pub const L_CTRL: &str = "left_control";
pub const R_SHIFT: &str = "right_shift";
pub const L_SHIFT: &str = "left_shift";

// Common keys
pub const CAPS: &str = "caps_lock";
pub const ESC: &str = "escape";
pub const RET: &str = "return_or_enter";
pub const ENTER: &str = "return_or_enter";
pub const SPC: &str = "spacebar";
pub const TAB: &str = "tab";
pub const BS: &str = "delete_or_backspace";
pub const DEL: &str = "delete_forward";

// Arrows
pub const UP: &str = "up_arrow";
pub const DOWN: &str = "down_arrow";
pub const LEFT: &str = "left_arrow";
pub const RIGHT: &str = "right_arrow";

// Navigation
pub const PGUP: &str = "page_up";
pub const PGDN: &str = "page_down";
pub const HOME: &str = "home";
pub const END: &str = "end";

/// Resolve a short alias (`esc`, `caps`, `R_CMD`, ...) to its key_code name.
///
/// Names that are not aliases are returned unchanged; key names are never
/// checked against the daemon's key table.
pub fn resolve_alias(name: &str) -> &str {
    static ALIASES: OnceLock<Vec<(&'static str, &'static str)>> = OnceLock::new();
    let table = ALIASES.get_or_init(|| {
        vec![
            ("CMD", CMD),
            ("ALT", ALT),
            ("OPT", OPT),
            ("CTRL", CTRL),
            ("R_CMD", R_CMD),
            ("L_CMD", L_CMD),
            ("R_ALT", R_ALT),
            ("L_ALT", L_ALT),
            ("R_OPT", R_OPT),
            ("L_OPT", L_OPT),
            ("R_CTRL", R_CTRL),
            ("L_CTRL", L_CTRL),
            ("R_SHIFT", R_SHIFT),
            ("L_SHIFT", L_SHIFT),
            ("CAPS", CAPS),
            ("ESC", ESC),
            ("RET", RET),
            ("ENTER", ENTER),
            ("SPC", SPC),
            ("BS", BS),
            ("DEL", DEL),
            ("UP", UP),
            ("DOWN", DOWN),
            ("LEFT", LEFT),
            ("RIGHT", RIGHT),
            ("PGUP", PGUP),
            ("PGDN", PGDN),
        ]
    });

    let upper = name.to_uppercase();
    table
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map(|(_, key)| *key)
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_alias() {
        assert_eq!(resolve_alias("esc"), "escape");
        assert_eq!(resolve_alias("CAPS"), "caps_lock");
        assert_eq!(resolve_alias("R_CMD"), "right_command");
        assert_eq!(resolve_alias("pgdn"), "page_down");
    }

    #[test]
    fn test_resolve_alias_passthrough() {
        assert_eq!(resolve_alias("left_arrow"), "left_arrow");
        assert_eq!(resolve_alias("h"), "h");
        assert_eq!(resolve_alias("not_a_key"), "not_a_key");
    }
}
