// Karabinex Cheat Sheets
// Markdown and HTML summaries of a compiled document

use std::fs;
use std::path::{Path, PathBuf};

use pulldown_cmark::{html, Options, Parser};
use serde_json::Value;

/// Render a Markdown cheat sheet: one section per profile, one table per rule
pub fn generate_markdown(document: &Value) -> String {
    let mut lines = vec!["# Karabinex Mapping Cheat Sheet".to_string(), String::new()];

    for profile in list(document.get("profiles")) {
        let name = profile.get("name").and_then(Value::as_str).unwrap_or("unnamed");
        let mut heading = format!("## Profile: {}", name);
        if profile.get("selected").and_then(Value::as_bool).unwrap_or(false) {
            heading.push_str(" (Selected)");
        }
        lines.push(heading);
        lines.push(String::new());

        let rules = profile
            .get("complex_modifications")
            .and_then(|cm| cm.get("rules"));
        for rule in list(rules) {
            let description = rule
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("(no description)");
            lines.push(format!("### {}", description));
            lines.push(String::new());
            lines.push("| From | To | Conditions |".to_string());
            lines.push("| :--- | :--- | :--- |".to_string());

            for manipulator in list(rule.get("manipulators")) {
                lines.push(format!(
                    "| {} | {} | {} |",
                    cell(&describe_from(manipulator.get("from"))),
                    cell(&describe_to(manipulator)),
                    cell(&describe_conditions(manipulator.get("conditions"))),
                ));
            }
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

/// Render the Markdown cheat sheet as a standalone HTML page
pub fn generate_html(document: &Value) -> String {
    let markdown = generate_markdown(document);
    let parser = Parser::new_ext(&markdown, Options::ENABLE_TABLES);
    let mut body = String::new();
    html::push_html(&mut body, parser);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Karabinex Mapping Cheat Sheet</title>
    <style>{}</style>
</head>
<body>
{}</body>
</html>
"#,
        STYLE, body
    )
}

const STYLE: &str = "body { font-family: -apple-system, sans-serif; margin: 2em; } \
table { border-collapse: collapse; margin-bottom: 1.5em; } \
th, td { border: 1px solid #ccc; padding: 4px 8px; text-align: left; } \
code { background: #f3f3f3; padding: 0 3px; }";

pub fn save_cheat_sheet(document: &Value, path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    write_output(path.as_ref(), &generate_markdown(document))
}

pub fn save_cheat_sheet_html(document: &Value, path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    write_output(path.as_ref(), &generate_html(document))
}

fn write_output(path: &Path, content: &str) -> std::io::Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    log::debug!("Cheat sheet written to {}", path.display());
    Ok(path.to_path_buf())
}

fn describe_from(from: Option<&Value>) -> String {
    let Some(from) = from else {
        return "-".to_string();
    };
    let keys: Vec<String> = match from.get("simultaneous") {
        Some(keys) => list(Some(keys))
            .iter()
            .filter_map(|k| k.get("key_code").and_then(Value::as_str))
            .map(|k| format!("`{}`", k))
            .collect(),
        None => from
            .get("key_code")
            .and_then(Value::as_str)
            .map(|k| vec![format!("`{}`", k)])
            .unwrap_or_default(),
    };
    let mut out = keys.join(" + ");

    let mandatory = strings(from.get("modifiers").and_then(|m| m.get("mandatory")));
    if !mandatory.is_empty() {
        out = format!("`{}` + {}", mandatory.join("+"), out);
    }
    out
}

fn describe_to(manipulator: &Value) -> String {
    let sections = [("to", "→"), ("to_if_alone", "Alone:"), ("to_if_held_down", "Held:")];
    let parts: Vec<String> = sections
        .iter()
        .filter_map(|(key, label)| {
            let actions: Vec<String> = list(manipulator.get(*key)).iter().map(describe_action).collect();
            (!actions.is_empty()).then(|| format!("{} `{}`", label, actions.join(" + ")))
        })
        .collect();
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join("<br>")
    }
}

fn describe_action(action: &Value) -> String {
    if let Some(key) = action.get("key_code").and_then(Value::as_str) {
        let modifiers = strings(action.get("modifiers"));
        if modifiers.is_empty() {
            return key.to_string();
        }
        return format!("{}+{}", modifiers.join("+"), key);
    }
    if let Some(var) = action.get("set_variable") {
        return format!(
            "set {}={}",
            var.get("name").and_then(Value::as_str).unwrap_or("?"),
            var.get("value").cloned().unwrap_or(Value::Null)
        );
    }
    if let Some(command) = action.get("shell_command").and_then(Value::as_str) {
        return format!("shell: {}", command);
    }
    action.to_string()
}

fn describe_conditions(conditions: Option<&Value>) -> String {
    let parts: Vec<String> = list(conditions)
        .iter()
        .map(|cond| {
            let kind = cond.get("type").and_then(Value::as_str).unwrap_or("unknown");
            let name = cond.get("name").and_then(Value::as_str).unwrap_or("?");
            let value = cond.get("value").cloned().unwrap_or(Value::Null);
            let apps = strings(cond.get("bundle_identifiers")).join(", ");
            match kind {
                "frontmost_application_if" => format!("App: {}", apps),
                "frontmost_application_unless" => format!("Not app: {}", apps),
                "variable_if" => format!("Var: {}=={}", name, value),
                "variable_unless" => format!("Var: {}!={}", name, value),
                other => other.to_string(),
            }
        })
        .collect();
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join("<br>")
    }
}

/// Escape pipes so cell content cannot split the table row
fn cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn list(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn strings(value: Option<&Value>) -> Vec<&str> {
    list(value).iter().filter_map(Value::as_str).collect()
}
