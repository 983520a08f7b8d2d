// Karabinex Static Analysis
// Coverage report over a compiled document, plus layer namespace checks

use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::Layer;

/// One manipulator sharing a `from` signature with another
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictEntry {
    pub profile: String,
    pub rule: String,
    pub conditions: Vec<Value>,
}

/// Summary of `from` signature reuse across a compiled document
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CoverageReport {
    pub total_manipulators: usize,
    pub unique_from: usize,
    pub duplicate_from: usize,
    /// Signatures used by more than one manipulator, in first-seen order
    pub potential_conflicts: IndexMap<String, Vec<ConflictEntry>>,
}

/// Count manipulators and group them by `from` signature.
///
/// A shared signature is only a potential conflict; the manipulators may be
/// guarded by mutually exclusive conditions.
pub fn compute_static_coverage(document: &Value) -> CoverageReport {
    let mut total = 0;
    let mut signatures: IndexMap<String, Vec<ConflictEntry>> = IndexMap::new();

    for profile in as_slice(document.get("profiles")) {
        let profile_name = str_field(profile, "name");
        let rules = profile
            .get("complex_modifications")
            .and_then(|cm| cm.get("rules"));
        for rule in as_slice(rules) {
            let rule_name = str_field(rule, "description");
            for manipulator in as_slice(rule.get("manipulators")) {
                total += 1;
                let entry = ConflictEntry {
                    profile: profile_name.clone(),
                    rule: rule_name.clone(),
                    conditions: as_slice(manipulator.get("conditions")).to_vec(),
                };
                signatures
                    .entry(from_signature(manipulator))
                    .or_default()
                    .push(entry);
            }
        }
    }

    let unique_from = signatures.len();
    signatures.retain(|_, entries| entries.len() > 1);
    let duplicate_from = signatures.values().map(|entries| entries.len() - 1).sum();

    CoverageReport {
        total_manipulators: total,
        unique_from,
        duplicate_from,
        potential_conflicts: signatures,
    }
}

pub fn format_coverage_report(report: &CoverageReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Static Coverage Report");
    let _ = writeln!(out, "Total manipulators: {}", report.total_manipulators);
    let _ = writeln!(out, "Unique from signatures: {}", report.unique_from);
    let _ = write!(out, "Duplicate from signatures: {}", report.duplicate_from);

    if !report.potential_conflicts.is_empty() {
        let _ = write!(out, "\n\nPotential conflicts (same from signature):");
        for (signature, entries) in &report.potential_conflicts {
            let _ = write!(out, "\n- {}", signature);
            for entry in entries {
                let _ = write!(
                    out,
                    "\n  Profile: {} | Rule: {} | {}",
                    entry.profile,
                    entry.rule,
                    condition_summary(&entry.conditions)
                );
            }
        }
    }

    out
}

/// `simultaneous(a+b)` or `key(k)` with `|m:..|o:..` when modifiers exist
pub fn from_signature(manipulator: &Value) -> String {
    let Some(from) = manipulator.get("from") else {
        return "key(unknown)".to_string();
    };

    if let Some(keys) = from.get("simultaneous") {
        let keys: Vec<&str> = as_slice(Some(keys))
            .iter()
            .map(|entry| entry.get("key_code").and_then(Value::as_str).unwrap_or("unknown"))
            .collect();
        return format!("simultaneous({})", keys.join("+"));
    }

    let key = from.get("key_code").and_then(Value::as_str).unwrap_or("unknown");
    let modifiers = from.get("modifiers");
    let mut mandatory = string_list(modifiers.and_then(|m| m.get("mandatory")));
    let mut optional = string_list(modifiers.and_then(|m| m.get("optional")));
    if mandatory.is_empty() && optional.is_empty() {
        return format!("key({})", key);
    }
    mandatory.sort_unstable();
    optional.sort_unstable();
    format!("key({})|m:{}|o:{}", key, mandatory.join("+"), optional.join("+"))
}

fn condition_summary(conditions: &[Value]) -> String {
    if conditions.is_empty() {
        return "Conditions: none".to_string();
    }
    let parts: Vec<String> = conditions
        .iter()
        .map(|cond| {
            let kind = str_field(cond, "type");
            match kind.as_str() {
                "frontmost_application_if" | "frontmost_application_unless" => {
                    let apps = string_list(cond.get("bundle_identifiers")).join(", ");
                    let short = if kind.ends_with("_if") { "app_if" } else { "app_unless" };
                    format!("{}({})", short, apps)
                }
                "variable_if" | "variable_unless" => format!(
                    "{}({}={})",
                    kind,
                    str_field(cond, "name"),
                    cond.get("value").cloned().unwrap_or(Value::Null)
                ),
                _ => kind,
            }
        })
        .collect();
    format!("Conditions: {}", parts.join("; "))
}

/// A variable name synthesized more than once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableCollision {
    pub variable: String,
    /// Owning layer of every occurrence, in layer order
    pub layers: Vec<String>,
}

/// Report variable names synthesized by more than one layer (or twice in one).
///
/// Names are never rewritten: raw rules may refer to them by hand.
pub fn find_variable_collisions(layers: &[&Layer]) -> Vec<VariableCollision> {
    let mut owners: IndexMap<String, Vec<String>> = IndexMap::new();
    for layer in layers {
        for variable in layer.synthesized_variables() {
            owners
                .entry(variable)
                .or_default()
                .push(layer.name().to_string());
        }
    }

    owners
        .into_iter()
        .filter(|(_, layers)| layers.len() > 1)
        .map(|(variable, layers)| VariableCollision { variable, layers })
        .collect()
}

/// Sequences in one layer that start with the same key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixRace {
    pub layer: String,
    pub first_key: String,
    pub sequences: Vec<Vec<String>>,
}

/// Find sequences whose first step would fire on the same key press.
///
/// The daemon decides which step rule matches; this is only surfaced as a
/// warning.
pub fn find_sequence_prefix_races(layer: &Layer) -> Vec<PrefixRace> {
    let mut by_first: IndexMap<&str, Vec<Vec<String>>> = IndexMap::new();
    for sequence in layer.sequences() {
        if let Some(first) = sequence.keys.first() {
            by_first
                .entry(first.as_str())
                .or_default()
                .push(sequence.keys.clone());
        }
    }

    by_first
        .into_iter()
        .filter(|(_, sequences)| sequences.len() > 1)
        .map(|(first_key, sequences)| PrefixRace {
            layer: layer.name().to_string(),
            first_key: first_key.to_string(),
            sequences,
        })
        .collect()
}

fn as_slice(value: Option<&Value>) -> &[Value] {
    value
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

fn string_list(value: Option<&Value>) -> Vec<&str> {
    as_slice(value).iter().filter_map(Value::as_str).collect()
}
