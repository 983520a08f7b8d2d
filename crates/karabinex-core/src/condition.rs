// Karabinex Conditions
// Guards restricting when a manipulator applies

use std::fmt;

use serde_json::{json, Value};

/// A manipulator guard.
///
/// Variables are process-wide named integer slots in the daemon (default 0);
/// app conditions match the frontmost application's bundle identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    AppIf(Vec<String>),
    AppUnless(Vec<String>),
    VariableIf { name: String, value: i64 },
    VariableUnless { name: String, value: i64 },
}

impl Condition {
    pub fn app_if<I, S>(bundle_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::AppIf(bundle_ids.into_iter().map(Into::into).collect())
    }

    pub fn app_unless<I, S>(bundle_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::AppUnless(bundle_ids.into_iter().map(Into::into).collect())
    }

    pub fn variable_if(name: impl Into<String>, value: i64) -> Self {
        Condition::VariableIf {
            name: name.into(),
            value,
        }
    }

    pub fn variable_unless(name: impl Into<String>, value: i64) -> Self {
        Condition::VariableUnless {
            name: name.into(),
            value,
        }
    }

    /// The `type` tag used in the target document
    pub fn type_name(&self) -> &'static str {
        match self {
            Condition::AppIf(_) => "frontmost_application_if",
            Condition::AppUnless(_) => "frontmost_application_unless",
            Condition::VariableIf { .. } => "variable_if",
            Condition::VariableUnless { .. } => "variable_unless",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Condition::AppIf(ids) | Condition::AppUnless(ids) => json!({
                "type": self.type_name(),
                "bundle_identifiers": ids,
            }),
            Condition::VariableIf { name, value } | Condition::VariableUnless { name, value } => {
                json!({
                    "type": self.type_name(),
                    "name": name,
                    "value": value,
                })
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::AppIf(ids) => write!(f, "app_if({})", ids.join(", ")),
            Condition::AppUnless(ids) => write!(f, "app_unless({})", ids.join(", ")),
            Condition::VariableIf { name, value } => write!(f, "variable_if({}={})", name, value),
            Condition::VariableUnless { name, value } => {
                write!(f, "variable_unless({}={})", name, value)
            }
        }
    }
}

pub(crate) fn conditions_to_json(conditions: &[Condition]) -> Value {
    Value::Array(conditions.iter().map(Condition::to_json).collect())
}
