use std::fmt;

use serde_json::{json, Map, Value};

/// A key event emitted by a manipulator, with optional output modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyAction {
    key_code: String,
    modifiers: Vec<String>,
    repeat: Option<bool>,
    lazy: Option<bool>,
    halt: Option<bool>,
}

impl KeyAction {
    pub fn new(key_code: impl Into<String>) -> Self {
        Self {
            key_code: key_code.into(),
            modifiers: Vec::new(),
            repeat: None,
            lazy: None,
            halt: None,
        }
    }

    /// Add output modifiers (e.g. `left_command`)
    pub fn with_modifiers<I, S>(mut self, modifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modifiers.extend(modifiers.into_iter().map(Into::into));
        self
    }

    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = Some(repeat);
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    pub fn halt(mut self, halt: bool) -> Self {
        self.halt = Some(halt);
        self
    }

    pub fn key_code(&self) -> &str {
        &self.key_code
    }

    pub fn modifiers(&self) -> &[String] {
        &self.modifiers
    }
}

/// An atomic effect in the target document.
///
/// Serialized as `{"key_code": ..}`, `{"set_variable": {"name", "value"}}`
/// or `{"shell_command": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Key(KeyAction),
    SetVariable { name: String, value: i64 },
    ShellCommand(String),
}

impl Action {
    /// Plain key press without modifiers
    pub fn key(key_code: impl Into<String>) -> Self {
        Action::Key(KeyAction::new(key_code))
    }

    /// Key press with output modifiers
    pub fn key_with<I, S>(key_code: impl Into<String>, modifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::Key(KeyAction::new(key_code).with_modifiers(modifiers))
    }

    pub fn set_variable(name: impl Into<String>, value: i64) -> Self {
        Action::SetVariable {
            name: name.into(),
            value,
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Action::ShellCommand(command.into())
    }

    /// Returns true if this action is an empty key code
    pub fn is_empty_key(&self) -> bool {
        matches!(self, Action::Key(k) if k.key_code.is_empty())
    }

    /// Build a fresh JSON value for this action
    pub fn to_json(&self) -> Value {
        match self {
            Action::Key(key) => {
                let mut map = Map::new();
                map.insert("key_code".into(), Value::from(key.key_code.as_str()));
                if !key.modifiers.is_empty() {
                    map.insert("modifiers".into(), json!(key.modifiers));
                }
                if let Some(repeat) = key.repeat {
                    map.insert("repeat".into(), Value::Bool(repeat));
                }
                if let Some(lazy) = key.lazy {
                    map.insert("lazy".into(), Value::Bool(lazy));
                }
                if let Some(halt) = key.halt {
                    map.insert("halt".into(), Value::Bool(halt));
                }
                Value::Object(map)
            }
            Action::SetVariable { name, value } => {
                json!({ "set_variable": { "name": name, "value": value } })
            }
            Action::ShellCommand(command) => json!({ "shell_command": command }),
        }
    }
}

impl From<&str> for Action {
    fn from(key_code: &str) -> Self {
        Action::key(key_code)
    }
}

impl From<String> for Action {
    fn from(key_code: String) -> Self {
        Action::key(key_code)
    }
}

impl From<KeyAction> for Action {
    fn from(key: KeyAction) -> Self {
        Action::Key(key)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Key(key) if key.modifiers.is_empty() => write!(f, "{}", key.key_code),
            Action::Key(key) => write!(f, "{}+{}", key.modifiers.join("+"), key.key_code),
            Action::SetVariable { name, value } => write!(f, "set({}={})", name, value),
            Action::ShellCommand(command) => write!(f, "shell({})", command),
        }
    }
}

/// Serialize a list of actions into a JSON array
pub(crate) fn actions_to_json(actions: &[Action]) -> Value {
    Value::Array(actions.iter().map(Action::to_json).collect())
}
