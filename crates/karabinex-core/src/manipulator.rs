// Karabinex Manipulator Model
// One low-level conditional key binding in the target document

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::action::actions_to_json;
use crate::condition::conditions_to_json;
use crate::error::{require_key, require_keys, BuildError};
use crate::{Action, Condition};

/// Ordering requirement for simultaneous key down / key up events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum KeyOrder {
    #[default]
    Insensitive,
    Strict,
    StrictInverse,
}

/// When a simultaneous binding is considered released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum KeyUpWhen {
    #[default]
    Any,
    All,
}

/// Options for simultaneous `from` blocks.
///
/// Only values that differ from the daemon's defaults are emitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimultaneousOptions {
    pub detect_key_down_uninterruptedly: bool,
    pub key_down_order: KeyOrder,
    pub key_up_order: KeyOrder,
    pub key_up_when: KeyUpWhen,
}

impl SimultaneousOptions {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn to_json(&self) -> Option<Value> {
        let mut map = Map::new();
        if self.detect_key_down_uninterruptedly {
            map.insert("detect_key_down_uninterruptedly".into(), Value::Bool(true));
        }
        if self.key_down_order != KeyOrder::Insensitive {
            map.insert("key_down_order".into(), Value::from(self.key_down_order.as_ref()));
        }
        if self.key_up_order != KeyOrder::Insensitive {
            map.insert("key_up_order".into(), Value::from(self.key_up_order.as_ref()));
        }
        if self.key_up_when != KeyUpWhen::Any {
            map.insert("key_up_when".into(), Value::from(self.key_up_when.as_ref()));
        }
        if map.is_empty() {
            None
        } else {
            Some(Value::Object(map))
        }
    }
}

/// The triggering side of a manipulator: one key, or several pressed together
#[derive(Debug, Clone, PartialEq)]
pub enum FromEvent {
    Key(String),
    Simultaneous {
        keys: Vec<String>,
        options: SimultaneousOptions,
    },
}

/// Actions fired after a delay, or when another key cancels the wait
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DelayedAction {
    pub to_if_invoked: Vec<Action>,
    pub to_if_canceled: Vec<Action>,
}

impl DelayedAction {
    pub fn to_json(&self) -> Value {
        json!({
            "to_if_invoked": actions_to_json(&self.to_if_invoked),
            "to_if_canceled": actions_to_json(&self.to_if_canceled),
        })
    }
}

/// Builder for a `type: basic` manipulator
#[derive(Debug, Clone, PartialEq)]
pub struct BasicManipulator {
    from: FromEvent,
    mandatory_modifiers: Vec<String>,
    optional_modifiers: Vec<String>,
    to: Vec<Action>,
    to_if_alone: Vec<Action>,
    to_if_held_down: Vec<Action>,
    to_after_key_up: Vec<Action>,
    to_delayed_action: Option<DelayedAction>,
    conditions: Vec<Condition>,
    parameters: IndexMap<String, i64>,
}

impl BasicManipulator {
    /// Manipulator triggered by a single key
    pub fn new(from_key: impl Into<String>) -> Result<Self, BuildError> {
        let from_key = from_key.into();
        require_key("from_key", &from_key)?;
        Ok(Self::with_from(FromEvent::Key(from_key)))
    }

    /// Manipulator triggered by two or more keys pressed together
    pub fn simultaneous<I, S>(keys: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::simultaneous_with(keys, SimultaneousOptions::default())
    }

    pub fn simultaneous_with<I, S>(keys: I, options: SimultaneousOptions) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        require_keys("simultaneous keys", &keys, 2)?;
        Ok(Self::with_from(FromEvent::Simultaneous { keys, options }))
    }

    fn with_from(from: FromEvent) -> Self {
        Self {
            from,
            mandatory_modifiers: Vec::new(),
            optional_modifiers: Vec::new(),
            to: Vec::new(),
            to_if_alone: Vec::new(),
            to_if_held_down: Vec::new(),
            to_after_key_up: Vec::new(),
            to_delayed_action: None,
            conditions: Vec::new(),
            parameters: IndexMap::new(),
        }
    }

    /// Add mandatory and optional `from` modifiers
    pub fn modifiers<I, J, S, T>(self, mandatory: I, optional: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        self.mandatory(mandatory).optional(optional)
    }

    pub fn mandatory<I, S>(mut self, modifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_unique(&mut self.mandatory_modifiers, modifiers);
        self
    }

    pub fn optional<I, S>(mut self, modifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_unique(&mut self.optional_modifiers, modifiers);
        self
    }

    /// Append a key press to `to`
    pub fn to(self, key: impl Into<String>) -> Result<Self, BuildError> {
        let key = key.into();
        require_key("to key", &key)?;
        Ok(self.to_action(Action::key(key)))
    }

    pub fn to_action(mut self, action: Action) -> Self {
        self.to.push(action);
        self
    }

    pub fn to_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.to.extend(actions);
        self
    }

    /// Append a key press to `to_if_alone`
    pub fn if_alone(self, key: impl Into<String>) -> Result<Self, BuildError> {
        let key = key.into();
        require_key("to_if_alone key", &key)?;
        Ok(self.if_alone_action(Action::key(key)))
    }

    pub fn if_alone_action(mut self, action: Action) -> Self {
        self.to_if_alone.push(action);
        self
    }

    /// Append a key press to `to_if_held_down`
    pub fn if_held(self, key: impl Into<String>) -> Result<Self, BuildError> {
        let key = key.into();
        require_key("to_if_held_down key", &key)?;
        Ok(self.if_held_action(Action::key(key)))
    }

    pub fn if_held_action(mut self, action: Action) -> Self {
        self.to_if_held_down.push(action);
        self
    }

    /// Append a key press to `to_after_key_up`
    pub fn after_key_up(self, key: impl Into<String>) -> Result<Self, BuildError> {
        let key = key.into();
        require_key("to_after_key_up key", &key)?;
        Ok(self.after_key_up_action(Action::key(key)))
    }

    pub fn after_key_up_action(mut self, action: Action) -> Self {
        self.to_after_key_up.push(action);
        self
    }

    pub fn after_key_up_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.to_after_key_up.extend(actions);
        self
    }

    /// Set `to_delayed_action`; repeated calls append to both branches
    pub fn delayed_action(
        mut self,
        to_if_invoked: impl IntoIterator<Item = Action>,
        to_if_canceled: impl IntoIterator<Item = Action>,
    ) -> Self {
        let delayed = self.to_delayed_action.get_or_insert_with(DelayedAction::default);
        delayed.to_if_invoked.extend(to_if_invoked);
        delayed.to_if_canceled.extend(to_if_canceled);
        self
    }

    /// Per-manipulator timing override (e.g. `basic.to_delayed_action_delay_milliseconds`)
    pub fn parameter(mut self, name: impl Into<String>, value: i64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn when_app<I, S>(self, bundle_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.condition(Condition::app_if(bundle_ids))
    }

    pub fn unless_app<I, S>(self, bundle_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.condition(Condition::app_unless(bundle_ids))
    }

    pub fn when_variable(self, name: impl Into<String>, value: i64) -> Self {
        self.condition(Condition::variable_if(name, value))
    }

    pub fn unless_variable(self, name: impl Into<String>, value: i64) -> Self {
        self.condition(Condition::variable_unless(name, value))
    }

    pub fn from_event(&self) -> &FromEvent {
        &self.from
    }

    pub fn to_list(&self) -> &[Action] {
        &self.to
    }

    pub fn to_if_alone_list(&self) -> &[Action] {
        &self.to_if_alone
    }

    pub fn to_if_held_down_list(&self) -> &[Action] {
        &self.to_if_held_down
    }

    pub fn to_after_key_up_list(&self) -> &[Action] {
        &self.to_after_key_up
    }

    pub fn to_delayed(&self) -> Option<&DelayedAction> {
        self.to_delayed_action.as_ref()
    }

    pub fn condition_list(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn parameter_map(&self) -> &IndexMap<String, i64> {
        &self.parameters
    }

    fn from_json(&self) -> Value {
        let mut from = Map::new();
        match &self.from {
            FromEvent::Key(key) => {
                from.insert("key_code".into(), Value::from(key.as_str()));
            }
            FromEvent::Simultaneous { keys, options } => {
                let entries: Vec<Value> = keys.iter().map(|k| json!({ "key_code": k })).collect();
                from.insert("simultaneous".into(), Value::Array(entries));
                if let Some(options) = options.to_json() {
                    from.insert("simultaneous_options".into(), options);
                }
            }
        }

        if !self.mandatory_modifiers.is_empty() || !self.optional_modifiers.is_empty() {
            let mut modifiers = Map::new();
            if !self.mandatory_modifiers.is_empty() {
                modifiers.insert("mandatory".into(), json!(self.mandatory_modifiers));
            }
            if !self.optional_modifiers.is_empty() {
                modifiers.insert("optional".into(), json!(self.optional_modifiers));
            }
            from.insert("modifiers".into(), Value::Object(modifiers));
        }

        Value::Object(from)
    }

    /// Build a fresh, independent JSON tree for this manipulator
    pub fn compile(&self) -> Value {
        let mut manip = Map::new();
        manip.insert("type".into(), Value::from("basic"));
        manip.insert("from".into(), self.from_json());

        let sections = [
            ("to", &self.to),
            ("to_if_alone", &self.to_if_alone),
            ("to_if_held_down", &self.to_if_held_down),
            ("to_after_key_up", &self.to_after_key_up),
        ];
        for (name, actions) in sections {
            if !actions.is_empty() {
                manip.insert(name.into(), actions_to_json(actions));
            }
        }

        if let Some(delayed) = &self.to_delayed_action {
            manip.insert("to_delayed_action".into(), delayed.to_json());
        }
        if !self.conditions.is_empty() {
            manip.insert("conditions".into(), conditions_to_json(&self.conditions));
        }
        if !self.parameters.is_empty() {
            manip.insert("parameters".into(), json!(self.parameters));
        }

        Value::Object(manip)
    }
}

fn extend_unique<I, S>(target: &mut Vec<String>, items: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for item in items {
        let item = item.into();
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// A verbatim manipulator fragment for features the builder does not model
#[derive(Debug, Clone, PartialEq)]
pub struct RawManipulator {
    value: Value,
}

impl RawManipulator {
    /// Wrap a raw manipulator; it must carry a string `type` and an object `from`
    pub fn new(value: Value) -> Result<Self, BuildError> {
        let Some(obj) = value.as_object() else {
            return Err(BuildError::invalid(format!(
                "raw manipulator must be an object, got {}",
                value
            )));
        };
        if !obj.get("type").is_some_and(Value::is_string) {
            return Err(BuildError::invalid(format!(
                "raw manipulator requires a string 'type', got {}",
                value
            )));
        }
        if !obj.get("from").is_some_and(Value::is_object) {
            return Err(BuildError::invalid(format!(
                "raw manipulator requires an object 'from', got {}",
                value
            )));
        }
        Ok(Self { value })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn compile(&self) -> Value {
        self.value.clone()
    }
}

/// Closed set of manipulator kinds stored in a rule
#[derive(Debug, Clone, PartialEq)]
pub enum Manipulator {
    Basic(BasicManipulator),
    Raw(RawManipulator),
}

impl Manipulator {
    pub fn compile(&self) -> Value {
        match self {
            Manipulator::Basic(m) => m.compile(),
            Manipulator::Raw(m) => m.compile(),
        }
    }
}

impl From<BasicManipulator> for Manipulator {
    fn from(m: BasicManipulator) -> Self {
        Manipulator::Basic(m)
    }
}

impl From<RawManipulator> for Manipulator {
    fn from(m: RawManipulator) -> Self {
        Manipulator::Raw(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_simple_mapping() {
        let result = BasicManipulator::new("a").unwrap().to("b").unwrap().compile();
        assert_eq!(result["type"], "basic");
        assert_eq!(result["from"]["key_code"], "a");
        assert_eq!(result["to"], json!([{"key_code": "b"}]));
        assert!(result.get("to_if_alone").is_none());
        assert!(result.get("conditions").is_none());
        assert!(result["from"].get("modifiers").is_none());
    }

    #[test]
    fn test_multiple_to_keys() {
        let result = BasicManipulator::new("a")
            .and_then(|m| m.to("b"))
            .and_then(|m| m.to("c"))
            .unwrap()
            .compile();
        assert_eq!(result["to"], json!([{"key_code": "b"}, {"key_code": "c"}]));
    }

    #[test]
    fn test_if_alone_and_held() {
        let result = BasicManipulator::new("caps_lock")
            .and_then(|m| m.if_alone("escape"))
            .and_then(|m| m.if_held("left_control"))
            .unwrap()
            .compile();
        assert_eq!(result["to_if_alone"], json!([{"key_code": "escape"}]));
        assert_eq!(result["to_if_held_down"], json!([{"key_code": "left_control"}]));
        assert!(result.get("to").is_none());
    }

    #[test]
    fn test_empty_keys_rejected() {
        assert!(matches!(BasicManipulator::new(""), Err(BuildError::InvalidArgument(_))));
        let m = BasicManipulator::new("a").unwrap();
        assert!(m.clone().to("").is_err());
        assert!(m.clone().if_alone("").is_err());
        assert!(m.clone().if_held("").is_err());
        assert!(m.after_key_up("").is_err());
        assert!(BasicManipulator::simultaneous(["j"]).is_err());
        assert!(BasicManipulator::simultaneous(["j", ""]).is_err());
    }

    #[test]
    fn test_modifiers_accumulate() {
        let result = BasicManipulator::new("tab")
            .unwrap()
            .mandatory(["left_command"])
            .mandatory(["left_shift", "left_command"])
            .optional(["any"])
            .compile();
        assert_eq!(
            result["from"]["modifiers"],
            json!({"mandatory": ["left_command", "left_shift"], "optional": ["any"]})
        );
    }

    #[test]
    fn test_conditions_in_insertion_order() {
        let result = BasicManipulator::new("a")
            .unwrap()
            .when_variable("hyper", 1)
            .when_app(["com.apple.Terminal"])
            .unless_variable("nav", 1)
            .compile();
        let conditions = result["conditions"].as_array().unwrap();
        assert_eq!(conditions.len(), 3);
        assert_eq!(conditions[0]["type"], "variable_if");
        assert_eq!(conditions[1]["type"], "frontmost_application_if");
        assert_eq!(conditions[2]["type"], "variable_unless");
    }

    #[test]
    fn test_simultaneous_default_options_omitted() {
        let result = BasicManipulator::simultaneous(["j", "k"]).unwrap().compile();
        assert_eq!(
            result["from"]["simultaneous"],
            json!([{"key_code": "j"}, {"key_code": "k"}])
        );
        assert!(result["from"].get("simultaneous_options").is_none());
        assert!(result["from"].get("key_code").is_none());
    }

    #[test]
    fn test_simultaneous_options_emitted() {
        let options = SimultaneousOptions {
            key_down_order: KeyOrder::Strict,
            key_up_when: KeyUpWhen::All,
            ..Default::default()
        };
        let result = BasicManipulator::simultaneous_with(["j", "k"], options)
            .unwrap()
            .compile();
        assert_eq!(
            result["from"]["simultaneous_options"],
            json!({"key_down_order": "strict", "key_up_when": "all"})
        );
    }

    #[test]
    fn test_key_order_strings() {
        assert_eq!(KeyOrder::StrictInverse.as_ref(), "strict_inverse");
        assert_eq!(KeyOrder::from_str("strict").unwrap(), KeyOrder::Strict);
        assert_eq!(KeyUpWhen::from_str("all").unwrap(), KeyUpWhen::All);
        assert!(KeyOrder::from_str("sideways").is_err());
    }

    #[test]
    fn test_delayed_action_and_parameters() {
        let result = BasicManipulator::new("g")
            .unwrap()
            .delayed_action(Vec::<Action>::new(), vec![Action::set_variable("step", 0)])
            .parameter("basic.to_delayed_action_delay_milliseconds", 300)
            .compile();
        assert_eq!(
            result["to_delayed_action"],
            json!({
                "to_if_invoked": [],
                "to_if_canceled": [{"set_variable": {"name": "step", "value": 0}}],
            })
        );
        assert_eq!(
            result["parameters"]["basic.to_delayed_action_delay_milliseconds"],
            300
        );
    }

    #[test]
    fn test_compile_does_not_alias_builder() {
        let builder = BasicManipulator::new("a").unwrap().to("b").unwrap();
        let first = builder.compile();
        let builder = builder.to("c").unwrap().when_variable("x", 1);
        assert_eq!(first["to"], json!([{"key_code": "b"}]));
        assert!(first.get("conditions").is_none());
        assert_ne!(first, builder.compile());
    }

    #[test]
    fn test_raw_manipulator_validation() {
        let raw = json!({"type": "basic", "from": {"key_code": "a"}, "to": [{"key_code": "b"}]});
        let m = RawManipulator::new(raw.clone()).unwrap();
        assert_eq!(Manipulator::from(m).compile(), raw);

        assert!(RawManipulator::new(json!({"from": {"key_code": "a"}})).is_err());
        assert!(RawManipulator::new(json!({"type": "basic"})).is_err());
        assert!(RawManipulator::new(json!({"type": "basic", "from": "a"})).is_err());
        assert!(RawManipulator::new(json!(["basic"])).is_err());
    }
}
