// Karabinex Layer Compiler
// Expands a declarative layer into activation, mapping, combo and sequence rules

use crate::error::{require_key, require_keys, BuildError};
use crate::key::ANY;
use crate::manipulator::SimultaneousOptions;
use crate::profile::TO_DELAYED_ACTION_DELAY_MS;
use crate::template::{make_shell_command, TemplateParams};
use crate::{Action, BasicManipulator, Condition, Rule};

/// Default delay between sequence steps
pub const DEFAULT_SEQUENCE_TIMEOUT_MS: i64 = 500;

/// What a simple mapping produces
#[derive(Debug, Clone, PartialEq)]
pub enum MappingTarget {
    Action(Action),
    /// Rendered through the default template registry at build time
    Macro {
        template: String,
        params: TemplateParams,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub from: String,
    pub target: MappingTarget,
}

/// Extra knobs for a combo
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComboOptions {
    pub simultaneous: SimultaneousOptions,
    /// Fired on release, independent of the layer's own key-up reset
    pub to_after_key_up: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combo {
    pub keys: Vec<String>,
    pub to: Vec<Action>,
    pub options: ComboOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub keys: Vec<String>,
    pub to: Action,
}

impl Sequence {
    /// Step variable names: `{layer}_seq_{k0}_{k1}..._step{n}`
    pub fn step_variables(&self, layer: &str) -> Vec<String> {
        let base = format!("{}_seq_{}", layer, self.keys.join("_"));
        (1..=self.keys.len())
            .map(|step| format!("{}_step{}", base, step))
            .collect()
    }
}

/// A set of bindings active while the trigger key(s) are held.
///
/// The layer name doubles as the Karabiner variable that tracks activation,
/// so it must be unique across a document. See
/// [`find_variable_collisions`](crate::analysis::find_variable_collisions).
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    name: String,
    triggers: Vec<String>,
    tap_alone: Option<Action>,
    mappings: Vec<Mapping>,
    combos: Vec<Combo>,
    sequences: Vec<Sequence>,
    sequence_timeout_ms: i64,
    scope: Vec<Condition>,
}

impl Layer {
    /// One trigger key gives a hold layer; two or more give a stacked layer
    pub fn new<I, S>(name: impl Into<String>, triggers: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        require_key("layer name", &name)?;
        let triggers: Vec<String> = triggers.into_iter().map(Into::into).collect();
        require_keys("trigger keys", &triggers, 1)?;

        Ok(Self {
            name,
            triggers,
            tap_alone: None,
            mappings: Vec::new(),
            combos: Vec::new(),
            sequences: Vec::new(),
            sequence_timeout_ms: DEFAULT_SEQUENCE_TIMEOUT_MS,
            scope: Vec::new(),
        })
    }

    /// Action sent when the single trigger key is tapped on its own
    pub fn tap_alone(mut self, action: impl Into<Action>) -> Result<Self, BuildError> {
        let action = action.into();
        if self.triggers.len() > 1 {
            return Err(BuildError::invalid(format!(
                "tap-alone is not supported for stacked layer '{}' (triggers {:?})",
                self.name, self.triggers
            )));
        }
        require_action("tap-alone action", &action)?;
        self.tap_alone = Some(action);
        Ok(self)
    }

    pub fn map(
        mut self,
        from: impl Into<String>,
        to: impl Into<Action>,
    ) -> Result<Self, BuildError> {
        let from = from.into();
        let to = to.into();
        require_key("from key", &from)?;
        require_action("to key", &to)?;
        self.mappings.push(Mapping {
            from,
            target: MappingTarget::Action(to),
        });
        Ok(self)
    }

    /// Bind `from` to a rendered template. Rendering errors surface from
    /// [`Layer::build_rules`].
    pub fn map_macro(
        mut self,
        from: impl Into<String>,
        template: impl Into<String>,
        params: TemplateParams,
    ) -> Result<Self, BuildError> {
        let from = from.into();
        let template = template.into();
        require_key("from key", &from)?;
        require_key("template name", &template)?;
        self.mappings.push(Mapping {
            from,
            target: MappingTarget::Macro { template, params },
        });
        Ok(self)
    }

    pub fn map_combo<I, S>(self, keys: I, to: impl Into<Action>) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.map_combo_with(keys, vec![to.into()], ComboOptions::default())
    }

    pub fn map_combo_with<I, S>(
        mut self,
        keys: I,
        to: Vec<Action>,
        options: ComboOptions,
    ) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        require_keys("combo keys", &keys, 2)?;
        if to.is_empty() {
            return Err(BuildError::invalid(format!(
                "combo {:?} needs at least one action",
                keys
            )));
        }
        for action in &to {
            require_action("combo action", action)?;
        }
        self.combos.push(Combo { keys, to, options });
        Ok(self)
    }

    pub fn map_sequence<I, S>(mut self, keys: I, to: impl Into<Action>) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let to = to.into();
        require_keys("sequence keys", &keys, 2)?;
        require_action("sequence action", &to)?;
        self.sequences.push(Sequence { keys, to });
        Ok(self)
    }

    /// Maximum delay between sequence steps; must be positive
    pub fn sequence_timeout(mut self, ms: i64) -> Result<Self, BuildError> {
        if ms <= 0 {
            return Err(BuildError::invalid(format!(
                "sequence timeout must be positive, got {}",
                ms
            )));
        }
        self.sequence_timeout_ms = ms;
        Ok(self)
    }

    /// Add a scope condition to every non-activation rule
    pub fn condition(mut self, condition: Condition) -> Self {
        self.scope.push(condition);
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

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn combos(&self) -> &[Combo] {
        &self.combos
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn sequence_timeout_ms(&self) -> i64 {
        self.sequence_timeout_ms
    }

    pub fn scope_conditions(&self) -> &[Condition] {
        &self.scope
    }

    /// Every variable this layer sets: the layer variable, then sequence steps
    pub fn synthesized_variables(&self) -> Vec<String> {
        let mut vars = vec![self.name.clone()];
        for sequence in &self.sequences {
            vars.extend(sequence.step_variables(&self.name));
        }
        vars
    }

    /// Expand into `[activation, *mappings, *combos, *sequence steps]`
    pub fn build_rules(&self) -> Result<Vec<Rule>, BuildError> {
        let mut rules = Vec::with_capacity(1 + self.mappings.len() + self.combos.len());
        rules.push(self.activation_rule()?);
        for mapping in &self.mappings {
            rules.push(self.mapping_rule(mapping)?);
        }
        for combo in &self.combos {
            rules.push(self.combo_rule(combo)?);
        }
        for sequence in &self.sequences {
            rules.extend(self.sequence_rules(sequence)?);
        }

        log::debug!(
            "Layer '{}': {} rules ({} mappings, {} combos, {} sequences)",
            self.name,
            rules.len(),
            self.mappings.len(),
            self.combos.len(),
            self.sequences.len()
        );
        for rule in &rules {
            log::trace!("  {}", rule.description());
        }

        Ok(rules)
    }

    fn layer_conditions(&self) -> Vec<Condition> {
        let mut conditions = Vec::with_capacity(self.scope.len() + 1);
        conditions.push(Condition::variable_if(&self.name, 1));
        conditions.extend(self.scope.iter().cloned());
        conditions
    }

    fn activation_rule(&self) -> Result<Rule, BuildError> {
        let (manipulator, description) = match self.triggers.as_slice() {
            [key] => {
                let mut m = BasicManipulator::new(key.as_str())?;
                if let Some(action) = &self.tap_alone {
                    m = m.if_alone_action(action.clone());
                }
                (m, format!("{} activation", self.name))
            }
            keys => (
                BasicManipulator::simultaneous(keys.iter().map(String::as_str))?,
                format!("{} stacked activation", self.name),
            ),
        };

        let manipulator = manipulator
            .optional([ANY])
            .to_action(Action::set_variable(&self.name, 1))
            .after_key_up_action(Action::set_variable(&self.name, 0));

        Ok(Rule::new(description).add(manipulator))
    }

    fn mapping_rule(&self, mapping: &Mapping) -> Result<Rule, BuildError> {
        let (actions, description) = match &mapping.target {
            MappingTarget::Action(action) => (
                vec![action.clone()],
                format!("{}: {} -> {}", self.name, mapping.from, action),
            ),
            MappingTarget::Macro { template, params } => (
                make_shell_command(template, params)?,
                format!("{} macro: {} -> {}", self.name, mapping.from, template),
            ),
        };

        let manipulator = BasicManipulator::new(mapping.from.as_str())?
            .optional([ANY])
            .to_actions(actions)
            .conditions(self.layer_conditions());

        Ok(Rule::new(description).add(manipulator))
    }

    fn combo_rule(&self, combo: &Combo) -> Result<Rule, BuildError> {
        let target = match combo.to.as_slice() {
            [Action::Key(key)] if key.modifiers().is_empty() => key.key_code().to_string(),
            _ => "complex".to_string(),
        };
        let description = format!("{} combo {} -> {}", self.name, combo.keys.join("+"), target);

        let manipulator = BasicManipulator::simultaneous_with(
            combo.keys.iter().map(String::as_str),
            combo.options.simultaneous.clone(),
        )?
        .optional([ANY])
        .to_actions(combo.to.iter().cloned())
        .after_key_up_actions(combo.options.to_after_key_up.iter().cloned())
        .conditions(self.layer_conditions());

        Ok(Rule::new(description).add(manipulator))
    }

    fn sequence_rules(&self, sequence: &Sequence) -> Result<Vec<Rule>, BuildError> {
        let steps = sequence.step_variables(&self.name);
        let description = format!("{} sequence: {}", self.name, sequence.keys.join("+"));
        let last = sequence.keys.len() - 1;

        let mut rules = Vec::with_capacity(sequence.keys.len());
        for (index, key) in sequence.keys.iter().enumerate() {
            let current = &steps[index];

            let mut conditions = self.layer_conditions();
            let mut cancel = vec![Action::set_variable(current, 0)];
            if index > 0 {
                conditions.push(Condition::variable_if(&steps[index - 1], 1));
                cancel.push(Action::set_variable(&steps[index - 1], 0));
            }

            let mut actions = vec![Action::set_variable(current, 1)];
            if index == last {
                actions.push(sequence.to.clone());
                actions.extend(steps.iter().map(|step| Action::set_variable(step, 0)));
            }

            let manipulator = BasicManipulator::new(key.as_str())?
                .optional([ANY])
                .to_actions(actions)
                .conditions(conditions)
                .delayed_action(Vec::<Action>::new(), cancel)
                .parameter(TO_DELAYED_ACTION_DELAY_MS, self.sequence_timeout_ms);

            rules.push(Rule::new(description.clone()).add(manipulator));
        }

        Ok(rules)
    }
}

/// Reject empty key codes, variable names and shell commands
fn require_action(what: &str, action: &Action) -> Result<(), BuildError> {
    match action {
        Action::Key(key) if key.key_code().is_empty() => {
            Err(BuildError::invalid(format!("{} cannot be empty", what)))
        }
        Action::SetVariable { name, value } if name.is_empty() => Err(BuildError::invalid(
            format!("{} sets a variable with an empty name (value {})", what, value),
        )),
        Action::ShellCommand(command) if command.trim().is_empty() => Err(BuildError::invalid(
            format!("{} has an empty shell command {:?}", what, command),
        )),
        _ => Ok(()),
    }
}
