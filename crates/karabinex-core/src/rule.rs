use serde_json::{json, Value};

use crate::error::BuildError;
use crate::manipulator::{Manipulator, RawManipulator};

/// A named, ordered group of manipulators
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    description: String,
    manipulators: Vec<Manipulator>,
}

impl Rule {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            manipulators: Vec::new(),
        }
    }

    /// Append a manipulator
    pub fn add(mut self, manipulator: impl Into<Manipulator>) -> Self {
        self.manipulators.push(manipulator.into());
        self
    }

    /// Append several manipulators, preserving their order
    pub fn extend<I, M>(mut self, manipulators: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Manipulator>,
    {
        self.manipulators
            .extend(manipulators.into_iter().map(Into::into));
        self
    }

    /// Append a verbatim manipulator fragment
    pub fn add_raw(self, value: Value) -> Result<Self, BuildError> {
        Ok(self.add(RawManipulator::new(value)?))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn manipulators(&self) -> &[Manipulator] {
        &self.manipulators
    }

    pub fn compile(&self) -> Value {
        let manipulators: Vec<Value> = self.manipulators.iter().map(Manipulator::compile).collect();
        json!({
            "description": self.description,
            "manipulators": manipulators,
        })
    }
}
