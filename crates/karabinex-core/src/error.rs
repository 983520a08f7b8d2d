// Karabinex Builder Errors

use crate::template::TemplateError;

/// Errors raised while assembling builder state or expanding layers.
///
/// `InvalidArgument` is raised by the call that introduced the bad value,
/// never deferred to compile time. Template failures surface from
/// `Layer::build_rules` when a macro mapping is rendered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl BuildError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        BuildError::InvalidArgument(msg.into())
    }
}

/// Reject an empty key name, echoing the offending input.
pub(crate) fn require_key(what: &str, key: &str) -> Result<(), BuildError> {
    if key.is_empty() {
        return Err(BuildError::invalid(format!("{} cannot be empty", what)));
    }
    Ok(())
}

/// Reject a key list that is too short or contains empty names.
pub(crate) fn require_keys(what: &str, keys: &[String], min: usize) -> Result<(), BuildError> {
    if keys.len() < min {
        return Err(BuildError::invalid(format!(
            "{} must contain at least {} {}, got {:?}",
            what,
            min,
            if min == 1 { "key" } else { "keys" },
            keys
        )));
    }
    if keys.iter().any(|k| k.is_empty()) {
        return Err(BuildError::invalid(format!(
            "{} cannot contain empty keys, got {:?}",
            what, keys
        )));
    }
    Ok(())
}
