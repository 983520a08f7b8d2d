// Karabinex Macro Templates
// Named, parameterized shell command patterns used by macro mappings

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;

use crate::Action;

/// Parameters substituted into a template's `{placeholders}`
pub type TemplateParams = IndexMap<String, String>;

/// Global template registry, seeded with the built-in templates
static TEMPLATE_REGISTRY: LazyLock<RwLock<TemplateRegistry>> =
    LazyLock::new(|| RwLock::new(TemplateRegistry::with_defaults()));

/// `{{` and `}}` are literal braces; `{name}` is a placeholder
static PLACEHOLDER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}"));

/// Errors that can occur while registering or rendering templates
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Missing template parameter '{key}' for template '{template}'")]
    MissingParameter { template: String, key: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Maps template names to command patterns
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, String>,
}

impl TemplateRegistry {
    /// Registry with no templates at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the built-in templates
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.add_internal(
            "typed_text",
            r#"osascript -e 'tell application "System Events" to keystroke "{text}"'"#,
        );
        registry.add_internal(
            "alfred",
            r#"osascript -e 'tell application id "com.runningwithcrayons.Alfred" to run trigger "{trigger}" in workflow "{workflow}" with argument "{arg}"'"#,
        );
        registry.add_internal(
            "keyboard_maestro",
            r#"osascript -e 'tell application "Keyboard Maestro Engine" to do script "{script}"'"#,
        );
        registry.add_internal("open", r#"open "{path}""#);
        registry.add_internal("shell", "{command}");
        registry
    }

    fn add_internal(&mut self, name: &str, template: &str) {
        self.templates.insert(name.to_string(), template.to_string());
    }

    /// Register a template; an existing template with the same name is replaced
    pub fn register(
        &mut self,
        name: impl Into<String>,
        template: impl Into<String>,
    ) -> Result<(), TemplateError> {
        let name = name.into();
        let template = template.into();
        if name.is_empty() {
            return Err(TemplateError::InvalidArgument(
                "Template name cannot be empty".into(),
            ));
        }
        if template.is_empty() {
            return Err(TemplateError::InvalidArgument(format!(
                "Template cannot be empty (name '{}')",
                name
            )));
        }
        self.templates.insert(name, template);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Template names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Substitute `params` into the named template
    pub fn render(&self, name: &str, params: &TemplateParams) -> Result<String, TemplateError> {
        let template = self
            .lookup(name)
            .ok_or_else(|| TemplateError::UnknownTemplate(name.to_string()))?;
        render_pattern(name, template, params)
    }
}

fn render_pattern(
    name: &str,
    template: &str,
    params: &TemplateParams,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    let placeholder = PLACEHOLDER
        .as_ref()
        .map_err(|e| TemplateError::InvalidArgument(e.to_string()))?;
    for caps in placeholder.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        match caps.get(1) {
            Some(key) => {
                let value = params.get(key.as_str()).ok_or_else(|| {
                    TemplateError::MissingParameter {
                        template: name.to_string(),
                        key: key.as_str().to_string(),
                    }
                })?;
                out.push_str(value);
            }
            // Escaped brace
            None => out.push_str(&whole.as_str()[..1]),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);

    Ok(out)
}

/// Build template parameters from key/value pairs
pub fn params<I, K, V>(pairs: I) -> TemplateParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Look up a template in the global registry
pub fn lookup_template(name: &str) -> Option<String> {
    TEMPLATE_REGISTRY.read().lookup(name).map(str::to_string)
}

/// Register a template in the global registry (last registration wins)
pub fn register_template(
    name: impl Into<String>,
    template: impl Into<String>,
) -> Result<(), TemplateError> {
    TEMPLATE_REGISTRY.write().register(name, template)
}

/// Render a template from the global registry
pub fn render_template(name: &str, params: &TemplateParams) -> Result<String, TemplateError> {
    TEMPLATE_REGISTRY.read().render(name, params)
}

/// Snapshot of the global registry
pub fn template_registry() -> TemplateRegistry {
    TEMPLATE_REGISTRY.read().clone()
}

/// Render a template into a single `shell_command` action
pub fn make_shell_command(
    name: &str,
    params: &TemplateParams,
) -> Result<Vec<Action>, TemplateError> {
    let command = render_template(name, params)?;
    Ok(vec![Action::shell(command)])
}
