// Karabinex Core Library
// Builders and layer compiler for Karabiner-Elements configurations

pub mod action;
pub mod analysis;
pub mod condition;
pub mod deploy;
pub mod docs;
pub mod document;
pub mod error;
pub mod key;
pub mod layer;
pub mod manipulator;
pub mod preset;
pub mod profile;
pub mod rule;
pub mod service;
pub mod template;

#[cfg(feature = "config")]
pub mod config;

pub use action::{Action, KeyAction};
pub use analysis::{compute_static_coverage, format_coverage_report, CoverageReport};
pub use condition::Condition;
pub use document::Document;
pub use error::BuildError;
pub use layer::{ComboOptions, Layer, MappingTarget};
pub use manipulator::{
    BasicManipulator, KeyOrder, KeyUpWhen, Manipulator, RawManipulator, SimultaneousOptions,
};
pub use preset::{
    app_switcher_enhancement, common_system_shortcuts, hyper_key_rule, vim_navigation, Preset,
};
pub use profile::{Device, Profile};
pub use rule::Rule;
pub use template::{
    make_shell_command, register_template, render_template, TemplateError, TemplateParams,
    TemplateRegistry,
};

#[cfg(feature = "config")]
pub use config::{Config, ConfigError};
