//! Configuration module.
//!
//! Handles compiler options and the TOML settings file they can be loaded from.

mod options;
mod settings;

pub use options::{CompilerOptions, LimitStrategy};
pub use settings::{expand_env_vars, CompilerSettings, Settings, SettingsError};
