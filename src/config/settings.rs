//! TOML-based configuration.
//!
//! Supports a config file (dqlc.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [compiler]
//! driver = "${DB_DRIVER}"
//! limit = "records"
//! quote_identifiers = false
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::options::{CompilerOptions, LimitStrategy};
use crate::sql::dialect::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub compiler: CompilerSettings,
}

/// `[compiler]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Connection driver name (pgsql, mysql, sqlite, mssql, oracle).
    /// Supports `${ENV_VAR}` expansion.
    pub driver: String,

    pub limit: LimitStrategy,

    pub quote_identifiers: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            driver: "pgsql".to_string(),
            limit: LimitStrategy::Records,
            quote_identifiers: false,
        }
    }
}

impl Settings {
    /// Parse settings from TOML source.
    pub fn parse(source: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(source)?)
    }

    /// Load settings from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `DQLC_CONFIG`
    /// 2. `./dqlc.toml`
    /// 3. `~/.config/dqlc/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("DQLC_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("dqlc.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("dqlc").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }

    /// Resolve the compiler options these settings describe.
    pub fn compiler_options(&self) -> Result<CompilerOptions, SettingsError> {
        let driver = expand_env_vars(&self.compiler.driver)?;
        let dialect = Dialect::from_driver_name(&driver)
            .map_err(|_| SettingsError::UnsupportedDriver(driver.clone()))?;

        Ok(CompilerOptions::default()
            .with_dialect(dialect)
            .with_limit_strategy(self.compiler.limit)
            .with_quoted_identifiers(self.compiler.quote_identifiers))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    var_name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
