//! Server settings
//!
//! Layered lowest to highest: defaults, the client's settings object
//! (`initializationOptions` at startup, `workspace/didChangeConfiguration`
//! afterwards), then environment overrides.

use super::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const STRATEGY_ENV: &str = "MINISCRIPT_LSP_STRATEGY";
pub const PROCESSING_TIMEOUT_ENV: &str = "MINISCRIPT_LSP_PROCESSING_TIMEOUT_MS";

/// Which merger builds the cross-file type view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Only a document's transitive imports and includes.
    #[default]
    Dependency,
    /// Every workspace file, in dependency order.
    Workspace,
}

impl std::str::FromStr for MergeStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dependency" => Ok(MergeStrategy::Dependency),
            "workspace" => Ok(MergeStrategy::Workspace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypeAnalyzerConfig {
    pub strategy: MergeStrategy,
    /// Glob of files the workspace strategy leaves out.
    pub exclude: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default = "default_true")]
    pub autocomplete: bool,

    #[serde(default = "default_true")]
    pub hoverdocs: bool,

    #[serde(default = "default_true")]
    pub diagnostic: bool,

    #[serde(default)]
    pub type_analyzer: TypeAnalyzerConfig,

    /// Suffixes tried, in order, when an import path has none.
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,

    /// Quiet period before an edited document is reanalyzed.
    #[serde(default = "default_processing_timeout_ms")]
    pub processing_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_file_extensions() -> Vec<String> {
    vec!["src".to_string(), "ms".to_string()]
}

fn default_processing_timeout_ms() -> u64 {
    50
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            autocomplete: true,
            hoverdocs: true,
            diagnostic: true,
            type_analyzer: TypeAnalyzerConfig::default(),
            file_extensions: default_file_extensions(),
            processing_timeout_ms: default_processing_timeout_ms(),
        }
    }
}

impl Configuration {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::default().with_process_env()
    }

    pub fn with_process_env(self) -> Result<Self, ConfigurationError> {
        self.with_env(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`, which stands in for the process
    /// environment.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(STRATEGY_ENV) {
            self.type_analyzer.strategy =
                value
                    .parse()
                    .map_err(|_| ConfigurationError::InvalidEnvironment {
                        variable: STRATEGY_ENV,
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = lookup(PROCESSING_TIMEOUT_ENV) {
            self.processing_timeout_ms =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigurationError::InvalidEnvironment {
                        variable: PROCESSING_TIMEOUT_ENV,
                        value: value.clone(),
                    })?;
        }
        Ok(self)
    }

    /// Parse a settings object. Missing fields take their defaults.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigurationError> {
        let configuration: Configuration = serde_json::from_value(value)?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// Parse a `didChangeConfiguration` payload, which either is the settings
    /// object or nests it under `"miniscript"`.
    pub fn from_settings(settings: serde_json::Value) -> Result<Self, ConfigurationError> {
        match settings {
            serde_json::Value::Object(mut map) if map.contains_key("miniscript") => {
                let nested = map.remove("miniscript").unwrap_or_default();
                Self::from_value(nested)
            }
            other => Self::from_value(other),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(pattern) = &self.type_analyzer.exclude {
            glob::Pattern::new(pattern).map_err(|source| ConfigurationError::InvalidExclude {
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }
}
