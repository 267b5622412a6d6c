//! Typed errors of the core.
//!
//! Expected failures (missing files, syntax errors, unresolved imports) are
//! modelled as data instead; these cover malformed input handed to the core.

use thiserror::Error;

/// A serialized [`DependencyLocation`](super::dependency::DependencyLocation)
/// that could not be parsed back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyLocationError {
    #[error("missing '!' separator in dependency location '{0}'")]
    MissingSeparator(String),
    #[error("unknown dependency kind '{0}'")]
    UnknownKind(String),
    #[error("dependency location '{0}' has an empty target")]
    EmptyLocation(String),
}

/// Settings that could not be applied.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("invalid settings payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("invalid exclude pattern '{pattern}': {source}")]
    InvalidExclude {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("invalid value '{value}' for {variable}")]
    InvalidEnvironment { variable: &'static str, value: String },
}
