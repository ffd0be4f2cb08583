use std::path::PathBuf;
use thiserror::Error;

use super::validate::Diagnostic;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("schema is unknown: no schema was supplied and none could be loaded")]
    SchemaUnavailable,

    #[error("failed to read schema file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse schema file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to parse manifest '{path}': {source}")]
    ManifestError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("invalid schema leaf at '{keypath}': {source}")]
    InvalidLeaf {
        keypath: String,
        source: serde_json::Error,
    },

    #[error("failed to deserialize config: {0}")]
    DeserializeError(#[from] toml::de::Error),
}

/// Returned when reading a keypath whose resolution produced errors.
#[derive(Debug, Clone, Error)]
#[error("config value at '{keypath}' is invalid: {}", join(.errors))]
pub struct FieldError {
    pub keypath: String,
    pub errors: Vec<Diagnostic>,
}

fn join(errors: &[Diagnostic]) -> String {
    errors
        .iter()
        .map(|d| d.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
