use crate::config::{ConfigError, Diagnostic};
use thiserror::Error;

/// Top-level error type for the schemacfg library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("configuration is invalid: {}", list(.errors))]
    Invalid { errors: Vec<Diagnostic> },
}

fn list(errors: &[Diagnostic]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
