pub mod config;
mod error;

pub use config::{Config, ConfigError, Diagnostic, EnvSource, MapEnv, Resolution, Schema, Value};
pub use error::Error;
