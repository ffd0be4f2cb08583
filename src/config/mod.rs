//! Schema-driven configuration resolution.

mod builder;
mod coerce;
mod env;
mod error;
mod file;
pub mod keypath;
mod resolve;
mod schema;
mod source;
mod validate;
mod value;

pub use builder::{Config, DEFAULT_CONFIG_PATH, DEFAULT_MANIFEST, DEFAULT_TEST_CONFIG_PATH};
pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use error::{ConfigError, FieldError};
pub use file::OVERRIDE_FILE_NAME;
pub use resolve::Resolution;
pub use schema::{AssembleFrom, Branch, Format, Leaf, Node, Schema, UrlPart, APP_NAME_KEY};
pub use source::{ManifestSource, SchemaFileSource, SchemaSource};
pub use validate::{Diagnostic, Severity};
pub use value::{Table, Value};
