use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use super::env::{EnvSource, ProcessEnv};
use super::resolve::{resolve, Resolution};
use super::schema::Schema;
use super::source::{layer, InlineSource, ManifestSource, SchemaFileSource};
use super::validate::Diagnostic;
use super::value::{table_to_toml, Table};
use super::ConfigError;

/// Default package manifest holding `[package.metadata.cfg]`.
pub const DEFAULT_MANIFEST: &str = "Cargo.toml";
/// Default schema file merged over the manifest schema.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";
/// Default schema file merged on top in test mode.
pub const DEFAULT_TEST_CONFIG_PATH: &str = "config.test.json";

type Handler<'a> = Box<dyn FnOnce(&[Diagnostic]) + 'a>;

/// Builder for resolving configuration against a schema.
///
/// ## Schema
///
/// A schema passed to [`with_schema`](Self::with_schema) is used as is.
/// Otherwise the schema is read from the package manifest
/// (`[package.metadata.cfg]` in `Cargo.toml`, or `config.cfg` in a JSON
/// manifest) and `config.json` is deep-merged on top of it. A schema file
/// that cannot be read or parsed is only fatal when no other schema was
/// found. In [test mode](Self::test_mode) the test fragments
/// (`[package.metadata.cfg-test]`, `config.test.json`) are merged on top of
/// whichever schema was found.
///
/// ## Values
///
/// Each leaf's value comes from the user's override file
/// (`$XDG_CONFIG_HOME/<$appName>/env.toml`, falling back to
/// `$HOME/.config/<$appName>/env.toml`) when it sets one, and from the
/// leaf's environment variable otherwise.
///
/// ## Example
///
/// ```no_run
/// use schemacfg::Config;
/// use serde::Deserialize;
/// use serde_json::json;
///
/// #[derive(Deserialize)]
/// struct MyConfig {
///     port: u16,
/// }
///
/// let config: MyConfig = Config::builder()
///     .with_schema(json!({
///         "port": { "desc": "listen port", "env": "PORT", "format": "port" }
///     }))
///     .build_into()?;
/// # Ok::<(), schemacfg::ConfigError>(())
/// ```
#[must_use = "builders do nothing until .build() or .resolve() is called"]
pub struct Config<'a> {
    schema: Option<Json>,
    env: Box<dyn EnvSource + 'a>,
    test_mode: bool,
    manifest_path: PathBuf,
    config_path: PathBuf,
    test_config_path: PathBuf,
    on_error: Option<Handler<'a>>,
    on_warning: Option<Handler<'a>>,
}

impl Default for Config<'_> {
    fn default() -> Self {
        Self {
            schema: None,
            env: Box::new(ProcessEnv),
            test_mode: false,
            manifest_path: PathBuf::from(DEFAULT_MANIFEST),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            test_config_path: PathBuf::from(DEFAULT_TEST_CONFIG_PATH),
            on_error: None,
            on_warning: None,
        }
    }
}

impl fmt::Debug for Config<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("schema", &self.schema)
            .field("env", &self.env)
            .field("test_mode", &self.test_mode)
            .field("manifest_path", &self.manifest_path)
            .field("config_path", &self.config_path)
            .field("test_config_path", &self.test_config_path)
            .field("on_error", &self.on_error.is_some())
            .field("on_warning", &self.on_warning.is_some())
            .finish()
    }
}

impl<'a> Config<'a> {
    /// Creates a new configuration builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Uses the given schema document instead of reading manifest and schema files.
    pub fn with_schema(mut self, schema: Json) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Reads environment variables from `env` instead of the process environment.
    pub fn with_env(mut self, env: impl EnvSource + 'a) -> Self {
        self.env = Box::new(env);
        self
    }

    /// Merges the test schema fragments on top of the base schema.
    ///
    /// In test mode [`build`](Self::build) does not invoke the handlers;
    /// use [`resolve`](Self::resolve) to read errors per keypath instead.
    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    /// Package manifest to read the schema from. Defaults to `Cargo.toml`.
    pub fn with_manifest(mut self, path: impl AsRef<Path>) -> Self {
        self.manifest_path = path.as_ref().to_path_buf();
        self
    }

    /// Schema file merged over the manifest schema. Defaults to `config.json`.
    pub fn with_config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = path.as_ref().to_path_buf();
        self
    }

    /// Schema file merged on top in test mode. Defaults to `config.test.json`.
    pub fn with_test_config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.test_config_path = path.as_ref().to_path_buf();
        self
    }

    /// Called by [`build`](Self::build) with every error, if there are any.
    ///
    /// Without a handler, errors are printed to stderr and the process exits
    /// with status 1.
    pub fn on_error(mut self, handler: impl FnOnce(&[Diagnostic]) + 'a) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    /// Called by [`build`](Self::build) with every warning, if there are any.
    ///
    /// Without a handler, warnings are printed to stdout.
    pub fn on_warning(mut self, handler: impl FnOnce(&[Diagnostic]) + 'a) -> Self {
        self.on_warning = Some(Box::new(handler));
        self
    }

    /// Determines the schema in effect.
    pub fn schema(&self) -> Result<Schema, ConfigError> {
        let mut doc = match &self.schema {
            Some(explicit) => layer(None, &InlineSource(explicit.clone()))?,
            None => {
                let base = layer(None, &ManifestSource::new(&self.manifest_path, false))?;
                layer(base, &SchemaFileSource::new(&self.config_path))?
            }
        };

        if self.test_mode {
            doc = layer(doc, &ManifestSource::new(&self.manifest_path, true))?;
            doc = layer(doc, &SchemaFileSource::new(&self.test_config_path))?;
        }

        let doc = doc.ok_or(ConfigError::SchemaUnavailable)?;
        Schema::from_json(&doc)
    }

    /// Resolves the configuration and returns it with its diagnostics.
    ///
    /// Handlers are not invoked; reading a faulted value through
    /// [`Resolution::get`] returns its errors instead.
    pub fn resolve(self) -> Result<Resolution, ConfigError> {
        let schema = self.schema()?;
        Ok(resolve(&schema, &*self.env))
    }

    /// Resolves the configuration, reports diagnostics through the handlers,
    /// and returns the configuration tree.
    ///
    /// In test mode nothing is reported upfront.
    pub fn build(mut self) -> Result<Table, ConfigError> {
        let on_error = self.on_error.take();
        let on_warning = self.on_warning.take();
        let test_mode = self.test_mode;
        let resolution = self.resolve()?;

        if test_mode {
            tracing::debug!(
                errors = resolution.errors.len(),
                warnings = resolution.warnings.len(),
                "test mode, diagnostics deferred"
            );
            return Ok(resolution.config);
        }

        if !resolution.errors.is_empty() {
            match on_error {
                Some(handler) => handler(&resolution.errors),
                None => exit_with_errors(&resolution.errors),
            }
        }

        if !resolution.warnings.is_empty() {
            match on_warning {
                Some(handler) => handler(&resolution.warnings),
                None => print_warnings(&resolution.warnings),
            }
        }

        Ok(resolution.config)
    }

    /// Like [`build`](Self::build), then deserializes the tree into `T`.
    ///
    /// URLs and paths deserialize from their string form.
    pub fn build_into<T: DeserializeOwned>(self) -> Result<T, ConfigError> {
        let config = self.build()?;
        let value = toml::Value::Table(table_to_toml(&config));
        value.try_into().map_err(ConfigError::DeserializeError)
    }
}

fn exit_with_errors(errors: &[Diagnostic]) -> ! {
    for error in errors {
        eprintln!("{error}");
    }
    std::process::exit(1);
}

fn print_warnings(warnings: &[Diagnostic]) {
    for warning in warnings {
        println!("{warning}");
    }
}
