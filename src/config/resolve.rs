//! Resolution of a schema against its value sources.
//!
//! Keypaths are processed once each, in schema traversal order. For every
//! keypath the override file wins over the environment whenever it supplies
//! a value at all, even a falsy one. Because `requiredWhen` gates read the
//! already-coerced value of another leaf, a gate must come earlier in
//! traversal order than the leaf it gates.

use std::collections::BTreeMap;

use super::env::EnvSource;
use super::error::FieldError;
use super::file;
use super::keypath;
use super::schema::Schema;
use super::validate::{validate, Diagnostic, Severity};
use super::value::{Table, Value};
use crate::Error;

/// The configuration tree produced by one resolution, with its diagnostics.
///
/// Leaves whose resolution produced an error still appear in the tree with
/// their fallback value; [`get`](Self::get) refuses to hand them out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub(super) config: Table,
    pub(super) errors: Vec<Diagnostic>,
    pub(super) warnings: Vec<Diagnostic>,
    field_errors: BTreeMap<String, Vec<Diagnostic>>,
}

impl Resolution {
    pub fn config(&self) -> &Table {
        &self.config
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors recorded for exactly this keypath.
    pub fn field_errors(&self, keypath: &str) -> &[Diagnostic] {
        self.field_errors
            .get(keypath)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Reads a value, failing if the keypath or any leaf beneath it has errors.
    pub fn get(&self, keypath: &str) -> Result<Option<&Value>, FieldError> {
        let nested = format!("{keypath}.");
        let errors: Vec<Diagnostic> = self
            .field_errors
            .iter()
            .filter(|(path, _)| path.as_str() == keypath || path.starts_with(&nested))
            .flat_map(|(_, errors)| errors.iter().cloned())
            .collect();

        if !errors.is_empty() {
            return Err(FieldError {
                keypath: keypath.to_string(),
                errors,
            });
        }

        Ok(keypath::get(keypath, Some(&self.config)))
    }

    /// Splits into the errors (if any) and the configuration tree.
    pub fn into_parts(self) -> (Option<Vec<Diagnostic>>, Table) {
        let errors = (!self.errors.is_empty()).then_some(self.errors);
        (errors, self.config)
    }

    /// Returns the configuration tree, or every error if there were any.
    pub fn into_result(self) -> Result<Table, Error> {
        match self.into_parts() {
            (None, config) => Ok(config),
            (Some(errors), _) => Err(Error::Invalid { errors }),
        }
    }

    fn record(&mut self, severity: Severity, diagnostic: Diagnostic) {
        match severity {
            Severity::Error => {
                self.field_errors
                    .entry(diagnostic.keypath.clone())
                    .or_default()
                    .push(diagnostic.clone());
                self.errors.push(diagnostic);
            }
            Severity::Warning => self.warnings.push(diagnostic),
        }
    }
}

/// Resolves every leaf of `schema`.
pub fn resolve(schema: &Schema, env: &dyn EnvSource) -> Resolution {
    let paths = schema.keypaths();
    check_gates(schema, &paths);

    let env_values: Vec<Option<Value>> = paths
        .iter()
        .map(|path| {
            schema
                .leaf(path)
                .and_then(|leaf| env.var(&leaf.env_var_name))
                .map(Value::String)
        })
        .collect();
    let override_values = file::override_values(schema.app_name(), &paths, env);

    let mut resolution = Resolution::default();
    let mut tree = Table::new();

    for ((path, from_env), from_file) in paths.iter().zip(env_values).zip(override_values) {
        let Some(leaf) = schema.leaf(path) else {
            continue;
        };

        let raw = from_file.or(from_env);
        let working = keypath::set(path, raw.clone(), &tree);
        let outcome = validate(&working, path, raw.as_ref(), leaf, env);
        tree = keypath::set(path, outcome.value, &working);

        if let Some((severity, diagnostic)) = outcome.diagnostic {
            resolution.record(severity, diagnostic);
        }
    }

    tracing::debug!(
        leaves = paths.len(),
        errors = resolution.errors.len(),
        warnings = resolution.warnings.len(),
        "resolved configuration"
    );

    resolution.config = tree;
    resolution
}

/// Logs `requiredWhen` gates that cannot have been coerced by the time the
/// gated leaf is validated. Such gates read as absent, which is `false`.
fn check_gates(schema: &Schema, paths: &[String]) {
    for (index, path) in paths.iter().enumerate() {
        let Some(gate) = schema.leaf(path).and_then(|leaf| leaf.required_when.as_deref()) else {
            continue;
        };

        match paths.iter().position(|candidate| candidate == gate) {
            Some(gate_index) if gate_index < index => {}
            Some(_) => tracing::warn!(
                keypath = %path,
                gate,
                "requiredWhen gate is not resolved before the leaf it gates"
            ),
            None => tracing::warn!(
                keypath = %path,
                gate,
                "requiredWhen gate is not a schema leaf"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::MapEnv;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn schema(doc: serde_json::Value) -> Schema {
        Schema::from_json(&doc).unwrap()
    }

    fn messages(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.message.as_str()).collect()
    }

    fn passing_simple() -> Schema {
        schema(json!({
            "env": {
                "desc": "the node environment",
                "env": "NODE_ENV",
                "format": ["development", "production", "test"],
                "caseInsensitive": true
            }
        }))
    }

    fn required_when() -> Schema {
        schema(json!({
            "tls": {
                "use": { "desc": "use tls", "env": "USE_TLS", "format": "boolean", "optional": true },
                "certPath": {
                    "desc": "path to the certificate",
                    "env": "TLS_CERT_PATH",
                    "format": "string",
                    "requiredWhen": "tls.use"
                }
            }
        }))
    }

    fn with_override(app_name: &str, contents: &str) -> (TempDir, MapEnv) {
        let xdg = TempDir::new().unwrap();
        let dir = xdg.path().join(app_name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("env.toml"), contents).unwrap();
        let env = MapEnv::new().with("XDG_CONFIG_HOME", xdg.path().display().to_string());
        (xdg, env)
    }

    #[test]
    fn test_simple_config_loads_environment() {
        let env = MapEnv::new().with("NODE_ENV", "test");
        let resolution = resolve(&passing_simple(), &env);

        assert!(resolution.is_ok());
        assert_eq!(resolution.config()["env"], Value::String("test".into()));
    }

    #[test]
    fn test_enum_inclusion_error() {
        let env = MapEnv::new().with("NODE_ENV", "bananas");
        let resolution = resolve(&passing_simple(), &env);

        assert_eq!(
            messages(resolution.errors()),
            vec!["env => \"bananas\" is not in \"development,production,test\""]
        );
    }

    #[test]
    fn test_enum_case_insensitive() {
        let env = MapEnv::new().with("NODE_ENV", "TEST");
        let resolution = resolve(&passing_simple(), &env);

        assert!(resolution.is_ok());
        assert_eq!(resolution.config()["env"], Value::String("test".into()));
    }

    #[test]
    fn test_missing_required_value() {
        let resolution = resolve(&passing_simple(), &MapEnv::new());
        assert_eq!(
            messages(resolution.errors()),
            vec!["value at \"env\" cannot be undefined"]
        );
    }

    #[test]
    fn test_optional_missing_value() {
        let optional = schema(json!({
            "env": { "desc": "env", "env": "NODE_ENV", "format": ["test"], "optional": true }
        }));
        let resolution = resolve(&optional, &MapEnv::new());

        assert!(resolution.is_ok());
        assert!(resolution.warnings().is_empty());
        assert_eq!(resolution.config().get("env"), None);
    }

    #[test]
    fn test_deep_config() {
        let deep = schema(json!({
            "one": {
                "logLevel": { "desc": "log level", "env": "LOG_LEVEL", "format": "string" },
                "two": {
                    "three": { "desc": "env", "env": "NODE_ENV", "format": ["test"] }
                }
            }
        }));
        let env = MapEnv::new()
            .with("NODE_ENV", "test")
            .with("LOG_LEVEL", "warn");
        let resolution = resolve(&deep, &env);

        assert!(resolution.is_ok());
        assert_eq!(
            resolution.get("one.logLevel").unwrap(),
            Some(&Value::String("warn".into()))
        );
        assert_eq!(
            resolution.get("one.two.three").unwrap(),
            Some(&Value::String("test".into()))
        );
    }

    #[test]
    fn test_required_when_gate_true() {
        let env = MapEnv::new()
            .with("USE_TLS", "true")
            .with("TLS_CERT_PATH", "/tmp/cert");
        let resolution = resolve(&required_when(), &env);

        assert!(resolution.is_ok());
        assert_eq!(resolution.get("tls.use").unwrap(), Some(&Value::Bool(true)));
        assert_eq!(
            resolution.get("tls.certPath").unwrap(),
            Some(&Value::String("/tmp/cert".into()))
        );
    }

    #[test]
    fn test_required_when_gate_true_and_value_missing() {
        let env = MapEnv::new().with("USE_TLS", "true");
        let resolution = resolve(&required_when(), &env);

        assert_eq!(
            messages(resolution.errors()),
            vec!["value at \"tls.certPath\" cannot be undefined"]
        );
        assert_eq!(resolution.field_errors("tls.certPath").len(), 1);
    }

    #[test]
    fn test_required_when_gate_false() {
        let env = MapEnv::new().with("USE_TLS", "false");
        let resolution = resolve(&required_when(), &env);

        assert!(resolution.is_ok());
        assert_eq!(resolution.get("tls.use").unwrap(), Some(&Value::Bool(false)));
        assert_eq!(resolution.get("tls.certPath").unwrap(), None);
        assert!(resolution.config()["tls"].as_table().is_some());
    }

    #[test]
    fn test_forward_gate_reads_false() {
        let forward = schema(json!({
            "certPath": { "desc": "cert", "env": "TLS_CERT_PATH", "format": "string", "requiredWhen": "useTls" },
            "useTls": { "desc": "use tls", "env": "USE_TLS", "format": "boolean" }
        }));
        let env = MapEnv::new().with("USE_TLS", "true");
        let resolution = resolve(&forward, &env);

        assert!(resolution.is_ok());
        assert_eq!(resolution.get("certPath").unwrap(), None);
    }

    #[test]
    fn test_override_file_wins_even_when_falsy() {
        let formats = schema(json!({
            "$appName": "cfg-test",
            "bool": { "desc": "a flag", "env": "BOOL", "format": "boolean" },
            "port": { "desc": "port", "env": "PORT", "format": "port" }
        }));
        let (_xdg, env) = with_override("cfg-test", "bool = false\n");
        let env = env.with("BOOL", "true").with("PORT", "80");

        let resolution = resolve(&formats, &env);
        assert!(resolution.is_ok());
        assert_eq!(resolution.config()["bool"], Value::Bool(false));
        assert_eq!(resolution.config()["port"], Value::Integer(80));
    }

    #[test]
    fn test_override_file_nested_values() {
        let xdg_schema = schema(json!({
            "$appName": "cfg-test",
            "port": { "desc": "port", "env": "PORT", "format": "port" },
            "nested": { "key": { "desc": "nested key", "env": "NESTED_KEY", "format": "string" } }
        }));
        let (_xdg, env) = with_override("cfg-test", "port = 8888\n\n[nested]\nkey = \"testing\"\n");

        let resolution = resolve(&xdg_schema, &env);
        assert!(resolution.is_ok());
        assert_eq!(resolution.get("port").unwrap(), Some(&Value::Integer(8888)));
        assert_eq!(
            resolution.get("nested.key").unwrap(),
            Some(&Value::String("testing".into()))
        );
    }

    #[test]
    fn test_optional_failure_is_warning_not_error() {
        let optional_port = schema(json!({
            "port": { "desc": "port", "env": "PORT", "format": "port", "optional": true }
        }));
        let env = MapEnv::new().with("PORT", "65536");
        let resolution = resolve(&optional_port, &env);

        assert!(resolution.is_ok());
        assert_eq!(
            messages(resolution.warnings()),
            vec!["\"port\" is not a valid port"]
        );
        assert_eq!(resolution.get("port").unwrap(), None);
    }

    #[test]
    fn test_get_refuses_faulted_paths_and_their_branches() {
        let env = MapEnv::new().with("USE_TLS", "true");
        let resolution = resolve(&required_when(), &env);

        assert!(resolution.get("tls.use").is_ok());
        let err = resolution.get("tls.certPath").unwrap_err();
        assert_eq!(err.keypath, "tls.certPath");
        let err = resolution.get("tls").unwrap_err();
        assert_eq!(err.errors.len(), 1);
    }

    #[test]
    fn test_into_parts_and_into_result() {
        let env = MapEnv::new().with("NODE_ENV", "test");
        let (errors, config) = resolve(&passing_simple(), &env).into_parts();
        assert!(errors.is_none());
        assert_eq!(config["env"], Value::String("test".into()));

        let result = resolve(&passing_simple(), &MapEnv::new()).into_result();
        match result {
            Err(Error::Invalid { errors }) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
