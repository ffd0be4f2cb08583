//! User-level override file.
//!
//! When the schema names an application, `env.toml` is looked up in
//! `$XDG_CONFIG_HOME/<app>` or, failing that, `$HOME/.config/<app>`. Its
//! nested tables mirror schema keypaths. A missing, unreadable or malformed
//! file counts as absent and is never reported as an error.

use std::path::{Path, PathBuf};

use super::env::EnvSource;
use super::value::Value;

/// File name of the override file inside the application's config directory.
pub const OVERRIDE_FILE_NAME: &str = "env.toml";

/// Locates the application's config directory.
pub fn override_dir(app_name: &str, env: &dyn EnvSource) -> Option<PathBuf> {
    if let Some(xdg) = env.var("XDG_CONFIG_HOME") {
        return Some(Path::new(&xdg).join(app_name));
    }
    env.var("HOME")
        .map(|home| Path::new(&home).join(".config").join(app_name))
}

/// Loads the override file, if there is one.
pub fn load_override_file(app_name: &str, env: &dyn EnvSource) -> Option<toml::Table> {
    let path = override_dir(app_name, env)?.join(OVERRIDE_FILE_NAME);

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(table) => {
                tracing::debug!(path = %path.display(), "loaded override file");
                Some(table)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed override file");
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no override file");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable override file");
            None
        }
    }
}

/// Builds the override value for every keypath, in keypath order.
pub fn override_values(
    app_name: Option<&str>,
    keypaths: &[String],
    env: &dyn EnvSource,
) -> Vec<Option<Value>> {
    let table = app_name.and_then(|name| load_override_file(name, env));

    keypaths
        .iter()
        .map(|keypath| table.as_ref().and_then(|t| lookup(t, keypath)))
        .collect()
}

fn lookup(table: &toml::Table, keypath: &str) -> Option<Value> {
    let mut segments = keypath.split('.');
    let mut current = table.get(segments.next()?)?;

    for segment in segments {
        current = current.as_table()?.get(segment)?;
    }

    Some(Value::from(current.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::MapEnv;
    use std::fs;
    use tempfile::TempDir;

    const TOML_CONF: &str = r#"
port = 8888

[nested]
key = "testing"
"#;

    fn write_override(config_home: &Path, app_name: &str, contents: &str) {
        let dir = config_home.join(app_name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(OVERRIDE_FILE_NAME), contents).unwrap();
    }

    fn keypaths() -> Vec<String> {
        vec!["port".into(), "nested.key".into(), "nested.missing".into()]
    }

    #[test]
    fn test_override_dir_prefers_xdg() {
        let env = MapEnv::new()
            .with("XDG_CONFIG_HOME", "/xdg")
            .with("HOME", "/home/me");
        assert_eq!(override_dir("app", &env), Some(PathBuf::from("/xdg/app")));

        let env = MapEnv::new().with("HOME", "/home/me");
        assert_eq!(
            override_dir("app", &env),
            Some(PathBuf::from("/home/me/.config/app"))
        );

        assert_eq!(override_dir("app", &MapEnv::new()), None);
    }

    #[test]
    fn test_loads_from_home() {
        let home = TempDir::new().unwrap();
        write_override(&home.path().join(".config"), "cfg-test", TOML_CONF);
        let env = MapEnv::new().with("HOME", home.path().display().to_string());

        let values = override_values(Some("cfg-test"), &keypaths(), &env);
        assert_eq!(
            values,
            vec![
                Some(Value::Integer(8888)),
                Some(Value::String("testing".into())),
                None
            ]
        );
    }

    #[test]
    fn test_loads_from_xdg_config_home() {
        let xdg = TempDir::new().unwrap();
        write_override(xdg.path(), "cfg-test", TOML_CONF);
        let env = MapEnv::new().with("XDG_CONFIG_HOME", xdg.path().display().to_string());

        let values = override_values(Some("cfg-test"), &keypaths(), &env);
        assert_eq!(values[0], Some(Value::Integer(8888)));
    }

    #[test]
    fn test_without_app_name_reads_nothing() {
        let xdg = TempDir::new().unwrap();
        write_override(xdg.path(), "cfg-test", TOML_CONF);
        let env = MapEnv::new().with("XDG_CONFIG_HOME", xdg.path().display().to_string());

        let values = override_values(None, &keypaths(), &env);
        assert_eq!(values, vec![None, None, None]);
    }

    #[test]
    fn test_malformed_file_is_absent() {
        let xdg = TempDir::new().unwrap();
        write_override(xdg.path(), "cfg-test", "port = = 1");
        let env = MapEnv::new().with("XDG_CONFIG_HOME", xdg.path().display().to_string());

        assert!(load_override_file("cfg-test", &env).is_none());
        let values = override_values(Some("cfg-test"), &keypaths(), &env);
        assert_eq!(values, vec![None, None, None]);
    }
}
