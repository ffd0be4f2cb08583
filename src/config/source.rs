//! Schema suppliers and schema layering.

use std::path::{Path, PathBuf};

use serde_json::Value as Json;

use super::ConfigError;

/// Key under `[package.metadata]` holding the schema in a Cargo manifest.
pub const CARGO_METADATA_KEY: &str = "cfg";
/// Key under `[package.metadata]` holding the test schema in a Cargo manifest.
pub const CARGO_TEST_METADATA_KEY: &str = "cfg-test";

/// Supplies a schema fragment.
pub trait SchemaSource: std::fmt::Debug {
    /// Returns `Ok(None)` when the source has no schema to offer.
    fn fragment(&self) -> Result<Option<Json>, ConfigError>;
}

/// A schema embedded in package metadata.
///
/// Cargo manifests carry it under `[package.metadata.cfg]` (test:
/// `[package.metadata.cfg-test]`); JSON manifests such as `package.json`
/// carry it under `config.cfg` (test: `configTest.cfg`).
#[derive(Debug, Clone)]
pub struct ManifestSource {
    path: PathBuf,
    test: bool,
}

impl ManifestSource {
    pub fn new(path: impl AsRef<Path>, test: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            test,
        }
    }
}

impl SchemaSource for ManifestSource {
    fn fragment(&self) -> Result<Option<Json>, ConfigError> {
        let Some(contents) = read_optional(&self.path)? else {
            return Ok(None);
        };

        let is_json = self.path.extension().is_some_and(|ext| ext == "json");
        let fragment = if is_json {
            let manifest: Json =
                serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
                    path: self.path.clone(),
                    source: e,
                })?;
            let pointer = if self.test {
                "/configTest/cfg"
            } else {
                "/config/cfg"
            };
            manifest.pointer(pointer).cloned()
        } else {
            let manifest: toml::Table =
                toml::from_str(&contents).map_err(|e| ConfigError::ManifestError {
                    path: self.path.clone(),
                    source: e,
                })?;
            let key = if self.test {
                CARGO_TEST_METADATA_KEY
            } else {
                CARGO_METADATA_KEY
            };
            manifest
                .get("package")
                .and_then(|p| p.get("metadata"))
                .and_then(|m| m.get(key))
                .map(serde_json::to_value)
                .transpose()
                .map_err(|e| ConfigError::InvalidSchema(e.to_string()))?
        };

        Ok(fragment.filter(Json::is_object))
    }
}

/// A standalone JSON schema document such as `config.json`.
#[derive(Debug, Clone)]
pub struct SchemaFileSource {
    path: PathBuf,
}

impl SchemaFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SchemaSource for SchemaFileSource {
    fn fragment(&self) -> Result<Option<Json>, ConfigError> {
        let Some(contents) = read_optional(&self.path)? else {
            return Ok(None);
        };

        let doc: Json = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: self.path.clone(),
            source: e,
        })?;

        if !doc.is_object() {
            return Err(ConfigError::InvalidSchema(format!(
                "{} must contain a JSON object",
                self.path.display()
            )));
        }

        Ok(Some(doc))
    }
}

/// An in-memory schema supplied by the caller.
#[derive(Debug, Clone)]
pub struct InlineSource(pub Json);

impl SchemaSource for InlineSource {
    fn fragment(&self) -> Result<Option<Json>, ConfigError> {
        Ok(Some(self.0.clone()))
    }
}

/// Merges `source`'s fragment on top of `base`.
///
/// A failing source is only fatal when there is no base schema to fall
/// back on.
pub fn layer(base: Option<Json>, source: &dyn SchemaSource) -> Result<Option<Json>, ConfigError> {
    match source.fragment() {
        Ok(Some(fragment)) => {
            tracing::debug!(?source, "merging schema fragment");
            Ok(Some(match base {
                Some(mut base) => {
                    deep_merge(&mut base, fragment);
                    base
                }
                None => fragment,
            }))
        }
        Ok(None) => Ok(base),
        Err(e) if base.is_some() => {
            tracing::warn!(?source, error = %e, "ignoring unusable schema source");
            Ok(base)
        }
        Err(e) => Err(e),
    }
}

/// Recursively merges objects; every other value (arrays included) is replaced.
pub fn deep_merge(base: &mut Json, overlay: Json) {
    match (base, overlay) {
        (Json::Object(base_map), Json::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "schema source not present");
            Ok(None)
        }
        Err(e) => Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
