//! Schema model: a tree of named branches whose leaves describe one
//! configurable value each.
//!
//! Schema documents are JSON objects. An object carrying `desc`, `env` and
//! `format` is a leaf; any other object is a branch. The reserved top-level
//! key `$appName` names the application for override-file lookup.
//!
//! ```json
//! {
//!   "$appName": "my-app",
//!   "port": { "desc": "listen port", "env": "PORT", "format": "port" },
//!   "tls": {
//!     "use": { "desc": "enable tls", "env": "USE_TLS", "format": "boolean", "optional": true },
//!     "certPath": { "desc": "certificate", "env": "TLS_CERT_PATH", "format": "path", "requiredWhen": "tls.use" }
//!   }
//! }
//! ```

use serde::Deserialize;
use serde_json::Value as Json;

use super::ConfigError;

/// Reserved top-level key naming the application.
pub const APP_NAME_KEY: &str = "$appName";

/// A parsed configuration schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    app_name: Option<String>,
    root: Branch,
}

/// A named grouping of further schema nodes, in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Branch {
    children: Vec<(String, Node)>,
}

/// A schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Leaf),
    Branch(Branch),
}

/// Describes a single configurable value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaf {
    #[serde(rename = "desc")]
    pub description: String,
    #[serde(rename = "env")]
    pub env_var_name: String,
    pub format: Format,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub required_when: Option<String>,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub assemble_from: Option<AssembleFrom>,
}

/// The format contract of a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "FormatDef")]
pub enum Format {
    Boolean,
    Number,
    Port,
    Url,
    Path,
    String,
    /// The value must equal one of the listed literals.
    OneOf(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FormatDef {
    Tag(String),
    OneOf(Vec<String>),
}

impl From<FormatDef> for Format {
    fn from(def: FormatDef) -> Self {
        match def {
            FormatDef::OneOf(list) => Format::OneOf(list),
            FormatDef::Tag(tag) => match tag.as_str() {
                "boolean" => Format::Boolean,
                "number" => Format::Number,
                "port" => Format::Port,
                "url" => Format::Url,
                "path" => Format::Path,
                "string" => Format::String,
                other => {
                    tracing::debug!(format = other, "unknown format tag, passing values through");
                    Format::String
                }
            },
        }
    }
}

/// Environment variables a URL can be assembled from when the leaf's own
/// value does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct AssembleFrom {
    pub protocol: Option<UrlPart>,
    pub host: Option<UrlPart>,
    pub port: Option<UrlPart>,
    pub username: Option<UrlPart>,
    pub password: Option<UrlPart>,
    pub pathname: Option<UrlPart>,
    pub search: Option<UrlPart>,
}

/// One URL component source: an environment variable, optionally with a
/// literal default.
///
/// Written either as `"HOST"` or as `{ "env": "PORT", "default": "8080" }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UrlPart {
    Env(String),
    WithDefault {
        env: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl UrlPart {
    pub fn env_var_name(&self) -> &str {
        match self {
            UrlPart::Env(env) | UrlPart::WithDefault { env, .. } => env,
        }
    }

    pub fn default_value(&self) -> Option<&str> {
        match self {
            UrlPart::Env(_) => None,
            UrlPart::WithDefault { default, .. } => default.as_deref(),
        }
    }
}

impl Leaf {
    /// Creates a required leaf with the given format.
    pub fn new(
        description: impl Into<String>,
        env_var_name: impl Into<String>,
        format: Format,
    ) -> Self {
        Self {
            description: description.into(),
            env_var_name: env_var_name.into(),
            format,
            optional: false,
            required_when: None,
            case_insensitive: false,
            assemble_from: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn required_when(mut self, keypath: impl Into<String>) -> Self {
        self.required_when = Some(keypath.into());
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn assemble_from(mut self, parts: AssembleFrom) -> Self {
        self.assemble_from = Some(parts);
        self
    }

    /// Whether this leaf can produce a value without one being supplied.
    pub(crate) fn assembles_url(&self) -> bool {
        self.format == Format::Url && self.assemble_from.is_some()
    }
}

impl Schema {
    /// Parses a schema document.
    pub fn from_json(doc: &Json) -> Result<Self, ConfigError> {
        let object = doc.as_object().ok_or_else(|| {
            ConfigError::InvalidSchema("schema root must be an object".to_string())
        })?;

        let app_name = match object.get(APP_NAME_KEY) {
            None => None,
            Some(Json::String(name)) => Some(name.clone()),
            Some(other) => {
                tracing::warn!(value = %other, "ignoring non-string {APP_NAME_KEY}");
                None
            }
        };

        Ok(Self {
            app_name,
            root: parse_branch(object, None)?,
        })
    }

    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    pub fn root(&self) -> &Branch {
        &self.root
    }

    /// All leaf keypaths in traversal order.
    pub fn keypaths(&self) -> Vec<String> {
        super::keypath::collect(&self.root)
    }

    /// Looks up the leaf at a dotted keypath.
    pub fn leaf(&self, keypath: &str) -> Option<&Leaf> {
        let mut branch = &self.root;
        let mut segments = keypath.split('.').peekable();

        while let Some(segment) = segments.next() {
            match (branch.get(segment)?, segments.peek()) {
                (Node::Leaf(leaf), None) => return Some(leaf),
                (Node::Branch(next), Some(_)) => branch = next,
                _ => return None,
            }
        }

        None
    }
}

impl Branch {
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.children
            .iter()
            .find_map(|(name, node)| (name == key).then_some(node))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

fn is_leaf(object: &serde_json::Map<String, Json>) -> bool {
    ["desc", "env", "format"]
        .iter()
        .all(|key| object.contains_key(*key))
}

fn parse_branch(
    object: &serde_json::Map<String, Json>,
    prefix: Option<&str>,
) -> Result<Branch, ConfigError> {
    let mut children = Vec::new();

    for (key, value) in object {
        if prefix.is_none() && key == APP_NAME_KEY {
            continue;
        }

        let keypath = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };

        let Some(child) = value.as_object() else {
            tracing::debug!(%keypath, "ignoring non-object schema member");
            continue;
        };

        let node = if is_leaf(child) {
            let leaf = Leaf::deserialize(value).map_err(|source| ConfigError::InvalidLeaf {
                keypath: keypath.clone(),
                source,
            })?;
            Node::Leaf(leaf)
        } else {
            Node::Branch(parse_branch(child, Some(&keypath))?)
        };

        children.push((key.clone(), node));
    }

    Ok(Branch { children })
}
