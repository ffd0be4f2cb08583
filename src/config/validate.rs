//! Per-leaf validation: requiredness, coercion dispatch, and the
//! error-versus-warning split.

use std::fmt;

use super::coerce::{self, Coercion};
use super::env::EnvSource;
use super::keypath;
use super::schema::{Format, Leaf};
use super::value::{Table, Value};

/// A message produced while validating one keypath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub keypath: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A required value is missing or does not fit its format.
    Error,
    /// An optional value is present but does not fit its format.
    Warning,
}

/// The result of validating one leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Value to write into the configuration tree, even on failure.
    pub value: Option<Value>,
    pub diagnostic: Option<(Severity, Diagnostic)>,
}

/// Validates and coerces the raw value of the leaf at `keypath`.
///
/// `tree` is the configuration built so far; `requiredWhen` gates read the
/// already-coerced value of another leaf from it.
pub fn validate(
    tree: &Table,
    keypath: &str,
    raw: Option<&Value>,
    leaf: &Leaf,
    env: &dyn EnvSource,
) -> Outcome {
    let required = !leaf.optional && gate_open(tree, leaf);

    // An optional URL is only assembled once one of its parts is supplied.
    let assembles = leaf.assembles_url()
        && (required
            || leaf
                .assemble_from
                .as_ref()
                .is_some_and(|parts| coerce::any_part_set(parts, env)));

    if raw.is_none() && !assembles {
        if required {
            return into_outcome(keypath, Severity::Error, coerce::present(keypath, raw));
        }
        let value = match leaf.format {
            Format::Boolean => Some(Value::Bool(false)),
            _ => None,
        };
        return Outcome {
            value,
            diagnostic: None,
        };
    }

    let coercion = match &leaf.format {
        Format::OneOf(allowed) => coerce::one_of(keypath, raw, allowed, leaf.case_insensitive),
        Format::Boolean => coerce::boolean(keypath, raw),
        Format::Number => coerce::number(keypath, raw),
        Format::Port => coerce::port(keypath, raw),
        Format::Path => coerce::path(keypath, raw),
        Format::Url => coerce::url(keypath, raw, leaf.assemble_from.as_ref(), env),
        Format::String => coerce::string(raw),
    };

    let severity = if required {
        Severity::Error
    } else {
        Severity::Warning
    };
    into_outcome(keypath, severity, coercion)
}

/// A leaf without `requiredWhen` is always gated open; otherwise the gate
/// leaf's value must coerce to `true`.
fn gate_open(tree: &Table, leaf: &Leaf) -> bool {
    let Some(gate) = leaf.required_when.as_deref() else {
        return true;
    };

    matches!(
        coerce::boolean(gate, keypath::get(gate, Some(tree))),
        Ok(Some(Value::Bool(true)))
    )
}

fn into_outcome(keypath: &str, severity: Severity, coercion: Coercion) -> Outcome {
    match coercion {
        Ok(value) => Outcome {
            value,
            diagnostic: None,
        },
        Err(rejected) => Outcome {
            value: rejected.fallback,
            diagnostic: Some((
                severity,
                Diagnostic {
                    keypath: keypath.to_string(),
                    message: rejected.message,
                },
            )),
        },
    }
}
