//! Per-format coercion of raw values.
//!
//! Every coercer maps a keypath and an optional raw value to either the
//! coerced value or a [`Rejected`] carrying the message to report and the
//! value to write anyway.

use std::fmt;
use std::path::PathBuf;

use url::Url;

use super::env::EnvSource;
use super::schema::{AssembleFrom, UrlPart};
use super::value::Value;

/// Largest integer an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A value that failed its format contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub message: String,
    pub fallback: Option<Value>,
}

impl Rejected {
    fn new(message: impl Into<String>, fallback: Option<Value>) -> Self {
        Self {
            message: message.into(),
            fallback,
        }
    }
}

pub type Coercion = Result<Option<Value>, Rejected>;

pub fn present(keypath: &str, raw: Option<&Value>) -> Coercion {
    match raw {
        Some(value) => Ok(Some(value.clone())),
        None => Err(Rejected::new(
            format!("value at \"{keypath}\" cannot be undefined"),
            None,
        )),
    }
}

pub fn string(raw: Option<&Value>) -> Coercion {
    Ok(raw.cloned())
}

pub fn boolean(keypath: &str, raw: Option<&Value>) -> Coercion {
    let value = match raw {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => match other.to_string().to_lowercase().as_str() {
            "true" | "t" | "1" => true,
            "false" | "f" | "0" => false,
            _ => {
                return Err(Rejected::new(
                    format!("\"{keypath}\" is not truthy or falsy"),
                    Some(Value::Bool(false)),
                ))
            }
        },
    };

    Ok(Some(Value::Bool(value)))
}

pub fn number(keypath: &str, raw: Option<&Value>) -> Coercion {
    match raw.and_then(numeric) {
        Some(n) => Ok(Some(number_value(n))),
        None => Err(Rejected::new(
            format!("\"{keypath}\" cannot be cast to a number"),
            None,
        )),
    }
}

pub fn port(keypath: &str, raw: Option<&Value>) -> Coercion {
    match raw.and_then(numeric) {
        Some(n) if n.fract() == 0.0 && (1.0..=65535.0).contains(&n) => {
            Ok(Some(Value::Integer(n as i64)))
        }
        _ => Err(Rejected::new(
            format!("\"{keypath}\" is not a valid port"),
            None,
        )),
    }
}

pub fn path(keypath: &str, raw: Option<&Value>) -> Coercion {
    let candidate = match raw {
        Some(Value::Path(p)) => Some(p.clone()),
        Some(other) => Some(PathBuf::from(other.to_string())),
        None => None,
    };

    match candidate {
        Some(p) if p.exists() => Ok(Some(Value::Path(p))),
        Some(p) => Err(Rejected::new(
            format!("for {keypath}, no file present at {}", p.display()),
            None,
        )),
        None => Err(Rejected::new(
            format!("for {keypath}, no file present at undefined"),
            None,
        )),
    }
}

/// Checks membership in a literal list, yielding the matching member.
pub fn one_of(
    keypath: &str,
    raw: Option<&Value>,
    allowed: &[String],
    case_insensitive: bool,
) -> Coercion {
    let text = raw.map_or_else(|| "undefined".to_string(), Value::to_string);

    let found = allowed.iter().find(|member| **member == text).or_else(|| {
        if !case_insensitive || raw.is_none() {
            return None;
        }
        let lowered = text.to_lowercase();
        allowed
            .iter()
            .find(|member| member.to_lowercase() == lowered)
    });

    match found {
        Some(member) if raw.is_some() => Ok(Some(Value::String(member.clone()))),
        _ => Err(Rejected::new(
            format!("{keypath} => \"{text}\" is not in \"{}\"", allowed.join(",")),
            raw.cloned(),
        )),
    }
}

/// Parses a URL, falling back to assembling one from environment parts.
pub fn url(
    keypath: &str,
    raw: Option<&Value>,
    assemble_from: Option<&AssembleFrom>,
    env: &dyn EnvSource,
) -> Coercion {
    let direct = match raw {
        Some(Value::Url(u)) => Some(u.clone()),
        Some(other) => Url::parse(&other.to_string()).ok(),
        None => None,
    };

    if let Some(u) = direct {
        return Ok(Some(Value::Url(u)));
    }

    let base = format!("\"{keypath}\" cannot be cast to a URL");
    let Some(parts) = assemble_from else {
        return Err(Rejected::new(base, None));
    };

    match assemble(parts, env) {
        Ok(u) => Ok(Some(Value::Url(u))),
        Err(failure) => Err(Rejected::new(
            format!("{base}; attempted to assemble from parts but {failure}"),
            None,
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblyFailure {
    Missing(&'static str),
    Unknown,
}

impl fmt::Display for AssemblyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyFailure::Missing(part) => write!(f, "the {part} is missing"),
            AssemblyFailure::Unknown => f.write_str("failed for an unknown reason"),
        }
    }
}

fn lookup(part: Option<&UrlPart>, env: &dyn EnvSource) -> Option<String> {
    let part = part?;
    env.var(part.env_var_name())
        .filter(|value| !value.is_empty())
        .or_else(|| part.default_value().map(str::to_string))
}

/// Whether any URL part has its variable set. Defaults do not count.
pub(crate) fn any_part_set(parts: &AssembleFrom, env: &dyn EnvSource) -> bool {
    [
        &parts.protocol,
        &parts.host,
        &parts.port,
        &parts.username,
        &parts.password,
        &parts.pathname,
        &parts.search,
    ]
    .into_iter()
    .flatten()
    .any(|part| env.var(part.env_var_name()).is_some_and(|value| !value.is_empty()))
}

fn assemble(parts: &AssembleFrom, env: &dyn EnvSource) -> Result<Url, AssemblyFailure> {
    use AssemblyFailure::{Missing, Unknown};

    let protocol = lookup(parts.protocol.as_ref(), env).ok_or(Missing("protocol"))?;
    let host = lookup(parts.host.as_ref(), env).ok_or(Missing("host"))?;

    let scheme = protocol.trim_end_matches('/').trim_end_matches(':');
    let mut url = Url::parse(&format!("{scheme}://{host}")).map_err(|_| Unknown)?;

    if let Some(port) = lookup(parts.port.as_ref(), env) {
        let port: u16 = port.parse().map_err(|_| Unknown)?;
        url.set_port(Some(port)).map_err(|_| Unknown)?;
    }
    if let Some(username) = lookup(parts.username.as_ref(), env) {
        url.set_username(&username).map_err(|_| Unknown)?;
    }
    if let Some(password) = lookup(parts.password.as_ref(), env) {
        url.set_password(Some(&password)).map_err(|_| Unknown)?;
    }
    if let Some(pathname) = lookup(parts.pathname.as_ref(), env) {
        url.set_path(&pathname);
    }
    if let Some(search) = lookup(parts.search.as_ref(), env) {
        url.set_query(Some(search.trim_start_matches('?')));
    }

    Ok(url)
}

/// Numeric cast with the leniency of a JavaScript `Number()` call.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) if f.is_nan() => None,
        Value::Float(f) => Some(*f),
        Value::Table(_) => None,
        other => parse_numeric(&other.to_string()),
    }
}

fn parse_numeric(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0.0);
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = text.strip_prefix(prefix) {
            if digits.is_empty() {
                return None;
            }
            return digits.chars().try_fold(0.0, |acc: f64, c| {
                c.to_digit(radix).map(|d| acc * f64::from(radix) + f64::from(d))
            });
        }
    }

    let unsigned = text.trim_start_matches(['+', '-']);
    if unsigned == "Infinity" {
        return text.parse::<f64>().ok();
    }
    if !unsigned
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }

    text.parse::<f64>().ok().filter(|n| !n.is_nan())
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::Integer(n as i64)
    } else {
        Value::Float(n)
    }
}
