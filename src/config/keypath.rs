//! Dotted keypath addressing over schema and configuration trees.
//!
//! Array indexes are not supported: every segment is a table key.

use std::sync::Arc;

use super::schema::{Branch, Node};
use super::value::{Table, Value};

/// Collects every leaf keypath under `branch`, depth-first in document order.
///
/// Recursion stops at leaves.
pub fn collect(branch: &Branch) -> Vec<String> {
    let mut paths = Vec::new();
    collect_into(branch, None, &mut paths);
    paths
}

fn collect_into(branch: &Branch, prefix: Option<&str>, paths: &mut Vec<String>) {
    for (key, node) in branch.iter() {
        let keypath = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.to_string(),
        };

        match node {
            Node::Leaf(_) => paths.push(keypath),
            Node::Branch(child) => collect_into(child, Some(&keypath), paths),
        }
    }
}

/// Reads the value at `keypath`, or `None` if any segment is missing.
pub fn get<'a>(keypath: &str, tree: Option<&'a Table>) -> Option<&'a Value> {
    let mut segments = keypath.split('.');
    let first = segments.next()?;
    let mut current = tree?.get(first)?;

    for segment in segments {
        current = current.as_table()?.get(segment)?;
    }

    Some(current)
}

/// Returns a copy of `tree` with `value` written at `keypath`.
///
/// Tables along the path are shallow-copied and created when missing; every
/// other branch is shared with `tree`. Writing `None` creates the
/// intermediate tables and leaves the final key absent.
pub fn set(keypath: &str, value: Option<Value>, tree: &Table) -> Table {
    let segments: Vec<&str> = keypath.split('.').collect();
    set_segments(&segments, value, tree)
}

fn set_segments(segments: &[&str], value: Option<Value>, tree: &Table) -> Table {
    let mut copy = tree.clone();

    let Some((first, rest)) = segments.split_first() else {
        return copy;
    };

    if rest.is_empty() {
        match value {
            Some(value) => {
                copy.insert(first.to_string(), value);
            }
            None => {
                copy.remove(*first);
            }
        }
        return copy;
    }

    let child = match tree.get(*first) {
        Some(Value::Table(existing)) => set_segments(rest, value, existing),
        _ => set_segments(rest, value, &Table::new()),
    };
    copy.insert(first.to_string(), Value::Table(Arc::new(child)));

    copy
}
