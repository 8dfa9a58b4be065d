//! Placeholder resolution for step configuration.
//!
//! Before a step runs, its `config` is materialized against the current data
//! context. The grammar is deliberately small:
//!
//! - a string exactly equal to `"$."` is replaced by the whole context;
//! - a string exactly equal to `"$.<path>"` is replaced by the value at the
//!   dot-separated `<path>`, or `null` when the path is absent. Segments are
//!   non-empty runs of ASCII letters, digits and `_`;
//! - every other leaf passes through untouched, including strings that merely
//!   contain `$.` somewhere inside them and expressions such as
//!   `"$.age >= 18"`.
//!
//! Objects and arrays are walked recursively. Resolution never fails.

use serde_json::{Map, Value};

/// Prefix that marks a placeholder string.
pub const PLACEHOLDER_PREFIX: &str = "$.";

/// Resolve every placeholder in `config` against `context`.
///
/// Returns a new value tree with the same shape as `config`.
pub fn resolve(config: &Value, context: &Value) -> Value {
    match config {
        Value::String(s) => match placeholder_path(s) {
            Some(path) => lookup(context, path).cloned().unwrap_or(Value::Null),
            None => config.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, context)).collect()),
        Value::Object(map) => {
            let resolved: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), resolve(v, context)))
                .collect();
            Value::Object(resolved)
        }
        _ => config.clone(),
    }
}

/// If `s` is a placeholder, return its path (`""` for the whole context).
pub fn placeholder_path(s: &str) -> Option<&str> {
    let path = s.strip_prefix(PLACEHOLDER_PREFIX)?;
    let well_formed = path.is_empty()
        || path.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    well_formed.then_some(path)
}

/// Whether `s` matches the placeholder grammar.
pub fn is_placeholder(s: &str) -> bool {
    placeholder_path(s).is_some()
}

/// Walk a dot-separated path into `context`.
///
/// An empty path yields the context itself. Numeric segments index into
/// arrays; on objects they are treated as ordinary keys.
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(context);
    }

    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
