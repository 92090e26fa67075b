/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Emptiness, equality, and stringification of resolved values.
//!
//! forEach skipping, `if` conditions, inline `{{#if}}` blocks, and leaf
//! interpolation all go through these helpers, so they agree on what
//! "empty" means.

use serde_json::Value;

/// Check whether a resolved value counts as empty.
///
/// Empty values:
/// - a missing value (`None`)
/// - `null`
/// - `false`
/// - zero
/// - `""`, `[]`, `{}`
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !*b,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
    }
}

pub fn is_non_empty(value: Option<&Value>) -> bool {
    !is_empty(value)
}

/// Structural equality, comparing numbers by numeric value so `1 == 1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Membership test for `contains` conditions.
///
/// Strings check for a substring; arrays check for an equal element.
pub fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

/// Render a value for interpolation into a message.
///
/// - String: as-is
/// - Number: decimal text (zero included, so `$index` renders `0`)
/// - `true`: `"true"`; `false` and `null`: empty
/// - Array: non-empty elements joined by newlines
/// - Object: compact JSON, or empty when it has no keys
pub fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Bool(true)) => "true".to_string(),
        Some(Value::Bool(false)) => String::new(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| stringify(Some(item)))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Some(Value::Object(map)) if map.is_empty() => String::new(),
        Some(v @ Value::Object(_)) => v.to_string(),
    }
}

/// Turn a resolved source value into the items a forEach iterates.
///
/// Arrays iterate their elements; any other non-empty value iterates once;
/// empty values iterate zero times.
pub fn into_items(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        Some(v) if is_non_empty(Some(&v)) => vec![v],
        _ => Vec::new(),
    }
}
