/*
 * path.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Dotted and bracketed path lookup into JSON values.
//!
//! Paths look like `character.traits[0]`, `turns.0.text`, or
//! `lore["key with spaces"]`. Lookups never fail loudly: any segment that
//! cannot be followed yields `None`.

use serde_json::Value;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse a path into segments.
///
/// Returns `None` for malformed paths (empty segments, unclosed brackets).
/// The empty string parses to no segments.
pub fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let path = path.trim();
    let mut segments = Vec::new();
    if path.is_empty() {
        return Some(segments);
    }

    let bytes = path.as_bytes();
    let mut i = 0;
    let mut expect_key = true;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                let close = path[i..].find(']')? + i;
                let inner = path[i + 1..close].trim();
                segments.push(parse_bracket(inner)?);
                i = close + 1;
                expect_key = false;
            }
            b'.' => {
                if expect_key {
                    // `a..b` or a leading dot
                    return None;
                }
                i += 1;
                expect_key = true;
            }
            _ => {
                let end = path[i..].find(['.', '[']).map_or(path.len(), |p| p + i);
                let key = path[i..end].trim();
                if key.is_empty() {
                    return None;
                }
                segments.push(PathSegment::Key(key.to_string()));
                i = end;
                expect_key = false;
            }
        }
    }
    if expect_key {
        // trailing dot
        return None;
    }
    Some(segments)
}

fn parse_bracket(inner: &str) -> Option<PathSegment> {
    if let Ok(index) = inner.parse::<usize>() {
        return Some(PathSegment::Index(index));
    }
    let unquoted = inner
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))?;
    Some(PathSegment::Key(unquoted.to_string()))
}

/// Follow parsed segments from `value`.
pub fn get_in<'a>(value: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get(key),
            (Value::Object(map), PathSegment::Index(index)) => map.get(&index.to_string()),
            (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
            (Value::Array(items), PathSegment::Key(key)) => {
                key.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            _ => None,
        })
}

/// Resolve `path` against `scope`, falling back to `scope.globals` only when
/// the direct lookup misses entirely.
pub fn resolve_path<'a>(scope: &'a Value, path: &str) -> Option<&'a Value> {
    resolve_path_with_globals(scope, scope.get("globals"), path)
}

/// Resolve `path` against `scope`, falling back to an explicit globals object.
pub fn resolve_path_with_globals<'a>(
    scope: &'a Value,
    globals: Option<&'a Value>,
    path: &str,
) -> Option<&'a Value> {
    let segments = parse_path(path)?;
    get_in(scope, &segments).or_else(|| globals.and_then(|g| get_in(g, &segments)))
}
