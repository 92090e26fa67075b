/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Leaf template AST.
//!
//! A leaf is one template string (message content, header, footer). The
//! tokenizer's flat segments are folded into this tree by
//! [`compile_leaf`](crate::leaf::compile_leaf).

use std::borrow::Cow;

use serde_json::Value;

use crate::path::{PathSegment, parse_path};
use crate::scope::{ExecutionScope, ReservedRef};

/// A node in a compiled leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafNode {
    /// Literal text output as-is.
    Text(String),

    /// Interpolation: `{{path}}`
    Variable(VarRef),

    /// Inline block: `{{#if path}}...{{#else}}...{{#endif}}`
    Conditional(InlineConditional),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineConditional {
    pub condition: InlineCondition,
    pub then: Vec<LeafNode>,
    pub otherwise: Vec<LeafNode>,
}

/// The single, optionally negated path an inline `#if` tests.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineCondition {
    pub negated: bool,
    pub var: VarRef,
}

/// A variable reference inside a leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    /// Path text as written.
    pub raw: String,
    pub target: VarTarget,
    /// Byte offset of the tag inside the leaf's source string.
    pub offset: usize,
}

/// What a variable resolves against.
#[derive(Debug, Clone, PartialEq)]
pub enum VarTarget {
    /// Loop item, then root context, then globals.
    Plain(Vec<PathSegment>),
    /// `$item`, `$index`, `$parent`, `$globals`, `$ctx`.
    Reserved(ReservedRef),
    /// A `$name` that is not reserved; always resolves to nothing.
    UnknownReserved(String),
    /// A path that does not parse; always resolves to nothing.
    Malformed,
}

impl VarRef {
    pub fn parse(raw: &str, offset: usize) -> Self {
        let target = match parse_path(raw) {
            Some(segments) if segments.is_empty() => VarTarget::Malformed,
            Some(segments) => match segments.first() {
                Some(PathSegment::Key(head)) if head.starts_with('$') => {
                    match ReservedRef::from_segments(&segments, None) {
                        Ok(reserved) => VarTarget::Reserved(reserved),
                        Err(name) => VarTarget::UnknownReserved(name),
                    }
                }
                _ => VarTarget::Plain(segments),
            },
            None => VarTarget::Malformed,
        };
        Self {
            raw: raw.to_string(),
            target,
            offset,
        }
    }

    /// Resolve against a scope. Missing data is `None`, never an error.
    pub fn resolve<'a>(&self, scope: &ExecutionScope<'a>) -> Option<Cow<'a, Value>> {
        match &self.target {
            VarTarget::Plain(path) => scope.resolve_plain(path).map(Cow::Borrowed),
            VarTarget::Reserved(reserved) => scope.resolve_reserved(reserved),
            VarTarget::UnknownReserved(_) | VarTarget::Malformed => None,
        }
    }
}

impl InlineCondition {
    /// Parse `path` or `!path`. Returns `None` when the expression is anything
    /// other than a single path.
    pub fn parse(expr: &str, offset: usize) -> Option<Self> {
        let expr = expr.trim();
        let (negated, path) = match expr.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, expr),
        };
        if path.is_empty() || path.contains(char::is_whitespace) {
            return None;
        }
        let var = VarRef::parse(path, offset);
        if var.target == VarTarget::Malformed {
            return None;
        }
        Some(Self { negated, var })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ReservedTarget;

    #[test]
    fn test_var_ref_targets() {
        assert!(matches!(VarRef::parse("name", 0).target, VarTarget::Plain(_)));
        assert!(matches!(
            VarRef::parse("$item.name", 0).target,
            VarTarget::Reserved(ReservedRef {
                target: ReservedTarget::Item,
                ..
            })
        ));
        assert_eq!(
            VarRef::parse("$iten.name", 0).target,
            VarTarget::UnknownReserved("$iten".to_string())
        );
        assert_eq!(VarRef::parse("each items", 0).target, VarTarget::Plain(vec![
            PathSegment::Key("each items".to_string())
        ]));
        assert_eq!(VarRef::parse("a..b", 0).target, VarTarget::Malformed);
    }

    #[test]
    fn test_inline_condition_parse() {
        let c = InlineCondition::parse("!$item.hidden", 0).unwrap();
        assert!(c.negated);
        assert_eq!(c.var.raw, "$item.hidden");

        assert!(InlineCondition::parse("a == b", 0).is_none());
        assert!(InlineCondition::parse("!", 0).is_none());
        assert!(InlineCondition::parse("", 0).is_none());
    }
}
