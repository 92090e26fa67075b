/*
 * scope.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Execution scope: the root render context plus a chain of loop frames.
//!
//! Frames are borrowed, stack-allocated links. Each forEach iteration pushes a
//! frame whose parent is the enclosing frame, so depth strictly increases
//! inward and a frame can never point at itself or a descendant.

use std::borrow::Cow;

use serde_json::Value;

use crate::path::{PathSegment, get_in};

/// Names intercepted by the scope instead of the source registry.
pub const RESERVED_SOURCES: [&str; 5] = ["$item", "$index", "$parent", "$globals", "$ctx"];

/// What a reserved reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedTarget {
    /// The item of the selected frame.
    Item,
    /// The index of the selected frame.
    Index,
    /// The root context's `globals` object.
    Globals,
    /// The root context.
    Ctx,
}

/// A parsed `$`-reference such as `$item.name`, `$parent.$index`, or `$ctx.turns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedRef {
    pub target: ReservedTarget,
    /// Frames to walk up from the innermost one (`0` is the innermost).
    pub level: usize,
    pub path: Vec<PathSegment>,
}

impl ReservedRef {
    /// Build a reserved reference from path segments whose head is a
    /// `$`-name.
    ///
    /// Leading `$parent` segments each add a level; `parent_level` replaces
    /// the level contributed by a single leading `$parent` (from a DataRef's
    /// `level` argument). After the `$parent` run, an explicit `$item` or
    /// `$index` selects what to read from that frame.
    ///
    /// Returns the offending name when a `$`-segment is not reserved.
    pub fn from_segments(
        segments: &[PathSegment],
        parent_level: Option<usize>,
    ) -> Result<ReservedRef, String> {
        let mut level = 0;
        let mut rest = segments;
        let mut saw_parent = false;
        while let Some((PathSegment::Key(head), tail)) = rest.split_first() {
            if head != "$parent" {
                break;
            }
            level += 1;
            saw_parent = true;
            rest = tail;
        }
        if let (Some(explicit), 1) = (parent_level, level) {
            level = explicit.max(1);
        }

        let (target, path) = match rest.split_first() {
            Some((PathSegment::Key(head), tail)) if head.starts_with('$') => {
                match head.as_str() {
                    "$item" => (ReservedTarget::Item, tail),
                    "$index" => (ReservedTarget::Index, tail),
                    "$globals" if !saw_parent => (ReservedTarget::Globals, tail),
                    "$ctx" if !saw_parent => (ReservedTarget::Ctx, tail),
                    other => return Err(other.to_string()),
                }
            }
            _ if saw_parent => (ReservedTarget::Item, rest),
            _ => return Err(String::new()),
        };

        Ok(ReservedRef {
            target,
            level,
            path: path.to_vec(),
        })
    }
}

/// Per-iteration binding pushed by a forEach.
#[derive(Debug)]
pub struct ScopeFrame<'a> {
    pub item: &'a Value,
    pub index: usize,
    pub parent: Option<&'a ScopeFrame<'a>>,
    depth: usize,
}

impl<'a> ScopeFrame<'a> {
    pub fn new(item: &'a Value, index: usize, parent: Option<&'a ScopeFrame<'a>>) -> Self {
        let depth = parent.map_or(1, |p| p.depth + 1);
        Self {
            item,
            index,
            parent,
            depth,
        }
    }

    /// Nesting depth; the outermost loop frame has depth 1.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Everything a leaf or data reference can see at one point of execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionScope<'a> {
    context: &'a Value,
    frame: Option<&'a ScopeFrame<'a>>,
}

impl<'a> ExecutionScope<'a> {
    /// The top-level scope of a render, outside any loop.
    pub fn root(context: &'a Value) -> Self {
        Self {
            context,
            frame: None,
        }
    }

    /// A scope whose innermost frame is `frame`.
    pub fn with_frame<'b>(&self, frame: &'b ScopeFrame<'b>) -> ExecutionScope<'b>
    where
        'a: 'b,
    {
        ExecutionScope {
            context: self.context,
            frame: Some(frame),
        }
    }

    pub fn context(&self) -> &'a Value {
        self.context
    }

    pub fn globals(&self) -> Option<&'a Value> {
        self.context.get("globals")
    }

    pub fn frame(&self) -> Option<&'a ScopeFrame<'a>> {
        self.frame
    }

    pub fn depth(&self) -> usize {
        self.frame.map_or(0, ScopeFrame::depth)
    }

    /// The frame `level` steps above the innermost one.
    pub fn ancestor(&self, level: usize) -> Option<&'a ScopeFrame<'a>> {
        let mut frame = self.frame?;
        for _ in 0..level {
            frame = frame.parent?;
        }
        Some(frame)
    }

    /// Resolve a reserved reference against this scope.
    pub fn resolve_reserved(&self, reference: &ReservedRef) -> Option<Cow<'a, Value>> {
        match reference.target {
            ReservedTarget::Item => {
                let frame = self.ancestor(reference.level)?;
                get_in(frame.item, &reference.path).map(Cow::Borrowed)
            }
            ReservedTarget::Index => {
                let frame = self.ancestor(reference.level)?;
                let index = Value::from(frame.index);
                get_in(&index, &reference.path)
                    .cloned()
                    .map(Cow::Owned)
            }
            ReservedTarget::Globals => {
                get_in(self.globals()?, &reference.path).map(Cow::Borrowed)
            }
            ReservedTarget::Ctx => get_in(self.context, &reference.path).map(Cow::Borrowed),
        }
    }

    /// Resolve a plain (non-reserved) leaf path: the innermost loop item
    /// first, then the root context, then the context's `globals`.
    pub fn resolve_plain(&self, path: &[PathSegment]) -> Option<&'a Value> {
        if let Some(found) = self.frame.and_then(|frame| get_in(frame.item, path)) {
            return Some(found);
        }
        get_in(self.context, path).or_else(|| self.globals().and_then(|g| get_in(g, path)))
    }
}
