/*
 * leaf.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Leaf compilation and rendering.
//!
//! A compiled leaf is an immutable tree; rendering it is a pure function of
//! the scope it is given.

use crate::ast::{InlineCondition, InlineConditional, LeafNode, VarRef, VarTarget};
use crate::condition::inline_holds;
use crate::diagnostics::DiagnosticCollector;
use crate::scope::ExecutionScope;
use crate::tokenizer::{Segment, codes, tokenize};
use crate::value::stringify;

/// Diagnostic code for an inline condition that is not a single path.
pub const UNSUPPORTED_CONDITION: &str = "P-1-9";

/// Diagnostic code for a `{{...}}` whose text is not a valid path.
pub const MALFORMED_PATH: &str = "P-1-10";

/// A compiled template string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledLeaf {
    nodes: Vec<LeafNode>,
}

impl CompiledLeaf {
    pub fn nodes(&self) -> &[LeafNode] {
        &self.nodes
    }

    /// True when the leaf contains no variables or conditionals.
    pub fn is_static(&self) -> bool {
        self.nodes.iter().all(|n| matches!(n, LeafNode::Text(_)))
    }

    /// Every variable reference in the leaf, including inline conditions.
    pub fn variables(&self) -> Vec<&VarRef> {
        let mut vars = Vec::new();
        collect_vars(&self.nodes, &mut vars);
        vars
    }

    /// Render against a scope.
    pub fn render(&self, scope: &ExecutionScope<'_>) -> String {
        let mut out = String::new();
        render_nodes(&self.nodes, scope, &mut out);
        out
    }
}

fn collect_vars<'a>(nodes: &'a [LeafNode], out: &mut Vec<&'a VarRef>) {
    for node in nodes {
        match node {
            LeafNode::Text(_) => {}
            LeafNode::Variable(var) => out.push(var),
            LeafNode::Conditional(block) => {
                out.push(&block.condition.var);
                collect_vars(&block.then, out);
                collect_vars(&block.otherwise, out);
            }
        }
    }
}

fn render_nodes(nodes: &[LeafNode], scope: &ExecutionScope<'_>, out: &mut String) {
    for node in nodes {
        match node {
            LeafNode::Text(text) => out.push_str(text),
            LeafNode::Variable(var) => out.push_str(&stringify(var.resolve(scope).as_deref())),
            LeafNode::Conditional(block) => {
                let branch = if inline_holds(&block.condition, scope) {
                    &block.then
                } else {
                    &block.otherwise
                };
                render_nodes(branch, scope, out);
            }
        }
    }
}

/// An `#if` whose `#endif` has not been seen yet.
struct OpenBlock {
    condition: InlineCondition,
    then: Vec<LeafNode>,
    otherwise: Option<Vec<LeafNode>>,
    offset: usize,
}

impl OpenBlock {
    fn close(self) -> LeafNode {
        LeafNode::Conditional(InlineConditional {
            condition: self.condition,
            then: self.then,
            otherwise: self.otherwise.unwrap_or_default(),
        })
    }
}

fn current<'s>(root: &'s mut Vec<LeafNode>, stack: &'s mut [OpenBlock]) -> &'s mut Vec<LeafNode> {
    match stack.last_mut() {
        Some(block) => match &mut block.otherwise {
            Some(otherwise) => otherwise,
            None => &mut block.then,
        },
        None => root,
    }
}

/// Tokenize and compile one template string.
///
/// Never fails: tokenizer and block-structure problems are added to
/// `diagnostics` and the leaf keeps everything that could be understood.
pub fn compile_leaf(
    source: &str,
    field: &str,
    diagnostics: &mut DiagnosticCollector,
) -> CompiledLeaf {
    let tokenized = tokenize(source, field);
    diagnostics.extend(tokenized.diagnostics);

    let mut root = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();

    for segment in tokenized.segments {
        match segment {
            Segment::Text { text, .. } => {
                current(&mut root, &mut stack).push(LeafNode::Text(text));
            }
            Segment::Variable { path, offset } => {
                let var = VarRef::parse(&path, offset);
                if var.target == VarTarget::Malformed {
                    diagnostics.warn_at(
                        MALFORMED_PATH,
                        format!("'{}' is not a valid path and renders empty", path),
                        field,
                        offset,
                    );
                }
                current(&mut root, &mut stack).push(LeafNode::Variable(var));
            }
            Segment::BlockStart { expr, offset } => {
                let condition = match InlineCondition::parse(&expr, offset) {
                    Some(condition) => condition,
                    None => {
                        if !expr.trim().is_empty() {
                            diagnostics.error_at(
                                UNSUPPORTED_CONDITION,
                                format!(
                                    "Inline '#if' accepts a single path, optionally negated; got '{}'",
                                    expr
                                ),
                                field,
                                offset,
                            );
                        }
                        // Never true: the block renders its else branch.
                        InlineCondition {
                            negated: false,
                            var: VarRef {
                                raw: expr,
                                target: VarTarget::Malformed,
                                offset,
                            },
                        }
                    }
                };
                stack.push(OpenBlock {
                    condition,
                    then: Vec::new(),
                    otherwise: None,
                    offset,
                });
            }
            Segment::BlockElse { offset } => match stack.last_mut() {
                None => diagnostics.error_at(
                    codes::UNMATCHED_ELSE,
                    "'else' without a matching '#if'",
                    field,
                    offset,
                ),
                Some(block) if block.otherwise.is_some() => diagnostics.error_at(
                    codes::DUPLICATE_ELSE,
                    "'#if' block has more than one 'else'",
                    field,
                    offset,
                ),
                Some(block) => block.otherwise = Some(Vec::new()),
            },
            Segment::BlockEnd { offset } => match stack.pop() {
                Some(block) => {
                    let node = block.close();
                    current(&mut root, &mut stack).push(node);
                }
                None => diagnostics.error_at(
                    codes::UNMATCHED_END,
                    "'endif' without a matching '#if'",
                    field,
                    offset,
                ),
            },
        }
    }

    while let Some(block) = stack.pop() {
        diagnostics.error_at(
            codes::UNCLOSED_BLOCK,
            "'#if' block is never closed",
            field,
            block.offset,
        );
        let node = block.close();
        current(&mut root, &mut stack).push(node);
    }

    CompiledLeaf { nodes: root }
}
