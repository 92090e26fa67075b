/*
 * layout.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Layout assembly.
//!
//! Walks the template layout and produces the final flat message list:
//! slot outputs are substituted in place, literal messages are kept when
//! they were charged, and injections are spliced in at their anchors.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use tracing::debug;

use crate::budget::BudgetManager;
use crate::model::{ChatCompletionMessage, GlobalAnchor};
use crate::options::{AttachmentDefaults, Injection};
use crate::plan::CompiledLayoutNode;
use crate::scope::ExecutionScope;
use crate::slots::{SlotOutput, charge, render_block};

/// Render and charge every literal layout message, in layout order.
///
/// The result is indexed by layout position; positions holding something
/// other than a kept literal are `None`.
pub fn render_literals(
    layout: &[CompiledLayoutNode],
    scope: &ExecutionScope<'_>,
    budget: &mut BudgetManager,
) -> Vec<Option<ChatCompletionMessage>> {
    layout
        .iter()
        .map(|node| match node {
            CompiledLayoutNode::Message(block) => charge(render_block(Some(block), scope), budget),
            CompiledLayoutNode::Slot(_) | CompiledLayoutNode::Anchor(_) => None,
        })
        .collect()
}

/// An injection that fit its lane, ready to place.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedInjection {
    pub anchor: GlobalAnchor,
    pub message: ChatCompletionMessage,
}

/// Charge injections in the order given.
///
/// Returns the injections that fit and the indices of those dropped.
pub fn charge_injections(
    injections: &[Injection],
    defaults: &AttachmentDefaults,
    budget: &mut BudgetManager,
) -> (Vec<PlacedInjection>, Vec<usize>) {
    let mut placed = Vec::new();
    let mut dropped = Vec::new();
    for (index, injection) in injections.iter().enumerate() {
        let lane = injection.lane.as_deref().unwrap_or(&defaults.lane);
        let cost = budget.estimate_tokens(&injection.content);
        let fits = !injection.content.is_empty()
            && budget.with_lane(lane, |budget| {
                if budget.can_fit_token_estimate(cost) {
                    budget.consume(cost);
                    true
                } else {
                    false
                }
            });
        if !fits {
            debug!(index, lane, cost, "injection dropped");
            dropped.push(index);
            continue;
        }
        placed.push(PlacedInjection {
            anchor: injection.anchor,
            message: ChatCompletionMessage {
                role: injection.role.unwrap_or(defaults.role),
                content: injection.content.clone(),
                name: injection.name.clone(),
                prefix: false,
            },
        });
    }
    (placed, dropped)
}

/// Produce the final message list.
///
/// `top` injections lead and `bottom` injections trail. Injections for an
/// anchor that the layout never places are appended before the `bottom`
/// ones, so nothing that was charged is lost.
pub fn assemble_layout(
    layout: &[CompiledLayoutNode],
    literals: Vec<Option<ChatCompletionMessage>>,
    mut slots: BTreeMap<usize, SlotOutput>,
    injections: Vec<PlacedInjection>,
) -> Vec<ChatCompletionMessage> {
    let mut by_anchor: BTreeMap<GlobalAnchor, Vec<ChatCompletionMessage>> = BTreeMap::new();
    for injection in injections {
        by_anchor
            .entry(injection.anchor)
            .or_default()
            .push(injection.message);
    }

    let mut out = by_anchor.remove(&GlobalAnchor::Top).unwrap_or_default();
    let bottom = by_anchor.remove(&GlobalAnchor::Bottom).unwrap_or_default();
    let mut placed: BTreeSet<GlobalAnchor> = BTreeSet::new();

    for (node, literal) in layout.iter().zip(literals) {
        match node {
            CompiledLayoutNode::Slot(index) => {
                if let Some(output) = slots.remove(index) {
                    out.extend(output.messages);
                }
            }
            CompiledLayoutNode::Message(_) => out.extend(literal),
            CompiledLayoutNode::Anchor(anchor) => {
                if placed.insert(*anchor) {
                    out.extend(by_anchor.remove(anchor).unwrap_or_default());
                }
            }
        }
    }

    // Anchors absent from the layout, in anchor order.
    for (_, messages) in by_anchor {
        out.extend(messages);
    }
    out.extend(bottom);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCollector;
    use crate::leaf::compile_leaf;
    use crate::model::Role;
    use crate::plan::CompiledBlock;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn literal(content: &str) -> CompiledLayoutNode {
        CompiledLayoutNode::Message(CompiledBlock {
            role: Role::System,
            content: compile_leaf(content, "layout", &mut DiagnosticCollector::new()),
            prefix: false,
        })
    }

    fn contents(messages: &[ChatCompletionMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_injection_lanes_and_drops() {
        let mut budget = BudgetManager::with_default_estimator(100).with_lane_budget("attachments", 2);
        let injections = vec![
            Injection::new(GlobalAnchor::BeforeChar, "aaaa"),
            Injection::new(GlobalAnchor::BeforeChar, "bbbbbbbb"),
            Injection::new(GlobalAnchor::AfterChar, "cccc"),
            Injection {
                lane: Some("main".to_string()),
                role: Some(Role::System),
                ..Injection::new(GlobalAnchor::Top, "dddddddd")
            },
        ];
        let (placed, dropped) =
            charge_injections(&injections, &AttachmentDefaults::default(), &mut budget);
        assert_eq!(dropped, vec![1]);
        let placed_contents: Vec<_> = placed.iter().map(|p| p.message.content.as_str()).collect();
        assert_eq!(placed_contents, vec!["aaaa", "cccc", "dddddddd"]);
        assert_eq!(placed[2].message.role, Role::System);
        assert_eq!(placed[0].message.role, Role::User);
        // Only the undeclared "main" lane touched the main pool.
        assert_eq!(budget.remaining(), 96);
    }

    #[test]
    fn test_assembly_order() {
        let layout = vec![
            literal("system"),
            CompiledLayoutNode::Anchor(GlobalAnchor::BeforeHistory),
            CompiledLayoutNode::Slot(0),
            CompiledLayoutNode::Anchor(GlobalAnchor::AfterHistory),
        ];
        let context = json!({});
        let mut budget = BudgetManager::with_default_estimator(100);
        let literals = render_literals(&layout, &ExecutionScope::root(&context), &mut budget);

        let mut slots = BTreeMap::new();
        slots.insert(
            0,
            SlotOutput {
                messages: vec![
                    ChatCompletionMessage::new(Role::User, "turn 1"),
                    ChatCompletionMessage::new(Role::Assistant, "turn 2"),
                ],
                ..SlotOutput::default()
            },
        );

        let inject = |anchor, content: &str| PlacedInjection {
            anchor,
            message: ChatCompletionMessage::new(Role::User, content),
        };
        let injections = vec![
            inject(GlobalAnchor::Bottom, "bottom"),
            inject(GlobalAnchor::AfterChar, "orphan"),
            inject(GlobalAnchor::BeforeHistory, "lore"),
            inject(GlobalAnchor::Top, "top"),
        ];

        let out = assemble_layout(&layout, literals, slots, injections);
        assert_eq!(
            contents(&out),
            vec!["top", "system", "lore", "turn 1", "turn 2", "orphan", "bottom"]
        );
    }

    #[test]
    fn test_literal_that_does_not_fit_is_dropped() {
        let layout = vec![literal("a very long system message"), literal("ok")];
        let context = json!({});
        let mut budget = BudgetManager::with_default_estimator(2);
        let literals = render_literals(&layout, &ExecutionScope::root(&context), &mut budget);
        assert_eq!(literals[0], None);
        let out = assemble_layout(&layout, literals, BTreeMap::new(), Vec::new());
        assert_eq!(contents(&out), vec!["ok"]);
    }
}
