/*
 * slots.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Slot execution.
//!
//! Slots run in descending priority so higher-priority content claims budget
//! first. Ties keep declaration order.

use std::collections::BTreeMap;

use tracing::debug;

use crate::budget::BudgetManager;
use crate::error::RenderResult;
use crate::evaluator::PlanExecutor;
use crate::model::ChatCompletionMessage;
use crate::plan::{CompiledBlock, CompiledSlot};
use crate::registry::ScopedRegistry;
use crate::scope::ExecutionScope;

/// What one slot produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotOutput {
    /// Header, plan messages and footer, in output order.
    pub messages: Vec<ChatCompletionMessage>,
    /// Tokens charged while the slot ran.
    pub tokens: u32,
    /// True when the slot was dropped by `omitIfEmpty`.
    pub omitted: bool,
    /// Plan messages skipped for budget.
    pub skipped: usize,
}

/// Indices of `selected` slots in execution order.
pub fn execution_order(slots: &[CompiledSlot], selected: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = selected.to_vec();
    order.sort_by(|a, b| slots[*b].priority.cmp(&slots[*a].priority).then(a.cmp(b)));
    order
}

/// Execute the `selected` slots (indices into `slots`), reserving every
/// selected slot's floor before the first one runs.
pub fn execute_slots(
    slots: &[CompiledSlot],
    selected: &[usize],
    registry: ScopedRegistry<'_>,
    scope: &ExecutionScope<'_>,
    budget: &mut BudgetManager,
) -> RenderResult<BTreeMap<usize, SlotOutput>> {
    for &index in selected {
        let slot = &slots[index];
        if let Some(floor) = slot.budget.and_then(|b| b.floor) {
            budget.reserve_floor(slot.name.as_str(), floor);
        }
    }

    let mut outputs = BTreeMap::new();
    for index in execution_order(slots, selected) {
        let slot = &slots[index];
        let output = budget.with_floor_owner(&slot.name, |budget| {
            match slot.budget.and_then(|b| b.max_tokens) {
                Some(max) => budget.with_node_budget(max, |budget| {
                    execute_slot(slot, registry, scope, budget)
                }),
                None => execute_slot(slot, registry, scope, budget),
            }
        });
        budget.release_floor(&slot.name);
        let output = output?;
        debug!(
            slot = %slot.name,
            priority = slot.priority,
            tokens = output.tokens,
            messages = output.messages.len(),
            omitted = output.omitted,
            "slot executed"
        );
        outputs.insert(index, output);
    }
    Ok(outputs)
}

fn execute_slot(
    slot: &CompiledSlot,
    registry: ScopedRegistry<'_>,
    scope: &ExecutionScope<'_>,
    budget: &mut BudgetManager,
) -> RenderResult<SlotOutput> {
    let before = budget.consumed();
    let header = render_block(slot.header.as_ref(), scope);
    let footer = render_block(slot.footer.as_ref(), scope);
    let wrapper_cost: u32 = [&header, &footer]
        .into_iter()
        .flatten()
        .map(|m| budget.estimate_tokens(&m.content))
        .sum();

    // Header and footer space is held back from the plan, floor included.
    let plan_cap = budget.remaining().saturating_sub(wrapper_cost);
    let mut executor = PlanExecutor::new(registry);
    let mut body = Vec::new();
    budget.with_floor_held_back(wrapper_cost, |budget| {
        budget.with_node_budget(plan_cap, |budget| {
            executor.execute(&slot.plan, scope, budget, &mut body)
        })
    })?;

    if body.is_empty() && slot.omit_if_empty {
        return Ok(SlotOutput {
            messages: Vec::new(),
            tokens: budget.consumed().saturating_sub(before),
            omitted: true,
            skipped: executor.skipped(),
        });
    }

    let mut messages = Vec::with_capacity(body.len() + 2);
    messages.extend(charge(header, budget));
    messages.extend(body);
    messages.extend(charge(footer, budget));

    Ok(SlotOutput {
        messages,
        tokens: budget.consumed().saturating_sub(before),
        omitted: false,
        skipped: executor.skipped(),
    })
}

/// Render a header, footer or literal block; empty content yields nothing.
pub(crate) fn render_block(
    block: Option<&CompiledBlock>,
    scope: &ExecutionScope<'_>,
) -> Option<ChatCompletionMessage> {
    let block = block?;
    let content = block.render(scope);
    if content.is_empty() {
        return None;
    }
    Some(ChatCompletionMessage {
        role: block.role,
        content,
        name: None,
        prefix: block.prefix,
    })
}

/// Consume the message's cost if it fits, otherwise drop it.
pub(crate) fn charge(
    message: Option<ChatCompletionMessage>,
    budget: &mut BudgetManager,
) -> Option<ChatCompletionMessage> {
    let message = message?;
    let cost = budget.estimate_tokens(&message.content);
    if !budget.can_fit_token_estimate(cost) {
        return None;
    }
    budget.consume(cost);
    Some(message)
}
