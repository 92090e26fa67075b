/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Plan execution.
//!
//! A slot's plan is executed against a scope, a [`ScopedRegistry`] and a
//! [`BudgetManager`], producing the slot's message buffer. Running out of
//! budget or data is never an error; messages that don't fit are skipped.

use tracing::trace;

use crate::budget::BudgetManager;
use crate::condition;
use crate::error::RenderResult;
use crate::model::{ChatCompletionMessage, FillDir, Role};
use crate::plan::{CompiledForEach, CompiledIf, CompiledMessage, CompiledPlanNode};
use crate::registry::ScopedRegistry;
use crate::scope::{ExecutionScope, ScopeFrame};
use crate::value::{into_items, stringify};

/// Executes plan nodes, counting messages skipped for budget.
pub struct PlanExecutor<'r> {
    registry: ScopedRegistry<'r>,
    skipped: usize,
}

impl<'r> PlanExecutor<'r> {
    pub fn new(registry: ScopedRegistry<'r>) -> Self {
        Self {
            registry,
            skipped: 0,
        }
    }

    /// Messages dropped because they did not fit the budget.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Execute `nodes` in order, appending their output to `out`.
    pub fn execute(
        &mut self,
        nodes: &[CompiledPlanNode],
        scope: &ExecutionScope<'_>,
        budget: &mut BudgetManager,
        out: &mut Vec<ChatCompletionMessage>,
    ) -> RenderResult<()> {
        for node in nodes {
            self.execute_node(node, scope, budget, out)?;
        }
        Ok(())
    }

    fn execute_node(
        &mut self,
        node: &CompiledPlanNode,
        scope: &ExecutionScope<'_>,
        budget: &mut BudgetManager,
        out: &mut Vec<ChatCompletionMessage>,
    ) -> RenderResult<()> {
        match node {
            CompiledPlanNode::Message(message) => self.execute_message(message, scope, budget, out),
            CompiledPlanNode::ForEach(each) => self.execute_for_each(each, scope, budget, out),
            CompiledPlanNode::If(CompiledIf {
                when,
                then,
                otherwise,
            }) => {
                let branch = if condition::evaluate(when, &self.registry, scope)? {
                    then
                } else {
                    otherwise
                };
                self.execute(branch, scope, budget, out)
            }
        }
    }

    fn execute_message(
        &mut self,
        message: &CompiledMessage,
        scope: &ExecutionScope<'_>,
        budget: &mut BudgetManager,
        out: &mut Vec<ChatCompletionMessage>,
    ) -> RenderResult<()> {
        let content = message.content.render(scope);
        if content.is_empty() {
            return Ok(());
        }

        let mut role = message.role;
        let mut name = None;
        if let Some(from) = &message.from {
            let author = stringify(self.registry.resolve(from, scope)?.as_deref());
            match Role::parse(&author) {
                Some(resolved) => role = resolved,
                None if !author.is_empty() => name = Some(author),
                None => {}
            }
        }

        let cost = budget.estimate_tokens(&content);
        if !budget.can_fit_token_estimate(cost) {
            trace!(cost, remaining = budget.remaining(), "message skipped for budget");
            self.skipped += 1;
            return Ok(());
        }
        budget.consume(cost);
        out.push(ChatCompletionMessage {
            role,
            content,
            name,
            prefix: message.prefix && role == Role::Assistant,
        });
        Ok(())
    }

    fn execute_for_each(
        &mut self,
        each: &CompiledForEach,
        scope: &ExecutionScope<'_>,
        budget: &mut BudgetManager,
        out: &mut Vec<ChatCompletionMessage>,
    ) -> RenderResult<()> {
        let source = self.registry.resolve(&each.source, scope)?;
        let mut items = into_items(source.map(|v| v.into_owned()));
        if let Some(limit) = each.limit {
            // The source's front is its freshest end.
            items.truncate(limit);
        }

        let mut buffer: Vec<ChatCompletionMessage> = Vec::new();
        for (index, item) in items.iter().enumerate() {
            if !budget.has_any() {
                trace!(source = %each.source, index, "loop stopped: budget exhausted");
                break;
            }
            let frame = ScopeFrame::new(item, index, scope.frame());
            let inner = scope.with_frame(&frame);

            let skipped_before = self.skipped;
            let mut item_out = Vec::new();
            self.execute(&each.map, &inner, budget, &mut item_out)?;

            match each.fill_dir {
                FillDir::Append => buffer.extend(item_out),
                FillDir::Prepend => {
                    buffer.splice(0..0, item_out);
                }
            }

            if self.skipped > skipped_before {
                trace!(source = %each.source, index, "loop stopped: item truncated");
                break;
            }
        }
        out.extend(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCollector;
    use crate::leaf::compile_leaf;
    use crate::model::{ConditionRef, ConditionType, DataRef};
    use crate::registry::SourceRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn message(role: Role, content: &str) -> CompiledMessage {
        CompiledMessage {
            role,
            content: compile_leaf(content, "test", &mut DiagnosticCollector::new()),
            from: None,
            prefix: false,
        }
    }

    fn for_each(
        source: &str,
        limit: Option<usize>,
        fill_dir: FillDir,
        map: Vec<CompiledPlanNode>,
    ) -> CompiledPlanNode {
        CompiledPlanNode::ForEach(CompiledForEach {
            source: DataRef::parse(source),
            map,
            limit,
            fill_dir,
        })
    }

    fn run(
        nodes: &[CompiledPlanNode],
        context: &Value,
        budget: &mut BudgetManager,
    ) -> Vec<ChatCompletionMessage> {
        let registry = SourceRegistry::from_context_keys(["turns", "characters"]);
        let mut executor = PlanExecutor::new(ScopedRegistry::new(&registry));
        let mut out = Vec::new();
        executor
            .execute(nodes, &ExecutionScope::root(context), budget, &mut out)
            .unwrap();
        out
    }

    fn contents(messages: &[ChatCompletionMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn test_prepend_with_limit_is_chronological() {
        let context = json!({ "turns": [
            { "text": "t4" }, { "text": "t3" }, { "text": "t2" }, { "text": "t1" }
        ] });
        let plan = vec![for_each(
            "turns",
            Some(2),
            FillDir::Prepend,
            vec![CompiledPlanNode::Message(message(Role::User, "{{$item.text}}"))],
        )];
        let out = run(&plan, &context, &mut BudgetManager::with_default_estimator(1000));
        assert_eq!(contents(&out), vec!["t3", "t4"]);
    }

    #[test]
    fn test_nested_scope_authors() {
        let context = json!({ "characters": [
            { "name": "Alice" }, { "name": "Bob" }, { "name": "Charlie" }
        ] });
        let mut speak = message(Role::User, "{{$item.name}} waves.");
        speak.from = Some(DataRef::parse("$item.name"));
        let plan = vec![for_each(
            "characters",
            None,
            FillDir::Append,
            vec![CompiledPlanNode::If(CompiledIf {
                when: ConditionRef {
                    reference: DataRef::parse("$item.name"),
                    kind: ConditionType::Neq,
                    value: Some(json!("Alice")),
                },
                then: vec![CompiledPlanNode::Message(speak)],
                otherwise: vec![],
            })],
        )];
        let out = run(&plan, &context, &mut BudgetManager::with_default_estimator(1000));
        let names: Vec<_> = out.iter().map(|m| m.name.as_deref()).collect();
        assert_eq!(names, vec![Some("Bob"), Some("Charlie")]);
    }

    #[test]
    fn test_from_role_override_drops_prefix() {
        let context = json!({ "turns": [{ "speaker": "user", "text": "hi" }] });
        let mut msg = message(Role::Assistant, "{{$item.text}}");
        msg.from = Some(DataRef::parse("$item.speaker"));
        msg.prefix = true;
        let plan = vec![for_each(
            "turns",
            None,
            FillDir::Append,
            vec![CompiledPlanNode::Message(msg)],
        )];
        let out = run(&plan, &context, &mut BudgetManager::with_default_estimator(1000));
        assert_eq!(out, vec![ChatCompletionMessage::new(Role::User, "hi")]);
    }

    #[test]
    fn test_empty_content_is_skipped_without_cost() {
        let plan = vec![CompiledPlanNode::Message(message(Role::System, "{{missing}}"))];
        let mut budget = BudgetManager::with_default_estimator(10);
        assert!(run(&plan, &json!({}), &mut budget).is_empty());
        assert_eq!(budget.consumed(), 0);
    }

    #[test]
    fn test_truncation_keeps_a_contiguous_fresh_run() {
        // Long turns cost 2 tokens each; the third one no longer fits.
        let context = json!({ "turns": [
            { "text": "aaaaaaaa" }, { "text": "bbbbbbbb" }, { "text": "dddddddd" }, { "text": "c" }
        ] });
        let plan = vec![for_each(
            "turns",
            None,
            FillDir::Prepend,
            vec![CompiledPlanNode::Message(message(Role::User, "{{$item.text}}"))],
        )];
        let mut budget = BudgetManager::with_default_estimator(5);
        let out = run(&plan, &context, &mut budget);
        // "c" would fit after the skip, but the run stops at the first gap.
        assert_eq!(contents(&out), vec!["bbbbbbbb", "aaaaaaaa"]);
        assert_eq!(budget.consumed(), 4);
    }

    #[test]
    fn test_non_array_source_iterates_once() {
        let context = json!({ "characters": { "name": "Solo" } });
        let plan = vec![for_each(
            "characters",
            None,
            FillDir::Append,
            vec![CompiledPlanNode::Message(message(Role::System, "{{$index}}:{{name}}"))],
        )];
        let out = run(&plan, &context, &mut BudgetManager::with_default_estimator(100));
        assert_eq!(contents(&out), vec!["0:Solo"]);
    }
}
