/*
 * condition.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Condition evaluation for `if` plan nodes and inline `{{#if}}` blocks.

use serde_json::Value;

use crate::ast::InlineCondition;
use crate::error::RenderResult;
use crate::model::{ConditionRef, ConditionType};
use crate::registry::ScopedRegistry;
use crate::scope::ExecutionScope;
use crate::value::{contains, is_empty, values_equal};

/// Evaluate a structured condition at the given scope.
pub fn evaluate(
    condition: &ConditionRef,
    registry: &ScopedRegistry<'_>,
    scope: &ExecutionScope<'_>,
) -> RenderResult<bool> {
    let actual = registry.resolve(&condition.reference, scope)?;
    Ok(test(
        condition.kind,
        actual.as_deref(),
        condition.value.as_ref(),
    ))
}

/// Apply a condition type to a resolved value.
///
/// A missing `expected` value compares as `null`.
pub fn test(kind: ConditionType, actual: Option<&Value>, expected: Option<&Value>) -> bool {
    let null = Value::Null;
    match kind {
        ConditionType::Eq => values_equal(actual.unwrap_or(&null), expected.unwrap_or(&null)),
        ConditionType::Neq => !values_equal(actual.unwrap_or(&null), expected.unwrap_or(&null)),
        ConditionType::NonEmpty => !is_empty(actual),
        ConditionType::Empty => is_empty(actual),
        ConditionType::Exists => actual.is_some_and(|v| !v.is_null()),
        ConditionType::Contains => match (actual, expected) {
            (Some(haystack), Some(needle)) => contains(haystack, needle),
            _ => false,
        },
    }
}

/// Truth of an inline `{{#if path}}` / `{{#if !path}}`.
pub fn inline_holds(condition: &InlineCondition, scope: &ExecutionScope<'_>) -> bool {
    let value = condition.var.resolve(scope);
    is_empty(value.as_deref()) == condition.negated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataRef;
    use crate::registry::SourceRegistry;
    use serde_json::json;

    fn cond(reference: &str, kind: ConditionType, value: Option<Value>) -> ConditionRef {
        ConditionRef {
            reference: DataRef::parse(reference),
            kind,
            value,
        }
    }

    #[test]
    fn test_condition_types() {
        assert!(test(ConditionType::Eq, Some(&json!(2)), Some(&json!(2.0))));
        assert!(test(ConditionType::Neq, Some(&json!("Bob")), Some(&json!("Alice"))));
        assert!(test(ConditionType::Neq, None, Some(&json!("Alice"))));
        assert!(test(ConditionType::Eq, None, None));
        assert!(test(ConditionType::Empty, Some(&json!(0)), None));
        assert!(test(ConditionType::NonEmpty, Some(&json!(["x"])), None));
        assert!(test(ConditionType::Exists, Some(&json!(false)), None));
        assert!(!test(ConditionType::Exists, Some(&Value::Null), None));
        assert!(test(ConditionType::Contains, Some(&json!(["a", "b"])), Some(&json!("a"))));
        assert!(!test(ConditionType::Contains, None, Some(&json!("a"))));
    }

    #[test]
    fn test_evaluate_against_registry() {
        let registry = SourceRegistry::from_context_keys(["mood"]);
        let scoped = ScopedRegistry::new(&registry);
        let context = json!({ "mood": "tense", "globals": { "season": "winter" } });
        let scope = ExecutionScope::root(&context);

        let check = |c: ConditionRef| evaluate(&c, &scoped, &scope).unwrap();
        assert!(check(cond("mood", ConditionType::Eq, Some(json!("tense")))));
        assert!(check(cond("$globals.season", ConditionType::Contains, Some(json!("win")))));
        assert!(check(cond("missing", ConditionType::Empty, None)));
        assert!(!check(cond("missing", ConditionType::Exists, None)));
    }

    #[test]
    fn test_inline_condition_shares_emptiness() {
        let context = json!({ "zero": 0, "list": [], "name": "x" });
        let scope = ExecutionScope::root(&context);
        let holds = |expr: &str| inline_holds(&InlineCondition::parse(expr, 0).unwrap(), &scope);
        assert!(!holds("zero"));
        assert!(holds("!list"));
        assert!(holds("name"));
        assert!(!holds("!name"));
        assert!(holds("!missing"));
    }
}
