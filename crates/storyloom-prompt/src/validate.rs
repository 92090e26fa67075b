/*
 * validate.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Structural validation of authored templates.
//!
//! These checks need nothing but the template itself and run before any
//! template string is tokenized.

use std::collections::BTreeSet;

use crate::error::TemplateStructureError;
use crate::model::{LayoutNode, PlanNode, PromptTemplate, Role};

/// Check a template's shape, returning the first problem found.
///
/// Checks run in this order:
/// 1. slot names are unique
/// 2. layout slot references resolve, and each slot is placed at most once
/// 3. `prefix` only appears on assistant messages
/// 4. slot budgets fit under their parent
pub fn validate_structure(template: &PromptTemplate) -> Result<(), TemplateStructureError> {
    check_unique_slots(template)?;
    check_layout_refs(template)?;
    check_prefixes(template)?;
    check_budgets(template)
}

fn check_unique_slots(template: &PromptTemplate) -> Result<(), TemplateStructureError> {
    let mut seen = BTreeSet::new();
    for (name, _) in template.slots.iter() {
        if !seen.insert(name) {
            return Err(TemplateStructureError::DuplicateSlot {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn check_layout_refs(template: &PromptTemplate) -> Result<(), TemplateStructureError> {
    let mut placed = BTreeSet::new();
    for node in &template.layout {
        let LayoutNode::Slot { name } = node else {
            continue;
        };
        if template.slots.get(name).is_none() {
            return Err(TemplateStructureError::DanglingSlotRef { name: name.clone() });
        }
        if !placed.insert(name.as_str()) {
            return Err(TemplateStructureError::DuplicateLayoutRef { name: name.clone() });
        }
    }
    Ok(())
}

fn check_prefix(location: String, role: Role, prefix: bool) -> Result<(), TemplateStructureError> {
    if prefix && role != Role::Assistant {
        return Err(TemplateStructureError::PrefixOnNonAssistant {
            location,
            role: role.to_string(),
        });
    }
    Ok(())
}

fn check_prefixes(template: &PromptTemplate) -> Result<(), TemplateStructureError> {
    for (i, node) in template.layout.iter().enumerate() {
        if let LayoutNode::Message(block) = node {
            check_prefix(format!("layout[{}]", i), block.role, block.prefix)?;
        }
    }
    for (name, slot) in template.slots.iter() {
        if let Some(header) = &slot.header {
            check_prefix(format!("slots.{}.header", name), header.role, header.prefix)?;
        }
        if let Some(footer) = &slot.footer {
            check_prefix(format!("slots.{}.footer", name), footer.role, footer.prefix)?;
        }
        check_plan_prefixes(&slot.plan, &format!("slots.{}.plan", name))?;
    }
    Ok(())
}

fn check_plan_prefixes(nodes: &[PlanNode], location: &str) -> Result<(), TemplateStructureError> {
    for (i, node) in nodes.iter().enumerate() {
        let here = format!("{}[{}]", location, i);
        match node {
            PlanNode::Message(message) => check_prefix(here, message.role, message.prefix)?,
            PlanNode::ForEach(each) => check_plan_prefixes(&each.map, &format!("{}.map", here))?,
            PlanNode::If(node) => {
                check_plan_prefixes(&node.then, &format!("{}.then", here))?;
                check_plan_prefixes(&node.otherwise, &format!("{}.else", here))?;
            }
        }
    }
    Ok(())
}

fn check_budgets(template: &PromptTemplate) -> Result<(), TemplateStructureError> {
    let template_max = template.budget.and_then(|b| b.max_tokens);
    for (name, slot) in template.slots.iter() {
        let Some(budget) = slot.budget else {
            continue;
        };
        if let (Some(value), Some(limit)) = (budget.max_tokens, template_max) {
            if value > limit {
                return Err(TemplateStructureError::BudgetExceedsParent {
                    location: format!("slots.{}.budget.maxTokens", name),
                    value,
                    limit,
                });
            }
        }
        if let (Some(value), Some(limit)) = (budget.floor, budget.max_tokens.or(template_max)) {
            if value > limit {
                return Err(TemplateStructureError::BudgetExceedsParent {
                    location: format!("slots.{}.budget.floor", name),
                    value,
                    limit,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(value: serde_json::Value) -> PromptTemplate {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_template_passes() {
        let t = template(json!({
            "id": "t", "task": "turn_generation", "name": "T",
            "budget": { "maxTokens": 100 },
            "layout": [
                { "kind": "message", "role": "system", "content": "hi" },
                { "kind": "slot", "name": "history" }
            ],
            "slots": {
                "history": {
                    "budget": { "maxTokens": 50, "floor": 10 },
                    "plan": [{ "kind": "message", "role": "assistant", "content": "x", "prefix": true }]
                }
            }
        }));
        assert_eq!(validate_structure(&t), Ok(()));
    }

    #[test]
    fn test_duplicate_layout_ref() {
        let t = template(json!({
            "id": "t", "task": "x", "name": "T",
            "layout": [{ "kind": "slot", "name": "a" }, { "kind": "slot", "name": "a" }],
            "slots": { "a": {} }
        }));
        assert_eq!(
            validate_structure(&t),
            Err(TemplateStructureError::DuplicateLayoutRef {
                name: "a".to_string()
            })
        );
    }

    #[test]
    fn test_nested_prefix_location() {
        let t = template(json!({
            "id": "t", "task": "x", "name": "T",
            "layout": [{ "kind": "slot", "name": "a" }],
            "slots": { "a": { "plan": [{
                "kind": "forEach", "source": "turns",
                "map": [{ "kind": "if", "when": { "ref": "$item", "type": "exists" },
                          "then": [{ "kind": "message", "role": "user", "content": "x", "prefix": true }] }]
            }] } }
        }));
        assert_eq!(
            validate_structure(&t),
            Err(TemplateStructureError::PrefixOnNonAssistant {
                location: "slots.a.plan[0].map[0].then[0]".to_string(),
                role: "user".to_string(),
            })
        );
    }

    #[test]
    fn test_budget_above_parent() {
        let t = template(json!({
            "id": "t", "task": "x", "name": "T",
            "budget": { "maxTokens": 100 },
            "layout": [],
            "slots": { "a": { "budget": { "floor": 150 } } }
        }));
        assert_eq!(
            validate_structure(&t),
            Err(TemplateStructureError::BudgetExceedsParent {
                location: "slots.a.budget.floor".to_string(),
                value: 150,
                limit: 100,
            })
        );
    }
}
