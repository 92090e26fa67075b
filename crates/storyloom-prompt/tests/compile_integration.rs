/*
 * compile_integration.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Compile-time validation, tokenizer and resolver behavior through the
 * public API.
 */

use pretty_assertions::assert_eq;
use serde_json::json;
use storyloom_prompt::{
    CompileError, CompileOptions, PromptTemplate, Segment, TemplateStructureError,
    compile_template, resolve_path, resolve_path_with_globals, template_schema_json, tokenize,
};

fn parse(text: &str) -> PromptTemplate {
    serde_json::from_str(text).unwrap()
}

fn structure_error(text: &str) -> TemplateStructureError {
    match compile_template(&parse(text), &CompileOptions::default()) {
        Err(CompileError::Structure(err)) => err,
        other => panic!("expected a structure error, got {:?}", other),
    }
}

#[test]
fn test_duplicate_slot_names_are_rejected() {
    let err = structure_error(
        r#"{
            "id": "t", "task": "turn_generation", "name": "T",
            "layout": [{ "kind": "slot", "name": "history" }],
            "slots": {
                "history": { "plan": [] },
                "history": { "priority": 3, "plan": [] }
            }
        }"#,
    );
    assert_eq!(
        err,
        TemplateStructureError::DuplicateSlot {
            name: "history".to_string()
        }
    );
}

#[test]
fn test_dangling_layout_reference_is_rejected() {
    let err = structure_error(
        r#"{
            "id": "t", "task": "turn_generation", "name": "T",
            "layout": [{ "kind": "slot", "name": "histroy" }],
            "slots": { "history": {} }
        }"#,
    );
    assert_eq!(
        err,
        TemplateStructureError::DanglingSlotRef {
            name: "histroy".to_string()
        }
    );
}

#[test]
fn test_prefix_on_non_assistant_is_rejected() {
    let err = structure_error(
        r#"{
            "id": "t", "task": "turn_generation", "name": "T",
            "layout": [{ "kind": "slot", "name": "intent" }],
            "slots": {
                "intent": {
                    "footer": { "role": "system", "content": "Answer now.", "prefix": true }
                }
            }
        }"#,
    );
    assert_eq!(
        err,
        TemplateStructureError::PrefixOnNonAssistant {
            location: "slots.intent.footer".to_string(),
            role: "system".to_string(),
        }
    );
}

#[test]
fn test_slot_budget_above_template_budget() {
    let err = structure_error(
        r#"{
            "id": "t", "task": "turn_generation", "name": "T",
            "budget": { "maxTokens": 1000 },
            "layout": [],
            "slots": { "history": { "budget": { "maxTokens": 1200 } } }
        }"#,
    );
    assert_eq!(
        err,
        TemplateStructureError::BudgetExceedsParent {
            location: "slots.history.budget.maxTokens".to_string(),
            value: 1200,
            limit: 1000,
        }
    );
}

#[test]
fn test_tokenizer_fault_tolerance() {
    let tokenized = tokenize("Start {{name", "content");
    assert_eq!(
        tokenized.segments.first(),
        Some(&Segment::Text {
            text: "Start ".to_string(),
            offset: 0
        })
    );
    assert!(tokenized.diagnostics.has_errors());
}

#[test]
fn test_globals_fallback_scenario() {
    let scope = json!({ "foo": { "bar": 1 } });
    let context = json!({ "globals": { "worldName": "Aethermoor" } });
    let globals = context.get("globals");

    assert_eq!(
        resolve_path_with_globals(&scope, globals, "worldName"),
        Some(&json!("Aethermoor"))
    );
    assert_eq!(
        resolve_path_with_globals(&scope, globals, "foo.bar"),
        Some(&json!(1))
    );
    assert_eq!(resolve_path(&scope, "foo.baz.qux"), None);
}

#[test]
fn test_schema_tracks_model() {
    let schema = template_schema_json();
    let plan_node = serde_json::to_string(&schema["definitions"]["PlanNode"]).unwrap();
    for kind in ["message", "forEach", "if"] {
        assert!(plan_node.contains(&format!("\"{}\"", kind)), "PlanNode lacks {}", kind);
    }
    let anchors = serde_json::to_string(&schema["definitions"]["GlobalAnchor"]).unwrap();
    assert!(anchors.contains("before_history"));
}
