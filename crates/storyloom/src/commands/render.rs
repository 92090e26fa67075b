/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `storyloom render`: preview the messages a template produces for a
//! context file.
//!
//! Every top-level key of the context becomes a named source, which is how
//! the template builder's preview exposes sample task data.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use storyloom_prompt::{
    BudgetConfig, CompileOptions, PromptTemplate, RenderOptions, SourceRegistry, compile_template,
};
use tracing::{debug, info};

use super::load_document;

#[derive(Debug)]
pub struct RenderArgs {
    pub template: String,
    pub context: String,
    pub budget: Option<String>,
    pub max_tokens: Option<u32>,
    pub options: Option<String>,
    pub report: bool,
}

pub fn execute(args: RenderArgs) -> Result<()> {
    let template: PromptTemplate = load_document(&args.template)?;
    let context: Value = load_document(&args.context)?;

    let mut config: BudgetConfig = match &args.budget {
        Some(path) => load_document(path)?,
        None => BudgetConfig::default(),
    };
    if let Some(max_tokens) = args.max_tokens {
        config.max_tokens = max_tokens;
    }
    let options: RenderOptions = match &args.options {
        Some(path) => load_document(path)?,
        None => RenderOptions::default(),
    };

    let output = render(&template, &context, &config, &options)
        .with_context(|| format!("Failed to render {}", args.template))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to encode messages")?
    );
    Ok(())
}

fn registry_for(context: &Value) -> SourceRegistry {
    match context.as_object() {
        Some(map) => SourceRegistry::from_context_keys(map.keys()),
        None => SourceRegistry::new(),
    }
}

fn render(
    template: &PromptTemplate,
    context: &Value,
    config: &BudgetConfig,
    options: &RenderOptions,
) -> Result<Value> {
    let registry = registry_for(context);
    let compiled = compile_template(template, &CompileOptions::for_registry(&registry))?;
    for diagnostic in compiled.diagnostics() {
        debug!(%diagnostic, "compile diagnostic");
    }

    let mut budget = config.build();
    let output = compiled.render_with_report(context, &registry, &mut budget, options)?;
    info!(
        template = %compiled.id(),
        messages = output.messages.len(),
        consumed = output.report.consumed,
        max_tokens = config.max_tokens,
        "rendered"
    );

    Ok(json!({
        "messages": output.messages,
        "report": output.report,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn template() -> PromptTemplate {
        serde_json::from_value(json!({
            "id": "t", "task": "turn_generation", "name": "T",
            "layout": [
                { "kind": "message", "role": "system", "content": "World: {{worldName}}" },
                { "kind": "slot", "name": "history" }
            ],
            "slots": { "history": { "plan": [{
                "kind": "forEach", "source": "turns", "fillDir": "prepend",
                "map": [{ "kind": "message", "role": "user", "content": "{{$item}}" }]
            }] } }
        }))
        .unwrap()
    }

    #[test]
    fn test_render_uses_context_keys_as_sources() {
        let context = json!({ "worldName": "Aethermoor", "turns": ["newest", "oldest"] });
        let output = render(
            &template(),
            &context,
            &BudgetConfig::default(),
            &RenderOptions::default(),
        )
        .unwrap();
        let contents: Vec<_> = output["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["World: Aethermoor", "oldest", "newest"]);
    }

    #[test]
    fn test_render_rejects_sources_missing_from_context() {
        let context = json!({ "worldName": "Aethermoor" });
        let err = render(
            &template(),
            &context,
            &BudgetConfig::default(),
            &RenderOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("turns"));
    }
}
