/*
 * check.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `storyloom check`: compile a template and report what the compiler found.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use storyloom_prompt::{
    AuthoringValidationError, CompileError, CompileOptions, Diagnostic, PromptTemplate,
    compile_template,
};
use tracing::info;

use super::load_document;

#[derive(Debug)]
pub struct CheckArgs {
    pub template: String,
    pub sources: Vec<String>,
    pub lenient: bool,
    pub json: bool,
}

/// Machine-readable result of a check.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    slot_order: Vec<String>,
}

pub fn execute(args: CheckArgs) -> Result<()> {
    let template: PromptTemplate = load_document(&args.template)?;
    let report = check(&template, &compile_options(&args));

    if args.json {
        let text = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
        println!("{}", text);
    } else {
        for diagnostic in &report.diagnostics {
            println!("{}", diagnostic);
        }
        if let Some(error) = &report.error {
            println!("error: {}", error);
        } else {
            println!("slot order: {}", report.slot_order.join(", "));
        }
    }

    if !report.ok {
        bail!("{} failed to compile", args.template);
    }
    info!(template = %args.template, "template ok");
    Ok(())
}

fn compile_options(args: &CheckArgs) -> CompileOptions {
    let mut options = CompileOptions::default();
    if !args.sources.is_empty() {
        options = options.with_allowed_sources(args.sources.iter());
    }
    if args.lenient {
        options = options.lenient();
    }
    options
}

fn check(template: &PromptTemplate, options: &CompileOptions) -> CheckReport {
    match compile_template(template, options) {
        Ok(compiled) => CheckReport {
            ok: true,
            error: None,
            diagnostics: compiled.diagnostics().to_vec(),
            slot_order: compiled.slot_order().into_iter().map(str::to_string).collect(),
        },
        Err(err) => {
            let diagnostics = match &err {
                CompileError::Authoring(AuthoringValidationError::MalformedTemplate {
                    diagnostics,
                    ..
                }) => diagnostics.clone(),
                _ => Vec::new(),
            };
            CheckReport {
                ok: false,
                error: Some(err.to_string()),
                diagnostics,
                slot_order: Vec::new(),
            }
        }
    }
}
