/*
 * compiler.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template compilation and the compiled template's render entry points.
//!
//! Compilation validates the template's structure, lowers every template
//! string into a [`CompiledLeaf`], and lints every data reference against
//! the task's sources. The result is immutable and can be shared across
//! threads and rendered any number of times.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::ast::VarTarget;
use crate::budget::BudgetManager;
use crate::diagnostics::{Diagnostic, DiagnosticCollector};
use crate::error::{AuthoringValidationError, CompileResult, RenderResult};
use crate::layout::{assemble_layout, charge_injections, render_literals};
use crate::leaf::{CompiledLeaf, compile_leaf};
use crate::model::{
    Budget, ChatCompletionMessage, DataRef, LayoutNode, MessageBlock, PlanNode, PromptTemplate,
};
use crate::options::{CompileOptions, RenderOptions};
use crate::path::{PathSegment, parse_path};
use crate::plan::{
    CompiledBlock, CompiledForEach, CompiledIf, CompiledLayoutNode, CompiledMessage,
    CompiledPlanNode, CompiledSlot,
};
use crate::registry::{ScopedRegistry, SourceRegistry};
use crate::scope::{ExecutionScope, ReservedRef};
use crate::slots::{execute_slots, execution_order};
use crate::validate::validate_structure;

/// Lint code for a slot that no layout node places; it never renders.
pub const UNPLACED_SLOT: &str = "P-2-1";

/// Validate and compile a template.
///
/// # Errors
/// - [`TemplateStructureError`](crate::TemplateStructureError) when the
///   template's shape is invalid
/// - [`AuthoringValidationError`] when it references sources or names the
///   task doesn't provide, or (unless `options.lenient`) when a template
///   string is malformed
pub fn compile_template(
    template: &PromptTemplate,
    options: &CompileOptions,
) -> CompileResult<CompiledTemplate> {
    validate_structure(template)?;

    let mut lowering = Lowering {
        options,
        diagnostics: DiagnosticCollector::new(),
    };

    let slots = template
        .slots
        .iter()
        .map(|(name, spec)| {
            let at = format!("slots.{}", name);
            Ok(CompiledSlot {
                name: name.to_string(),
                priority: spec.priority,
                budget: spec.budget,
                plan: lowering.plan(&spec.plan, &format!("{}.plan", at))?,
                omit_if_empty: spec.omit_if_empty,
                header: lowering.optional_block(spec.header.as_ref(), &format!("{}.header", at))?,
                footer: lowering.optional_block(spec.footer.as_ref(), &format!("{}.footer", at))?,
            })
        })
        .collect::<Result<Vec<_>, AuthoringValidationError>>()?;

    let layout = template
        .layout
        .iter()
        .enumerate()
        .map(|(i, node)| {
            Ok(match node {
                LayoutNode::Slot { name } => {
                    // Structural validation guarantees the slot exists.
                    let index = slots.iter().position(|s| &s.name == name).unwrap_or_default();
                    CompiledLayoutNode::Slot(index)
                }
                LayoutNode::Message(block) => {
                    CompiledLayoutNode::Message(lowering.block(block, &format!("layout[{}]", i))?)
                }
                LayoutNode::Anchor { anchor } => CompiledLayoutNode::Anchor(*anchor),
            })
        })
        .collect::<Result<Vec<_>, AuthoringValidationError>>()?;

    for (index, slot) in slots.iter().enumerate() {
        let placed = layout
            .iter()
            .any(|node| matches!(node, CompiledLayoutNode::Slot(i) if *i == index));
        if !placed {
            lowering.diagnostics.warn_at(
                UNPLACED_SLOT,
                format!("Slot '{}' is not placed in the layout and will not render", slot.name),
                &format!("slots.{}", slot.name),
                0,
            );
        }
    }

    let diagnostics = lowering.diagnostics.into_diagnostics();
    debug!(
        template = %template.id,
        task = %template.task,
        slots = slots.len(),
        diagnostics = diagnostics.len(),
        "template compiled"
    );

    Ok(CompiledTemplate {
        id: template.id.clone(),
        task: template.task.clone(),
        name: template.name.clone(),
        version: template.version,
        budget: template.budget,
        layout,
        slots,
        diagnostics,
    })
}

struct Lowering<'o> {
    options: &'o CompileOptions,
    diagnostics: DiagnosticCollector,
}

impl Lowering<'_> {
    fn leaf(&mut self, source: &str, field: &str) -> Result<CompiledLeaf, AuthoringValidationError> {
        let mut local = DiagnosticCollector::new();
        let leaf = compile_leaf(source, field, &mut local);

        for var in leaf.variables() {
            if let VarTarget::UnknownReserved(name) = &var.target {
                let name = if name.is_empty() { &var.raw } else { name };
                return Err(AuthoringValidationError::UnknownReservedName {
                    name: name.clone(),
                    location: format!("{}:{}", field, var.offset),
                });
            }
        }
        if local.has_errors() && !self.options.lenient {
            return Err(AuthoringValidationError::MalformedTemplate {
                location: field.to_string(),
                diagnostics: local.errors(),
            });
        }
        self.diagnostics.extend(local);
        Ok(leaf)
    }

    fn data_ref(&self, data_ref: &DataRef, location: &str) -> Result<(), AuthoringValidationError> {
        if data_ref.source.starts_with('$') {
            let path = parse_path(data_ref.path.as_deref().unwrap_or("")).unwrap_or_default();
            let mut segments = vec![PathSegment::Key(data_ref.source.clone())];
            segments.extend(path);
            return match ReservedRef::from_segments(&segments, None) {
                Ok(_) => Ok(()),
                Err(name) => Err(AuthoringValidationError::UnknownReservedName {
                    name: if name.is_empty() {
                        data_ref.source.clone()
                    } else {
                        name
                    },
                    location: location.to_string(),
                }),
            };
        }
        match &self.options.allowed_sources {
            Some(allowed) if !allowed.contains(&data_ref.source) => {
                Err(AuthoringValidationError::UnknownSource {
                    source_name: data_ref.source.clone(),
                    location: location.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn block(&mut self, block: &MessageBlock, at: &str) -> Result<CompiledBlock, AuthoringValidationError> {
        Ok(CompiledBlock {
            role: block.role,
            content: self.leaf(&block.content, &format!("{}.content", at))?,
            prefix: block.prefix,
        })
    }

    fn optional_block(
        &mut self,
        block: Option<&MessageBlock>,
        at: &str,
    ) -> Result<Option<CompiledBlock>, AuthoringValidationError> {
        block.map(|b| self.block(b, at)).transpose()
    }

    fn plan(&mut self, nodes: &[PlanNode], at: &str) -> Result<Vec<CompiledPlanNode>, AuthoringValidationError> {
        nodes
            .iter()
            .enumerate()
            .map(|(i, node)| self.plan_node(node, &format!("{}[{}]", at, i)))
            .collect()
    }

    fn plan_node(&mut self, node: &PlanNode, at: &str) -> Result<CompiledPlanNode, AuthoringValidationError> {
        Ok(match node {
            PlanNode::Message(message) => {
                if let Some(from) = &message.from {
                    self.data_ref(from, &format!("{}.from", at))?;
                }
                CompiledPlanNode::Message(CompiledMessage {
                    role: message.role,
                    content: self.leaf(&message.content, &format!("{}.content", at))?,
                    from: message.from.clone(),
                    prefix: message.prefix,
                })
            }
            PlanNode::ForEach(each) => {
                self.data_ref(&each.source, &format!("{}.source", at))?;
                CompiledPlanNode::ForEach(CompiledForEach {
                    source: each.source.clone(),
                    map: self.plan(&each.map, &format!("{}.map", at))?,
                    limit: each.limit,
                    fill_dir: each.fill_dir,
                })
            }
            PlanNode::If(node) => {
                self.data_ref(&node.when.reference, &format!("{}.when.ref", at))?;
                CompiledPlanNode::If(CompiledIf {
                    when: node.when.clone(),
                    then: self.plan(&node.then, &format!("{}.then", at))?,
                    otherwise: self.plan(&node.otherwise, &format!("{}.else", at))?,
                })
            }
        })
    }
}

/// A validated template, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    id: String,
    task: String,
    name: String,
    version: u32,
    budget: Option<Budget>,
    layout: Vec<CompiledLayoutNode>,
    slots: Vec<CompiledSlot>,
    diagnostics: Vec<Diagnostic>,
}

/// Per-slot accounting from one render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotReport {
    pub name: String,
    pub priority: i32,
    pub messages: usize,
    pub tokens: u32,
    pub omitted: bool,
    /// Plan messages that did not fit.
    pub skipped: usize,
}

/// Accounting for one render, for previews and logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderReport {
    /// Slots in execution order.
    pub slots: Vec<SlotReport>,
    /// Indices into `RenderOptions::injections` that did not fit.
    pub dropped_injections: Vec<usize>,
    /// Tokens charged by this render.
    pub consumed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderOutput {
    pub messages: Vec<ChatCompletionMessage>,
    pub report: RenderReport,
}

impl CompiledTemplate {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Warnings, plus tokenizer errors kept by a lenient compile.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Names of the slots the layout places, in execution order.
    pub fn slot_order(&self) -> Vec<&str> {
        execution_order(&self.slots, &self.placed_slots())
            .into_iter()
            .map(|i| self.slots[i].name.as_str())
            .collect()
    }

    /// Render the template into a message list.
    pub fn render(
        &self,
        context: &Value,
        registry: &SourceRegistry,
        budget: &mut BudgetManager,
        options: &RenderOptions,
    ) -> RenderResult<Vec<ChatCompletionMessage>> {
        self.render_with_report(context, registry, budget, options)
            .map(|output| output.messages)
    }

    /// Render the template, also returning per-slot accounting.
    pub fn render_with_report(
        &self,
        context: &Value,
        registry: &SourceRegistry,
        budget: &mut BudgetManager,
        options: &RenderOptions,
    ) -> RenderResult<RenderOutput> {
        let scope = ExecutionScope::root(context);
        let registry = ScopedRegistry::new(registry);
        let selected = self.placed_slots();
        let start = budget.consumed();

        let run = |budget: &mut BudgetManager| {
            let literals = render_literals(&self.layout, &scope, budget);
            execute_slots(&self.slots, &selected, registry, &scope, budget)
                .map(|outputs| (literals, outputs))
        };
        let (literals, outputs) = match self.budget.and_then(|b| b.max_tokens) {
            Some(max) => budget.with_node_budget(max, run),
            None => run(budget),
        }?;

        let (injections, dropped_injections) =
            charge_injections(&options.injections, &options.attachment_defaults, budget);

        let report = RenderReport {
            slots: execution_order(&self.slots, &selected)
                .into_iter()
                .filter_map(|i| {
                    let output = outputs.get(&i)?;
                    let slot = &self.slots[i];
                    Some(SlotReport {
                        name: slot.name.clone(),
                        priority: slot.priority,
                        messages: output.messages.len(),
                        tokens: output.tokens,
                        omitted: output.omitted,
                        skipped: output.skipped,
                    })
                })
                .collect(),
            dropped_injections,
            consumed: budget.consumed().saturating_sub(start),
        };

        let messages = assemble_layout(&self.layout, literals, outputs, injections);
        debug!(
            template = %self.id,
            messages = messages.len(),
            consumed = report.consumed,
            "template rendered"
        );
        Ok(RenderOutput { messages, report })
    }

    fn placed_slots(&self) -> Vec<usize> {
        self.layout
            .iter()
            .filter_map(|node| match node {
                CompiledLayoutNode::Slot(index) => Some(*index),
                CompiledLayoutNode::Message(_) | CompiledLayoutNode::Anchor(_) => None,
            })
            .collect()
    }
}
