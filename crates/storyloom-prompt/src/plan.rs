/*
 * plan.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiled, executable forms of the authored template nodes.
//!
//! Lowering replaces every template string with a [`CompiledLeaf`]; the rest
//! of the structure carries over unchanged.

use crate::leaf::CompiledLeaf;
use crate::model::{Budget, ConditionRef, DataRef, FillDir, GlobalAnchor, Role};
use crate::scope::ExecutionScope;

/// A fixed message with compiled content.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBlock {
    pub role: Role,
    pub content: CompiledLeaf,
    pub prefix: bool,
}

impl CompiledBlock {
    pub fn render(&self, scope: &ExecutionScope<'_>) -> String {
        self.content.render(scope)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledPlanNode {
    Message(CompiledMessage),
    ForEach(CompiledForEach),
    If(CompiledIf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMessage {
    pub role: Role,
    pub content: CompiledLeaf,
    pub from: Option<DataRef>,
    pub prefix: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledForEach {
    pub source: DataRef,
    pub map: Vec<CompiledPlanNode>,
    pub limit: Option<usize>,
    pub fill_dir: FillDir,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledIf {
    pub when: ConditionRef,
    pub then: Vec<CompiledPlanNode>,
    pub otherwise: Vec<CompiledPlanNode>,
}

/// A slot ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSlot {
    pub name: String,
    pub priority: i32,
    pub budget: Option<Budget>,
    pub plan: Vec<CompiledPlanNode>,
    pub omit_if_empty: bool,
    pub header: Option<CompiledBlock>,
    pub footer: Option<CompiledBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompiledLayoutNode {
    /// Index into the compiled template's slot list.
    Slot(usize),
    Message(CompiledBlock),
    Anchor(GlobalAnchor),
}
