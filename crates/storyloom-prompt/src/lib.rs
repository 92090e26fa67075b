/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Prompt template compiler and budget-aware renderer for Storyloom.
//!
//! A [`PromptTemplate`] is an author-defined JSON document that describes how
//! to turn task data into the chat messages of one LLM request:
//!
//! - **Slots** are named, independently budgeted content blocks whose
//!   **plan** is a small closed set of nodes (`message`, `forEach`, `if`)
//! - The **layout** orders slots, literal messages and injection anchors
//! - Template strings support `{{path}}` interpolation and inline
//!   `{{#if path}}...{{#else}}...{{#endif}}` blocks
//! - Loop variables are reached through the reserved names `$item`,
//!   `$index`, `$parent`, `$globals` and `$ctx`
//!
//! Templates are compiled once with [`compile_template`], which rejects
//! structural and authoring errors, and the resulting [`CompiledTemplate`] is
//! rendered per request against a context, a [`SourceRegistry`] and a fresh
//! [`BudgetManager`]. Rendering is deterministic and never fails on missing
//! data; only a failing source resolver produces a [`RenderError`].
//!
//! # Example
//!
//! ```ignore
//! use storyloom_prompt::{
//!     BudgetManager, CompileOptions, RenderOptions, SourceRegistry, compile_template,
//! };
//!
//! let registry = SourceRegistry::from_context_keys(["turns"]);
//! let compiled = compile_template(&template, &CompileOptions::for_registry(&registry))?;
//!
//! let mut budget = BudgetManager::with_default_estimator(4096);
//! let messages = compiled.render(&context, &registry, &mut budget, &RenderOptions::default())?;
//! ```

pub mod ast;
pub mod budget;
pub mod compiler;
pub mod condition;
pub mod diagnostics;
pub mod error;
pub mod evaluator;
pub mod layout;
pub mod leaf;
pub mod model;
pub mod options;
pub mod path;
pub mod plan;
pub mod registry;
pub mod schema;
pub mod scope;
pub mod slots;
pub mod tokenizer;
pub mod validate;
pub mod value;

// Re-export main types at crate root
pub use budget::{BudgetConfig, BudgetManager, CharRatioEstimator, TokenEstimator};
pub use compiler::{
    CompiledTemplate, RenderOutput, RenderReport, SlotReport, compile_template,
};
pub use diagnostics::{Diagnostic, DiagnosticCollector, DiagnosticKind, DiagnosticLocation};
pub use error::{
    AuthoringValidationError, CompileError, CompileResult, RenderError, RenderResult,
    ResolveError, TemplateStructureError,
};
pub use leaf::{CompiledLeaf, compile_leaf};
pub use model::{
    Budget, ChatCompletionMessage, ConditionRef, ConditionType, DataRef, FillDir, ForEachNode,
    GlobalAnchor, IfNode, LayoutNode, MessageBlock, MessageNode, PlanNode, PromptTemplate, Role,
    SlotMap, SlotSpec,
};
pub use options::{AttachmentDefaults, CompileOptions, Injection, RenderOptions};
pub use path::{resolve_path, resolve_path_with_globals};
pub use registry::{ContextPath, ScopedRegistry, SourceRegistry, SourceResolver};
pub use schema::{template_schema, template_schema_json};
pub use scope::{ExecutionScope, ScopeFrame};
pub use tokenizer::{Segment, Tokenized, tokenize};
pub use validate::validate_structure;
