/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template compilation and rendering.
//!
//! Compile-time errors are permanent author errors: a template that fails to
//! compile must not be saved or used. Render-time errors only cover resolver
//! failures; missing data never produces an error.

use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// The template's shape is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateStructureError {
    /// Two slots share the same name.
    #[error("Duplicate slot name: {name}")]
    DuplicateSlot { name: String },

    /// A layout node references a slot that does not exist.
    #[error("Layout references unknown slot: {name}")]
    DanglingSlotRef { name: String },

    /// A slot is placed in the layout more than once.
    #[error("Slot '{name}' is referenced more than once in the layout")]
    DuplicateLayoutRef { name: String },

    /// `prefix: true` was set on a message whose role is not `assistant`.
    #[error("prefix is only allowed on assistant messages (at {location}, role {role})")]
    PrefixOnNonAssistant { location: String, role: String },

    /// A slot's budget ceiling or floor exceeds what its parent allows.
    #[error("Budget at {location} is {value} tokens, above its parent limit of {limit}")]
    BudgetExceedsParent {
        location: String,
        value: u32,
        limit: u32,
    },
}

/// The template references something the task does not provide.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthoringValidationError {
    /// A data reference names a source the task's registry doesn't offer.
    #[error("Unknown source '{source_name}' at {location}")]
    UnknownSource {
        source_name: String,
        location: String,
    },

    /// A `$`-prefixed name that is not one of the reserved scope sources.
    #[error("Unknown reserved name '{name}' at {location}")]
    UnknownReservedName { name: String, location: String },

    /// A template string could not be tokenized cleanly.
    #[error("Malformed template string at {location}: {}", first_message(.diagnostics))]
    MalformedTemplate {
        location: String,
        diagnostics: Vec<Diagnostic>,
    },
}

fn first_message(diagnostics: &[Diagnostic]) -> &str {
    diagnostics
        .first()
        .map(|d| d.message.as_str())
        .unwrap_or("unknown error")
}

/// Any error raised by [`compile_template`](crate::compile_template).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Structure(#[from] TemplateStructureError),

    #[error(transparent)]
    Authoring(#[from] AuthoringValidationError),
}

/// Failure reported by a [`SourceResolver`](crate::SourceResolver).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ResolveError {
    pub message: String,
}

impl ResolveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors that abort a single render call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// A source resolver failed unexpectedly.
    #[error("Source '{source_name}' failed to resolve: {error}")]
    Resolver {
        source_name: String,
        #[source]
        error: ResolveError,
    },
}

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Result type for rendering.
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCollector;

    #[test]
    fn test_compile_error_is_transparent() {
        let err: CompileError = TemplateStructureError::DuplicateSlot {
            name: "history".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Duplicate slot name: history");
    }

    #[test]
    fn test_malformed_template_reports_first_diagnostic() {
        let mut collector = DiagnosticCollector::new();
        collector.error_at("P-1-1", "Unterminated tag", "slots.a.plan[0].content", 6);
        let err = AuthoringValidationError::MalformedTemplate {
            location: "slots.a.plan[0].content".to_string(),
            diagnostics: collector.into_diagnostics(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed template string at slots.a.plan[0].content: Unterminated tag"
        );
    }

    #[test]
    fn test_render_error_keeps_source() {
        let err = RenderError::Resolver {
            source_name: "turns".to_string(),
            error: ResolveError::new("store unavailable"),
        };
        assert_eq!(
            err.to_string(),
            "Source 'turns' failed to resolve: store unavailable"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
