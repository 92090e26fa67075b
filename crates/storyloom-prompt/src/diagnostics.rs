/*
 * diagnostics.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Diagnostics collected while tokenizing and linting templates.
//!
//! Tokenizing never throws: problems are recorded here with the template
//! field they came from and the byte offset inside that string. The compiler
//! decides whether recorded errors block compilation.

use serde::{Deserialize, Serialize};

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Error,
    Warning,
}

/// Where in the authored template a diagnostic points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticLocation {
    /// Field path inside the template, e.g. `slots.history.plan[0].content`.
    pub field: String,
    /// Byte offset inside that field's string.
    pub offset: usize,
}

/// A single diagnostic message.
///
/// Codes are stable identifiers: `P-1-*` for tokenizer problems and
/// `P-2-*` for non-fatal lint findings such as an unplaced slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<DiagnosticLocation>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
        };
        write!(f, "{}[{}]: {}", kind, self.code, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " (at {}:{})", loc.field, loc.offset)?;
        }
        Ok(())
    }
}

/// Collector for diagnostics produced during compilation.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    /// Create a new empty collector.
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Add an error with code and location.
    pub fn error_at(
        &mut self,
        code: &str,
        message: impl Into<String>,
        field: &str,
        offset: usize,
    ) {
        self.push(DiagnosticKind::Error, code, message.into(), field, offset);
    }

    /// Add a warning with code and location.
    pub fn warn_at(&mut self, code: &str, message: impl Into<String>, field: &str, offset: usize) {
        self.push(DiagnosticKind::Warning, code, message.into(), field, offset);
    }

    fn push(
        &mut self,
        kind: DiagnosticKind,
        code: &str,
        message: String,
        field: &str,
        offset: usize,
    ) {
        self.add(Diagnostic {
            code: code.to_string(),
            kind,
            message,
            location: Some(DiagnosticLocation {
                field: field.to_string(),
                offset,
            }),
        });
    }

    /// Merge another collector's diagnostics into this one.
    pub fn extend(&mut self, other: DiagnosticCollector) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// Check if any errors were collected (warnings don't count).
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Error)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Only the error-level diagnostics, in insertion order.
    pub fn errors(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Error)
            .cloned()
            .collect()
    }

    /// Consume the collector, returning diagnostics in insertion order.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}
