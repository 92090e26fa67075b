/*
 * tokenizer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template string tokenizer.
//!
//! Splits a template string into segments:
//!
//! - text
//! - variables: `{{ path }}`
//! - block start: `{{#if path}}` or `{{#if !path}}`
//! - block else: `{{#else}}` or `{{else}}`
//! - block end: `{{#endif}}` or `{{/if}}`
//!
//! The tokenizer is fault tolerant. Unknown `#directives` become variable
//! lookups of the directive text, and an unterminated tag records an error
//! while keeping everything parsed before it. Nothing here panics or returns
//! `Err`; problems land in the returned diagnostics.

use crate::diagnostics::DiagnosticCollector;

/// Diagnostic codes raised by the tokenizer.
pub mod codes {
    pub const UNTERMINATED_TAG: &str = "P-1-1";
    pub const EMPTY_TAG: &str = "P-1-2";
    pub const MISSING_CONDITION: &str = "P-1-3";
    pub const UNKNOWN_DIRECTIVE: &str = "P-1-4";
    pub const UNMATCHED_ELSE: &str = "P-1-5";
    pub const UNMATCHED_END: &str = "P-1-6";
    pub const UNCLOSED_BLOCK: &str = "P-1-7";
    pub const DUPLICATE_ELSE: &str = "P-1-8";
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// One token of a template string. Offsets are byte offsets of the token's
/// start inside the source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text { text: String, offset: usize },
    Variable { path: String, offset: usize },
    BlockStart { expr: String, offset: usize },
    BlockElse { offset: usize },
    BlockEnd { offset: usize },
}

impl Segment {
    pub fn offset(&self) -> usize {
        match self {
            Segment::Text { offset, .. }
            | Segment::Variable { offset, .. }
            | Segment::BlockStart { offset, .. }
            | Segment::BlockElse { offset }
            | Segment::BlockEnd { offset } => *offset,
        }
    }
}

/// Result of tokenizing one template string.
#[derive(Debug, Clone, Default)]
pub struct Tokenized {
    pub segments: Vec<Segment>,
    pub diagnostics: DiagnosticCollector,
}

/// Tokenize `source`. `field` names the template field the string came from
/// and is only used for diagnostic locations.
pub fn tokenize(source: &str, field: &str) -> Tokenized {
    let mut out = Tokenized::default();
    let mut cursor = 0;

    while cursor < source.len() {
        let Some(open_rel) = source[cursor..].find(OPEN) else {
            push_text(&mut out.segments, &source[cursor..], cursor);
            break;
        };
        let open = cursor + open_rel;
        push_text(&mut out.segments, &source[cursor..open], cursor);

        let inner_start = open + OPEN.len();
        let Some(close_rel) = source[inner_start..].find(CLOSE) else {
            out.diagnostics.error_at(
                codes::UNTERMINATED_TAG,
                format!(
                    "Unterminated tag: '{}' has no closing '}}}}'",
                    truncate(&source[open..], 24)
                ),
                field,
                open,
            );
            break;
        };
        let close = inner_start + close_rel;
        classify_tag(&source[inner_start..close], open, field, &mut out);
        cursor = close + CLOSE.len();
    }

    out
}

fn push_text(segments: &mut Vec<Segment>, text: &str, offset: usize) {
    if text.is_empty() {
        return;
    }
    // Adjacent text (e.g. around a skipped empty tag) is merged.
    if let Some(Segment::Text { text: prev, .. }) = segments.last_mut() {
        prev.push_str(text);
        return;
    }
    segments.push(Segment::Text {
        text: text.to_string(),
        offset,
    });
}

fn classify_tag(raw: &str, offset: usize, field: &str, out: &mut Tokenized) {
    let inner = raw.trim();
    if inner.is_empty() {
        out.diagnostics
            .error_at(codes::EMPTY_TAG, "Empty tag '{{}}'", field, offset);
        return;
    }

    if let Some(directive) = inner.strip_prefix('#') {
        let directive = directive.trim_start();
        let (name, rest) = directive
            .split_once(char::is_whitespace)
            .map_or((directive, ""), |(n, r)| (n, r.trim()));
        match name {
            "if" => {
                if rest.is_empty() {
                    out.diagnostics.error_at(
                        codes::MISSING_CONDITION,
                        "'#if' needs a condition",
                        field,
                        offset,
                    );
                }
                out.segments.push(Segment::BlockStart {
                    expr: rest.to_string(),
                    offset,
                });
            }
            "else" if rest.is_empty() => out.segments.push(Segment::BlockElse { offset }),
            "endif" if rest.is_empty() => out.segments.push(Segment::BlockEnd { offset }),
            _ => {
                out.diagnostics.warn_at(
                    codes::UNKNOWN_DIRECTIVE,
                    format!("Unknown directive '#{}' is treated as a variable", name),
                    field,
                    offset,
                );
                out.segments.push(Segment::Variable {
                    path: directive.to_string(),
                    offset,
                });
            }
        }
        return;
    }

    match inner {
        "else" => out.segments.push(Segment::BlockElse { offset }),
        "/if" => out.segments.push(Segment::BlockEnd { offset }),
        _ => out.segments.push(Segment::Variable {
            path: inner.to_string(),
            offset,
        }),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(t: &str, offset: usize) -> Segment {
        Segment::Text {
            text: t.to_string(),
            offset,
        }
    }

    fn var(p: &str, offset: usize) -> Segment {
        Segment::Variable {
            path: p.to_string(),
            offset,
        }
    }

    #[test]
    fn test_plain_text() {
        let t = tokenize("Hello, world!", "f");
        assert_eq!(t.segments, vec![text("Hello, world!", 0)]);
        assert!(t.diagnostics.is_empty());
    }

    #[test]
    fn test_variables_and_text() {
        let t = tokenize("Hi {{ name }}, from {{$globals.worldName}}.", "f");
        assert_eq!(
            t.segments,
            vec![
                text("Hi ", 0),
                var("name", 3),
                text(", from ", 13),
                var("$globals.worldName", 20),
                text(".", 42),
            ]
        );
    }

    #[test]
    fn test_block_tokens() {
        let t = tokenize("{{#if mood}}a{{else}}b{{#endif}}{{#if !x}}c{{/if}}", "f");
        assert_eq!(
            t.segments,
            vec![
                Segment::BlockStart {
                    expr: "mood".to_string(),
                    offset: 0
                },
                text("a", 12),
                Segment::BlockElse { offset: 13 },
                text("b", 21),
                Segment::BlockEnd { offset: 22 },
                Segment::BlockStart {
                    expr: "!x".to_string(),
                    offset: 32
                },
                text("c", 42),
                Segment::BlockEnd { offset: 43 },
            ]
        );
        assert!(t.diagnostics.is_empty());
    }

    #[test]
    fn test_unterminated_tag_keeps_leading_text() {
        let t = tokenize("Start {{name", "slots.a.plan[0].content");
        assert_eq!(t.segments, vec![text("Start ", 0)]);
        assert!(t.diagnostics.has_errors());
        let diag = &t.diagnostics.diagnostics()[0];
        assert_eq!(diag.code, codes::UNTERMINATED_TAG);
        assert_eq!(diag.location.as_ref().map(|l| l.offset), Some(6));
    }

    #[test]
    fn test_unknown_directive_becomes_variable() {
        let t = tokenize("{{#each items}}", "f");
        assert_eq!(t.segments, vec![var("each items", 0)]);
        assert!(!t.diagnostics.has_errors());
        assert_eq!(t.diagnostics.diagnostics()[0].code, codes::UNKNOWN_DIRECTIVE);
    }

    #[test]
    fn test_empty_tag_is_error_and_text_merges() {
        let t = tokenize("a{{ }}b", "f");
        assert_eq!(t.segments, vec![text("ab", 0)]);
        assert!(t.diagnostics.has_errors());
    }

    #[test]
    fn test_if_without_condition() {
        let t = tokenize("{{#if}}x{{/if}}", "f");
        assert!(t.diagnostics.has_errors());
        assert_eq!(t.segments.len(), 3);
    }

    #[test]
    fn test_multibyte_text() {
        let t = tokenize("Übung {{x}} ü", "f");
        assert_eq!(t.segments, vec![text("Übung ", 0), var("x", 7), text(" ü", 12)]);
    }
}
