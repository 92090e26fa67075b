/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Command implementations for the Storyloom CLI
//!
//! Each command module handles file I/O and output, and delegates to
//! storyloom-prompt for compiling and rendering.

pub mod check;
pub mod render;
pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Read a JSON or YAML document; the format is chosen by file extension.
pub fn load_document<T: DeserializeOwned>(path: &str) -> Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    parse_document(&text, Path::new(path))
}

fn parse_document<T: DeserializeOwned>(text: &str, path: &Path) -> Result<T> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => serde_yaml::from_str(text)
            .with_context(|| format!("Invalid YAML in {}", path.display())),
        _ => serde_json::from_str(text)
            .with_context(|| format!("Invalid JSON in {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use storyloom_prompt::BudgetConfig;

    #[test]
    fn test_parse_yaml_by_extension() {
        let config: BudgetConfig = parse_document(
            "maxTokens: 300\nlanes:\n  attachments: 40\n",
            Path::new("budget.yaml"),
        )
        .unwrap();
        assert_eq!(config.max_tokens, 300);
        assert_eq!(config.lanes.get("attachments"), Some(&40));
        assert_eq!(config.chars_per_token, 4);
    }

    #[test]
    fn test_parse_json_is_the_default() {
        let config: BudgetConfig =
            parse_document(r#"{ "maxTokens": 12 }"#, Path::new("budget")).unwrap();
        assert_eq!(config.max_tokens, 12);
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let err = parse_document::<BudgetConfig>("{", Path::new("budget.json")).unwrap_err();
        assert!(err.to_string().contains("budget.json"));
    }
}
