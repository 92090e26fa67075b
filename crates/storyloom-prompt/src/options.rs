/*
 * options.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compile and render options.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{GlobalAnchor, Role};
use crate::registry::SourceRegistry;

/// Options for [`compile_template`](crate::compile_template).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    /// Non-reserved source names the task provides. `None` skips the check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_sources: Option<BTreeSet<String>>,

    /// Keep template strings with tokenizer errors instead of rejecting
    /// them. Used for template-builder previews; the errors are kept on the
    /// compiled template's diagnostics.
    #[serde(default)]
    pub lenient: bool,
}

impl CompileOptions {
    /// Allow exactly the sources `registry` provides.
    pub fn for_registry(registry: &SourceRegistry) -> Self {
        Self {
            allowed_sources: Some(registry.names().map(str::to_string).collect()),
            lenient: false,
        }
    }

    pub fn with_allowed_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn lenient(mut self) -> Self {
        self.lenient = true;
        self
    }
}

/// Defaults applied to injections that don't set their own lane or role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDefaults {
    #[serde(default = "default_lane")]
    pub lane: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_lane() -> String {
    "attachments".to_string()
}

fn default_role() -> Role {
    Role::User
}

impl Default for AttachmentDefaults {
    fn default() -> Self {
        Self {
            lane: default_lane(),
            role: default_role(),
        }
    }
}

/// Externally supplied content spliced in at a layout anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Injection {
    pub anchor: GlobalAnchor,
    /// Literal text; not interpreted as a template.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane: Option<String>,
}

impl Injection {
    pub fn new(anchor: GlobalAnchor, content: impl Into<String>) -> Self {
        Self {
            anchor,
            content: content.into(),
            role: None,
            name: None,
            lane: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    #[serde(default)]
    pub attachment_defaults: AttachmentDefaults,
    #[serde(default)]
    pub injections: Vec<Injection>,
}

impl RenderOptions {
    pub fn with_injection(mut self, injection: Injection) -> Self {
        self.injections.push(injection);
        self
    }
}
