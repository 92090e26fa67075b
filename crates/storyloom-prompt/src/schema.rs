/*
 * schema.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! JSON Schema of the authorable template DSL.
//!
//! Derived from the model types, so it always tracks them. The visual
//! template builder consumes this.

use schemars::schema::RootSchema;
use schemars::schema_for;
use serde_json::Value;

use crate::model::PromptTemplate;

pub fn template_schema() -> RootSchema {
    schema_for!(PromptTemplate)
}

/// [`template_schema`] as a JSON value.
pub fn template_schema_json() -> Value {
    serde_json::to_value(template_schema()).unwrap_or_default()
}
