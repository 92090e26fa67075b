/*
 * schema.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `storyloom schema`: print the template JSON Schema.

use anyhow::{Context, Result};
use storyloom_prompt::template_schema;

pub fn execute(pretty: bool) -> Result<()> {
    let schema = template_schema();
    let text = if pretty {
        serde_json::to_string_pretty(&schema)
    } else {
        serde_json::to_string(&schema)
    }
    .context("Failed to encode schema")?;
    println!("{}", text);
    Ok(())
}
