/*
 * main.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Storyloom prompt template CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "storyloom")]
#[command(about = "Compile, validate and preview Storyloom prompt templates", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a template and report its diagnostics
    Check {
        /// Template file (JSON or YAML)
        template: String,

        /// Source name the template may read from (repeatable).
        /// When omitted, any source name is accepted.
        #[arg(long = "source", value_name = "NAME")]
        sources: Vec<String>,

        /// Accept templates whose strings are malformed
        #[arg(long)]
        lenient: bool,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a template against a context file and print the messages
    Render {
        /// Template file (JSON or YAML)
        template: String,

        /// Context file; each top-level key becomes a named source
        #[arg(short, long)]
        context: String,

        /// Budget configuration file ({ maxTokens, lanes, charsPerToken })
        #[arg(short, long)]
        budget: Option<String>,

        /// Override the budget's maxTokens
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Render options file (injections, attachmentDefaults)
        #[arg(short, long)]
        options: Option<String>,

        /// Print the render report alongside the messages
        #[arg(long)]
        report: bool,
    },

    /// Print the JSON Schema of the template format
    Schema {
        /// Pretty-print the schema
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storyloom=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            template,
            sources,
            lenient,
            json,
        } => commands::check::execute(commands::check::CheckArgs {
            template,
            sources,
            lenient,
            json,
        }),
        Commands::Render {
            template,
            context,
            budget,
            max_tokens,
            options,
            report,
        } => commands::render::execute(commands::render::RenderArgs {
            template,
            context,
            budget,
            max_tokens,
            options,
            report,
        }),
        Commands::Schema { pretty } => commands::schema::execute(pretty),
    }
}
