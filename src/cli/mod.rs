//! Command-line surface for ingesting articles and querying the index.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Chunk, embed and retrieve news articles for grounded generation.
#[derive(Debug, Parser)]
#[command(name = "arag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Chunk, embed and index articles from a JSON/JSONL file
    Ingest(commands::IngestArgs),

    /// Retrieve the chunks most similar to a query
    Search(commands::SearchArgs),

    /// Check embedding server and vector index status
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
