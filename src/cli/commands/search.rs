use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use crate::cli::output::get_formatter;
use crate::models::{ChunkFilter, ChunkKind, Config, OutputFormat, SearchResults};
use crate::services::{RetrievalPipeline, build_context};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'n', help = "Number of chunks to retrieve")]
    pub limit: Option<u32>,

    #[arg(long, help = "Restrict results to one document id")]
    pub document: Option<String>,

    #[arg(long, help = "Restrict results to a chunk kind: header or content")]
    pub kind: Option<ChunkKind>,

    #[arg(long, help = "Print the assembled prompt context instead of a result list")]
    pub context: bool,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let limit = args.limit.unwrap_or(config.search.top_k);
    if limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }

    let mut filter = match args.document {
        Some(document_id) => ChunkFilter::document(document_id),
        None => ChunkFilter::any(),
    };
    if let Some(kind) = args.kind {
        filter = filter.with_kind(kind);
    }

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Limit: {limit}");
        if let Some(ref document_id) = filter.document_id {
            eprintln!("  Document: {document_id}");
        }
        if let Some(kind) = filter.kind {
            eprintln!("  Kind: {kind}");
        }
    }

    let pipeline = RetrievalPipeline::from_config(&config)
        .await
        .context("failed to initialize retrieval pipeline")?;

    let results = pipeline
        .retrieve(query, limit as usize, &filter)
        .await
        .context("search failed")?;

    if args.context {
        let context = build_context(&results);
        if context.is_empty() {
            print!("{}", formatter.format_message("No relevant context found."));
        } else if format == OutputFormat::Json {
            print!("{}", formatter.format_message(&context));
        } else {
            print!("{context}");
        }
        return Ok(());
    }

    let duration_ms = start_time.elapsed().as_millis() as u64;
    if verbose {
        eprintln!("  Total: {duration_ms}ms");
        eprintln!();
    }

    let search_results = SearchResults::new(query.to_string(), results, duration_ms);
    print!("{}", formatter.format_search_results(&search_results));

    Ok(())
}
