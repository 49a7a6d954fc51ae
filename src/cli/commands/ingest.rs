//! Ingest command implementation.

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::cli::output::{IngestReport, get_formatter};
use crate::models::{ArticleMetadata, Config, Document, OutputFormat};
use crate::services::RetrievalPipeline;

/// Arguments for the ingest command.
#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Path to JSON or JSONL file of articles (use - for stdin)
    #[arg()]
    pub file: Option<PathBuf>,

    /// Only validate the input file without indexing
    #[arg(long)]
    pub validate_only: bool,
}

/// Article identifiers arrive as numbers or strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ArticleId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArticleId::Number(n) => write!(f, "{n}"),
            ArticleId::Text(s) => write!(f, "{s}"),
        }
    }
}

/// JSON article record.
#[derive(Debug, Deserialize)]
pub struct ArticleRecord {
    pub id: ArticleId,
    pub title: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(flatten)]
    pub metadata: ArticleMetadata,
}

impl ArticleRecord {
    /// An explicit header wins over one rendered from metadata.
    pub fn into_document(self) -> Document {
        let id = self.id.to_string();
        match self.header {
            Some(header) => {
                let document = Document::new(id, self.title, self.body).with_header(header);
                match self.metadata.url {
                    Some(url) => document.with_url(url),
                    None => document,
                }
            }
            None => Document::from_article(id, self.title, &self.metadata, self.body),
        }
    }
}

/// Handle the ingest command.
pub async fn handle_ingest(args: IngestArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let input = read_input(args.file.as_deref())?;
    let records = parse_articles(&input)?;

    if records.is_empty() {
        print!("{}", formatter.format_message("No articles found in input."));
        return Ok(());
    }

    if verbose || args.validate_only {
        eprintln!("Found {} articles to ingest", records.len());
    }

    if args.validate_only {
        print!(
            "{}",
            formatter.format_message(&format!(
                "Validation successful: {} articles ready for ingestion",
                records.len()
            ))
        );
        return Ok(());
    }

    let documents: Vec<Document> = records
        .into_iter()
        .map(ArticleRecord::into_document)
        .collect();

    let pipeline = RetrievalPipeline::from_config(&config)
        .await
        .context("failed to initialize retrieval pipeline")?;

    info!(documents = documents.len(), "starting ingestion");
    let results = pipeline.ingest_all(documents).await;

    let report = IngestReport::new(results, start_time.elapsed().as_millis() as u64);
    print!("{}", formatter.format_ingest_report(&report));

    if report.failed > 0 {
        anyhow::bail!("{} of {} articles failed", report.failed, report.documents);
    }

    Ok(())
}

/// Read input from file or stdin.
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path.to_string_lossy() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("failed to read stdin")?;
            Ok(input)
        }
    }
}

/// Parse articles from a JSON array or JSONL.
fn parse_articles(input: &str) -> Result<Vec<ArticleRecord>> {
    let input = input.trim();

    if input.is_empty() {
        return Ok(Vec::new());
    }

    if input.starts_with('[') {
        return serde_json::from_str(input).context("failed to parse JSON array");
    }

    let mut records = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ArticleRecord = serde_json::from_str(line)
            .with_context(|| format!("failed to parse JSON at line {}", i + 1))?;
        records.push(record);
    }

    Ok(records)
}
