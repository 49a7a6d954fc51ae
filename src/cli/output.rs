use serde::Serialize;
use std::fmt::Write as FmtWrite;

use crate::models::{IngestResult, OutputFormat, SearchResults};

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_ingest_report(&self, report: &IngestReport) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_connected: bool,
    pub vector_store_driver: String,
    pub vector_store_url: String,
    pub vector_store_connected: bool,
    pub chunk_count: u64,
    pub table: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub indexed: usize,
    pub failed: usize,
    pub chunks: usize,
    pub duration_ms: u64,
    pub results: Vec<IngestResult>,
}

impl IngestReport {
    pub fn new(results: Vec<IngestResult>, duration_ms: u64) -> Self {
        let indexed = results.iter().filter(|r| r.is_indexed()).count();
        Self {
            documents: results.len(),
            indexed,
            failed: results.len() - indexed,
            chunks: results.iter().map(|r| r.chunk_count).sum(),
            duration_ms,
            results,
        }
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        let _ = writeln!(output, "Search results for: \"{}\"", results.query);
        let _ = writeln!(
            output,
            "Found {} results in {}ms\n",
            results.results.len(),
            results.duration_ms
        );

        for (i, result) in results.results.iter().enumerate() {
            let _ = writeln!(output, "{}. [Score: {:.3}]", i + 1, result.score);
            if !result.title.is_empty() {
                let _ = writeln!(output, "   Title: {}", result.title);
            }
            let _ = writeln!(
                output,
                "   Document: {} ({} #{})",
                result.document_id, result.chunk_kind, result.chunk_index
            );
            if let Some(ref url) = result.url {
                let _ = writeln!(output, "   URL: {}", url);
            }
            let _ = writeln!(output, "   ---");

            let preview: String = result.chunk_text.chars().take(200).collect();
            let preview = if result.chunk_text.chars().count() > 200 {
                format!("{}...", preview)
            } else {
                preview
            };
            for line in preview.lines() {
                let _ = writeln!(output, "   {}", line);
            }
            let _ = writeln!(output);
        }

        output
    }

    fn format_ingest_report(&self, report: &IngestReport) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Ingestion Complete");
        let _ = writeln!(output, "------------------");
        let _ = writeln!(output, "Documents: {}", report.documents);
        let _ = writeln!(output, "Indexed:   {}", report.indexed);
        let _ = writeln!(output, "Failed:    {}", report.failed);
        let _ = writeln!(output, "Chunks:    {}", report.chunks);
        let _ = writeln!(output, "Duration:  {}ms", report.duration_ms);

        let failures: Vec<&IngestResult> =
            report.results.iter().filter(|r| !r.is_indexed()).collect();
        if !failures.is_empty() {
            let _ = writeln!(output, "\nFailures");
            let _ = writeln!(output, "--------");
            for failure in failures {
                let reason = failure.failure_reason.as_deref().unwrap_or("unknown");
                let _ = writeln!(output, "  {} [{}] {}", failure.document_id, failure.status, reason);
            }
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let connected = |ok: bool| if ok { "[CONNECTED]" } else { "[DISCONNECTED]" };

        let mut output = String::new();
        let _ = writeln!(output, "Status");
        let _ = writeln!(output, "------");
        let _ = writeln!(
            output,
            "Embedding:     {} {}",
            status.embedding_url,
            connected(status.embedding_connected)
        );
        let _ = writeln!(output, "  Model:       {}", status.embedding_model);
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Vector Store:  {} ({})",
            status.vector_store_driver,
            connected(status.vector_store_connected)
        );
        if status.vector_store_connected {
            let _ = writeln!(output, "  URL:         {}", status.vector_store_url);
            let _ = writeln!(output, "  Table:       {}", status.table);
            let _ = writeln!(output, "  Chunks:      {}", status.chunk_count);
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }
}

pub struct JsonFormatter;

impl JsonFormatter {
    fn render<T: Serialize>(value: &T) -> String {
        match serde_json::to_string_pretty(value) {
            Ok(json) => format!("{json}\n"),
            Err(e) => format!("{{\"error\": \"{e}\"}}\n"),
        }
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        Self::render(results)
    }

    fn format_ingest_report(&self, report: &IngestReport) -> String {
        Self::render(report)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        Self::render(status)
    }

    fn format_message(&self, message: &str) -> String {
        Self::render(&serde_json::json!({ "message": message }))
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorClass, IngestFailure};
    use crate::models::{ChunkKind, IngestStage, RetrievedChunk};

    fn report() -> IngestReport {
        let failure = IngestFailure::new("2", IngestStage::Embedded, ErrorClass::Transient, "timeout");
        IngestReport::new(
            vec![IngestResult::indexed("1", 3), IngestResult::failed(&failure)],
            12,
        )
    }

    #[test]
    fn test_ingest_report_counts() {
        let report = report();
        assert_eq!(report.documents, 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.chunks, 3);
    }

    #[test]
    fn test_text_ingest_report_lists_failures() {
        let text = TextFormatter.format_ingest_report(&report());
        assert!(text.contains("Indexed:   1"));
        assert!(text.contains("2 [failed(embedding)]"));
    }

    #[test]
    fn test_json_search_results() {
        let results = SearchResults::new(
            "rust".to_string(),
            vec![RetrievedChunk {
                chunk_text: "Title: Rust".to_string(),
                chunk_kind: ChunkKind::Header,
                document_id: "1".to_string(),
                chunk_index: 0,
                title: "Rust".to_string(),
                url: None,
                score: 0.5,
            }],
            3,
        );
        let json = JsonFormatter.format_search_results(&results);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["results"][0]["chunk_kind"], "header");
        assert_eq!(value["query"], "rust");
    }

    #[test]
    fn test_text_empty_results() {
        let results = SearchResults::new("nothing".to_string(), Vec::new(), 1);
        assert_eq!(
            TextFormatter.format_search_results(&results),
            "No results found for: nothing\n"
        );
    }
}
