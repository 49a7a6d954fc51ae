//! Prompt assembly from retrieved chunks.

use std::fmt::Write as FmtWrite;

use crate::models::RetrievedChunk;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant with access to a knowledge base of \
news articles. When context from the knowledge base is provided, use it to answer accurately \
and cite the sources by number. If the context is not relevant to the question, say so and \
answer from general knowledge.";

/// Render retrieved chunks as numbered sources, best first.
///
/// Each source names its article title and URL when known.
pub fn build_context(results: &[RetrievedChunk]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut output = String::from("CONTEXT FROM KNOWLEDGE BASE:\n\n");
    for (idx, result) in results.iter().enumerate() {
        let title = if result.title.trim().is_empty() {
            "Untitled"
        } else {
            result.title.as_str()
        };
        let _ = writeln!(
            output,
            "[{}] {} (document {}, {} #{}) relevance {:.3}",
            idx + 1,
            title,
            result.document_id,
            result.chunk_kind,
            result.chunk_index,
            result.score
        );
        if let Some(ref url) = result.url {
            let _ = writeln!(output, "URL: {url}");
        }
        let _ = writeln!(output, "{}\n", result.chunk_text.trim_end());
    }
    output
}

/// Full prompt for a generation call: instructions, context, then the question.
pub fn build_prompt(question: &str, results: &[RetrievedChunk]) -> String {
    let context = build_context(results);
    if context.is_empty() {
        return format!("{SYSTEM_PROMPT}\n\nUSER QUESTION:\n{question}");
    }
    format!("{SYSTEM_PROMPT}\n\n{context}USER QUESTION:\n{question}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkKind;

    fn hit(document_id: &str, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_text: text.to_string(),
            chunk_kind: ChunkKind::Header,
            document_id: document_id.to_string(),
            chunk_index: 0,
            title: String::new(),
            url: None,
            score,
        }
    }

    #[test]
    fn test_build_context_empty() {
        assert!(build_context(&[]).is_empty());
    }

    #[test]
    fn test_build_context_numbers_sources() {
        let context = build_context(&[
            hit("101", "Title: First\n\n", 0.91234),
            hit("202", "Title: Second", 0.5),
        ]);

        assert!(context.contains(
            "[1] Untitled (document 101, header #0) relevance 0.912\nTitle: First\n\n"
        ));
        assert!(context.contains(
            "[2] Untitled (document 202, header #0) relevance 0.500\nTitle: Second\n"
        ));
    }

    #[test]
    fn test_build_context_cites_title_and_url() {
        let mut source = hit("7", "Body of the launch story.", 0.8);
        source.title = "Launch day".to_string();
        source.url = Some("https://example.com/launch".to_string());

        let context = build_context(&[source]);

        assert!(context.contains(
            "[1] Launch day (document 7, header #0) relevance 0.800\n\
             URL: https://example.com/launch\n\
             Body of the launch story.\n"
        ));
    }

    #[test]
    fn test_build_prompt_ends_with_question() {
        let prompt = build_prompt("what is new?", &[hit("1", "Title: x", 0.7)]);
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.contains("(document 1, header #0)"));
        assert!(prompt.ends_with("USER QUESTION:\nwhat is new?"));

        let bare = build_prompt("hello", &[]);
        assert!(!bare.contains("CONTEXT"));
        assert!(bare.ends_with("USER QUESTION:\nhello"));
    }
}
