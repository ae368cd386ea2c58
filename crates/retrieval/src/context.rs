//! Grounding-context assembly.
//!
//! Turns an ordered chunk list into a single bounded string. The reference
//! list is extracted by the fan-out engine before this step and passed
//! through unchanged.

use parley_core::retrieval::RetrievedChunk;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Fixed separator between rendered document blocks.
const SEPARATOR: &str = "\n\n---\n\n";

/// Characters reserved for the truncation notice when the first document
/// alone exceeds the limit.
const TRUNCATION_MARGIN: usize = 50;

const TRUNCATION_NOTICE: &str = "\n[... content truncated ...]";

/// The ephemeral result of one retrieval pass. Constructed and consumed
/// within a single turn, never cached across turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalContext {
    /// Bounded, formatted grounding text. Empty when retrieval was attempted
    /// but nothing matched.
    pub context_text: String,

    /// Retrieved chunks after filtering and deduplication, in merge order.
    pub documents: Vec<RetrievedChunk>,

    /// One entry per unique source document id.
    pub references: Vec<RetrievedChunk>,

    /// How many search queries were issued.
    pub query_count: usize,

    /// Knowledge bases that answered (failed ones excluded).
    pub knowledge_ids_searched: Vec<String>,
}

impl RetrievalContext {
    /// An empty result for degraded retrieval.
    pub fn empty(query_count: usize) -> Self {
        Self {
            query_count,
            ..Self::default()
        }
    }
}

/// Render one chunk as a labeled context block.
fn format_single_document(chunk: &RetrievedChunk, index: usize) -> String {
    format!(
        "Document {index} - Source: {} (Knowledge Base: {})\n\n{}",
        chunk.file_name, chunk.knowledge_id, chunk.content
    )
}

/// Format retrieved chunks as a bounded context string.
///
/// Greedy and order-preserving: documents are appended until the limit would
/// be exceeded. The first document is always included — truncated to
/// `max_length - 50` with a trailing notice when it alone overflows — so the
/// context is never empty while at least one document matched.
pub fn format_context(documents: &[RetrievedChunk], max_length: usize) -> String {
    if documents.is_empty() {
        return String::new();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current_length = 0usize;
    let mut truncated = false;

    for (i, chunk) in documents.iter().enumerate() {
        let block = format_single_document(chunk, i + 1);

        let mut projected = current_length + block.len();
        if !parts.is_empty() {
            projected += SEPARATOR.len();
        }

        if projected <= max_length {
            parts.push(block);
            current_length = projected;
        } else if i == 0 {
            let available = max_length.saturating_sub(TRUNCATION_MARGIN);
            let mut cut = block;
            cut.truncate(floor_char_boundary(&cut, available));
            cut.push_str(TRUNCATION_NOTICE);
            parts.push(cut);
            truncated = true;
            break;
        } else {
            truncated = true;
            break;
        }
    }

    if truncated {
        info!(
            included = parts.len(),
            total = documents.len(),
            "Context truncated"
        );
    }

    parts.join(SEPARATOR)
}

/// Largest index `<= at` that lies on a UTF-8 character boundary.
fn floor_char_boundary(s: &str, at: usize) -> usize {
    if at >= s.len() {
        return s.len();
    }
    let mut idx = at;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
