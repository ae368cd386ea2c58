//! Retrieval collaborator traits — vector search and knowledge-base
//! enumeration.
//!
//! The fan-out engine consumes these capabilities without knowing the
//! backing index technology. Implementations live outside the core; tests
//! use scripted mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// A retrieved document chunk with source metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Identifier of the source document this chunk came from.
    pub document_id: String,

    /// Name of the source file.
    pub file_name: String,

    /// Knowledge base the chunk belongs to.
    pub knowledge_id: String,

    /// URL or path to the source file, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Similarity score from the search backend. Not every backend supplies
    /// one; unscored chunks bypass threshold filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,

    /// The chunk text.
    pub content: String,
}

impl RetrievedChunk {
    /// The label surfaced to clients in reference lists: the source URL when
    /// known, otherwise the file name.
    pub fn source_label(&self) -> &str {
        self.source_url.as_deref().unwrap_or(&self.file_name)
    }
}

/// Per-knowledge-base nearest-neighbor search capability.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Run every query against one knowledge base, returning up to `top_k`
    /// ranked chunks per query, concatenated in query order.
    async fn search(
        &self,
        knowledge_id: &str,
        queries: &[String],
        top_k: usize,
    ) -> std::result::Result<Vec<RetrievedChunk>, RetrievalError>;
}

/// Knowledge-base enumeration capability.
#[async_trait]
pub trait KnowledgeCatalog: Send + Sync {
    /// The set of knowledge base ids that currently hold any indexed chunk.
    async fn knowledge_ids(&self) -> std::result::Result<Vec<String>, RetrievalError>;
}
