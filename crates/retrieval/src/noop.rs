//! No-op knowledge adapters — used when no vector backend is wired.
//!
//! Retrieval over these always comes back empty, so grounded turns degrade
//! to the no-context prompt variant.

use async_trait::async_trait;
use parley_core::error::RetrievalError;
use parley_core::retrieval::{KnowledgeCatalog, RetrievedChunk, VectorSearch};

/// A knowledge backend with nothing in it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKnowledge;

#[async_trait]
impl KnowledgeCatalog for NoKnowledge {
    async fn knowledge_ids(&self) -> Result<Vec<String>, RetrievalError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl VectorSearch for NoKnowledge {
    async fn search(
        &self,
        _knowledge_id: &str,
        _queries: &[String],
        _top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        Ok(Vec::new())
    }
}
