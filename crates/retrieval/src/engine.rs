//! The retrieval fan-out engine.
//!
//! Fans the query set out over one or all knowledge bases, merges, filters
//! by score, deduplicates by content, and extracts references. Per-KB
//! failures are isolated: a failed search is logged, skipped, and excluded
//! from `knowledge_ids_searched`; it never aborts the whole retrieval.

use std::collections::HashSet;
use std::sync::Arc;

use parley_config::RetrievalConfig;
use parley_core::message::Message;
use parley_core::retrieval::{KnowledgeCatalog, RetrievedChunk, VectorSearch};
use sha2::{Digest, Sha256};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::context::{RetrievalContext, format_context};
use crate::queries::build_queries;

/// Fan-out retrieval over runtime-discovered knowledge bases.
pub struct RetrievalEngine {
    catalog: Arc<dyn KnowledgeCatalog>,
    search: Arc<dyn VectorSearch>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        catalog: Arc<dyn KnowledgeCatalog>,
        search: Arc<dyn VectorSearch>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            catalog,
            search,
            config,
        }
    }

    /// Retrieve grounding context for a turn.
    ///
    /// `knowledge_id = None` means "search all". This method never fails:
    /// engine-level errors (including catalog enumeration failure) degrade to
    /// an empty result.
    pub async fn retrieve(
        &self,
        message: &str,
        knowledge_id: Option<&str>,
        history: &[Message],
    ) -> RetrievalContext {
        let queries = build_queries(
            message,
            history,
            self.config.include_history_queries,
            self.config.max_history_queries,
        );

        info!(
            knowledge_id = knowledge_id.unwrap_or("ALL"),
            queries = queries.len(),
            top_k = self.config.top_k,
            "Retrieval starting"
        );

        let (mut documents, knowledge_ids_searched) = match knowledge_id {
            Some(id) => self.search_single(id, &queries).await,
            None => self.search_all(&queries).await,
        };

        if let Some(threshold) = self.config.score_threshold {
            documents = filter_by_score(documents, threshold);
        }
        let documents = deduplicate(documents);
        let references = extract_references(&documents);
        let context_text = format_context(&documents, self.config.max_context_length);

        info!(
            documents = documents.len(),
            references = references.len(),
            context_length = context_text.len(),
            knowledge_bases_searched = knowledge_ids_searched.len(),
            "Retrieval completed"
        );

        RetrievalContext {
            context_text,
            documents,
            references,
            query_count: queries.len(),
            knowledge_ids_searched,
        }
    }

    /// Search one named knowledge base. A failure empties the result but
    /// still reports the turn as not having searched that KB.
    async fn search_single(
        &self,
        knowledge_id: &str,
        queries: &[String],
    ) -> (Vec<RetrievedChunk>, Vec<String>) {
        match self
            .search
            .search(knowledge_id, queries, self.config.top_k)
            .await
        {
            Ok(documents) => (documents, vec![knowledge_id.to_string()]),
            Err(e) => {
                warn!(knowledge_id, error = %e, "Knowledge base search failed, continuing without it");
                (Vec::new(), Vec::new())
            }
        }
    }

    /// Enumerate all knowledge bases and search them concurrently.
    /// Results are re-assembled in enumeration order so merge order stays
    /// deterministic.
    async fn search_all(&self, queries: &[String]) -> (Vec<RetrievedChunk>, Vec<String>) {
        let knowledge_ids = match self.catalog.knowledge_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Knowledge base enumeration failed, skipping retrieval");
                return (Vec::new(), Vec::new());
            }
        };

        if knowledge_ids.is_empty() {
            warn!("No knowledge bases found for retrieval");
            return (Vec::new(), Vec::new());
        }

        info!(count = knowledge_ids.len(), "Searching across all knowledge bases");

        let mut tasks = JoinSet::new();
        for (index, kb_id) in knowledge_ids.iter().enumerate() {
            let search = self.search.clone();
            let kb_id = kb_id.clone();
            let queries = queries.to_vec();
            let top_k = self.config.top_k;
            tasks.spawn(async move {
                let result = search.search(&kb_id, &queries, top_k).await;
                (index, kb_id, result)
            });
        }

        let mut slots: Vec<Option<(String, Vec<RetrievedChunk>)>> =
            vec![None; knowledge_ids.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, kb_id, Ok(documents))) => {
                    debug!(knowledge_id = %kb_id, count = documents.len(), "Knowledge base answered");
                    slots[index] = Some((kb_id, documents));
                }
                Ok((_, kb_id, Err(e))) => {
                    warn!(knowledge_id = %kb_id, error = %e, "Knowledge base search failed, continuing with others");
                }
                Err(e) => {
                    warn!(error = %e, "Knowledge base search task panicked");
                }
            }
        }

        let mut documents = Vec::new();
        let mut searched = Vec::new();
        for slot in slots.into_iter().flatten() {
            let (kb_id, docs) = slot;
            documents.extend(docs);
            searched.push(kb_id);
        }
        (documents, searched)
    }
}

/// Drop scored documents below the threshold; unscored documents are kept
/// unconditionally.
fn filter_by_score(documents: Vec<RetrievedChunk>, threshold: f32) -> Vec<RetrievedChunk> {
    let original = documents.len();
    let filtered: Vec<RetrievedChunk> = documents
        .into_iter()
        .filter(|d| d.relevance_score.is_none_or(|s| s >= threshold))
        .collect();
    if filtered.len() < original {
        info!(
            before = original,
            after = filtered.len(),
            threshold,
            "Score filtering applied"
        );
    }
    filtered
}

/// Collapse duplicates by exact content equality; first occurrence wins.
/// Also coalesces identical chunks surfaced by different queries or
/// knowledge bases.
fn deduplicate(documents: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    let original = documents.len();
    let mut seen: HashSet<[u8; 32]> = HashSet::new();
    let unique: Vec<RetrievedChunk> = documents
        .into_iter()
        .filter(|d| seen.insert(Sha256::digest(d.content.as_bytes()).into()))
        .collect();
    if unique.len() < original {
        debug!(before = original, after = unique.len(), "Deduplication applied");
    }
    unique
}

/// Promote one chunk per unique `document_id` to the reference list.
fn extract_references(documents: &[RetrievedChunk]) -> Vec<RetrievedChunk> {
    let mut seen: HashSet<&str> = HashSet::new();
    documents
        .iter()
        .filter(|d| !d.document_id.is_empty() && seen.insert(&d.document_id))
        .cloned()
        .collect()
}
