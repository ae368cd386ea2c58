//! Retrieval fan-out and grounding-context assembly for Parley.
//!
//! Given a user message, optional conversation history, and either one
//! knowledge base or "search all", the engine produces a ranked,
//! deduplicated set of grounding chunks and a size-bounded context string.
//! Grounding is best-effort: no retrieval failure ever fails the
//! surrounding turn.

pub mod context;
pub mod engine;
pub mod noop;
pub mod queries;

pub use context::{RetrievalContext, format_context};
pub use engine::RetrievalEngine;
pub use noop::NoKnowledge;
pub use queries::build_queries;
