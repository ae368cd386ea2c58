//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley conversational
//! backend. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod generation;
pub mod message;
pub mod retrieval;
pub mod session;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GenerationError, Result, RetrievalError, StoreError};
pub use generation::{GenUnit, GenUsage, GenerationRequest, Generator, PromptRole, PromptTurn};
pub use message::{Message, Reaction, Role, TokenCounts};
pub use retrieval::{KnowledgeCatalog, RetrievedChunk, VectorSearch};
pub use session::{PageInfo, Session, SessionId};
pub use store::{MessageOrder, SessionStore, StoreStats};
