//! SessionStore trait — durable CRUD over sessions and messages.
//!
//! The orchestrator and the HTTP surface depend only on this trait; one
//! concrete adapter exists per backing store technology (SQLite for
//! production, in-memory for tests).
//!
//! Every mutating operation is individually atomic: a single session row or a
//! single message row per call. Hard delete of a session cascades message
//! deletion inside the same transaction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::message::{Message, Reaction};
use crate::session::{PageInfo, Session, SessionId};

/// Ordering for message pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrder {
    /// Oldest first — canonical conversation order.
    #[default]
    Asc,
    /// Newest first.
    Desc,
}

/// Aggregate session statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub sessions: SessionStats,
    pub messages: MessageStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub unique_users: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStats {
    pub total: u64,
    pub human: u64,
    pub ai: u64,
    /// Mean messages per session, rounded to two decimals.
    pub avg_per_session: f64,
}

/// The core SessionStore trait.
///
/// Implementations: SQLite (production), in-memory (testing / hot paths —
/// never the source of truth).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Create a new session. Fails with `StoreError::Conflict` if the id
    /// already exists.
    async fn create_session(
        &self,
        session_id: SessionId,
        user_id: Option<String>,
        title: Option<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<Session, StoreError>;

    /// Fetch a session by id.
    async fn get_session(
        &self,
        session_id: &SessionId,
    ) -> std::result::Result<Option<Session>, StoreError>;

    /// Update `last_accessed_at` to now. Absent or inactive sessions are a
    /// logged no-op — never fatal to the caller's turn.
    async fn touch_session(&self, session_id: &SessionId) -> std::result::Result<(), StoreError>;

    /// List sessions for a user, ordered by `last_accessed_at` descending.
    async fn list_sessions(
        &self,
        user_id: &str,
        active_only: bool,
        page: u32,
        per_page: u32,
    ) -> std::result::Result<(Vec<Session>, PageInfo), StoreError>;

    /// Mark a session inactive. Messages are retained.
    async fn deactivate_session(
        &self,
        session_id: &SessionId,
    ) -> std::result::Result<bool, StoreError>;

    /// Permanently delete a session; message deletion cascades atomically.
    async fn delete_session(&self, session_id: &SessionId)
    -> std::result::Result<bool, StoreError>;

    /// Purge inactive sessions untouched for more than `retention_days`.
    /// Returns the number of sessions removed.
    async fn delete_old_sessions(&self, retention_days: u32)
    -> std::result::Result<u64, StoreError>;

    /// Append a message to a session. The message identity (id, timestamp)
    /// is generated by the caller before persistence; the stored row is
    /// returned unchanged.
    async fn append_message(&self, message: Message) -> std::result::Result<Message, StoreError>;

    /// Page through a session's messages ordered by `created_at`.
    async fn messages(
        &self,
        session_id: &SessionId,
        page: u32,
        per_page: u32,
        order: MessageOrder,
    ) -> std::result::Result<(Vec<Message>, PageInfo), StoreError>;

    /// Total number of messages in a session.
    async fn message_count(&self, session_id: &SessionId)
    -> std::result::Result<u64, StoreError>;

    /// Set or update the reaction on an ai message. Fails with
    /// `StoreError::NotFound` if the message is absent from the session and
    /// `StoreError::InvalidRole` if the target is not an ai message.
    async fn set_reaction(
        &self,
        message_id: &str,
        session_id: &SessionId,
        reaction: Reaction,
    ) -> std::result::Result<Message, StoreError>;

    /// Aggregate statistics over all sessions and messages.
    async fn stats(&self) -> std::result::Result<StoreStats, StoreError>;
}
