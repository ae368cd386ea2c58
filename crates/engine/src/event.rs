//! Turn-level streaming events.
//!
//! `TurnEvent` wraps the orchestrator's progress into typed events that the
//! gateway forwards to clients over SSE:
//! - `session`  — always first: session identity + grounding summary
//! - `chunk`    — partial assistant text, zero or more, in generation order
//! - `complete` — terminal on success
//! - `error`    — emitted on failure; may replace or follow other events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by the orchestrator during a streaming turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Session identity, emitted before any content so the client can
    /// correlate the streamed text with its eventual persisted message.
    Session {
        session_id: String,
        is_new: bool,
        /// Pre-generated id of the forthcoming assistant message.
        message_id: String,
        message_created_at: DateTime<Utc>,
        /// Source labels of grounding references, present only when
        /// grounding was attempted.
        #[serde(skip_serializing_if = "Option::is_none")]
        references: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        document_count: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        knowledge_ids_searched: Option<Vec<String>>,
    },

    /// Partial assistant text.
    Chunk { content: String },

    /// The turn finished; `message_count` is the session's updated total.
    Complete { status: String, message_count: u64 },

    /// An error occurred. Before streaming starts errors surface
    /// synchronously instead; once streaming has begun they fold into this.
    Error { error: String, message: String },
}

impl TurnEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Session { .. } => "session",
            Self::Chunk { .. } => "chunk",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// A completion event with the canonical status string.
    pub fn complete(message_count: u64) -> Self {
        Self::Complete {
            status: "complete".into(),
            message_count,
        }
    }

    /// An error event from any displayable error.
    pub fn error(error: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::Error {
            error: error.to_string(),
            message: message.into(),
        }
    }
}
