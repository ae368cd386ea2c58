//! Session domain types.
//!
//! A Session is the durable container for a multi-turn conversation: it owns
//! its messages, tracks access time on every turn, and can be soft-deleted
//! (messages retained) or hard-deleted (messages cascade).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A durable chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID (generated at creation, never reused)
    pub session_id: SessionId,

    /// Optional owning user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Title derived from the first 50 chars of the first user message.
    /// Set once at creation, immutable thereafter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// When this session was created
    pub created_at: DateTime<Utc>,

    /// Updated on every turn. Always >= created_at.
    pub last_accessed_at: DateTime<Utc>,

    /// False once soft-deleted; messages are retained.
    pub is_active: bool,

    /// Open key/value map. Caller-supplied entries merge over stored ones.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    /// Create a new active session stamped with the current time.
    pub fn new(
        session_id: SessionId,
        user_id: Option<String>,
        title: Option<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            title,
            created_at: now,
            last_accessed_at: now,
            is_active: true,
            metadata,
        }
    }
}

/// Page-based pagination metadata returned by list operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
    /// Current page number (1-indexed)
    pub page: u32,
    /// Items per page
    pub per_page: u32,
    /// Total number of items
    pub total: u64,
    /// Total number of pages
    pub total_pages: u64,
    /// Whether a next page exists
    pub has_next: bool,
    /// Whether a previous page exists
    pub has_previous: bool,
}

impl PageInfo {
    /// Compute pagination metadata for a page over `total` items.
    pub fn compute(page: u32, per_page: u32, total: u64) -> Self {
        let per = u64::from(per_page.max(1));
        let total_pages = total.div_ceil(per);
        Self {
            page,
            per_page,
            total,
            total_pages,
            has_next: u64::from(page) < total_pages,
            has_previous: page > 1,
        }
    }
}
