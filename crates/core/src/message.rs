//! Message domain types.
//!
//! A turn produces exactly one `human` message followed by one `ai` message.
//! Ordering by `created_at` (ties broken by insertion order) defines the
//! canonical conversation order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionId;

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    Human,
    /// The assistant
    Ai,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "ai" => Ok(Self::Ai),
            other => Err(format!("invalid message role: {other}")),
        }
    }
}

/// A user reaction on an assistant message.
///
/// Only settable on `ai`-role messages. The unset state is `Option::None`,
/// not a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

impl std::str::FromStr for Reaction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "like" => Ok(Self::Like),
            "dislike" => Ok(Self::Dislike),
            other => Err(format!("invalid reaction: {other}")),
        }
    }
}

/// Token usage counters attached to an ai message at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// A single persisted message in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (generated before persistence)
    pub message_id: String,

    /// Owning session
    pub session_id: SessionId,

    /// Who authored this message (immutable)
    pub role: Role,

    /// The text content (immutable once written)
    pub content: String,

    /// Timestamp; non-decreasing within a session in creation order
    pub created_at: DateTime<Utc>,

    /// Reaction, only ever set on ai messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,

    /// Token usage, set once at creation for ai messages
    #[serde(flatten)]
    pub tokens: TokenCounts,

    /// Open metadata map; ai turns carry grounding provenance here
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    /// Create a new human message for a session.
    pub fn human(session_id: SessionId, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            session_id,
            role: Role::Human,
            content: content.into(),
            created_at: Utc::now(),
            reaction: None,
            tokens: TokenCounts::default(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new ai message for a session.
    pub fn ai(session_id: SessionId, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            session_id,
            role: Role::Ai,
            content: content.into(),
            created_at: Utc::now(),
            reaction: None,
            tokens: TokenCounts::default(),
            metadata: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Human).unwrap(), r#""human""#);
        assert_eq!(serde_json::to_string(&Role::Ai).unwrap(), r#""ai""#);
    }

    #[test]
    fn reaction_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Reaction::Like).unwrap(), r#""like""#);
        assert_eq!(
            serde_json::to_string(&Reaction::Dislike).unwrap(),
            r#""dislike""#
        );
    }

    #[test]
    fn role_parse_rejects_unknown() {
        assert!("system".parse::<Role>().is_err());
        assert_eq!("ai".parse::<Role>().unwrap(), Role::Ai);
    }

    #[test]
    fn human_message_has_zero_tokens() {
        let msg = Message::human(SessionId::new(), "Hello");
        assert_eq!(msg.role, Role::Human);
        assert_eq!(msg.tokens, TokenCounts::default());
        assert!(msg.reaction.is_none());
    }

    #[test]
    fn message_serialization_flattens_tokens() {
        let mut msg = Message::ai(SessionId::from("s1"), "Hi");
        msg.tokens = TokenCounts {
            input_tokens: 10,
            output_tokens: 20,
            total_tokens: 30,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""input_tokens":10"#));
        assert!(json.contains(r#""total_tokens":30"#));

        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tokens.output_tokens, 20);
    }
}
