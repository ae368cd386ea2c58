//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Parley operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Generation errors ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Ownership ---
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    // --- Input validation ---
    #[error("Validation error: {0}")]
    Validation(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Session already exists: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Reactions can only be set on ai messages (message {message_id} is {role})")]
    InvalidRole { message_id: String, role: String },

    #[error("Storage error: {0}")]
    Persistence(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Search failed on knowledge base {knowledge_id}: {reason}")]
    SearchFailed {
        knowledge_id: String,
        reason: String,
    },

    #[error("Knowledge base enumeration failed: {0}")]
    CatalogUnavailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_displays_correctly() {
        let err = Error::Store(StoreError::NotFound {
            entity: "session",
            id: "abc-123".into(),
        });
        assert!(err.to_string().contains("session"));
        assert!(err.to_string().contains("abc-123"));
    }

    #[test]
    fn invalid_role_error_names_message() {
        let err = Error::Store(StoreError::InvalidRole {
            message_id: "msg-9".into(),
            role: "human".into(),
        });
        assert!(err.to_string().contains("msg-9"));
        assert!(err.to_string().contains("human"));
    }

    #[test]
    fn retrieval_error_displays_knowledge_id() {
        let err = Error::Retrieval(RetrievalError::SearchFailed {
            knowledge_id: "kb-1".into(),
            reason: "timeout".into(),
        });
        assert!(err.to_string().contains("kb-1"));
        assert!(err.to_string().contains("timeout"));
    }
}
