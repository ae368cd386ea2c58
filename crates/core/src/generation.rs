//! Generator trait — the abstraction over text-generation backends.
//!
//! A Generator accepts an ordered list of role-tagged prompt turns and
//! returns an incremental sequence of text units, optionally closing with a
//! final token-usage record.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Role of a prompt turn sent to the generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    Human,
    Ai,
}

/// One role-tagged turn in the composed prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTurn {
    pub role: PromptRole,
    pub content: String,
}

impl PromptTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Ai,
            content: content.into(),
        }
    }
}

/// A generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The composed prompt, system turn first.
    pub turns: Vec<PromptTurn>,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature (0.0 = deterministic).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.3
}

/// Token usage reported by the generation backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// A single incremental unit in a generation stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenUnit {
    /// Partial text delta.
    #[serde(default)]
    pub text: Option<String>,

    /// Whether this is the final unit.
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only on the final unit).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<GenUsage>,
}

/// The core Generator trait.
///
/// The orchestrator calls `stream()` without knowing which backend is in
/// use — remote API, local model, or a scripted mock in tests.
#[async_trait]
pub trait Generator: Send + Sync {
    /// A human-readable name for this generator (e.g., "openai_compat").
    fn name(&self) -> &str;

    /// Start a generation stream for the composed prompt.
    ///
    /// The returned receiver yields incremental units; the stream ends with a
    /// unit whose `done` flag is set (carrying usage when the backend reports
    /// it) or with an `Err` on mid-stream failure.
    async fn stream(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<GenUnit, GenerationError>>,
        GenerationError,
    >;
}
