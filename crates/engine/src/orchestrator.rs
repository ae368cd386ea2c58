//! The per-turn orchestration state machine.
//!
//! One call to [`ChatEngine::stream_turn`] drives a full turn:
//!
//! resolve session → load history → persist user turn → (retrieve context)
//! → build prompt → stream generation → persist assistant turn → complete.
//!
//! Failures before any event is emitted surface synchronously as `Err`;
//! once streaming has begun, failures fold into in-stream `error` events.
//! The single fatal persistence point is the user-turn write: without a
//! durable record of the input, generation must not proceed.

use std::sync::Arc;

use parley_config::EngineConfig;
use parley_core::error::{Error, Result, StoreError};
use parley_core::generation::{GenUsage, GenerationRequest, Generator, PromptTurn};
use parley_core::message::{Message, Role, TokenCounts};
use parley_core::session::{Session, SessionId};
use parley_core::store::{MessageOrder, SessionStore};
use parley_retrieval::{RetrievalContext, RetrievalEngine};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::event::TurnEvent;
use crate::prompt::build_system_prompt;

/// One inbound turn request.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    /// The user's message.
    pub message: String,

    /// Existing session id (omit to create a new session).
    #[serde(default)]
    pub session_id: Option<String>,

    /// Requesting user.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Caller-supplied metadata, merged over stored session defaults.
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,

    /// Whether to ground the response in retrieved context.
    #[serde(default = "default_true")]
    pub use_grounding: bool,

    /// Specific knowledge base to search; omit to search all.
    #[serde(default)]
    pub knowledge_id: Option<String>,
}

fn default_true() -> bool {
    true
}

/// The conversation orchestrator.
pub struct ChatEngine {
    store: Arc<dyn SessionStore>,
    generator: Arc<dyn Generator>,
    retrieval: Arc<RetrievalEngine>,
    config: EngineConfig,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ChatEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        generator: Arc<dyn Generator>,
        retrieval: Arc<RetrievalEngine>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            generator,
            retrieval,
            config,
            temperature: 0.3,
            max_tokens: None,
        }
    }

    /// Set the generation temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the generation token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Execute one turn, streaming events through the returned receiver.
    ///
    /// Session resolution and the user-turn write happen before this method
    /// returns, so their failures surface synchronously — no events are
    /// emitted for them. Dropping the receiver cancels the in-flight
    /// generation cleanly.
    pub async fn stream_turn(&self, request: TurnRequest) -> Result<mpsc::Receiver<TurnEvent>> {
        let message = request.message.trim().to_string();
        if message.is_empty() {
            return Err(Error::Validation("message must not be empty".into()));
        }

        // ── ResolveSession ──
        let (session, is_new) = self.resolve_session(&request, &message).await?;

        // ── LoadHistory (degrades to empty) ──
        let history = self.load_history(&session.session_id).await;

        // ── PersistUserTurn (fatal on failure) ──
        let mut user_message = Message::human(session.session_id.clone(), &message);
        user_message.metadata = merge_metadata(&session.metadata, request.metadata.as_ref());
        self.store
            .append_message(user_message)
            .await
            .map_err(Error::from)?;

        info!(
            session_id = %session.session_id,
            is_new,
            use_grounding = request.use_grounding,
            "Turn started"
        );

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        let store = self.store.clone();
        let generator = self.generator.clone();
        let retrieval = self.retrieval.clone();
        let temperature = self.temperature;
        let max_tokens = self.max_tokens;
        let use_grounding = request.use_grounding;
        let knowledge_id = request.knowledge_id.clone();

        tokio::spawn(async move {
            run_streaming_phase(StreamingTurn {
                store,
                generator,
                retrieval,
                tx,
                session,
                is_new,
                message,
                history,
                use_grounding,
                knowledge_id,
                temperature,
                max_tokens,
            })
            .await;
        });

        Ok(rx)
    }

    /// Create a new session or validate and touch an existing one.
    async fn resolve_session(
        &self,
        request: &TurnRequest,
        message: &str,
    ) -> Result<(Session, bool)> {
        match &request.session_id {
            None => {
                let title: String = message.chars().take(self.config.title_len).collect();
                let session = self
                    .store
                    .create_session(
                        SessionId::new(),
                        request.user_id.clone(),
                        Some(title),
                        request.metadata.clone().unwrap_or_default(),
                    )
                    .await?;
                info!(session_id = %session.session_id, "Created new session for turn");
                Ok((session, true))
            }
            Some(id) => {
                let session_id = SessionId::from(id);
                let session = self
                    .store
                    .get_session(&session_id)
                    .await?
                    .ok_or(StoreError::NotFound {
                        entity: "session",
                        id: id.clone(),
                    })?;

                if let Some(owner) = &session.user_id {
                    if request.user_id.as_deref() != Some(owner.as_str()) {
                        return Err(Error::Forbidden {
                            message: format!(
                                "You do not have permission to access session {id}"
                            ),
                        });
                    }
                }

                if !session.is_active {
                    return Err(
                        StoreError::InvalidState(format!("session {id} is inactive")).into(),
                    );
                }

                // Touch failure is logged, never fatal to the turn.
                if let Err(e) = self.store.touch_session(&session_id).await {
                    warn!(session_id = %session_id, error = %e, "Failed to touch session");
                }

                Ok((session, false))
            }
        }
    }

    /// Most recent messages in chronological order. Failure degrades to an
    /// empty history.
    async fn load_history(&self, session_id: &SessionId) -> Vec<Message> {
        match self
            .store
            .messages(session_id, 1, self.config.history_limit, MessageOrder::Desc)
            .await
        {
            Ok((mut messages, _)) => {
                messages.reverse();
                messages
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to load history, continuing without it");
                Vec::new()
            }
        }
    }
}

/// Everything the spawned streaming phase needs.
struct StreamingTurn {
    store: Arc<dyn SessionStore>,
    generator: Arc<dyn Generator>,
    retrieval: Arc<RetrievalEngine>,
    tx: mpsc::Sender<TurnEvent>,
    session: Session,
    is_new: bool,
    message: String,
    history: Vec<Message>,
    use_grounding: bool,
    knowledge_id: Option<String>,
    temperature: f32,
    max_tokens: Option<u32>,
}

async fn run_streaming_phase(turn: StreamingTurn) {
    let StreamingTurn {
        store,
        generator,
        retrieval,
        tx,
        session,
        is_new,
        message,
        history,
        use_grounding,
        knowledge_id,
        temperature,
        max_tokens,
    } = turn;

    // ── RetrieveContext (degrades, never fatal) ──
    let retrieval_ctx: Option<RetrievalContext> = if use_grounding {
        Some(
            retrieval
                .retrieve(&message, knowledge_id.as_deref(), &history)
                .await,
        )
    } else {
        None
    };

    // Pre-generate the assistant message identity so the client can
    // correlate streamed content before any of it arrives.
    let mut assistant = Message::ai(session.session_id.clone(), "");

    let session_event = TurnEvent::Session {
        session_id: session.session_id.to_string(),
        is_new,
        message_id: assistant.message_id.clone(),
        message_created_at: assistant.created_at,
        references: retrieval_ctx.as_ref().map(|ctx| {
            ctx.references
                .iter()
                .map(|r| r.source_label().to_string())
                .collect()
        }),
        document_count: retrieval_ctx.as_ref().map(|ctx| ctx.documents.len()),
        knowledge_ids_searched: retrieval_ctx
            .as_ref()
            .map(|ctx| ctx.knowledge_ids_searched.clone()),
    };
    if tx.send(session_event).await.is_err() {
        debug!("Client disconnected before session event, aborting turn");
        return;
    }

    // ── BuildPrompt ──
    let system = build_system_prompt(
        retrieval_ctx
            .as_ref()
            .map(|ctx| ctx.context_text.as_str()),
    );
    let mut turns = vec![PromptTurn::system(system)];
    for past in &history {
        turns.push(match past.role {
            Role::Human => PromptTurn::human(&past.content),
            Role::Ai => PromptTurn::ai(&past.content),
        });
    }
    turns.push(PromptTurn::human(&message));

    let gen_request = GenerationRequest {
        turns,
        max_tokens,
        temperature,
    };

    // ── StreamGeneration ──
    let mut gen_rx = match generator.stream(gen_request).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(error = %e, "Generation request failed");
            let _ = tx
                .send(TurnEvent::error(e, "Failed to stream chat response"))
                .await;
            return;
        }
    };

    let mut full_response = String::new();
    let mut usage = GenUsage::default();
    while let Some(unit) = gen_rx.recv().await {
        match unit {
            Ok(unit) => {
                if let Some(text) = unit.text {
                    if !text.is_empty() {
                        full_response.push_str(&text);
                        if tx
                            .send(TurnEvent::Chunk { content: text })
                            .await
                            .is_err()
                        {
                            // Client disconnected mid-generation: abort the
                            // generation call, skip persistence of the
                            // partial assistant turn. A clean stop, not an
                            // error.
                            debug!(session_id = %session.session_id, "Client disconnected mid-stream, cancelling turn");
                            return;
                        }
                    }
                }
                if unit.done {
                    if let Some(reported) = unit.usage {
                        usage = reported;
                    }
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Generation stream failed");
                let _ = tx
                    .send(TurnEvent::error(e, "Streaming error occurred"))
                    .await;
                return;
            }
        }
    }

    // ── PersistAssistantTurn (reported, never retracts streamed content) ──
    assistant.content = full_response;
    assistant.tokens = TokenCounts {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        total_tokens: usage.total_tokens,
    };
    assistant.metadata = grounding_provenance(use_grounding, retrieval_ctx.as_ref());

    if let Err(e) = store.append_message(assistant).await {
        warn!(session_id = %session.session_id, error = %e, "Failed to persist assistant turn");
        let _ = tx
            .send(TurnEvent::error(e, "Failed to save assistant response"))
            .await;
        return;
    }

    // ── Complete ──
    let message_count = match store.message_count(&session.session_id).await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "Failed to count session messages");
            0
        }
    };
    let _ = tx.send(TurnEvent::complete(message_count)).await;
    info!(session_id = %session.session_id, message_count, "Turn complete");
}

/// Merge caller-supplied metadata over stored session defaults: new keys are
/// added, caller keys override.
fn merge_metadata(
    base: &serde_json::Map<String, serde_json::Value>,
    overrides: Option<&serde_json::Map<String, serde_json::Value>>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut merged = base.clone();
    if let Some(overrides) = overrides {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Grounding provenance recorded on the persisted assistant message.
fn grounding_provenance(
    use_grounding: bool,
    ctx: Option<&RetrievalContext>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut metadata = serde_json::Map::new();
    metadata.insert("use_grounding".into(), serde_json::json!(use_grounding));
    if let Some(ctx) = ctx {
        metadata.insert(
            "knowledge_ids_searched".into(),
            serde_json::json!(ctx.knowledge_ids_searched),
        );
        metadata.insert(
            "reference_document_ids".into(),
            serde_json::json!(
                ctx.references
                    .iter()
                    .map(|r| r.document_id.as_str())
                    .collect::<Vec<_>>()
            ),
        );
        metadata.insert(
            "context_length".into(),
            serde_json::json!(ctx.context_text.len()),
        );
        metadata.insert("query_count".into(), serde_json::json!(ctx.query_count));
    }
    metadata
}
