//! The v1 REST/SSE API.
//!
//! Endpoints:
//!
//! - `POST   /v1/chat/stream`                                — SSE chat turn
//! - `GET    /v1/sessions`                                   — list sessions
//! - `GET    /v1/sessions/{id}`                              — session + history
//! - `DELETE /v1/sessions/{id}?permanent=`                   — deactivate / delete
//! - `PUT    /v1/sessions/{id}/messages/{message_id}/reaction` — react
//! - `GET    /v1/stats`                                      — aggregate stats
//!
//! Pre-stream failures map to HTTP status codes; once an SSE stream has
//! started, failures arrive as in-stream `error` events and the request
//! itself completes successfully.

use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event as SseEvent, Sse},
    response::Json,
    routing::{delete, get, post, put},
};
use parley_core::error::{Error, StoreError};
use parley_core::message::{Message, Reaction};
use parley_core::session::{PageInfo, Session, SessionId};
use parley_core::store::{MessageOrder, StoreStats};
use parley_engine::{TurnEvent, TurnRequest, encode};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::SharedState;

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat/stream", post(chat_stream_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/sessions/{id}", get(session_history_handler))
        .route("/sessions/{id}", delete(delete_session_handler))
        .route(
            "/sessions/{id}/messages/{message_id}/reaction",
            put(reaction_handler),
        )
        .route("/stats", get(stats_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

#[derive(Serialize)]
struct SessionDto {
    session_id: String,
    user_id: Option<String>,
    title: Option<String>,
    created_at: String,
    last_accessed_at: String,
    is_active: bool,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl From<&Session> for SessionDto {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.session_id.to_string(),
            user_id: s.user_id.clone(),
            title: s.title.clone(),
            created_at: s.created_at.to_rfc3339(),
            last_accessed_at: s.last_accessed_at.to_rfc3339(),
            is_active: s.is_active,
            metadata: s.metadata.clone(),
        }
    }
}

#[derive(Serialize)]
struct MessageDto {
    message_id: String,
    session_id: String,
    role: String,
    content: String,
    created_at: String,
    reaction: Option<String>,
    input_tokens: u32,
    output_tokens: u32,
    total_tokens: u32,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl From<&Message> for MessageDto {
    fn from(m: &Message) -> Self {
        Self {
            message_id: m.message_id.clone(),
            session_id: m.session_id.to_string(),
            role: m.role.as_str().into(),
            content: m.content.clone(),
            created_at: m.created_at.to_rfc3339(),
            reaction: m.reaction.map(|r| r.as_str().into()),
            input_tokens: m.tokens.input_tokens,
            output_tokens: m.tokens.output_tokens,
            total_tokens: m.tokens.total_tokens,
            metadata: m.metadata.clone(),
        }
    }
}

#[derive(Deserialize)]
struct PageParams {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn default_page() -> u32 {
    1
}
fn default_per_page() -> u32 {
    50
}

#[derive(Serialize)]
struct SessionListResponse {
    sessions: Vec<SessionDto>,
    pagination: PageInfo,
}

#[derive(Serialize)]
struct SessionHistoryResponse {
    session: SessionDto,
    messages: Vec<MessageDto>,
    pagination: PageInfo,
}

#[derive(Deserialize)]
struct DeleteParams {
    #[serde(default)]
    permanent: bool,
}

#[derive(Serialize)]
struct DeleteSessionResponse {
    session_id: String,
    success: bool,
    message: String,
}

#[derive(Deserialize)]
struct ReactionRequest {
    reaction: Reaction,
}

#[derive(Serialize)]
struct ReactionResponse {
    message_id: String,
    session_id: String,
    reaction: String,
    success: bool,
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// The requesting user, from the `User-Id` header.
fn user_id_from(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("User-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing or invalid User-Id header"))
}

/// Fetch a session and verify existence, ownership, and (optionally)
/// active status.
async fn verify_session_access(
    state: &SharedState,
    session_id: &SessionId,
    user_id: &str,
    require_active: bool,
) -> Result<Session, ApiError> {
    let session = state
        .store
        .get_session(session_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("Session {session_id} not found"),
            )
        })?;

    if let Some(owner) = &session.user_id {
        if owner != user_id {
            return Err(api_error(
                StatusCode::FORBIDDEN,
                "You do not have permission to access this session",
            ));
        }
    }

    if require_active && !session.is_active {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("Session {session_id} is inactive"),
        ));
    }

    Ok(session)
}

fn store_error(e: StoreError) -> ApiError {
    error!(error = %e, "Store operation failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Map pre-stream engine failures to HTTP status codes.
fn engine_error(e: Error) -> ApiError {
    let status = match &e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Forbidden { .. } => StatusCode::FORBIDDEN,
        Error::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        Error::Store(StoreError::InvalidState(_)) => StatusCode::BAD_REQUEST,
        Error::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "Turn failed before streaming");
    }
    api_error(status, e.to_string())
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `POST /v1/chat/stream` — run a turn, stream events as SSE.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(mut payload): Json<TurnRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    // The header is authoritative for the requesting user.
    if let Some(user_id) = headers
        .get("User-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        payload.user_id = Some(user_id.to_string());
    }

    info!(
        has_session = payload.session_id.is_some(),
        use_grounding = payload.use_grounding,
        "chat/stream request"
    );

    let rx = state
        .engine
        .stream_turn(payload)
        .await
        .map_err(engine_error)?;

    let stream = ReceiverStream::new(rx).map(|event: TurnEvent| {
        Ok(SseEvent::default()
            .event(event.event_type())
            .data(encode::payload_json(&event)))
    });

    Ok(Sse::new(stream))
}

/// `GET /v1/sessions` — list the requesting user's active sessions.
async fn list_sessions_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let user_id = user_id_from(&headers)?;

    let (sessions, pagination) = state
        .store
        .list_sessions(&user_id, true, params.page, params.per_page)
        .await
        .map_err(store_error)?;

    Ok(Json(SessionListResponse {
        sessions: sessions.iter().map(SessionDto::from).collect(),
        pagination,
    }))
}

/// `GET /v1/sessions/{id}` — session info plus chronological messages.
async fn session_history_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<SessionHistoryResponse>, ApiError> {
    let user_id = user_id_from(&headers)?;
    let session_id = SessionId::from(&id);
    let session = verify_session_access(&state, &session_id, &user_id, true).await?;

    let (messages, pagination) = state
        .store
        .messages(&session_id, params.page, params.per_page, MessageOrder::Asc)
        .await
        .map_err(store_error)?;

    Ok(Json(SessionHistoryResponse {
        session: SessionDto::from(&session),
        messages: messages.iter().map(MessageDto::from).collect(),
        pagination,
    }))
}

/// `DELETE /v1/sessions/{id}` — soft deactivate, or hard delete with
/// `?permanent=true`.
async fn delete_session_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<DeleteSessionResponse>, ApiError> {
    let user_id = user_id_from(&headers)?;
    let session_id = SessionId::from(&id);
    // Deleting an already-inactive session is allowed.
    verify_session_access(&state, &session_id, &user_id, false).await?;

    let message = if params.permanent {
        let deleted = state
            .store
            .delete_session(&session_id)
            .await
            .map_err(store_error)?;
        if !deleted {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("Session {id} not found or already deleted"),
            ));
        }
        "Session and all messages permanently deleted"
    } else {
        let deactivated = state
            .store
            .deactivate_session(&session_id)
            .await
            .map_err(store_error)?;
        if !deactivated {
            return Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to deactivate session",
            ));
        }
        "Session marked as inactive"
    };

    Ok(Json(DeleteSessionResponse {
        session_id: id,
        success: true,
        message: message.into(),
    }))
}

/// `PUT /v1/sessions/{id}/messages/{message_id}/reaction` — set or update
/// a reaction on an assistant message.
async fn reaction_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((id, message_id)): Path<(String, String)>,
    Json(payload): Json<ReactionRequest>,
) -> Result<Json<ReactionResponse>, ApiError> {
    let user_id = user_id_from(&headers)?;
    let session_id = SessionId::from(&id);
    verify_session_access(&state, &session_id, &user_id, true).await?;

    let message = state
        .store
        .set_reaction(&message_id, &session_id, payload.reaction)
        .await
        .map_err(|e| match e {
            StoreError::NotFound { .. } => api_error(
                StatusCode::NOT_FOUND,
                format!("Message {message_id} not found in session {id}"),
            ),
            StoreError::InvalidRole { .. } => api_error(StatusCode::BAD_REQUEST, e.to_string()),
            other => store_error(other),
        })?;

    Ok(Json(ReactionResponse {
        message_id: message.message_id,
        session_id: id,
        reaction: payload.reaction.as_str().into(),
        success: true,
    }))
}

/// `GET /v1/stats` — aggregate session and message statistics.
async fn stats_handler(State(state): State<SharedState>) -> Result<Json<StoreStats>, ApiError> {
    let stats = state.store.stats().await.map_err(store_error)?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GatewayState, build_router};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use parley_config::{EngineConfig, RetrievalConfig};
    use parley_core::message::Role;
    use parley_core::store::SessionStore;
    use parley_engine::ChatEngine;
    use parley_providers::MockGenerator;
    use parley_retrieval::{NoKnowledge, RetrievalEngine};
    use parley_store::InMemoryStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(reply: &str) -> (SharedState, Arc<dyn SessionStore>) {
        let store: Arc<dyn SessionStore> = Arc::new(InMemoryStore::new());
        let retrieval = Arc::new(RetrievalEngine::new(
            Arc::new(NoKnowledge),
            Arc::new(NoKnowledge),
            RetrievalConfig::default(),
        ));
        let engine = Arc::new(ChatEngine::new(
            store.clone(),
            Arc::new(MockGenerator::from_text(reply)),
            retrieval,
            EngineConfig::default(),
        ));
        (
            Arc::new(GatewayState {
                store: store.clone(),
                engine,
            }),
            store,
        )
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    fn chat_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/chat/stream")
            .header("Content-Type", "application/json")
            .header("User-Id", "u1")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn chat_stream_emits_sse_event_sequence() {
        let (state, _) = test_state("Hi there");
        let app = build_router(state);

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "message": "Hello",
                "use_grounding": false
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        assert!(body.contains("event: session"));
        assert!(body.contains(r#""is_new":true"#));
        assert!(body.contains("event: chunk"));
        assert!(body.contains("event: complete"));
        assert!(body.contains(r#""message_count":2"#));
        // Grounding disabled: no retrieval fields in the session event.
        assert!(!body.contains("knowledge_ids_searched"));
    }

    #[tokio::test]
    async fn chat_stream_empty_message_is_400() {
        let (state, _) = test_state("x");
        let app = build_router(state);

        let response = app
            .oneshot(chat_request(serde_json::json!({ "message": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_stream_unknown_session_is_404() {
        let (state, _) = test_state("x");
        let app = build_router(state);

        let response = app
            .oneshot(chat_request(serde_json::json!({
                "message": "hi",
                "session_id": "ghost"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_sessions_requires_user_header() {
        let (state, _) = test_state("x");
        let app = build_router(state);

        let request = Request::builder()
            .uri("/v1/sessions")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_history_is_owner_checked() {
        let (state, store) = test_state("x");
        let session = store
            .create_session(
                SessionId::new(),
                Some("owner".into()),
                Some("Theirs".into()),
                Default::default(),
            )
            .await
            .unwrap();
        let app = build_router(state);

        let request = Request::builder()
            .uri(format!("/v1/sessions/{}", session.session_id))
            .header("User-Id", "intruder")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn session_history_returns_messages_chronologically() {
        let (state, store) = test_state("x");
        let session = store
            .create_session(
                SessionId::new(),
                Some("u1".into()),
                Some("Mine".into()),
                Default::default(),
            )
            .await
            .unwrap();
        store
            .append_message(Message::human(session.session_id.clone(), "question"))
            .await
            .unwrap();
        store
            .append_message(Message::ai(session.session_id.clone(), "answer"))
            .await
            .unwrap();
        let app = build_router(state);

        let request = Request::builder()
            .uri(format!("/v1/sessions/{}", session.session_id))
            .header("User-Id", "u1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["messages"][0]["role"], "human");
        assert_eq!(parsed["messages"][1]["role"], "ai");
        assert_eq!(parsed["pagination"]["total"], 2);
    }

    #[tokio::test]
    async fn delete_session_soft_then_hard() {
        let (state, store) = test_state("x");
        let session = store
            .create_session(SessionId::new(), Some("u1".into()), None, Default::default())
            .await
            .unwrap();
        let app = build_router(state);

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/v1/sessions/{}", session.session_id))
            .header("User-Id", "u1")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = store.get_session(&session.session_id).await.unwrap().unwrap();
        assert!(!fetched.is_active);

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/v1/sessions/{}?permanent=true", session.session_id))
            .header("User-Id", "u1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.get_session(&session.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reaction_endpoint_validates_role() {
        let (state, store) = test_state("x");
        let session = store
            .create_session(SessionId::new(), Some("u1".into()), None, Default::default())
            .await
            .unwrap();
        let human = store
            .append_message(Message::human(session.session_id.clone(), "q"))
            .await
            .unwrap();
        let ai = store
            .append_message(Message::ai(session.session_id.clone(), "a"))
            .await
            .unwrap();
        assert_eq!(human.role, Role::Human);
        let app = build_router(state);

        let request = Request::builder()
            .method("PUT")
            .uri(format!(
                "/v1/sessions/{}/messages/{}/reaction",
                session.session_id, human.message_id
            ))
            .header("Content-Type", "application/json")
            .header("User-Id", "u1")
            .body(Body::from(r#"{"reaction":"like"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method("PUT")
            .uri(format!(
                "/v1/sessions/{}/messages/{}/reaction",
                session.session_id, ai.message_id
            ))
            .header("Content-Type", "application/json")
            .header("User-Id", "u1")
            .body(Body::from(r#"{"reaction":"dislike"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains(r#""reaction":"dislike""#));
    }

    #[tokio::test]
    async fn stats_endpoint_reports_counts() {
        let (state, store) = test_state("x");
        store
            .create_session(SessionId::new(), Some("u1".into()), None, Default::default())
            .await
            .unwrap();
        let app = build_router(state);

        let request = Request::builder()
            .uri("/v1/stats")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["sessions"]["total"], 1);
        assert_eq!(parsed["sessions"]["active"], 1);
    }
}
