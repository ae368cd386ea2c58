//! In-memory session store — useful for tests and ephemeral deployments.
//!
//! Never the source of truth for anything a client expects to survive a
//! restart.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parley_core::error::StoreError;
use parley_core::message::{Message, Reaction, Role};
use parley_core::session::{PageInfo, Session, SessionId};
use parley_core::store::{MessageOrder, MessageStats, SessionStats, SessionStore, StoreStats};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    /// Insertion order doubles as the created_at tiebreak.
    messages: Vec<Message>,
}

/// An in-memory store over tokio `RwLock`-guarded collections.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_session(
        &self,
        session_id: SessionId,
        user_id: Option<String>,
        title: Option<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Session, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(session_id.as_str()) {
            return Err(StoreError::Conflict(session_id.0));
        }
        let session = Session::new(session_id, user_id, title, metadata);
        inner
            .sessions
            .insert(session.session_id.0.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.sessions.get(session_id.as_str()).cloned())
    }

    async fn touch_session(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(session_id.as_str()) {
            Some(session) if session.is_active => {
                session.last_accessed_at = Utc::now();
            }
            _ => {
                warn!(session_id = %session_id, "Touch skipped: session not found or inactive");
            }
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        user_id: &str,
        active_only: bool,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<Session>, PageInfo), StoreError> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| s.user_id.as_deref() == Some(user_id))
            .filter(|s| !active_only || s.is_active)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));

        let total = sessions.len() as u64;
        let page = page.max(1);
        let start = ((page - 1) * per_page) as usize;
        let page_items: Vec<Session> = sessions
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .collect();

        Ok((page_items, PageInfo::compute(page, per_page, total)))
    }

    async fn deactivate_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(session_id.as_str()) {
            Some(session) => {
                session.is_active = false;
                session.last_accessed_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let removed = inner.sessions.remove(session_id.as_str()).is_some();
        if removed {
            inner.messages.retain(|m| &m.session_id != session_id);
        }
        Ok(removed)
    }

    async fn delete_old_sessions(&self, retention_days: u32) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let mut inner = self.inner.write().await;
        let stale: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| !s.is_active && s.last_accessed_at < cutoff)
            .map(|s| s.session_id.0.clone())
            .collect();
        for id in &stale {
            inner.sessions.remove(id);
            inner.messages.retain(|m| m.session_id.as_str() != id);
        }
        Ok(stale.len() as u64)
    }

    async fn append_message(&self, message: Message) -> Result<Message, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(message.session_id.as_str()) {
            return Err(StoreError::NotFound {
                entity: "session",
                id: message.session_id.0.clone(),
            });
        }
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn messages(
        &self,
        session_id: &SessionId,
        page: u32,
        per_page: u32,
        order: MessageOrder,
    ) -> Result<(Vec<Message>, PageInfo), StoreError> {
        let inner = self.inner.read().await;
        // Insertion order already satisfies the created_at tiebreak.
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| &m.session_id == session_id)
            .cloned()
            .collect();
        if order == MessageOrder::Desc {
            messages.reverse();
        }

        let total = messages.len() as u64;
        let page = page.max(1);
        let start = ((page - 1) * per_page) as usize;
        let page_items: Vec<Message> = messages
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .collect();

        Ok((page_items, PageInfo::compute(page, per_page, total)))
    }

    async fn message_count(&self, session_id: &SessionId) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| &m.session_id == session_id)
            .count() as u64)
    }

    async fn set_reaction(
        &self,
        message_id: &str,
        session_id: &SessionId,
        reaction: Reaction,
    ) -> Result<Message, StoreError> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.message_id == message_id && &m.session_id == session_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "message",
                id: message_id.to_string(),
            })?;

        if message.role != Role::Ai {
            return Err(StoreError::InvalidRole {
                message_id: message_id.to_string(),
                role: message.role.to_string(),
            });
        }

        message.reaction = Some(reaction);
        message.metadata.insert(
            "reaction_updated_at".into(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );
        Ok(message.clone())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let inner = self.inner.read().await;
        let total = inner.sessions.len() as u64;
        let active = inner.sessions.values().filter(|s| s.is_active).count() as u64;
        let unique_users = inner
            .sessions
            .values()
            .filter_map(|s| s.user_id.as_deref())
            .collect::<std::collections::HashSet<_>>()
            .len() as u64;

        let msg_total = inner.messages.len() as u64;
        let human = inner
            .messages
            .iter()
            .filter(|m| m.role == Role::Human)
            .count() as u64;

        let mut per_session: HashMap<&str, u64> = HashMap::new();
        for message in &inner.messages {
            *per_session.entry(message.session_id.as_str()).or_default() += 1;
        }
        let avg = if per_session.is_empty() {
            0.0
        } else {
            msg_total as f64 / per_session.len() as f64
        };

        Ok(StoreStats {
            sessions: SessionStats {
                total,
                active,
                inactive: total - active,
                unique_users,
            },
            messages: MessageStats {
                total: msg_total,
                human,
                ai: msg_total - human,
                avg_per_session: (avg * 100.0).round() / 100.0,
            },
        })
    }
}
