//! SQLite session store.
//!
//! Uses a single SQLite database file with two tables:
//! - `sessions` — one row per chat session
//! - `messages` — one row per message, FK to its session with
//!   `ON DELETE CASCADE`
//!
//! The integer `seq` rowid on `messages` breaks `created_at` ties so the
//! canonical conversation order is stable.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parley_core::error::StoreError;
use parley_core::message::{Message, Reaction, Role, TokenCounts};
use parley_core::session::{PageInfo, Session, SessionId};
use parley_core::store::{MessageOrder, MessageStats, SessionStats, SessionStore, StoreStats};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// A production SQLite session store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a connection path.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database
    /// (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        Self::with_max_connections(path, 4).await
    }

    /// Create with an explicit pool size.
    pub async fn with_max_connections(path: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Persistence(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Persistence(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite session store initialized at {path}");
        Ok(store)
    }

    /// Run schema migrations — creates tables and indexes.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id       TEXT PRIMARY KEY,
                user_id          TEXT,
                title            TEXT,
                created_at       TEXT NOT NULL,
                last_accessed_at TEXT NOT NULL,
                is_active        INTEGER NOT NULL DEFAULT 1,
                metadata         TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq            INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id     TEXT UNIQUE NOT NULL,
                session_id     TEXT NOT NULL
                               REFERENCES sessions(session_id) ON DELETE CASCADE,
                role           TEXT NOT NULL CHECK (role IN ('human', 'ai')),
                content        TEXT NOT NULL,
                created_at     TEXT NOT NULL,
                reaction       TEXT,
                input_tokens   INTEGER NOT NULL DEFAULT 0,
                output_tokens  INTEGER NOT NULL DEFAULT 0,
                total_tokens   INTEGER NOT NULL DEFAULT 0,
                metadata       TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_last_accessed ON sessions(last_accessed_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_active ON sessions(is_active)",
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_session_created ON messages(session_id, created_at)",
        ] {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("index: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Parse a `Session` from a SQLite row.
    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StoreError> {
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| StoreError::Persistence(format!("session_id column: {e}")))?;
        let user_id: Option<String> = row
            .try_get("user_id")
            .map_err(|e| StoreError::Persistence(format!("user_id column: {e}")))?;
        let title: Option<String> = row
            .try_get("title")
            .map_err(|e| StoreError::Persistence(format!("title column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::Persistence(format!("created_at column: {e}")))?;
        let last_accessed_at: String = row
            .try_get("last_accessed_at")
            .map_err(|e| StoreError::Persistence(format!("last_accessed_at column: {e}")))?;
        let is_active: bool = row
            .try_get("is_active")
            .map_err(|e| StoreError::Persistence(format!("is_active column: {e}")))?;
        let metadata_json: String = row
            .try_get("metadata")
            .map_err(|e| StoreError::Persistence(format!("metadata column: {e}")))?;

        Ok(Session {
            session_id: SessionId(session_id),
            user_id,
            title,
            created_at: parse_timestamp(&created_at),
            last_accessed_at: parse_timestamp(&last_accessed_at),
            is_active,
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        })
    }

    /// Parse a `Message` from a SQLite row.
    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let message_id: String = row
            .try_get("message_id")
            .map_err(|e| StoreError::Persistence(format!("message_id column: {e}")))?;
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| StoreError::Persistence(format!("session_id column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| StoreError::Persistence(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::Persistence(format!("content column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::Persistence(format!("created_at column: {e}")))?;
        let reaction: Option<String> = row
            .try_get("reaction")
            .map_err(|e| StoreError::Persistence(format!("reaction column: {e}")))?;
        let input_tokens: i64 = row.try_get("input_tokens").unwrap_or(0);
        let output_tokens: i64 = row.try_get("output_tokens").unwrap_or(0);
        let total_tokens: i64 = row.try_get("total_tokens").unwrap_or(0);
        let metadata_json: String = row
            .try_get("metadata")
            .map_err(|e| StoreError::Persistence(format!("metadata column: {e}")))?;

        let role = role
            .parse::<Role>()
            .map_err(StoreError::Persistence)?;
        let reaction = reaction.and_then(|r| r.parse::<Reaction>().ok());

        Ok(Message {
            message_id,
            session_id: SessionId(session_id),
            role,
            content,
            created_at: parse_timestamp(&created_at),
            reaction,
            tokens: TokenCounts {
                input_tokens: input_tokens as u32,
                output_tokens: output_tokens as u32,
                total_tokens: total_tokens as u32,
            },
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        })
    }
}

fn parse_timestamp(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_session(
        &self,
        session_id: SessionId,
        user_id: Option<String>,
        title: Option<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Session, StoreError> {
        let session = Session::new(session_id, user_id, title, metadata);
        let metadata_json = serde_json::to_string(&session.metadata)
            .map_err(|e| StoreError::Persistence(format!("metadata serialization: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, title, created_at, last_accessed_at, is_active, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
            "#,
        )
        .bind(session.session_id.as_str())
        .bind(&session.user_id)
        .bind(&session.title)
        .bind(session.created_at.to_rfc3339())
        .bind(session.last_accessed_at.to_rfc3339())
        .bind(&metadata_json)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!(session_id = %session.session_id, "Created new session");
                Ok(session)
            }
            Err(e) => {
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    Err(StoreError::Conflict(session.session_id.0))
                } else {
                    Err(StoreError::Persistence(format!("INSERT session: {e}")))
                }
            }
        }
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?1")
            .bind(session_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("SELECT session: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_session(r)?)),
            None => Ok(None),
        }
    }

    async fn touch_session(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET last_accessed_at = ?1 WHERE session_id = ?2 AND is_active = 1",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(session_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("UPDATE access time: {e}")))?;

        if result.rows_affected() == 0 {
            warn!(session_id = %session_id, "Touch skipped: session not found or inactive");
        } else {
            debug!(session_id = %session_id, "Updated session access time");
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
        let active_filter = if active_only {
            "AND is_active = 1"
        } else {
            ""
        };

        let count_sql = format!("SELECT COUNT(*) AS cnt FROM sessions WHERE user_id = ?1 {active_filter}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("COUNT sessions: {e}")))?
            .try_get("cnt")
            .map_err(|e| StoreError::Persistence(format!("cnt column: {e}")))?;

        let page = page.max(1);
        let offset = i64::from(page - 1) * i64::from(per_page);
        let list_sql = format!(
            "SELECT * FROM sessions WHERE user_id = ?1 {active_filter} \
             ORDER BY last_accessed_at DESC LIMIT ?2 OFFSET ?3"
        );
        let rows = sqlx::query(&list_sql)
            .bind(user_id)
            .bind(i64::from(per_page))
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("SELECT sessions: {e}")))?;

        let sessions = rows
            .iter()
            .map(Self::row_to_session)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((sessions, PageInfo::compute(page, per_page, total as u64)))
    }

    async fn deactivate_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET is_active = 0, last_accessed_at = ?1 WHERE session_id = ?2",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(session_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("UPDATE deactivate: {e}")))?;

        let deactivated = result.rows_affected() > 0;
        if deactivated {
            info!(session_id = %session_id, "Deactivated session");
        }
        Ok(deactivated)
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        // Messages cascade via the FK constraint within the same statement.
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?1")
            .bind(session_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("DELETE session: {e}")))?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(session_id = %session_id, "Permanently deleted session");
        }
        Ok(deleted)
    }

    async fn delete_old_sessions(&self, retention_days: u32) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));

        let result = sqlx::query(
            "DELETE FROM sessions WHERE is_active = 0 AND last_accessed_at < ?1",
        )
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("DELETE old sessions: {e}")))?;

        let count = result.rows_affected();
        if count > 0 {
            info!(count, retention_days, "Deleted old inactive sessions");
        }
        Ok(count)
    }

    async fn append_message(&self, message: Message) -> Result<Message, StoreError> {
        let metadata_json = serde_json::to_string(&message.metadata)
            .map_err(|e| StoreError::Persistence(format!("metadata serialization: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO messages
                (message_id, session_id, role, content, created_at,
                 input_tokens, output_tokens, total_tokens, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&message.message_id)
        .bind(message.session_id.as_str())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .bind(i64::from(message.tokens.input_tokens))
        .bind(i64::from(message.tokens.output_tokens))
        .bind(i64::from(message.tokens.total_tokens))
        .bind(&metadata_json)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(session_id = %message.session_id, role = %message.role, "Appended message");
                Ok(message)
            }
            Err(e) => {
                if e.as_database_error()
                    .is_some_and(|db| db.is_foreign_key_violation())
                {
                    Err(StoreError::NotFound {
                        entity: "session",
                        id: message.session_id.0.clone(),
                    })
                } else {
                    Err(StoreError::Persistence(format!("INSERT message: {e}")))
                }
            }
        }
    }

    async fn messages(
        &self,
        session_id: &SessionId,
        page: u32,
        per_page: u32,
        order: MessageOrder,
    ) -> Result<(Vec<Message>, PageInfo), StoreError> {
        let total = self.message_count(session_id).await?;

        let order_sql = match order {
            MessageOrder::Asc => "ORDER BY created_at ASC, seq ASC",
            MessageOrder::Desc => "ORDER BY created_at DESC, seq DESC",
        };

        let page = page.max(1);
        let offset = i64::from(page - 1) * i64::from(per_page);
        let sql = format!(
            "SELECT * FROM messages WHERE session_id = ?1 {order_sql} LIMIT ?2 OFFSET ?3"
        );
        let rows = sqlx::query(&sql)
            .bind(session_id.as_str())
            .bind(i64::from(per_page))
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("SELECT messages: {e}")))?;

        let messages = rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((messages, PageInfo::compute(page, per_page, total)))
    }

    async fn message_count(&self, session_id: &SessionId) -> Result<u64, StoreError> {
        let cnt: i64 = sqlx::query("SELECT COUNT(*) AS cnt FROM messages WHERE session_id = ?1")
            .bind(session_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("COUNT messages: {e}")))?
            .try_get("cnt")
            .map_err(|e| StoreError::Persistence(format!("cnt column: {e}")))?;
        Ok(cnt as u64)
    }

    async fn set_reaction(
        &self,
        message_id: &str,
        session_id: &SessionId,
        reaction: Reaction,
    ) -> Result<Message, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM messages WHERE message_id = ?1 AND session_id = ?2",
        )
        .bind(message_id)
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("SELECT message: {e}")))?;

        let Some(ref row) = row else {
            return Err(StoreError::NotFound {
                entity: "message",
                id: message_id.to_string(),
            });
        };

        let mut message = Self::row_to_message(row)?;
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

        let metadata_json = serde_json::to_string(&message.metadata)
            .map_err(|e| StoreError::Persistence(format!("metadata serialization: {e}")))?;

        sqlx::query(
            "UPDATE messages SET reaction = ?1, metadata = ?2 WHERE message_id = ?3",
        )
        .bind(reaction.as_str())
        .bind(&metadata_json)
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("UPDATE reaction: {e}")))?;

        debug!(message_id, reaction = reaction.as_str(), "Set message reaction");
        Ok(message)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(is_active), 0) AS active,
                COUNT(DISTINCT user_id) AS unique_users
            FROM sessions
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("session stats: {e}")))?;

        let total: i64 = row.try_get("total").unwrap_or(0);
        let active: i64 = row.try_get("active").unwrap_or(0);
        let unique_users: i64 = row.try_get("unique_users").unwrap_or(0);

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(role = 'human'), 0) AS human,
                COALESCE(SUM(role = 'ai'), 0) AS ai
            FROM messages
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("message stats: {e}")))?;

        let msg_total: i64 = row.try_get("total").unwrap_or(0);
        let human: i64 = row.try_get("human").unwrap_or(0);
        let ai: i64 = row.try_get("ai").unwrap_or(0);

        let avg: Option<f64> = sqlx::query(
            r#"
            SELECT AVG(msg_count) AS avg_count FROM
                (SELECT COUNT(*) AS msg_count FROM messages GROUP BY session_id)
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Persistence(format!("avg stats: {e}")))?
        .try_get("avg_count")
        .unwrap_or(None);

        Ok(StoreStats {
            sessions: SessionStats {
                total: total as u64,
                active: active as u64,
                inactive: (total - active) as u64,
                unique_users: unique_users as u64,
            },
            messages: MessageStats {
                total: msg_total as u64,
                human: human as u64,
                ai: ai as u64,
                avg_per_session: (avg.unwrap_or(0.0) * 100.0).round() / 100.0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    async fn seed_session(store: &SqliteStore, user: &str) -> Session {
        store
            .create_session(
                SessionId::new(),
                Some(user.into()),
                Some("Test session".into()),
                Default::default(),
            )
            .await
            .unwrap()
    }

    fn msg(session_id: &SessionId, role: Role, content: &str) -> Message {
        match role {
            Role::Human => Message::human(session_id.clone(), content),
            Role::Ai => Message::ai(session_id.clone(), content),
        }
    }

    #[tokio::test]
    async fn create_and_get_session() {
        let store = test_store().await;
        let created = seed_session(&store, "u1").await;

        let fetched = store
            .get_session(&created.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.session_id, created.session_id);
        assert_eq!(fetched.user_id.as_deref(), Some("u1"));
        assert!(fetched.is_active);
        assert!(fetched.last_accessed_at >= fetched.created_at);
    }

    #[tokio::test]
    async fn create_duplicate_is_conflict() {
        let store = test_store().await;
        let created = seed_session(&store, "u1").await;

        let err = store
            .create_session(created.session_id.clone(), None, None, Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn touch_updates_access_time() {
        let store = test_store().await;
        let created = seed_session(&store, "u1").await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.touch_session(&created.session_id).await.unwrap();

        let fetched = store
            .get_session(&created.session_id)
            .await
            .unwrap()
            .unwrap();
        assert!(fetched.last_accessed_at > created.last_accessed_at);
        assert!(fetched.last_accessed_at >= fetched.created_at);
    }

    #[tokio::test]
    async fn touch_missing_session_is_noop() {
        let store = test_store().await;
        store
            .touch_session(&SessionId::from("no-such-session"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn touch_inactive_session_is_noop() {
        let store = test_store().await;
        let created = seed_session(&store, "u1").await;
        store.deactivate_session(&created.session_id).await.unwrap();

        let before = store
            .get_session(&created.session_id)
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.touch_session(&created.session_id).await.unwrap();

        let after = store
            .get_session(&created.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.last_accessed_at, before.last_accessed_at);
    }

    #[tokio::test]
    async fn list_sessions_ordered_by_access_time() {
        let store = test_store().await;
        let first = seed_session(&store, "u1").await;
        let second = seed_session(&store, "u1").await;
        seed_session(&store, "someone-else").await;

        // Touch the first session so it becomes the most recent.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.touch_session(&first.session_id).await.unwrap();

        let (sessions, info) = store.list_sessions("u1", true, 1, 50).await.unwrap();
        assert_eq!(info.total, 2);
        assert_eq!(sessions[0].session_id, first.session_id);
        assert_eq!(sessions[1].session_id, second.session_id);
    }

    #[tokio::test]
    async fn list_sessions_active_only_filter() {
        let store = test_store().await;
        let a = seed_session(&store, "u1").await;
        seed_session(&store, "u1").await;
        store.deactivate_session(&a.session_id).await.unwrap();

        let (active, _) = store.list_sessions("u1", true, 1, 50).await.unwrap();
        assert_eq!(active.len(), 1);

        let (all, _) = store.list_sessions("u1", false, 1, 50).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn list_sessions_pagination() {
        let store = test_store().await;
        for _ in 0..5 {
            seed_session(&store, "u1").await;
        }

        let (page1, info) = store.list_sessions("u1", true, 1, 2).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(info.total, 5);
        assert_eq!(info.total_pages, 3);
        assert!(info.has_next);
        assert!(!info.has_previous);

        let (page3, info) = store.list_sessions("u1", true, 3, 2).await.unwrap();
        assert_eq!(page3.len(), 1);
        assert!(!info.has_next);
        assert!(info.has_previous);
    }

    #[tokio::test]
    async fn deactivate_preserves_messages() {
        let store = test_store().await;
        let session = seed_session(&store, "u1").await;
        store
            .append_message(msg(&session.session_id, Role::Human, "Hello"))
            .await
            .unwrap();

        assert!(store.deactivate_session(&session.session_id).await.unwrap());

        let fetched = store
            .get_session(&session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!fetched.is_active);
        assert_eq!(store.message_count(&session.session_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn hard_delete_cascades_messages() {
        let store = test_store().await;
        let session = seed_session(&store, "u1").await;
        for text in ["one", "two", "three"] {
            store
                .append_message(msg(&session.session_id, Role::Human, text))
                .await
                .unwrap();
        }

        assert!(store.delete_session(&session.session_id).await.unwrap());
        assert!(store.get_session(&session.session_id).await.unwrap().is_none());
        assert_eq!(store.message_count(&session.session_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_missing_session_returns_false() {
        let store = test_store().await;
        assert!(!store.delete_session(&SessionId::from("ghost")).await.unwrap());
    }

    #[tokio::test]
    async fn append_to_missing_session_is_not_found() {
        let store = test_store().await;
        let err = store
            .append_message(msg(&SessionId::from("ghost"), Role::Human, "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn messages_paginate_in_order() {
        let store = test_store().await;
        let session = seed_session(&store, "u1").await;
        for i in 0..5 {
            let role = if i % 2 == 0 { Role::Human } else { Role::Ai };
            store
                .append_message(msg(&session.session_id, role, &format!("message {i}")))
                .await
                .unwrap();
        }

        let (asc, info) = store
            .messages(&session.session_id, 1, 3, MessageOrder::Asc)
            .await
            .unwrap();
        assert_eq!(info.total, 5);
        assert_eq!(asc[0].content, "message 0");
        assert_eq!(asc[2].content, "message 2");

        let (desc, _) = store
            .messages(&session.session_id, 1, 3, MessageOrder::Desc)
            .await
            .unwrap();
        assert_eq!(desc[0].content, "message 4");
    }

    #[tokio::test]
    async fn message_created_at_is_non_decreasing() {
        let store = test_store().await;
        let session = seed_session(&store, "u1").await;
        for i in 0..4 {
            store
                .append_message(msg(&session.session_id, Role::Human, &format!("m{i}")))
                .await
                .unwrap();
        }

        let (messages, _) = store
            .messages(&session.session_id, 1, 50, MessageOrder::Asc)
            .await
            .unwrap();
        for pair in messages.windows(2) {
            assert!(pair[1].created_at >= pair[0].created_at);
        }
    }

    #[tokio::test]
    async fn token_counts_round_trip() {
        let store = test_store().await;
        let session = seed_session(&store, "u1").await;
        let tokens = TokenCounts {
            input_tokens: 120,
            output_tokens: 48,
            total_tokens: 168,
        };
        let mut message = msg(&session.session_id, Role::Ai, "answer");
        message.tokens = tokens;
        store.append_message(message).await.unwrap();

        let (messages, _) = store
            .messages(&session.session_id, 1, 10, MessageOrder::Asc)
            .await
            .unwrap();
        assert_eq!(messages[0].tokens, tokens);
    }

    #[tokio::test]
    async fn reaction_only_on_ai_messages() {
        let store = test_store().await;
        let session = seed_session(&store, "u1").await;
        let human = store
            .append_message(msg(&session.session_id, Role::Human, "question"))
            .await
            .unwrap();
        let ai = store
            .append_message(msg(&session.session_id, Role::Ai, "answer"))
            .await
            .unwrap();

        let err = store
            .set_reaction(&human.message_id, &session.session_id, Reaction::Like)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRole { .. }));

        // The human row must not have been mutated.
        let (messages, _) = store
            .messages(&session.session_id, 1, 10, MessageOrder::Asc)
            .await
            .unwrap();
        assert!(messages[0].reaction.is_none());

        let updated = store
            .set_reaction(&ai.message_id, &session.session_id, Reaction::Dislike)
            .await
            .unwrap();
        assert_eq!(updated.reaction, Some(Reaction::Dislike));
        assert!(updated.metadata.contains_key("reaction_updated_at"));
    }

    #[tokio::test]
    async fn reaction_on_missing_message_is_not_found() {
        let store = test_store().await;
        let session = seed_session(&store, "u1").await;
        let err = store
            .set_reaction("ghost", &session.session_id, Reaction::Like)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn reaction_can_be_updated() {
        let store = test_store().await;
        let session = seed_session(&store, "u1").await;
        let ai = store
            .append_message(msg(&session.session_id, Role::Ai, "answer"))
            .await
            .unwrap();

        store
            .set_reaction(&ai.message_id, &session.session_id, Reaction::Like)
            .await
            .unwrap();
        let updated = store
            .set_reaction(&ai.message_id, &session.session_id, Reaction::Dislike)
            .await
            .unwrap();
        assert_eq!(updated.reaction, Some(Reaction::Dislike));
    }

    #[tokio::test]
    async fn delete_old_sessions_purges_inactive_only() {
        let store = test_store().await;
        let stale = seed_session(&store, "u1").await;
        let fresh = seed_session(&store, "u1").await;
        store.deactivate_session(&stale.session_id).await.unwrap();

        // Backdate the stale session past the retention window.
        sqlx::query("UPDATE sessions SET last_accessed_at = ?1 WHERE session_id = ?2")
            .bind((Utc::now() - Duration::days(120)).to_rfc3339())
            .bind(stale.session_id.as_str())
            .execute(&store.pool)
            .await
            .unwrap();

        let purged = store.delete_old_sessions(90).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get_session(&stale.session_id).await.unwrap().is_none());
        assert!(store.get_session(&fresh.session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stats_aggregate_counts() {
        let store = test_store().await;
        let a = seed_session(&store, "u1").await;
        let b = seed_session(&store, "u2").await;
        store.deactivate_session(&b.session_id).await.unwrap();

        for session in [&a, &b] {
            store
                .append_message(msg(&session.session_id, Role::Human, "q"))
                .await
                .unwrap();
            store
                .append_message(msg(&session.session_id, Role::Ai, "a"))
                .await
                .unwrap();
        }

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.sessions.total, 2);
        assert_eq!(stats.sessions.active, 1);
        assert_eq!(stats.sessions.inactive, 1);
        assert_eq!(stats.sessions.unique_users, 2);
        assert_eq!(stats.messages.total, 4);
        assert_eq!(stats.messages.human, 2);
        assert_eq!(stats.messages.ai, 2);
        assert!((stats.messages.avg_per_session - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn stats_empty_store() {
        let store = test_store().await;
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.sessions.total, 0);
        assert_eq!(stats.messages.total, 0);
        assert!((stats.messages.avg_per_session).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn metadata_round_trip() {
        let store = test_store().await;
        let mut metadata = serde_json::Map::new();
        metadata.insert("channel".into(), serde_json::json!("web"));

        let session = store
            .create_session(SessionId::new(), Some("u1".into()), None, metadata)
            .await
            .unwrap();

        let fetched = store
            .get_session(&session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.metadata["channel"], serde_json::json!("web"));
    }

    #[tokio::test]
    async fn store_name() {
        let store = test_store().await;
        assert_eq!(store.name(), "sqlite");
    }
}
