//! SQLite conversation store.
//!
//! Two tables:
//! - `conversations`: one index row per conversation, created on first write
//! - `messages`: one row per message, ordered by an autoincrement id

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use quill_core::error::MemoryError;
use quill_core::memory::{ConversationStore, ConversationSummary};
use quill_core::message::{ConversationId, Message, MessageToolCall, Role, parse_timestamp};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// A durable conversation log backed by SQLite.
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Also accepts zone-less ISO-8601 text written by other tools.
fn parse_ts(s: &str) -> DateTime<Utc> {
    parse_timestamp(s).unwrap_or_else(|| {
        warn!(value = %s, "Unreadable stored timestamp, using the current time");
        Utc::now()
    })
}

impl SqliteStore {
    /// Open a store from a SQLite URL or path.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(url: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?;
        Self::connect(options, url).await
    }

    /// Open a store at a file path, creating parent directories as needed.
    pub async fn open(path: &Path) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::Storage(format!("Failed to create {}: {e}", parent.display())))?;
        }
        let options = SqliteConnectOptions::new().filename(path);
        Self::connect(options, &path.display().to_string()).await
    }

    async fn connect(options: SqliteConnectOptions, label: &str) -> Result<Self, MemoryError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {label}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                metadata    TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id  TEXT NOT NULL,
                message_id       TEXT NOT NULL,
                role             TEXT NOT NULL,
                content          TEXT NOT NULL,
                name             TEXT,
                tool_calls       TEXT NOT NULL DEFAULT '[]',
                tool_call_id     TEXT,
                timestamp        TEXT NOT NULL,
                metadata         TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("conversation index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, MemoryError> {
        let column = |name: &str, e: sqlx::Error| MemoryError::QueryFailed(format!("{name} column: {e}"));

        let id: String = row.try_get("message_id").map_err(|e| column("message_id", e))?;
        let role: String = row.try_get("role").map_err(|e| column("role", e))?;
        let content: String = row.try_get("content").map_err(|e| column("content", e))?;
        let name: Option<String> = row.try_get("name").map_err(|e| column("name", e))?;
        let tool_calls_json: String = row.try_get("tool_calls").map_err(|e| column("tool_calls", e))?;
        let tool_call_id: Option<String> = row.try_get("tool_call_id").map_err(|e| column("tool_call_id", e))?;
        let timestamp: String = row.try_get("timestamp").map_err(|e| column("timestamp", e))?;
        let metadata_json: String = row.try_get("metadata").map_err(|e| column("metadata", e))?;

        let tool_calls: Vec<MessageToolCall> = serde_json::from_str(&tool_calls_json).unwrap_or_default();
        let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();

        Ok(Message {
            id,
            role: Role::parse(&role),
            content,
            name,
            tool_calls,
            tool_call_id,
            timestamp: parse_ts(&timestamp),
            metadata,
        })
    }

    fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationSummary, MemoryError> {
        let column = |name: &str, e: sqlx::Error| MemoryError::QueryFailed(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let title: String = row.try_get("title").map_err(|e| column("title", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        let updated_at: String = row.try_get("updated_at").map_err(|e| column("updated_at", e))?;
        let metadata_json: String = row.try_get("metadata").map_err(|e| column("metadata", e))?;

        Ok(ConversationSummary {
            id: ConversationId(id),
            title,
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, conversation_id: &ConversationId, message: &Message) -> Result<(), MemoryError> {
        let tool_calls = serde_json::to_string(&message.tool_calls)
            .map_err(|e| MemoryError::Storage(format!("tool_calls serialization: {e}")))?;
        let metadata = serde_json::to_string(&message.metadata)
            .map_err(|e| MemoryError::Storage(format!("metadata serialization: {e}")))?;
        let now = format_ts(&Utc::now());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, title, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(ConversationSummary::default_title(conversation_id))
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("conversation upsert failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages
                (conversation_id, message_id, role, content, name, tool_calls, tool_call_id, timestamp, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(&message.id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.name)
        .bind(&tool_calls)
        .bind(&message.tool_call_id)
        .bind(format_ts(&message.timestamp))
        .bind(&metadata)
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("message INSERT failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(conversation_id = %conversation_id, role = %message.role, "Stored message");
        Ok(())
    }

    async fn load(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, MemoryError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY id ASC")
            .bind(conversation_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("load conversation: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, MemoryError> {
        let rows = sqlx::query("SELECT * FROM conversations ORDER BY updated_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("list conversations: {e}")))?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    async fn delete(&self, conversation_id: &ConversationId) -> Result<bool, MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        let messages = sqlx::query("DELETE FROM messages WHERE conversation_id = ?1")
            .bind(conversation_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("message DELETE failed: {e}")))?;

        let conversations = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(conversation_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("conversation DELETE failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        Ok(messages.rows_affected() > 0 || conversations.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query("DELETE FROM messages")
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("message DELETE failed: {e}")))?;
        sqlx::query("DELETE FROM conversations")
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("conversation DELETE failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        info!("Cleared all stored conversations");
        Ok(())
    }
}
