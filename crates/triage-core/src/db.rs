//! Database operations for triage.
//!
//! SQLite is the record store behind every ledger. Reads go straight to the
//! pool and may run in parallel; writes go through [`Database::begin_write`],
//! which hands out one transaction at a time.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqliteExecutor, SqlitePool, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{
    Agent, AgentStatus, CannedMessage, Conversation, ConversationStatus, Customer, Message,
    NewAgent, TriageStats,
};
use crate::schema::SCHEMA;
use crate::urgency::UrgencyLevel;
use crate::{agents, canned, customers, messages};

/// Database handle for triage.
pub struct Database {
    pool: SqlitePool,
    writer: Mutex<()>,
}

/// An open write transaction. Dropping it without [`WriteTx::commit`] rolls
/// every statement back.
pub struct WriteTx<'a> {
    tx: Transaction<'static, Sqlite>,
    _writer: MutexGuard<'a, ()>,
}

impl WriteTx<'_> {
    /// Connection to run statements inside the transaction.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

impl Database {
    /// Open or create a database at the given path with default tuning.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &EngineConfig::default()).await
    }

    /// Open or create a database at the given path.
    pub async fn open_with(path: &Path, engine: &EngineConfig) -> Result<Self> {
        let parent = path.parent().unwrap_or(Path::new("."));
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(engine.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            writer: Mutex::new(()),
        };
        db.init().await?;
        Ok(db)
    }

    /// Initialize schema.
    async fn init(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Start a write transaction. Writers queue behind each other; readers
    /// are not blocked.
    pub async fn begin_write(&self) -> Result<WriteTx<'_>> {
        let writer = self.writer.lock().await;
        let tx = self.pool.begin().await?;
        Ok(WriteTx {
            tx,
            _writer: writer,
        })
    }

    // =========================================================================
    // Customers
    // =========================================================================

    /// Get a customer by ID.
    pub async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        customers::get(&self.pool, id).await
    }

    /// List all customers, most conversations first.
    pub async fn list_customers(&self) -> Result<Vec<Customer>> {
        customers::list(&self.pool).await
    }

    /// Search customers by name, e-mail, or phone substring.
    pub async fn search_customers(&self, query: &str) -> Result<Vec<Customer>> {
        customers::search(&self.pool, query).await
    }

    // =========================================================================
    // Agents
    // =========================================================================

    /// Register an agent, or return the existing one with the same e-mail.
    pub async fn create_agent(&self, agent: &NewAgent) -> Result<Agent> {
        let mut tx = self.begin_write().await?;
        let created = agents::create(tx.conn(), agent).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Get an agent by ID.
    pub async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>> {
        agents::get(&self.pool, id).await
    }

    /// List all agents by name.
    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        agents::list(&self.pool).await
    }

    /// List agents with the given presence.
    pub async fn list_agents_by_status(&self, status: AgentStatus) -> Result<Vec<Agent>> {
        agents::list_by_status(&self.pool, status).await
    }

    /// Online agents, least loaded first.
    pub async fn available_agents(&self) -> Result<Vec<Agent>> {
        agents::available(&self.pool).await
    }

    /// Agents ordered by resolved count.
    pub async fn top_agents(&self, limit: i64) -> Result<Vec<Agent>> {
        agents::top_performers(&self.pool, limit).await
    }

    pub async fn count_online_agents(&self) -> Result<i64> {
        agents::count_online(&self.pool).await
    }

    /// Update agent presence.
    pub async fn set_agent_status(&self, id: Uuid, status: AgentStatus) -> Result<Agent> {
        let mut tx = self.begin_write().await?;
        agents::set_status(tx.conn(), id, status).await?;
        let agent = agents::require(tx.conn(), id).await?;
        tx.commit().await?;
        Ok(agent)
    }

    // =========================================================================
    // Canned messages
    // =========================================================================

    /// Add a reply template.
    pub async fn create_canned_message(
        &self,
        title: &str,
        category: &str,
        content: &str,
        shortcut: Option<&str>,
    ) -> Result<CannedMessage> {
        let mut tx = self.begin_write().await?;
        let created = canned::create(tx.conn(), title, category, content, shortcut).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Get a template by ID.
    pub async fn get_canned_message(&self, id: Uuid) -> Result<Option<CannedMessage>> {
        canned::get(&self.pool, id).await
    }

    /// Active templates, optionally restricted to one category.
    pub async fn list_canned_messages(&self, category: Option<&str>) -> Result<Vec<CannedMessage>> {
        match category {
            Some(category) => canned::list_by_category(&self.pool, category).await,
            None => canned::list_active(&self.pool).await,
        }
    }

    /// Distinct categories of active templates.
    pub async fn canned_categories(&self) -> Result<Vec<String>> {
        canned::categories(&self.pool).await
    }

    /// Search active templates by title or content.
    pub async fn search_canned_messages(&self, query: &str) -> Result<Vec<CannedMessage>> {
        canned::search(&self.pool, query).await
    }

    /// Active templates by usage.
    pub async fn most_used_canned_messages(&self, limit: i64) -> Result<Vec<CannedMessage>> {
        canned::most_used(&self.pool, limit).await
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Get a conversation by ID.
    pub async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        fetch_conversation(&self.pool, id).await
    }

    /// List conversations with optional filters, most urgent first.
    pub async fn list_conversations(
        &self,
        opts: &ListConversationsOptions,
    ) -> Result<Vec<Conversation>> {
        let mut sql = String::from("SELECT * FROM conversations WHERE 1=1");

        if !opts.statuses.is_empty() {
            let placeholders = vec!["?"; opts.statuses.len()].join(", ");
            sql.push_str(&format!(" AND status IN ({placeholders})"));
        }
        if opts.urgency_level.is_some() {
            sql.push_str(" AND urgency_level = ?");
        }
        if opts.agent_id.is_some() {
            sql.push_str(" AND assigned_agent_id = ?");
        }
        if opts.customer_id.is_some() {
            sql.push_str(" AND customer_id = ?");
        }
        if opts.unassigned_only {
            sql.push_str(" AND assigned_agent_id IS NULL");
        }

        sql.push_str(" ORDER BY urgency_score DESC, last_message_at DESC, created_at DESC");

        match (opts.limit, opts.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        let mut query = sqlx::query(&sql);
        for status in &opts.statuses {
            query = query.bind(status.as_str());
        }
        if let Some(level) = opts.urgency_level {
            query = query.bind(level.as_str());
        }
        if let Some(agent_id) = opts.agent_id {
            query = query.bind(agent_id.to_string());
        }
        if let Some(customer_id) = opts.customer_id {
            query = query.bind(customer_id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(conversation_from_row).collect()
    }

    /// Get conversation count.
    pub async fn count_conversations(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Get a message by ID.
    pub async fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        messages::get(&self.pool, id).await
    }

    /// Case-insensitive substring search over message content.
    pub async fn search_messages(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        messages::search(&self.pool, query, limit, offset).await
    }

    /// Get message count.
    pub async fn count_messages(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Queue-level counters.
    pub async fn stats(&self) -> Result<TriageStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status IN ('OPEN', 'IN_PROGRESS') THEN 1 ELSE 0 END), 0) AS active,
                COALESCE(SUM(CASE WHEN urgency_level IN ('HIGH', 'CRITICAL') THEN 1 ELSE 0 END), 0) AS urgent,
                COALESCE(SUM(CASE WHEN assigned_agent_id IS NULL AND status = 'OPEN' THEN 1 ELSE 0 END), 0) AS unassigned
            FROM conversations
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TriageStats {
            total_conversations: row.get("total"),
            active_conversations: row.get("active"),
            urgent_conversations: row.get("urgent"),
            unassigned_conversations: row.get("unassigned"),
            online_agents: agents::count_online(&self.pool).await?,
            total_messages: self.count_messages().await?,
        })
    }
}

/// Options for listing conversations.
#[derive(Debug, Default, Clone)]
pub struct ListConversationsOptions {
    /// Any of these statuses; empty means all.
    pub statuses: Vec<ConversationStatus>,
    pub urgency_level: Option<UrgencyLevel>,
    pub agent_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub unassigned_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// =============================================================================
// Conversation rows
// =============================================================================

pub(crate) async fn insert_conversation(
    conn: &mut SqliteConnection,
    conv: &Conversation,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO conversations (id, customer_id, assigned_agent_id, subject, status,
            urgency_score, urgency_level, urgency_reason, unread_count,
            last_message_at, last_message_preview, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(conv.id.to_string())
    .bind(conv.customer_id.to_string())
    .bind(conv.assigned_agent_id.map(|id| id.to_string()))
    .bind(&conv.subject)
    .bind(conv.status.as_str())
    .bind(i64::from(conv.urgency_score))
    .bind(conv.urgency_level.as_str())
    .bind(&conv.urgency_reason)
    .bind(conv.unread_count)
    .bind(conv.last_message_at.map(|dt| dt.timestamp_millis()))
    .bind(&conv.last_message_preview)
    .bind(conv.created_at.timestamp_millis())
    .bind(conv.updated_at.timestamp_millis())
    .execute(conn)
    .await?;
    Ok(())
}

/// Write back every mutable conversation field.
pub(crate) async fn save_conversation(
    conn: &mut SqliteConnection,
    conv: &Conversation,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE conversations SET
            assigned_agent_id = ?,
            status = ?,
            urgency_score = ?,
            urgency_level = ?,
            urgency_reason = ?,
            unread_count = ?,
            last_message_at = ?,
            last_message_preview = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(conv.assigned_agent_id.map(|id| id.to_string()))
    .bind(conv.status.as_str())
    .bind(i64::from(conv.urgency_score))
    .bind(conv.urgency_level.as_str())
    .bind(&conv.urgency_reason)
    .bind(conv.unread_count)
    .bind(conv.last_message_at.map(|dt| dt.timestamp_millis()))
    .bind(&conv.last_message_preview)
    .bind(conv.updated_at.timestamp_millis())
    .bind(conv.id.to_string())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found("conversation", conv.id));
    }
    Ok(())
}

pub(crate) async fn fetch_conversation(
    executor: impl SqliteExecutor<'_>,
    id: Uuid,
) -> Result<Option<Conversation>> {
    let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(conversation_from_row).transpose()
}

pub(crate) async fn require_conversation(
    executor: impl SqliteExecutor<'_>,
    id: Uuid,
) -> Result<Conversation> {
    fetch_conversation(executor, id)
        .await?
        .ok_or_else(|| Error::not_found("conversation", id))
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation> {
    let score: i64 = row.get("urgency_score");
    Ok(Conversation {
        id: uuid_col(row, "id")?,
        customer_id: uuid_col(row, "customer_id")?,
        assigned_agent_id: opt_uuid_col(row, "assigned_agent_id")?,
        subject: row.get("subject"),
        status: row.get::<&str, _>("status").parse()?,
        urgency_score: u8::try_from(score.clamp(0, 100)).unwrap_or_default(),
        urgency_level: row.get::<&str, _>("urgency_level").parse()?,
        urgency_reason: row.get("urgency_reason"),
        unread_count: row.get("unread_count"),
        last_message_at: row
            .get::<Option<i64>, _>("last_message_at")
            .map(from_millis),
        last_message_preview: row.get("last_message_preview"),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    })
}

// =============================================================================
// Column helpers
// =============================================================================

pub(crate) fn uuid_col(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let raw: &str = row.get(column);
    Uuid::parse_str(raw).map_err(|e| Error::Other(format!("bad uuid in {column}: {e}")))
}

pub(crate) fn opt_uuid_col(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    row.get::<Option<&str>, _>(column)
        .map(|raw| {
            Uuid::parse_str(raw).map_err(|e| Error::Other(format!("bad uuid in {column}: {e}")))
        })
        .transpose()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// LIKE pattern for a case-insensitive substring match.
pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .trim()
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
