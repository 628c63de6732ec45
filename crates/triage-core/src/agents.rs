//! Agent ledger: presence plus active-load and resolution counters.
//!
//! Every counter change is one `UPDATE ... SET x = x + 1` statement, so the
//! read-modify-write happens inside the store and never crosses an await in
//! our code. Counters are only moved by the conversation state machine via
//! [`apply`].

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor};
use tracing::debug;
use uuid::Uuid;

use crate::db::{from_millis, uuid_col};
use crate::error::{Error, Result};
use crate::lifecycle::AgentEffect;
use crate::models::{Agent, AgentStatus, NewAgent};

/// Add one conversation to the agent's active load.
pub async fn increment_active(executor: impl SqliteExecutor<'_>, id: Uuid) -> Result<()> {
    bump(
        executor,
        id,
        "active_conversations = active_conversations + 1",
    )
    .await?;
    debug!(agent_id = %id, "active load incremented");
    Ok(())
}

/// Remove one conversation from the agent's active load. Already zero stays zero.
pub async fn decrement_active(executor: impl SqliteExecutor<'_>, id: Uuid) -> Result<()> {
    bump(
        executor,
        id,
        "active_conversations = MAX(active_conversations - 1, 0)",
    )
    .await?;
    debug!(agent_id = %id, "active load decremented");
    Ok(())
}

/// Count one more resolved conversation.
pub async fn increment_resolved(executor: impl SqliteExecutor<'_>, id: Uuid) -> Result<()> {
    bump(executor, id, "total_resolved = total_resolved + 1").await?;
    debug!(agent_id = %id, "resolved count incremented");
    Ok(())
}

/// Set presence and stamp `last_active`.
pub async fn set_status(
    executor: impl SqliteExecutor<'_>,
    id: Uuid,
    status: AgentStatus,
) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let result =
        sqlx::query("UPDATE agents SET status = ?, last_active = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(now)
            .bind(id.to_string())
            .execute(executor)
            .await?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("agent", id));
    }
    debug!(agent_id = %id, %status, "agent status updated");
    Ok(())
}

async fn bump(executor: impl SqliteExecutor<'_>, id: Uuid, assignment: &str) -> Result<()> {
    let sql = format!("UPDATE agents SET {assignment}, updated_at = ? WHERE id = ?");
    let result = sqlx::query(&sql)
        .bind(Utc::now().timestamp_millis())
        .bind(id.to_string())
        .execute(executor)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("agent", id));
    }
    Ok(())
}

/// Carry out one counter effect emitted by a conversation transition.
pub async fn apply(conn: &mut SqliteConnection, effect: &AgentEffect) -> Result<()> {
    match *effect {
        AgentEffect::IncrementActive(id) => increment_active(conn, id).await,
        AgentEffect::DecrementActive(id) => decrement_active(conn, id).await,
        AgentEffect::IncrementResolved(id) => increment_resolved(conn, id).await,
    }
}

/// Register an agent. An agent with the same e-mail is returned unchanged.
pub async fn create(conn: &mut SqliteConnection, new: &NewAgent) -> Result<Agent> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("agent name is blank".to_string()));
    }
    let email = new
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase);

    if let Some(email) = &email {
        let existing = sqlx::query("SELECT * FROM agents WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(row) = existing {
            return agent_from_row(&row);
        }
    }

    let now = Utc::now();
    let agent = Agent {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email,
        avatar_url: new.avatar_url.clone(),
        status: new.status,
        active_conversations: 0,
        total_resolved: 0,
        last_active: Some(now),
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO agents (id, name, email, avatar_url, status, active_conversations,
            total_resolved, last_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?, ?)
        "#,
    )
    .bind(agent.id.to_string())
    .bind(&agent.name)
    .bind(&agent.email)
    .bind(&agent.avatar_url)
    .bind(agent.status.as_str())
    .bind(now.timestamp_millis())
    .bind(now.timestamp_millis())
    .bind(now.timestamp_millis())
    .execute(conn)
    .await?;

    debug!(agent_id = %agent.id, name = %agent.name, "agent created");
    Ok(agent)
}

pub async fn get(executor: impl SqliteExecutor<'_>, id: Uuid) -> Result<Option<Agent>> {
    let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(agent_from_row).transpose()
}

pub async fn require(executor: impl SqliteExecutor<'_>, id: Uuid) -> Result<Agent> {
    get(executor, id)
        .await?
        .ok_or_else(|| Error::not_found("agent", id))
}

pub async fn list(executor: impl SqliteExecutor<'_>) -> Result<Vec<Agent>> {
    let rows = sqlx::query("SELECT * FROM agents ORDER BY name")
        .fetch_all(executor)
        .await?;
    rows.iter().map(agent_from_row).collect()
}

pub async fn list_by_status(
    executor: impl SqliteExecutor<'_>,
    status: AgentStatus,
) -> Result<Vec<Agent>> {
    let rows = sqlx::query("SELECT * FROM agents WHERE status = ? ORDER BY name")
        .bind(status.as_str())
        .fetch_all(executor)
        .await?;
    rows.iter().map(agent_from_row).collect()
}

/// Online agents, least loaded first.
pub async fn available(executor: impl SqliteExecutor<'_>) -> Result<Vec<Agent>> {
    let rows = sqlx::query(
        "SELECT * FROM agents WHERE status = 'ONLINE' ORDER BY active_conversations ASC, name",
    )
    .fetch_all(executor)
    .await?;
    rows.iter().map(agent_from_row).collect()
}

pub async fn top_performers(executor: impl SqliteExecutor<'_>, limit: i64) -> Result<Vec<Agent>> {
    let rows = sqlx::query("SELECT * FROM agents ORDER BY total_resolved DESC, name LIMIT ?")
        .bind(limit)
        .fetch_all(executor)
        .await?;
    rows.iter().map(agent_from_row).collect()
}

pub async fn count_online(executor: impl SqliteExecutor<'_>) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM agents WHERE status = 'ONLINE'")
        .fetch_one(executor)
        .await?;
    Ok(count.0)
}

fn agent_from_row(row: &SqliteRow) -> Result<Agent> {
    Ok(Agent {
        id: uuid_col(row, "id")?,
        name: row.get("name"),
        email: row.get("email"),
        avatar_url: row.get("avatar_url"),
        status: row.get::<&str, _>("status").parse()?,
        active_conversations: row.get("active_conversations"),
        total_resolved: row.get("total_resolved"),
        last_active: row.get::<Option<i64>, _>("last_active").map(from_millis),
        created_at: from_millis(row.get("created_at")),
    })
}
