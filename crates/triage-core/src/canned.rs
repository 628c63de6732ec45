//! Canned reply templates.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor};
use tracing::debug;
use uuid::Uuid;

use crate::db::{from_millis, like_pattern, uuid_col};
use crate::error::{Error, Result};
use crate::models::CannedMessage;

pub async fn create(
    conn: &mut SqliteConnection,
    title: &str,
    category: &str,
    content: &str,
    shortcut: Option<&str>,
) -> Result<CannedMessage> {
    if title.trim().is_empty() || content.trim().is_empty() {
        return Err(Error::InvalidInput(
            "canned message needs a title and content".to_string(),
        ));
    }

    let message = CannedMessage {
        id: Uuid::new_v4(),
        title: title.trim().to_string(),
        category: category.trim().to_string(),
        content: content.to_string(),
        shortcut: shortcut.map(ToOwned::to_owned),
        usage_count: 0,
        is_active: true,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO canned_messages (id, title, category, content, shortcut, usage_count, is_active, created_at)
        VALUES (?, ?, ?, ?, ?, 0, 1, ?)
        "#,
    )
    .bind(message.id.to_string())
    .bind(&message.title)
    .bind(&message.category)
    .bind(&message.content)
    .bind(&message.shortcut)
    .bind(message.created_at.timestamp_millis())
    .execute(conn)
    .await?;

    Ok(message)
}

/// Content of an active template for a reply, counting the use. Runs inside
/// the reply's transaction so the count and the message commit together.
pub async fn take_for_reply(conn: &mut SqliteConnection, id: Uuid) -> Result<String> {
    let row = sqlx::query(
        r#"
        UPDATE canned_messages SET usage_count = usage_count + 1
        WHERE id = ? AND is_active = 1
        RETURNING content
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(conn)
    .await?;

    let content: String = row
        .map(|row| row.get("content"))
        .ok_or_else(|| Error::not_found("canned message", id))?;
    debug!(canned_id = %id, "canned message used");
    Ok(content)
}

pub async fn get(executor: impl SqliteExecutor<'_>, id: Uuid) -> Result<Option<CannedMessage>> {
    let row = sqlx::query("SELECT * FROM canned_messages WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(canned_from_row).transpose()
}

pub async fn list_active(executor: impl SqliteExecutor<'_>) -> Result<Vec<CannedMessage>> {
    let rows = sqlx::query("SELECT * FROM canned_messages WHERE is_active = 1 ORDER BY category, title")
        .fetch_all(executor)
        .await?;
    rows.iter().map(canned_from_row).collect()
}

pub async fn list_by_category(
    executor: impl SqliteExecutor<'_>,
    category: &str,
) -> Result<Vec<CannedMessage>> {
    let rows = sqlx::query(
        "SELECT * FROM canned_messages WHERE is_active = 1 AND category = ? ORDER BY title",
    )
    .bind(category)
    .fetch_all(executor)
    .await?;
    rows.iter().map(canned_from_row).collect()
}

pub async fn categories(executor: impl SqliteExecutor<'_>) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT category FROM canned_messages WHERE is_active = 1 ORDER BY category",
    )
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(|(category,)| category).collect())
}

pub async fn search(executor: impl SqliteExecutor<'_>, query: &str) -> Result<Vec<CannedMessage>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM canned_messages
        WHERE is_active = 1
          AND (lower(title) LIKE ?1 ESCAPE '\' OR lower(content) LIKE ?1 ESCAPE '\')
        ORDER BY usage_count DESC, title
        "#,
    )
    .bind(like_pattern(query))
    .fetch_all(executor)
    .await?;
    rows.iter().map(canned_from_row).collect()
}

pub async fn most_used(executor: impl SqliteExecutor<'_>, limit: i64) -> Result<Vec<CannedMessage>> {
    let rows = sqlx::query(
        "SELECT * FROM canned_messages WHERE is_active = 1 ORDER BY usage_count DESC, title LIMIT ?",
    )
    .bind(limit)
    .fetch_all(executor)
    .await?;
    rows.iter().map(canned_from_row).collect()
}

fn canned_from_row(row: &SqliteRow) -> Result<CannedMessage> {
    Ok(CannedMessage {
        id: uuid_col(row, "id")?,
        title: row.get("title"),
        category: row.get("category"),
        content: row.get("content"),
        shortcut: row.get("shortcut"),
        usage_count: row.get("usage_count"),
        is_active: row.get("is_active"),
        created_at: from_millis(row.get("created_at")),
    })
}
