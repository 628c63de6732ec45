//! Append-only message log.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor};
use tracing::debug;
use uuid::Uuid;

use crate::db::{from_millis, like_pattern, opt_uuid_col, uuid_col};
use crate::error::Result;
use crate::models::{Message, NewMessage};

/// Store a message. Content is never edited afterwards.
pub async fn append(conn: &mut SqliteConnection, new: NewMessage) -> Result<Message> {
    let message = Message {
        id: Uuid::new_v4(),
        conversation_id: new.conversation_id,
        sender_id: new.sender_id,
        sender_type: new.sender_type,
        sender_name: new.sender_name,
        content: new.content,
        is_read: new.is_read,
        is_canned_response: new.is_canned_response,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO messages (id, conversation_id, sender_id, sender_type, sender_name,
            content, is_read, is_canned_response, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(message.id.to_string())
    .bind(message.conversation_id.to_string())
    .bind(message.sender_id.map(|id| id.to_string()))
    .bind(message.sender_type.as_str())
    .bind(&message.sender_name)
    .bind(&message.content)
    .bind(message.is_read)
    .bind(message.is_canned_response)
    .bind(message.created_at.timestamp_millis())
    .execute(conn)
    .await?;

    debug!(
        message_id = %message.id,
        conversation_id = %message.conversation_id,
        sender = %message.sender_type,
        "message appended"
    );
    Ok(message)
}

/// Messages of one conversation in arrival order.
pub async fn list_by_conversation(
    executor: impl SqliteExecutor<'_>,
    conversation_id: Uuid,
) -> Result<Vec<Message>> {
    let rows = sqlx::query(
        "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at ASC, seq ASC",
    )
    .bind(conversation_id.to_string())
    .fetch_all(executor)
    .await?;
    rows.iter().map(message_from_row).collect()
}

/// Flag every unread customer message of a conversation as read.
pub async fn mark_all_customer_messages_read(
    executor: impl SqliteExecutor<'_>,
    conversation_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE messages SET is_read = 1
        WHERE conversation_id = ? AND sender_type = 'CUSTOMER' AND is_read = 0
        "#,
    )
    .bind(conversation_id.to_string())
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count_unread_customer_messages(
    executor: impl SqliteExecutor<'_>,
    conversation_id: Uuid,
) -> Result<i64> {
    let count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM messages
        WHERE conversation_id = ? AND sender_type = 'CUSTOMER' AND is_read = 0
        "#,
    )
    .bind(conversation_id.to_string())
    .fetch_one(executor)
    .await?;
    Ok(count.0)
}

pub async fn get(executor: impl SqliteExecutor<'_>, id: Uuid) -> Result<Option<Message>> {
    let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(message_from_row).transpose()
}

/// Newest messages whose content contains `query`, ignoring case.
pub async fn search(
    executor: impl SqliteExecutor<'_>,
    query: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Message>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM messages
        WHERE lower(content) LIKE ? ESCAPE '\'
        ORDER BY created_at DESC, seq DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(like_pattern(query))
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await?;
    rows.iter().map(message_from_row).collect()
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    Ok(Message {
        id: uuid_col(row, "id")?,
        conversation_id: uuid_col(row, "conversation_id")?,
        sender_id: opt_uuid_col(row, "sender_id")?,
        sender_type: row.get::<&str, _>("sender_type").parse()?,
        sender_name: row.get("sender_name"),
        content: row.get("content"),
        is_read: row.get("is_read"),
        is_canned_response: row.get("is_canned_response"),
        created_at: from_millis(row.get("created_at")),
    })
}
