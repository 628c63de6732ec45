//! Customer identity resolution.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqliteExecutor};
use tracing::debug;
use uuid::Uuid;

use crate::db::{from_millis, like_pattern, uuid_col};
use crate::error::{Error, Result};
use crate::models::{Customer, CustomerIdentity};

pub const UNKNOWN_CUSTOMER: &str = "Unknown Customer";

/// Trimmed, non-empty contact fields; rejects malformed e-mail.
pub(crate) fn normalize(identity: &CustomerIdentity) -> Result<CustomerIdentity> {
    fn clean(value: Option<&String>) -> Option<String> {
        value
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
    }

    let email = clean(identity.email.as_ref()).map(|e| e.to_lowercase());
    if let Some(email) = &email {
        let valid = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
        if !valid {
            return Err(Error::InvalidInput(format!("malformed email '{email}'")));
        }
    }

    Ok(CustomerIdentity {
        name: clean(identity.name.as_ref()),
        email,
        phone: clean(identity.phone.as_ref()),
    })
}

/// Find a customer by e-mail, then phone; create one when neither matches.
pub async fn find_or_create(
    conn: &mut SqliteConnection,
    identity: &CustomerIdentity,
) -> Result<Customer> {
    let identity = normalize(identity)?;

    if let Some(email) = &identity.email {
        if let Some(existing) = find_by("email", email, &mut *conn).await? {
            return Ok(existing);
        }
    }
    if let Some(phone) = &identity.phone {
        if let Some(existing) = find_by("phone", phone, &mut *conn).await? {
            return Ok(existing);
        }
    }

    let customer = Customer {
        id: Uuid::new_v4(),
        name: identity
            .name
            .clone()
            .unwrap_or_else(|| UNKNOWN_CUSTOMER.to_string()),
        email: identity.email,
        phone: identity.phone,
        account_status: "ACTIVE".to_string(),
        total_conversations: 0,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO customers (id, name, email, phone, account_status, total_conversations, created_at)
        VALUES (?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(customer.id.to_string())
    .bind(&customer.name)
    .bind(&customer.email)
    .bind(&customer.phone)
    .bind(&customer.account_status)
    .bind(customer.created_at.timestamp_millis())
    .execute(conn)
    .await?;

    debug!(customer_id = %customer.id, "customer created");
    Ok(customer)
}

async fn find_by(
    column: &'static str,
    value: &str,
    executor: impl SqliteExecutor<'_>,
) -> Result<Option<Customer>> {
    let sql = format!("SELECT * FROM customers WHERE {column} = ? ORDER BY created_at LIMIT 1");
    let row = sqlx::query(&sql)
        .bind(value)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(customer_from_row).transpose()
}

/// Count one more conversation for the customer. Never decremented.
pub async fn increment_conversations(conn: &mut SqliteConnection, id: Uuid) -> Result<()> {
    let result = sqlx::query(
        "UPDATE customers SET total_conversations = total_conversations + 1 WHERE id = ?",
    )
    .bind(id.to_string())
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("customer", id));
    }
    Ok(())
}

pub async fn get(executor: impl SqliteExecutor<'_>, id: Uuid) -> Result<Option<Customer>> {
    let row = sqlx::query("SELECT * FROM customers WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(customer_from_row).transpose()
}

pub async fn list(executor: impl SqliteExecutor<'_>) -> Result<Vec<Customer>> {
    let rows = sqlx::query("SELECT * FROM customers ORDER BY total_conversations DESC, name")
        .fetch_all(executor)
        .await?;
    rows.iter().map(customer_from_row).collect()
}

/// Name, e-mail, or phone containing `query`. A blank query matches nothing.
pub async fn search(executor: impl SqliteExecutor<'_>, query: &str) -> Result<Vec<Customer>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    let pattern = like_pattern(query);
    let rows = sqlx::query(
        r#"
        SELECT * FROM customers
        WHERE lower(name) LIKE ?1 ESCAPE '\'
           OR lower(COALESCE(email, '')) LIKE ?1 ESCAPE '\'
           OR COALESCE(phone, '') LIKE ?1 ESCAPE '\'
        ORDER BY name
        "#,
    )
    .bind(pattern)
    .fetch_all(executor)
    .await?;
    rows.iter().map(customer_from_row).collect()
}

fn customer_from_row(row: &SqliteRow) -> Result<Customer> {
    Ok(Customer {
        id: uuid_col(row, "id")?,
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        account_status: row.get("account_status"),
        total_conversations: row.get("total_conversations"),
        created_at: from_millis(row.get("created_at")),
    })
}
