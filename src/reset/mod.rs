//! Password-reset codes.
//!
//! A short numeric code is stored against the username (email or phone, not
//! a foreign key) with a tight expiry. Invalid attempts leave the row for
//! expiry; only a successful reset consumes it.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

/// Code lifetime in seconds.
pub const RESET_CODE_TTL_SECONDS: i64 = 5 * 60;

/// Digits in the one-time code.
pub const RESET_CODE_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct ResetRecord {
    pub id: Uuid,
    pub token: String,
    pub username: String,
    pub expired: bool,
}

impl ResetRecord {
    fn from_row(row: &PgRow) -> Self {
        Self {
            id: row.get("id"),
            token: row.get("token"),
            username: row.get("username"),
            expired: row.get("expired"),
        }
    }
}

pub async fn insert(pool: &PgPool, username: &str, token: &str) -> Result<()> {
    let query = r"
        INSERT INTO reset_passwords (token, username, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token)
        .bind(username)
        .bind(RESET_CODE_TTL_SECONDS)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert reset code")?;
    Ok(())
}

/// Expiry is evaluated by the database clock at query time and returned as a
/// flag; the caller decides how to respond.
pub async fn find_by_token(pool: &PgPool, token: &str) -> Result<Option<ResetRecord>> {
    let query = r"
        SELECT id, token, username, (expires_at <= NOW()) AS expired
        FROM reset_passwords
        WHERE token = $1
        ORDER BY created_at DESC
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find reset code")?;
    Ok(row.as_ref().map(ResetRecord::from_row))
}

pub async fn find_by_token_and_username(
    pool: &PgPool,
    token: &str,
    username: &str,
) -> Result<Option<ResetRecord>> {
    let query = r"
        SELECT id, token, username, (expires_at <= NOW()) AS expired
        FROM reset_passwords
        WHERE token = $1 AND username = $2
        ORDER BY created_at DESC
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find reset code")?;
    Ok(row.as_ref().map(ResetRecord::from_row))
}

/// Consume a code after a successful reset.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    let query = "DELETE FROM reset_passwords WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete reset code")?;
    Ok(())
}
