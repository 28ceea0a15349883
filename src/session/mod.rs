//! Session ledger: one row per issued login/refresh/registration token,
//! used for logout revocation and for driving cache reconciliation.
//!
//! Expiry is wall-clock and fixed at creation; rows are evaluated lazily by
//! predicate, never swept by a background reaper.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// Insert a ledger row for a freshly issued token. Multiple concurrent
/// sessions per user are allowed; no uniqueness across rows.
pub async fn create(
    pool: &PgPool,
    user_id: Uuid,
    session_marker: &str,
    lifetime_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO sessions (user_id, token, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(session_marker)
        .bind(lifetime_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert session")?;
    Ok(())
}

/// Delete the exactly matching row. Revoking an absent session is a no-op.
pub async fn revoke(pool: &PgPool, user_id: Uuid, session_marker: &str) -> Result<()> {
    let query = "DELETE FROM sessions WHERE user_id = $1 AND token = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(session_marker)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke session")?;
    Ok(())
}

/// True iff at least one non-expired row exists for the user, compared
/// against the database clock at query time.
pub async fn has_active_session(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let query = r"
        SELECT 1 AS present
        FROM sessions
        WHERE user_id = $1
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check active session")?;
    Ok(row.is_some())
}

/// Deduplicated users with at least one non-expired session; drives the
/// cache reconciliation pass.
pub async fn active_user_ids(pool: &PgPool) -> Result<Vec<Uuid>> {
    let query = r"
        SELECT DISTINCT user_id
        FROM sessions
        WHERE expires_at > NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list active sessions")?;
    Ok(rows.iter().map(|row| row.get("user_id")).collect())
}
