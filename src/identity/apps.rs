//! App (machine client) storage.
//!
//! Apps hold a single overwritable token column; each generation replaces
//! the previous value. Grant syncs mirror the cache unconditionally since
//! apps have no login session gating the entry.

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::App;
use crate::auth::error::AuthError;
use crate::cache::{Cache, mirror};
use crate::db::is_unique_violation;
use crate::pagination::{Order, Page, PageParams};

const APP_COLUMNS: &str = r"id, name, description, token,
       extract(epoch FROM created_at)::bigint AS created_at";

pub async fn list(pool: &PgPool, params: &PageParams) -> Result<Page<App>, AuthError> {
    let order = match params.order {
        Order::Asc => "ASC",
        Order::Desc => "DESC",
    };
    let query = format!(
        r"
        SELECT {APP_COLUMNS}, COUNT(*) OVER () AS total
        FROM apps
        WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR id::text ILIKE '%' || $1 || '%')
        ORDER BY created_at {order}
        LIMIT $2 OFFSET $3
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(params.search.as_deref())
        .bind(params.per_page)
        .bind(params.offset())
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list apps")?;

    let total = rows.first().map_or(0, |row| row.get::<i64, _>("total"));
    Ok(Page {
        items: rows.iter().map(App::from_row).collect(),
        page: params.page,
        per_page: params.per_page,
        total,
    })
}

/// Every app, for the cache reconciliation pass.
pub async fn all(pool: &PgPool) -> Result<Vec<App>, AuthError> {
    let query = format!("SELECT {APP_COLUMNS} FROM apps ORDER BY name ASC");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list apps")?;
    Ok(rows.iter().map(App::from_row).collect())
}

pub async fn insert(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
) -> Result<App, AuthError> {
    let query = format!(
        r"
        INSERT INTO apps (name, description)
        VALUES ($1, $2)
        RETURNING {APP_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(name)
        .bind(description)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(App::from_row(&row)),
        Err(err) if is_unique_violation(&err) => Err(AuthError::Conflict("App")),
        Err(err) => Err(AuthError::from(
            anyhow::Error::from(err).context("failed to insert app"),
        )),
    }
}

pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<App>, AuthError> {
    let query = format!("SELECT {APP_COLUMNS} FROM apps WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find app")?;
    Ok(row.as_ref().map(App::from_row))
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<App, AuthError> {
    let query = format!(
        r"
        UPDATE apps
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {APP_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match row {
        Ok(Some(row)) => Ok(App::from_row(&row)),
        Ok(None) => Err(AuthError::NotFound("App")),
        Err(err) if is_unique_violation(&err) => Err(AuthError::Conflict("App")),
        Err(err) => Err(AuthError::from(
            anyhow::Error::from(err).context("failed to update app"),
        )),
    }
}

/// Delete an app, clearing its grants first and dropping its cache entry.
pub async fn delete(pool: &PgPool, cache: &Cache, id: Uuid) -> Result<App, AuthError> {
    let app = find(pool, id).await?.ok_or(AuthError::NotFound("App"))?;

    let mut tx = pool.begin().await.context("begin app delete")?;
    for query in [
        "DELETE FROM app_roles WHERE app_id = $1",
        "DELETE FROM app_permissions WHERE app_id = $1",
        "DELETE FROM apps WHERE id = $1",
    ] {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete app")?;
    }
    tx.commit().await.context("commit app delete")?;

    mirror::remove(cache, app.id).await;
    Ok(app)
}

/// Overwrite the stored token with the latest generated value.
pub async fn update_token(pool: &PgPool, id: Uuid, token: &str) -> Result<(), AuthError> {
    let query = r"
        UPDATE apps
        SET token = $2, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(token)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update app token")?;
    if result.rows_affected() == 0 {
        return Err(AuthError::NotFound("App"));
    }
    Ok(())
}

/// Replace the app's direct permission grants and mirror the cache.
pub async fn sync_permissions(
    pool: &PgPool,
    cache: &Cache,
    id: Uuid,
    permission_ids: &[Uuid],
) -> Result<(), AuthError> {
    let app = find(pool, id).await?.ok_or(AuthError::NotFound("App"))?;

    let mut tx = pool.begin().await.context("begin app permission sync")?;

    let query = "DELETE FROM app_permissions WHERE app_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear app permissions")?;

    for permission_id in permission_ids {
        let query = r"
            INSERT INTO app_permissions (app_id, permission_id)
            SELECT $1, id FROM permissions WHERE id = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(permission_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to grant permission to app")?;
        if result.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Err(AuthError::NotFound("Permission"));
        }
    }

    tx.commit().await.context("commit app permission sync")?;
    mirror::write_app(pool, cache, &app).await;
    Ok(())
}

/// Replace the app's role set and mirror the cache.
pub async fn sync_roles(
    pool: &PgPool,
    cache: &Cache,
    id: Uuid,
    role_ids: &[Uuid],
) -> Result<(), AuthError> {
    let app = find(pool, id).await?.ok_or(AuthError::NotFound("App"))?;

    let mut tx = pool.begin().await.context("begin app role sync")?;

    let query = "DELETE FROM app_roles WHERE app_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear app roles")?;

    for role_id in role_ids {
        let query = r"
            INSERT INTO app_roles (app_id, role_id)
            SELECT $1, id FROM roles WHERE id = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(role_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to grant role to app")?;
        if result.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Err(AuthError::NotFound("Role"));
        }
    }

    tx.commit().await.context("commit app role sync")?;
    mirror::write_app(pool, cache, &app).await;
    Ok(())
}
