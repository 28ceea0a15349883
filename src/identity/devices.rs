//! Device registration storage.

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{Device, NewDevice};
use crate::auth::error::AuthError;
use crate::pagination::{Order, Page, PageParams};

const DEVICE_COLUMNS: &str = r"id, user_id, device_id, mark, model, carrier, os, nfc, app_version,
       extract(epoch FROM created_at)::bigint AS created_at";

pub async fn list(pool: &PgPool, params: &PageParams) -> Result<Page<Device>, AuthError> {
    let order = match params.order {
        Order::Asc => "ASC",
        Order::Desc => "DESC",
    };
    let query = format!(
        r"
        SELECT {DEVICE_COLUMNS}, COUNT(*) OVER () AS total
        FROM devices
        WHERE ($1::text IS NULL
               OR device_id ILIKE '%' || $1 || '%'
               OR mark ILIKE '%' || $1 || '%'
               OR model ILIKE '%' || $1 || '%')
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
        .context("failed to list devices")?;

    let total = rows.first().map_or(0, |row| row.get::<i64, _>("total"));
    Ok(Page {
        items: rows.iter().map(Device::from_row).collect(),
        page: params.page,
        per_page: params.per_page,
        total,
    })
}

pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Device>, AuthError> {
    let query = format!(
        "SELECT {DEVICE_COLUMNS} FROM devices WHERE user_id = $1 ORDER BY created_at DESC"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list user devices")?;
    Ok(rows.iter().map(Device::from_row).collect())
}

pub async fn insert(pool: &PgPool, new: &NewDevice) -> Result<Device, AuthError> {
    let query = format!(
        r"
        INSERT INTO devices (user_id, device_id, mark, model, carrier, os, nfc, app_version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {DEVICE_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(new.user_id)
        .bind(&new.device_id)
        .bind(&new.mark)
        .bind(&new.model)
        .bind(&new.carrier)
        .bind(&new.os)
        .bind(new.nfc)
        .bind(&new.app_version)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert device")?;
    Ok(Device::from_row(&row))
}

pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<Device>, AuthError> {
    let query = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1");
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
        .context("failed to find device")?;
    Ok(row.as_ref().map(Device::from_row))
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), AuthError> {
    let query = "DELETE FROM devices WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete device")?;
    if result.rows_affected() == 0 {
        return Err(AuthError::NotFound("Device"));
    }
    Ok(())
}
