//! User storage.
//!
//! Default lookups exclude soft-deleted rows; callers opt into deleted
//! records through `UserScope`. Mutations that change grants or the
//! financial profile update the authorization cache within the same logical
//! operation.

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{NewUser, Profile, User, UserScope, UserUpdate};
use crate::auth::error::AuthError;
use crate::cache::{Cache, mirror};
use crate::db::is_unique_violation;
use crate::pagination::{Order, Page, PageParams};
use crate::rbac::{PrincipalKind, Role, resolver};

const USER_COLUMNS: &str = r"users.id, users.email, users.phone, users.password_hash,
       users.name, users.lastname, users.second_lastname, users.is_active, users.aq_id,
       extract(epoch FROM users.deleted_at)::bigint AS deleted_at,
       extract(epoch FROM users.created_at)::bigint AS created_at";

pub async fn find(pool: &PgPool, id: Uuid, scope: UserScope) -> Result<Option<User>, AuthError> {
    let query = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE users.id = $1{}",
        scope.clause()
    );
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
        .context("failed to find user")?;
    Ok(row.as_ref().map(User::from_row))
}

/// Login lookup: the username is an email or a phone number.
pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<User>, AuthError> {
    let query = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE (users.email = $1 OR users.phone = $1){}",
        UserScope::Default.clause()
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find user by username")?;
    Ok(row.as_ref().map(User::from_row))
}

/// Impersonation lookup requires both identifiers to match.
pub async fn find_by_phone_and_email(
    pool: &PgPool,
    phone: &str,
    email: &str,
) -> Result<Option<User>, AuthError> {
    let query = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE users.phone = $1 AND users.email = $2{}",
        UserScope::Default.clause()
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(phone)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find user by phone and email")?;
    Ok(row.as_ref().map(User::from_row))
}

pub async fn find_by_aq_id(pool: &PgPool, aq_id: i32) -> Result<Option<User>, AuthError> {
    let query = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE users.aq_id = $1{}",
        UserScope::Default.clause()
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(aq_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find user by aq_id")?;
    Ok(row.as_ref().map(User::from_row))
}

pub async fn list(
    pool: &PgPool,
    params: &PageParams,
    scope: UserScope,
) -> Result<Page<User>, AuthError> {
    let order = match params.order {
        Order::Asc => "ASC",
        Order::Desc => "DESC",
    };
    let query = format!(
        r"
        SELECT {USER_COLUMNS}, COUNT(*) OVER () AS total
        FROM users
        WHERE ($1::text IS NULL
               OR users.email ILIKE '%' || $1 || '%'
               OR users.phone ILIKE '%' || $1 || '%'
               OR users.name ILIKE '%' || $1 || '%'
               OR users.lastname ILIKE '%' || $1 || '%'
               OR users.id::text ILIKE '%' || $1 || '%'){scope}
        ORDER BY users.created_at {order}
        LIMIT $2 OFFSET $3
    ",
        scope = scope.clause()
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
        .context("failed to list users")?;

    let total = rows.first().map_or(0, |row| row.get::<i64, _>("total"));
    Ok(Page {
        items: rows.iter().map(User::from_row).collect(),
        page: params.page,
        per_page: params.per_page,
        total,
    })
}

/// Create a user with its empty profile and initial role in one transaction.
/// The password arrives already hashed; plaintext never reaches storage.
pub async fn create(
    pool: &PgPool,
    new: &NewUser,
    password_hash: &str,
    role_id: Uuid,
) -> Result<User, AuthError> {
    let mut tx = pool.begin().await.context("begin user create")?;

    let query = format!(
        r"
        INSERT INTO users (email, phone, password_hash, name, lastname, second_lastname, aq_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(password_hash)
        .bind(&new.name)
        .bind(&new.lastname)
        .bind(&new.second_lastname)
        .bind(new.aq_id)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user = match row {
        Ok(row) => User::from_row(&row),
        Err(err) if is_unique_violation(&err) => {
            let _ = tx.rollback().await;
            return Err(AuthError::Conflict("User"));
        }
        Err(err) => {
            return Err(AuthError::from(
                anyhow::Error::from(err).context("failed to insert user"),
            ));
        }
    };

    let query = "INSERT INTO profiles (user_id) VALUES ($1)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert profile")?;

    let query = "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.id)
        .bind(role_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to assign initial role")?;

    tx.commit().await.context("commit user create")?;
    Ok(user)
}

/// Apply the allow-listed update fields; anything absent stays untouched.
pub async fn update(pool: &PgPool, id: Uuid, update: &UserUpdate) -> Result<User, AuthError> {
    let query = format!(
        r"
        UPDATE users
        SET email = COALESCE($2, email),
            phone = COALESCE($3, phone),
            name = COALESCE($4, name),
            lastname = COALESCE($5, lastname),
            second_lastname = COALESCE($6, second_lastname),
            aq_id = COALESCE($7, aq_id),
            updated_at = NOW()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING {USER_COLUMNS}
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
        .bind(&update.email)
        .bind(&update.phone)
        .bind(&update.name)
        .bind(&update.lastname)
        .bind(&update.second_lastname)
        .bind(update.aq_id)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match row {
        Ok(Some(row)) => Ok(User::from_row(&row)),
        Ok(None) => Err(AuthError::NotFound("User")),
        Err(err) if is_unique_violation(&err) => Err(AuthError::Conflict("User")),
        Err(err) => Err(AuthError::from(
            anyhow::Error::from(err).context("failed to update user"),
        )),
    }
}

pub async fn set_password(pool: &PgPool, id: Uuid, password_hash: &str) -> Result<(), AuthError> {
    let query = r"
        UPDATE users
        SET password_hash = $2, updated_at = NOW()
        WHERE id = $1 AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password")?;
    if result.rows_affected() == 0 {
        return Err(AuthError::NotFound("User"));
    }
    Ok(())
}

pub async fn set_active(pool: &PgPool, id: Uuid, active: bool) -> Result<(), AuthError> {
    let query = r"
        UPDATE users
        SET is_active = $2, updated_at = NOW()
        WHERE id = $1 AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .bind(active)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update activation state")?;
    if result.rows_affected() == 0 {
        return Err(AuthError::NotFound("User"));
    }
    Ok(())
}

/// A user holding the `root` role can never be soft- or hard-deleted.
async fn ensure_deletable(pool: &PgPool, user_id: Uuid) -> Result<(), AuthError> {
    let roles = resolver::list_roles(pool, PrincipalKind::User, user_id).await?;
    if roles.iter().any(Role::is_root) {
        return Err(AuthError::ProtectedRoot("user"));
    }
    Ok(())
}

/// Mark a user deleted and drop its cache entry.
pub async fn soft_delete(pool: &PgPool, cache: &Cache, id: Uuid) -> Result<User, AuthError> {
    let user = find(pool, id, UserScope::Default)
        .await?
        .ok_or(AuthError::NotFound("User"))?;
    ensure_deletable(pool, user.id).await?;

    let query = r"
        UPDATE users
        SET deleted_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND deleted_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to soft delete user")?;

    mirror::remove(cache, user.id).await;
    Ok(user)
}

/// Clear the deleted mark and force-recreate the cache entry.
pub async fn restore(pool: &PgPool, cache: &Cache, id: Uuid) -> Result<User, AuthError> {
    let user = find(pool, id, UserScope::OnlyDeleted)
        .await?
        .ok_or(AuthError::NotFound("User"))?;

    let query = r"
        UPDATE users
        SET deleted_at = NULL, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to restore user")?;

    mirror::write_user(pool, cache, &user, true).await;
    Ok(user)
}

/// Remove the row for good: associations first, then the user, then the
/// cache entry.
pub async fn hard_delete(pool: &PgPool, cache: &Cache, id: Uuid) -> Result<User, AuthError> {
    let user = find(pool, id, UserScope::WithDeleted)
        .await?
        .ok_or(AuthError::NotFound("User"))?;
    ensure_deletable(pool, user.id).await?;

    let mut tx = pool.begin().await.context("begin user delete")?;
    for query in [
        "DELETE FROM user_roles WHERE user_id = $1",
        "DELETE FROM user_permissions WHERE user_id = $1",
        "DELETE FROM sessions WHERE user_id = $1",
        "DELETE FROM devices WHERE user_id = $1",
        "DELETE FROM profiles WHERE user_id = $1",
        "DELETE FROM users WHERE id = $1",
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
            .context("failed to delete user")?;
    }
    tx.commit().await.context("commit user delete")?;

    mirror::remove(cache, user.id).await;
    Ok(user)
}

/// Replace the user's direct permission grants, then refresh its cache entry
/// (no force: principals that never logged in stay uncached).
pub async fn sync_permissions(
    pool: &PgPool,
    cache: &Cache,
    id: Uuid,
    permission_ids: &[Uuid],
) -> Result<(), AuthError> {
    let user = find(pool, id, UserScope::Default)
        .await?
        .ok_or(AuthError::NotFound("User"))?;

    let mut tx = pool.begin().await.context("begin permission sync")?;

    let query = "DELETE FROM user_permissions WHERE user_id = $1";
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
        .context("failed to clear user permissions")?;

    for permission_id in permission_ids {
        let query = r"
            INSERT INTO user_permissions (user_id, permission_id)
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
            .context("failed to grant permission")?;
        if result.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Err(AuthError::NotFound("Permission"));
        }
    }

    tx.commit().await.context("commit permission sync")?;
    mirror::write_user(pool, cache, &user, false).await;
    Ok(())
}

/// Replace the user's role set, then refresh its cache entry (no force).
pub async fn sync_roles(
    pool: &PgPool,
    cache: &Cache,
    id: Uuid,
    role_ids: &[Uuid],
) -> Result<(), AuthError> {
    let user = find(pool, id, UserScope::Default)
        .await?
        .ok_or(AuthError::NotFound("User"))?;

    let mut tx = pool.begin().await.context("begin role sync")?;

    let query = "DELETE FROM user_roles WHERE user_id = $1";
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
        .context("failed to clear user roles")?;

    for role_id in role_ids {
        let query = r"
            INSERT INTO user_roles (user_id, role_id)
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
            .context("failed to grant role")?;
        if result.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Err(AuthError::NotFound("Role"));
        }
    }

    tx.commit().await.context("commit role sync")?;
    mirror::write_user(pool, cache, &user, false).await;
    Ok(())
}

pub async fn fetch_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<Profile>, AuthError> {
    let query = r"
        SELECT user_id, available_credit, payment_capacity, second_credit
        FROM profiles
        WHERE user_id = $1
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
        .context("failed to fetch profile")?;
    Ok(row.as_ref().map(Profile::from_row))
}

async fn upsert_profile_field(
    pool: &PgPool,
    cache: &Cache,
    id: Uuid,
    query: &'static str,
    bind_f64: Option<f64>,
    bind_bool: Option<bool>,
) -> Result<(), AuthError> {
    let user = find(pool, id, UserScope::Default)
        .await?
        .ok_or(AuthError::NotFound("User"))?;

    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let statement = sqlx::query(query).bind(user.id);
    let statement = match (bind_f64, bind_bool) {
        (Some(value), _) => statement.bind(value),
        (_, Some(value)) => statement.bind(value),
        (None, None) => statement,
    };
    statement
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update profile field")?;

    mirror::write_user(pool, cache, &user, false).await;
    Ok(())
}

pub async fn update_available_credit(
    pool: &PgPool,
    cache: &Cache,
    id: Uuid,
    amount: f64,
) -> Result<(), AuthError> {
    let query = r"
        INSERT INTO profiles (user_id, available_credit)
        VALUES ($1, $2)
        ON CONFLICT (user_id)
        DO UPDATE SET available_credit = EXCLUDED.available_credit, updated_at = NOW()
    ";
    upsert_profile_field(pool, cache, id, query, Some(amount), None).await
}

pub async fn update_payment_capacity(
    pool: &PgPool,
    cache: &Cache,
    id: Uuid,
    amount: f64,
) -> Result<(), AuthError> {
    let query = r"
        INSERT INTO profiles (user_id, payment_capacity)
        VALUES ($1, $2)
        ON CONFLICT (user_id)
        DO UPDATE SET payment_capacity = EXCLUDED.payment_capacity, updated_at = NOW()
    ";
    upsert_profile_field(pool, cache, id, query, Some(amount), None).await
}

pub async fn update_second_credit(
    pool: &PgPool,
    cache: &Cache,
    id: Uuid,
    second_credit: bool,
) -> Result<(), AuthError> {
    let query = r"
        INSERT INTO profiles (user_id, second_credit)
        VALUES ($1, $2)
        ON CONFLICT (user_id)
        DO UPDATE SET second_credit = EXCLUDED.second_credit, updated_at = NOW()
    ";
    upsert_profile_field(pool, cache, id, query, None, Some(second_credit)).await
}
