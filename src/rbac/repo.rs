//! Role and permission storage, including the protection rules for fixed
//! rows and the `root` role.

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{Permission, Role};
use crate::auth::error::AuthError;
use crate::db::is_unique_violation;
use crate::pagination::{Order, Page, PageParams};

const LIST_ROLES_DESC: &str = r"
    SELECT id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at,
           COUNT(*) OVER () AS total
    FROM roles
    WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR id::text ILIKE '%' || $1 || '%')
    ORDER BY created_at DESC
    LIMIT $2 OFFSET $3
";

const LIST_ROLES_ASC: &str = r"
    SELECT id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at,
           COUNT(*) OVER () AS total
    FROM roles
    WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR id::text ILIKE '%' || $1 || '%')
    ORDER BY created_at ASC
    LIMIT $2 OFFSET $3
";

const LIST_PERMISSIONS_DESC: &str = r"
    SELECT id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at,
           COUNT(*) OVER () AS total
    FROM permissions
    WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR id::text ILIKE '%' || $1 || '%')
    ORDER BY created_at DESC
    LIMIT $2 OFFSET $3
";

const LIST_PERMISSIONS_ASC: &str = r"
    SELECT id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at,
           COUNT(*) OVER () AS total
    FROM permissions
    WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%' OR id::text ILIKE '%' || $1 || '%')
    ORDER BY created_at ASC
    LIMIT $2 OFFSET $3
";

pub async fn list_roles(pool: &PgPool, params: &PageParams) -> Result<Page<Role>, AuthError> {
    let query = match params.order {
        Order::Asc => LIST_ROLES_ASC,
        Order::Desc => LIST_ROLES_DESC,
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(params.search.as_deref())
        .bind(params.per_page)
        .bind(params.offset())
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list roles")?;

    let total = rows
        .first()
        .map_or(0, |row| row.get::<i64, _>("total"));
    Ok(Page {
        items: rows.iter().map(Role::from_row).collect(),
        page: params.page,
        per_page: params.per_page,
        total,
    })
}

/// Plain unpaginated listing, ordered by name.
pub async fn all_roles(pool: &PgPool) -> Result<Vec<Role>, AuthError> {
    let query = r"
        SELECT id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at
        FROM roles
        ORDER BY name ASC
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
        .context("failed to list roles")?;
    Ok(rows.iter().map(Role::from_row).collect())
}

/// Creating a role is always allowed, including with `fixed = true`.
pub async fn insert_role(pool: &PgPool, name: &str, fixed: bool) -> Result<Role, AuthError> {
    let query = r"
        INSERT INTO roles (name, fixed)
        VALUES ($1, $2)
        RETURNING id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(fixed)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(Role::from_row(&row)),
        Err(err) if is_unique_violation(&err) => Err(AuthError::Conflict("Role")),
        Err(err) => Err(AuthError::from(
            anyhow::Error::from(err).context("failed to insert role"),
        )),
    }
}

pub async fn find_role(pool: &PgPool, id: Uuid) -> Result<Option<Role>, AuthError> {
    let query = r"
        SELECT id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at
        FROM roles
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find role")?;
    Ok(row.as_ref().map(Role::from_row))
}

pub async fn find_role_by_name(pool: &PgPool, name: &str) -> Result<Option<Role>, AuthError> {
    let query = r"
        SELECT id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at
        FROM roles
        WHERE name = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find role by name")?;
    Ok(row.as_ref().map(Role::from_row))
}

/// Update name/fixed. The `root` role is immutable even if its `fixed` flag
/// was cleared by some other path; other fixed roles reject updates too.
pub async fn update_role(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    fixed: Option<bool>,
) -> Result<Role, AuthError> {
    let role = find_role(pool, id).await?.ok_or(AuthError::NotFound("Role"))?;
    if role.is_root() {
        return Err(AuthError::ProtectedRoot("role"));
    }
    if role.fixed {
        return Err(AuthError::ProtectedFixed("role"));
    }

    let query = r"
        UPDATE roles
        SET name = COALESCE($2, name),
            fixed = COALESCE($3, fixed),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .bind(name)
        .bind(fixed)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(Role::from_row(&row)),
        Err(err) if is_unique_violation(&err) => Err(AuthError::Conflict("Role")),
        Err(err) => Err(AuthError::from(
            anyhow::Error::from(err).context("failed to update role"),
        )),
    }
}

/// Delete a role and clear its associations first. Fixed roles and the
/// `root` role are protected.
pub async fn delete_role(pool: &PgPool, id: Uuid) -> Result<Role, AuthError> {
    let role = find_role(pool, id).await?.ok_or(AuthError::NotFound("Role"))?;
    if role.is_root() {
        return Err(AuthError::ProtectedRoot("role"));
    }
    if role.fixed {
        return Err(AuthError::ProtectedFixed("role"));
    }

    let mut tx = pool.begin().await.context("begin role delete")?;
    for query in [
        "DELETE FROM role_permissions WHERE role_id = $1",
        "DELETE FROM user_roles WHERE role_id = $1",
        "DELETE FROM app_roles WHERE role_id = $1",
        "DELETE FROM roles WHERE id = $1",
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
            .context("failed to delete role")?;
    }
    tx.commit().await.context("commit role delete")?;
    Ok(role)
}

/// Replace a role's permission set. Every referenced permission must exist.
pub async fn sync_role_permissions(
    pool: &PgPool,
    role_id: Uuid,
    permission_ids: &[Uuid],
) -> Result<(), AuthError> {
    if find_role(pool, role_id).await?.is_none() {
        return Err(AuthError::NotFound("Role"));
    }

    let mut tx = pool.begin().await.context("begin role permission sync")?;

    let query = "DELETE FROM role_permissions WHERE role_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(role_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear role permissions")?;

    for permission_id in permission_ids {
        let query = r"
            INSERT INTO role_permissions (role_id, permission_id)
            SELECT $1, id FROM permissions WHERE id = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(role_id)
            .bind(permission_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to grant permission to role")?;
        if result.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Err(AuthError::NotFound("Permission"));
        }
    }

    tx.commit().await.context("commit role permission sync")?;
    Ok(())
}

/// Permissions directly attached to a role.
pub async fn role_permission_list(
    pool: &PgPool,
    role_id: Uuid,
) -> Result<Vec<Permission>, AuthError> {
    let query = r"
        SELECT permissions.id, permissions.name, permissions.fixed,
               extract(epoch FROM permissions.created_at)::bigint AS created_at
        FROM permissions
        JOIN role_permissions ON role_permissions.permission_id = permissions.id
        WHERE role_permissions.role_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(role_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list role permission grants")?;
    Ok(rows.iter().map(Permission::from_row).collect())
}

pub async fn list_permissions(
    pool: &PgPool,
    params: &PageParams,
) -> Result<Page<Permission>, AuthError> {
    let query = match params.order {
        Order::Asc => LIST_PERMISSIONS_ASC,
        Order::Desc => LIST_PERMISSIONS_DESC,
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(params.search.as_deref())
        .bind(params.per_page)
        .bind(params.offset())
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list permissions")?;

    let total = rows
        .first()
        .map_or(0, |row| row.get::<i64, _>("total"));
    Ok(Page {
        items: rows.iter().map(Permission::from_row).collect(),
        page: params.page,
        per_page: params.per_page,
        total,
    })
}

pub async fn all_permissions(pool: &PgPool) -> Result<Vec<Permission>, AuthError> {
    let query = r"
        SELECT id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at
        FROM permissions
        ORDER BY name ASC
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
        .context("failed to list permissions")?;
    Ok(rows.iter().map(Permission::from_row).collect())
}

pub async fn insert_permission(
    pool: &PgPool,
    name: &str,
    fixed: bool,
) -> Result<Permission, AuthError> {
    let query = r"
        INSERT INTO permissions (name, fixed)
        VALUES ($1, $2)
        RETURNING id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(fixed)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(Permission::from_row(&row)),
        Err(err) if is_unique_violation(&err) => Err(AuthError::Conflict("Permission")),
        Err(err) => Err(AuthError::from(
            anyhow::Error::from(err).context("failed to insert permission"),
        )),
    }
}

pub async fn find_permission(pool: &PgPool, id: Uuid) -> Result<Option<Permission>, AuthError> {
    let query = r"
        SELECT id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at
        FROM permissions
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find permission")?;
    Ok(row.as_ref().map(Permission::from_row))
}

/// Update a permission. The `fixed` flag blocks deletion only, so fixed
/// permissions still accept updates.
pub async fn update_permission(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    fixed: Option<bool>,
) -> Result<Permission, AuthError> {
    if find_permission(pool, id).await?.is_none() {
        return Err(AuthError::NotFound("Permission"));
    }

    let query = r"
        UPDATE permissions
        SET name = COALESCE($2, name),
            fixed = COALESCE($3, fixed),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, fixed, extract(epoch FROM created_at)::bigint AS created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .bind(name)
        .bind(fixed)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(Permission::from_row(&row)),
        Err(err) if is_unique_violation(&err) => Err(AuthError::Conflict("Permission")),
        Err(err) => Err(AuthError::from(
            anyhow::Error::from(err).context("failed to update permission"),
        )),
    }
}

/// Delete a permission and its grants. Fixed permissions are protected.
pub async fn delete_permission(pool: &PgPool, id: Uuid) -> Result<Permission, AuthError> {
    let permission = find_permission(pool, id)
        .await?
        .ok_or(AuthError::NotFound("Permission"))?;
    if permission.fixed {
        return Err(AuthError::ProtectedFixed("permission"));
    }

    let mut tx = pool.begin().await.context("begin permission delete")?;
    for query in [
        "DELETE FROM role_permissions WHERE permission_id = $1",
        "DELETE FROM user_permissions WHERE permission_id = $1",
        "DELETE FROM app_permissions WHERE permission_id = $1",
        "DELETE FROM permissions WHERE id = $1",
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
            .context("failed to delete permission")?;
    }
    tx.commit().await.context("commit permission delete")?;
    Ok(permission)
}
