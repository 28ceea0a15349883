//! Permission resolution for users and apps.
//!
//! Roles and permissions are materialized eagerly; callers reuse the result
//! within one authorization check instead of re-traversing associations.
//! The root bypass is NOT applied here so introspection endpoints can list
//! raw grants; see the gateway for the bypass.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::Instrument;
use uuid::Uuid;

use super::{Permission, PrincipalKind, ROOT_ROLE, Role};

/// Resolved role and permission name snapshot for one principal; the shape
/// authorization decisions (and the cache payload) work on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grants {
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl Grants {
    /// The centralized root bypass; both the permission gate and the role
    /// gate consult this and nothing else.
    #[must_use]
    pub fn is_superuser(&self) -> bool {
        self.roles.iter().any(|name| name == ROOT_ROLE)
    }

    /// Logical OR across the required list.
    #[must_use]
    pub fn holds_any_permission(&self, required: &[&str]) -> bool {
        required
            .iter()
            .any(|needed| self.permissions.iter().any(|held| held == needed))
    }

    #[must_use]
    pub fn holds_any_role(&self, required: &[&str]) -> bool {
        required
            .iter()
            .any(|needed| self.roles.iter().any(|held| held == needed))
    }
}

/// Roles held by a principal, materialized.
pub async fn list_roles(pool: &PgPool, kind: PrincipalKind, id: Uuid) -> Result<Vec<Role>> {
    let query = match kind {
        PrincipalKind::User => {
            r"
            SELECT roles.id, roles.name, roles.fixed,
                   extract(epoch FROM roles.created_at)::bigint AS created_at
            FROM roles
            JOIN user_roles ON user_roles.role_id = roles.id
            WHERE user_roles.user_id = $1
        "
        }
        PrincipalKind::App => {
            r"
            SELECT roles.id, roles.name, roles.fixed,
                   extract(epoch FROM roles.created_at)::bigint AS created_at
            FROM roles
            JOIN app_roles ON app_roles.role_id = roles.id
            WHERE app_roles.app_id = $1
        "
        }
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list principal roles")?;

    Ok(rows.iter().map(Role::from_row).collect())
}

/// Directly granted permissions, independent of roles.
pub async fn direct_permissions(
    pool: &PgPool,
    kind: PrincipalKind,
    id: Uuid,
) -> Result<Vec<Permission>> {
    let query = match kind {
        PrincipalKind::User => {
            r"
            SELECT permissions.id, permissions.name, permissions.fixed,
                   extract(epoch FROM permissions.created_at)::bigint AS created_at
            FROM permissions
            JOIN user_permissions ON user_permissions.permission_id = permissions.id
            WHERE user_permissions.user_id = $1
        "
        }
        PrincipalKind::App => {
            r"
            SELECT permissions.id, permissions.name, permissions.fixed,
                   extract(epoch FROM permissions.created_at)::bigint AS created_at
            FROM permissions
            JOIN app_permissions ON app_permissions.permission_id = permissions.id
            WHERE app_permissions.app_id = $1
        "
        }
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list direct permissions")?;

    Ok(rows.iter().map(Permission::from_row).collect())
}

/// Permissions granted through every role the principal holds, deduplicated.
pub async fn role_permissions(
    pool: &PgPool,
    kind: PrincipalKind,
    id: Uuid,
) -> Result<Vec<Permission>> {
    let query = match kind {
        PrincipalKind::User => {
            r"
            SELECT DISTINCT permissions.id, permissions.name, permissions.fixed,
                   extract(epoch FROM permissions.created_at)::bigint AS created_at
            FROM permissions
            JOIN role_permissions ON role_permissions.permission_id = permissions.id
            JOIN user_roles ON user_roles.role_id = role_permissions.role_id
            WHERE user_roles.user_id = $1
        "
        }
        PrincipalKind::App => {
            r"
            SELECT DISTINCT permissions.id, permissions.name, permissions.fixed,
                   extract(epoch FROM permissions.created_at)::bigint AS created_at
            FROM permissions
            JOIN role_permissions ON role_permissions.permission_id = permissions.id
            JOIN app_roles ON app_roles.role_id = role_permissions.role_id
            WHERE app_roles.app_id = $1
        "
        }
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list role permissions")?;

    Ok(rows.iter().map(Permission::from_row).collect())
}

/// Union of two permission lists, deduplicated by permission identity.
/// Result order is unspecified; callers must not depend on it.
#[must_use]
pub fn merge_unique(direct: Vec<Permission>, from_roles: Vec<Permission>) -> Vec<Permission> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut merged = Vec::with_capacity(direct.len() + from_roles.len());
    for permission in direct.into_iter().chain(from_roles) {
        if seen.insert(permission.id) {
            merged.push(permission);
        }
    }
    merged
}

/// The effective permission set: direct grants ∪ role-derived grants.
/// An empty result is valid, not an error.
pub async fn effective_permissions(
    pool: &PgPool,
    kind: PrincipalKind,
    id: Uuid,
) -> Result<Vec<Permission>> {
    let direct = direct_permissions(pool, kind, id).await?;
    let derived = role_permissions(pool, kind, id).await?;
    Ok(merge_unique(direct, derived))
}

/// Resolve the full grant snapshot for one principal.
pub async fn grants(pool: &PgPool, kind: PrincipalKind, id: Uuid) -> Result<Grants> {
    let roles = list_roles(pool, kind, id)
        .await?
        .into_iter()
        .map(|role| role.name)
        .collect();
    let permissions = effective_permissions(pool, kind, id)
        .await?
        .into_iter()
        .map(|permission| permission.name)
        .collect();
    Ok(Grants { roles, permissions })
}

#[cfg(test)]
mod tests {
    use super::{Grants, merge_unique};
    use crate::rbac::Permission;
    use uuid::Uuid;

    fn permission(id: Uuid, name: &str) -> Permission {
        Permission {
            id,
            name: name.to_string(),
            fixed: false,
            created_at: 0,
        }
    }

    #[test]
    fn merge_deduplicates_by_identity() {
        let shared = Uuid::new_v4();
        let direct = vec![
            permission(shared, "profile.update"),
            permission(Uuid::new_v4(), "orders.read"),
        ];
        let from_roles = vec![
            // Same identity arriving through a role must not duplicate.
            permission(shared, "profile.update"),
            permission(Uuid::new_v4(), "orders.create"),
        ];
        let merged = merge_unique(direct, from_roles);
        assert_eq!(merged.len(), 3);
        assert_eq!(
            merged.iter().filter(|p| p.id == shared).count(),
            1,
            "duplicate identity survived the merge"
        );
    }

    #[test]
    fn merge_contains_both_sources() {
        let direct = vec![permission(Uuid::new_v4(), "a")];
        let from_roles = vec![permission(Uuid::new_v4(), "b")];
        let merged = merge_unique(direct.clone(), from_roles.clone());
        assert!(merged.iter().any(|p| p.id == direct[0].id));
        assert!(merged.iter().any(|p| p.id == from_roles[0].id));
    }

    #[test]
    fn empty_grant_set_is_valid() {
        let merged = merge_unique(Vec::new(), Vec::new());
        assert!(merged.is_empty());

        let grants = Grants {
            roles: Vec::new(),
            permissions: Vec::new(),
        };
        assert!(!grants.is_superuser());
        assert!(!grants.holds_any_permission(&["anything"]));
    }

    #[test]
    fn superuser_is_the_root_role_by_name() {
        let grants = Grants {
            roles: vec!["admin".to_string(), "root".to_string()],
            permissions: Vec::new(),
        };
        assert!(grants.is_superuser());

        let grants = Grants {
            roles: vec!["rooted".to_string()],
            permissions: Vec::new(),
        };
        assert!(!grants.is_superuser());
    }

    #[test]
    fn required_lists_are_or_semantics() {
        let grants = Grants {
            roles: vec!["support".to_string()],
            permissions: vec!["profile.update".to_string()],
        };
        assert!(grants.holds_any_permission(&["something.else", "profile.update"]));
        assert!(!grants.holds_any_permission(&["something.else"]));
        assert!(grants.holds_any_role(&["admin", "support"]));
        assert!(!grants.holds_any_role(&["admin"]));
    }
}
