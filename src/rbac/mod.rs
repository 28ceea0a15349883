//! Roles, permissions and their resolution into effective grants.

pub mod repo;
pub mod resolver;

use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

/// Holding this role bypasses every permission and role check.
pub const ROOT_ROLE: &str = "root";

/// Role granted to self-registered users.
pub const DEFAULT_ROLE: &str = "shopper";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub fixed: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub fixed: bool,
    pub created_at: i64,
}

/// Which side of the principal split an id belongs to. Users and apps share
/// the same resolution semantics over different association tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    App,
}

impl Role {
    pub(crate) fn from_row(row: &PgRow) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            fixed: row.get("fixed"),
            created_at: row.get("created_at"),
        }
    }

    /// The `root` row itself is immutable regardless of the `fixed` flag.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.name == ROOT_ROLE
    }
}

impl Permission {
    pub(crate) fn from_row(row: &PgRow) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            fixed: row.get("fixed"),
            created_at: row.get("created_at"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ROOT_ROLE, Role};
    use uuid::Uuid;

    #[test]
    fn root_detection_is_by_name_not_flag() {
        let role = Role {
            id: Uuid::new_v4(),
            name: ROOT_ROLE.to_string(),
            fixed: false,
            created_at: 0,
        };
        assert!(role.is_root());

        let fixed = Role {
            id: Uuid::new_v4(),
            name: "shopper".to_string(),
            fixed: true,
            created_at: 0,
        };
        assert!(!fixed.is_root());
    }
}
