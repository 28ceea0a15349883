//! Principal identities: users (human shoppers) and apps (machine clients),
//! plus the peripheral profile and device records owned by users.

pub mod apps;
pub mod devices;
pub mod users;

use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

/// Soft-delete state, modeled explicitly instead of scattering nullable
/// timestamp checks through queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    Active,
    SoftDeleted { at: i64 },
}

impl UserState {
    #[must_use]
    pub fn from_epoch(deleted_at: Option<i64>) -> Self {
        match deleted_at {
            Some(at) => Self::SoftDeleted { at },
            None => Self::Active,
        }
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::SoftDeleted { .. })
    }

    #[must_use]
    pub fn deleted_at(&self) -> Option<i64> {
        match self {
            Self::SoftDeleted { at } => Some(*at),
            Self::Active => None,
        }
    }
}

/// Which rows a user lookup may see. `Default` is the rule everywhere unless
/// a caller explicitly opts into deleted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserScope {
    Default,
    WithDeleted,
    OnlyDeleted,
}

impl UserScope {
    /// Predicate appended to every user query; the single place the
    /// soft-delete exclusion rule lives.
    #[must_use]
    pub fn clause(self) -> &'static str {
        match self {
            Self::Default => " AND users.deleted_at IS NULL",
            Self::WithDeleted => "",
            Self::OnlyDeleted => " AND users.deleted_at IS NOT NULL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub second_lastname: Option<String>,
    pub is_active: bool,
    pub aq_id: Option<i32>,
    pub state: UserState,
    pub created_at: i64,
}

impl User {
    pub(crate) fn from_row(row: &PgRow) -> Self {
        Self {
            id: row.get("id"),
            email: row.get("email"),
            phone: row.get("phone"),
            password_hash: row.get("password_hash"),
            name: row.get("name"),
            lastname: row.get("lastname"),
            second_lastname: row.get("second_lastname"),
            is_active: row.get("is_active"),
            aq_id: row.get("aq_id"),
            state: UserState::from_epoch(row.get("deleted_at")),
            created_at: row.get("created_at"),
        }
    }
}

/// Financial summary piggybacked on the authorization cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub user_id: Uuid,
    pub available_credit: f64,
    pub payment_capacity: f64,
    pub second_credit: bool,
}

impl Profile {
    pub(crate) fn from_row(row: &PgRow) -> Self {
        Self {
            user_id: row.get("user_id"),
            available_credit: row.get("available_credit"),
            payment_capacity: row.get("payment_capacity"),
            second_credit: row.get("second_credit"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct App {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub token: Option<String>,
    pub created_at: i64,
}

impl App {
    pub(crate) fn from_row(row: &PgRow) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            token: row.get("token"),
            created_at: row.get("created_at"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub mark: Option<String>,
    pub model: Option<String>,
    pub carrier: Option<String>,
    pub os: Option<String>,
    pub nfc: Option<bool>,
    pub app_version: Option<String>,
    pub created_at: i64,
}

impl Device {
    pub(crate) fn from_row(row: &PgRow) -> Self {
        Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            device_id: row.get("device_id"),
            mark: row.get("mark"),
            model: row.get("model"),
            carrier: row.get("carrier"),
            os: row.get("os"),
            nfc: row.get("nfc"),
            app_version: row.get("app_version"),
            created_at: row.get("created_at"),
        }
    }
}

/// Allow-listed fields settable at registration/creation. Anything else in a
/// request payload is ignored by construction.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub phone: String,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub second_lastname: Option<String>,
    pub aq_id: Option<i32>,
}

/// Allow-listed fields settable on update. Password and activation state
/// have dedicated operations.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub second_lastname: Option<String>,
    pub aq_id: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct NewDevice {
    pub user_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub mark: Option<String>,
    pub model: Option<String>,
    pub carrier: Option<String>,
    pub os: Option<String>,
    pub nfc: Option<bool>,
    pub app_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{UserScope, UserState};

    #[test]
    fn user_state_from_epoch() {
        assert_eq!(UserState::from_epoch(None), UserState::Active);
        let deleted = UserState::from_epoch(Some(1_700_000_000));
        assert!(deleted.is_deleted());
        assert_eq!(deleted.deleted_at(), Some(1_700_000_000));
        assert_eq!(UserState::Active.deleted_at(), None);
    }

    #[test]
    fn default_scope_excludes_deleted_rows() {
        assert_eq!(UserScope::Default.clause(), " AND users.deleted_at IS NULL");
        assert_eq!(UserScope::WithDeleted.clause(), "");
        assert_eq!(
            UserScope::OnlyDeleted.clause(),
            " AND users.deleted_at IS NOT NULL"
        );
    }
}
