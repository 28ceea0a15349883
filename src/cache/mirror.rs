//! Write-through mirror of each principal's resolved grants and profile
//! summary, keyed by `"ms-users-" + principal id`.
//!
//! Routine grant/profile mutations only refresh entries that already exist;
//! login (and restore) force the write so a freshly authenticated principal
//! is always cached. Deleting a user removes its entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::Cache;
use crate::identity::{App, User, users};
use crate::rbac::{PrincipalKind, resolver, resolver::Grants};

pub const CACHE_KEY_PREFIX: &str = "ms-users-";

#[must_use]
pub fn principal_key(id: Uuid) -> String {
    format!("{CACHE_KEY_PREFIX}{id}")
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub available_credit: f64,
    pub payment_capacity: f64,
    pub second_credit: bool,
}

/// Cached payload for a user principal.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: Uuid,
    pub email: String,
    pub permissions: Vec<String>,
    pub roles: Vec<String>,
    pub profile: Option<ProfileSummary>,
}

/// Cached payload for an app principal; apps have no profile or email.
#[derive(Debug, Serialize, Deserialize)]
pub struct AppEntry {
    pub id: Uuid,
    pub permissions: Vec<String>,
    pub roles: Vec<String>,
}

/// Extract the grant snapshot from a cached entry of either shape.
#[must_use]
pub fn grants_from_entry(data: &Value) -> Option<Grants> {
    #[derive(Deserialize)]
    struct Entry {
        roles: Vec<String>,
        permissions: Vec<String>,
    }
    serde_json::from_value::<Entry>(data.clone())
        .ok()
        .map(|entry| Grants {
            roles: entry.roles,
            permissions: entry.permissions,
        })
}

/// Re-derive and store a user's cache entry.
///
/// Without `force` the write is skipped when the key is absent: a principal
/// that never logged in gets no hot entry from routine updates.
pub async fn write_user(pool: &PgPool, cache: &Cache, user: &User, force: bool) {
    let key = principal_key(user.id);
    if !force && !cache.exists(&key).await {
        return;
    }

    let grants = match resolver::grants(pool, PrincipalKind::User, user.id).await {
        Ok(grants) => grants,
        Err(err) => {
            warn!("Skipping cache write for {key}: {err:#}");
            return;
        }
    };
    let profile = match users::fetch_profile(pool, user.id).await {
        Ok(profile) => profile,
        Err(err) => {
            warn!("Skipping cache write for {key}: {err:#}");
            return;
        }
    };

    let entry = UserEntry {
        id: user.id,
        email: user.email.clone(),
        permissions: grants.permissions,
        roles: grants.roles,
        profile: profile.map(|profile| ProfileSummary {
            available_credit: profile.available_credit,
            payment_capacity: profile.payment_capacity,
            second_credit: profile.second_credit,
        }),
    };
    match serde_json::to_value(&entry) {
        Ok(value) => cache.set(&key, value, None).await,
        Err(err) => warn!("Failed to serialize cache entry {key}: {err}"),
    }
}

/// Re-derive and store an app's cache entry. App writes are unconditional;
/// apps have no login session gating the entry.
pub async fn write_app(pool: &PgPool, cache: &Cache, app: &App) {
    let key = principal_key(app.id);
    let grants = match resolver::grants(pool, PrincipalKind::App, app.id).await {
        Ok(grants) => grants,
        Err(err) => {
            warn!("Skipping cache write for {key}: {err:#}");
            return;
        }
    };

    let entry = AppEntry {
        id: app.id,
        permissions: grants.permissions,
        roles: grants.roles,
    };
    match serde_json::to_value(&entry) {
        Ok(value) => cache.set(&key, value, None).await,
        Err(err) => warn!("Failed to serialize cache entry {key}: {err}"),
    }
}

pub async fn remove(cache: &Cache, principal_id: Uuid) {
    cache.delete(&principal_key(principal_id)).await;
}

#[cfg(test)]
mod tests {
    use super::{CACHE_KEY_PREFIX, grants_from_entry, principal_key};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn key_is_prefix_plus_principal_id() {
        let id = Uuid::new_v4();
        let key = principal_key(id);
        assert_eq!(key, format!("ms-users-{id}"));
        assert!(key.starts_with(CACHE_KEY_PREFIX));
    }

    #[test]
    fn grants_parse_from_user_entry() {
        let data = json!({
            "id": Uuid::new_v4(),
            "email": "a@example.com",
            "permissions": ["profile.update"],
            "roles": ["shopper"],
            "profile": {
                "available_credit": 100.0,
                "payment_capacity": 20.0,
                "second_credit": false
            }
        });
        let grants = grants_from_entry(&data).expect("grants from user entry");
        assert_eq!(grants.permissions, vec!["profile.update"]);
        assert_eq!(grants.roles, vec!["shopper"]);
    }

    #[test]
    fn grants_parse_from_app_entry() {
        let data = json!({
            "id": Uuid::new_v4(),
            "permissions": [],
            "roles": ["service"]
        });
        let grants = grants_from_entry(&data).expect("grants from app entry");
        assert!(grants.permissions.is_empty());
        assert_eq!(grants.roles, vec!["service"]);
    }

    #[test]
    fn malformed_entry_is_a_miss() {
        assert!(grants_from_entry(&json!("not-an-object")).is_none());
        assert!(grants_from_entry(&json!({"roles": "oops"})).is_none());
    }

    #[test]
    fn user_entry_value_shape() {
        let entry = super::UserEntry {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            permissions: vec!["profile.update".to_string()],
            roles: vec!["shopper".to_string()],
            profile: None,
        };
        let value = serde_json::to_value(&entry).expect("serialize user entry");
        let object = value.as_object().expect("user entry is an object");
        for key in ["id", "email", "permissions", "roles", "profile"] {
            assert!(object.contains_key(key), "missing entry field {key}");
        }
        assert!(object["profile"].is_null());
    }
}
