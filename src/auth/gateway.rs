//! Request authorization gateway.
//!
//! Per-request state machine: Unauthenticated → TokenPresented →
//! TokenValidated → PrincipalResolved → Authorized | Forbidden. The token is
//! only an identity + session assertion; grants are re-resolved from the
//! cache or the database on every request.

use axum::http::{HeaderMap, header::AUTHORIZATION};
use sqlx::PgPool;
use uuid::Uuid;

use super::error::AuthError;
use super::token::{AuthClaims, TokenService};
use crate::cache::{Cache, mirror};
use crate::identity::{App, User, UserScope, apps, users};
use crate::rbac::{PrincipalKind, resolver};

pub use crate::rbac::resolver::Grants;

/// The resolved caller: a user or an app.
#[derive(Debug)]
pub enum Principal {
    User(User),
    App(App),
}

impl Principal {
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::User(user) => user.id,
            Self::App(app) => app.id,
        }
    }

    #[must_use]
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Self::User(_) => PrincipalKind::User,
            Self::App(_) => PrincipalKind::App,
        }
    }

    #[must_use]
    pub fn as_user(&self) -> Option<&User> {
        match self {
            Self::User(user) => Some(user),
            Self::App(_) => None,
        }
    }
}

/// Authenticated request context.
#[derive(Debug)]
pub struct AuthSession {
    pub claims: AuthClaims,
    pub principal: Principal,
}

/// Validate the bearer token and resolve the embedded id: users first, then
/// apps. A soft-deleted user is treated as not found. Every failure on this
/// path is terminal 401.
pub async fn authenticate(
    headers: &HeaderMap,
    pool: &PgPool,
    tokens: &TokenService,
) -> Result<AuthSession, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::InvalidToken)?;
    if !tokens.is_valid(&token) {
        return Err(AuthError::InvalidToken);
    }
    let claims = tokens.decode(&token)?;

    if let Some(user) = users::find(pool, claims.id, UserScope::Default).await? {
        return Ok(AuthSession {
            claims,
            principal: Principal::User(user),
        });
    }
    if let Some(app) = apps::find(pool, claims.id).await? {
        return Ok(AuthSession {
            claims,
            principal: Principal::App(app),
        });
    }
    Err(AuthError::InvalidToken)
}

/// Load the grant snapshot for a principal, trying the cache first and
/// falling back to a direct resolution. A missing, corrupt or timed-out
/// cache entry is just a miss, never an authorization failure.
pub async fn load_grants(
    pool: &PgPool,
    cache: &Cache,
    principal: &Principal,
) -> Result<Grants, AuthError> {
    if let Some(data) = cache.get(&mirror::principal_key(principal.id())).await {
        if let Some(grants) = mirror::grants_from_entry(&data) {
            return Ok(grants);
        }
    }
    Ok(resolver::grants(pool, principal.kind(), principal.id()).await?)
}

/// Permission gate: root bypass first, then OR across the required list.
pub async fn require_permission(
    pool: &PgPool,
    cache: &Cache,
    principal: &Principal,
    required: &[&str],
) -> Result<(), AuthError> {
    let grants = load_grants(pool, cache, principal).await?;
    if grants.is_superuser() || grants.holds_any_permission(required) {
        return Ok(());
    }
    Err(AuthError::Forbidden)
}

/// Role gate: same root bypass, then OR across the required role names.
pub async fn require_role(
    pool: &PgPool,
    cache: &Cache,
    principal: &Principal,
    required: &[&str],
) -> Result<(), AuthError> {
    let grants = load_grants(pool, cache, principal).await?;
    if grants.is_superuser() || grants.holds_any_role(required) {
        return Ok(());
    }
    Err(AuthError::Forbidden)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{Principal, extract_bearer_token};
    use crate::identity::{App, User, UserState};
    use crate::rbac::PrincipalKind;
    use axum::http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
    use uuid::Uuid;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            phone: "5512345678".to_string(),
            password_hash: "x".to_string(),
            name: None,
            lastname: None,
            second_lastname: None,
            is_active: true,
            aq_id: None,
            state: UserState::Active,
            created_at: 0,
        }
    }

    fn app() -> App {
        App {
            id: Uuid::new_v4(),
            name: "billing".to_string(),
            description: None,
            token: None,
            created_at: 0,
        }
    }

    #[test]
    fn extract_bearer_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_bearer_token(&headers), Some("abc".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("abc"));
        assert_eq!(extract_bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(extract_bearer_token(&headers), None);

        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn principal_maps_to_kind() {
        let principal = Principal::User(user());
        assert_eq!(principal.kind(), PrincipalKind::User);
        assert!(principal.as_user().is_some());

        let principal = Principal::App(app());
        assert_eq!(principal.kind(), PrincipalKind::App);
        assert!(principal.as_user().is_none());
    }
}
