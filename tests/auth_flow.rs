//! End-to-end checks of the token + grants surface that do not need a
//! database: a login-shaped payload survives the round trip, the session
//! marker correlates token and ledger, and the gates honor the root bypass.

use anyhow::Result;
use custodia::auth::utils::{SESSION_MARKER_LEN, new_session_marker};
use custodia::auth::{AuthError, Grants, SessionClaims, TokenService};
use secrecy::SecretString;
use uuid::Uuid;

const LOGIN_TOKEN_LIFETIME: i64 = 60 * 60 * 24 * 15;
const LOGIN_REFRESH_TOKEN_LIFETIME: i64 = 60 * 60 * 24 * 20;

fn service() -> TokenService {
    TokenService::new(&SecretString::from("integration-secret".to_string()))
        .with_lifetimes(LOGIN_TOKEN_LIFETIME, LOGIN_REFRESH_TOKEN_LIFETIME)
}

fn login_claims(marker: &str) -> SessionClaims {
    SessionClaims {
        id: Uuid::new_v4(),
        aq_id: Some(7),
        session: marker.to_string(),
        available_credit: 2500.0,
        payment_capacity: 410.5,
        second_credit: false,
        roles: vec!["shopper".to_string()],
        exp: 0,
    }
}

#[test]
fn login_shaped_pair_round_trips_with_session_marker() -> Result<()> {
    let service = service();
    let marker = new_session_marker()?;
    assert_eq!(marker.len(), SESSION_MARKER_LEN);

    let claims = login_claims(&marker);
    let pair = service.issue_pair(&claims)?;

    // Both tokens carry the same payload; only the lifetimes differ.
    let access = service.decode_session(&pair.token)?;
    let refresh = service.decode_session(&pair.refresh_token)?;
    assert_eq!(access.session, marker);
    assert_eq!(refresh.session, marker);
    assert_eq!(access.id, claims.id);
    assert_eq!(access.roles, vec!["shopper".to_string()]);
    assert!(refresh.exp > access.exp);

    // The gateway only needs the identity assertion.
    let identity = service.decode(&format!("Bearer {}", pair.token))?;
    assert_eq!(identity.id, claims.id);
    assert_eq!(identity.session.as_deref(), Some(marker.as_str()));
    Ok(())
}

#[test]
fn foreign_and_expired_tokens_are_rejected() -> Result<()> {
    let service = service();
    let marker = new_session_marker()?;
    let pair = service.issue_pair(&login_claims(&marker))?;

    let other = TokenService::new(&SecretString::from("other-secret".to_string()));
    assert!(matches!(
        other.decode(&pair.token),
        Err(AuthError::InvalidToken)
    ));

    let expired = service.issue(&login_claims(&marker), -600)?;
    assert!(!service.is_valid(&expired));
    Ok(())
}

#[test]
fn permission_gate_semantics() {
    let shopper = Grants {
        roles: vec!["shopper".to_string()],
        permissions: vec!["profile.update".to_string()],
    };
    // Logical OR across the required list, nothing more.
    assert!(shopper.holds_any_permission(&["profile.update"]));
    assert!(shopper.holds_any_permission(&["anything-else", "profile.update"]));
    assert!(!shopper.holds_any_permission(&["anything-else"]));
    assert!(!shopper.is_superuser());

    // Root passes every check regardless of explicit grants.
    let root = Grants {
        roles: vec!["root".to_string()],
        permissions: Vec::new(),
    };
    assert!(root.is_superuser());
    assert!(!root.holds_any_permission(&["profile.update"]));
    assert!(!root.holds_any_role(&["admin"]));
}
