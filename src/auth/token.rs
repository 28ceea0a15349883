//! Signed session tokens.
//!
//! Tokens are HS256 JWTs signed with a process-wide secret. The payload is an
//! identity + session assertion only; authorization is re-resolved from the
//! database or cache on every request.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::AuthError;

/// Scheme label stripped (case-sensitively) before decoding.
pub const TOKEN_TYPE: &str = "Bearer";

const DEFAULT_TOKEN_LIFETIME: i64 = 12 * 60 * 60;
const DEFAULT_REFRESH_TOKEN_LIFETIME: i64 = 24 * 60 * 60;

/// App-to-app tokens are effectively unlimited (~50 years).
pub const APP_TOKEN_LIFETIME: i64 = 1_576_800_000;

/// Current unix time in seconds.
#[must_use]
pub fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}

/// Full login/refresh payload. Roles and profile financials are a snapshot
/// taken at issuance time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub id: Uuid,
    pub aq_id: Option<i32>,
    pub session: String,
    pub available_credit: f64,
    pub payment_capacity: f64,
    pub second_credit: bool,
    pub roles: Vec<String>,
    #[serde(default)]
    pub exp: i64,
}

/// Minimal app payload used for service-to-service tokens.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppClaims {
    pub id: Uuid,
    #[serde(default)]
    pub exp: i64,
}

/// Identity assertion common to user and app tokens; what the gateway needs.
#[derive(Clone, Debug, Deserialize)]
pub struct AuthClaims {
    pub id: Uuid,
    #[serde(default)]
    pub aq_id: Option<i32>,
    #[serde(default)]
    pub session: Option<String>,
    pub exp: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

/// Issues and validates signed tokens with configurable lifetimes.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_lifetime: i64,
    refresh_token_lifetime: i64,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            refresh_token_lifetime: DEFAULT_REFRESH_TOKEN_LIFETIME,
        }
    }

    #[must_use]
    pub fn with_lifetimes(mut self, token_lifetime: i64, refresh_token_lifetime: i64) -> Self {
        self.token_lifetime = token_lifetime;
        self.refresh_token_lifetime = refresh_token_lifetime;
        self
    }

    #[must_use]
    pub fn token_lifetime(&self) -> i64 {
        self.token_lifetime
    }

    /// Sign a session payload with `exp = now + lifetime`.
    pub fn issue(&self, claims: &SessionClaims, lifetime: i64) -> Result<String, AuthError> {
        let mut claims = claims.clone();
        claims.exp = epoch_now() + lifetime;
        self.sign(&claims)
    }

    /// Issue an access + refresh pair carrying the same payload; only the
    /// lifetimes differ.
    pub fn issue_pair(&self, claims: &SessionClaims) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            token: self.issue(claims, self.token_lifetime)?,
            refresh_token: self.issue(claims, self.refresh_token_lifetime)?,
        })
    }

    /// Issue the `{id}` pair for an app; the access token is effectively
    /// unlimited, the refresh token keeps the configured lifetime.
    pub fn issue_app(&self, app_id: Uuid) -> Result<TokenPair, AuthError> {
        let access = AppClaims {
            id: app_id,
            exp: epoch_now() + APP_TOKEN_LIFETIME,
        };
        let refresh = AppClaims {
            id: app_id,
            exp: epoch_now() + self.refresh_token_lifetime,
        };
        Ok(TokenPair {
            token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
        })
    }

    /// Verify signature + expiry and return the identity assertion.
    pub fn decode(&self, token: &str) -> Result<AuthClaims, AuthError> {
        let token = strip_scheme(token);
        decode::<AuthClaims>(token, &self.decoding_key, &validation())
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }

    /// Decode the full session payload (introspection and tests).
    pub fn decode_session(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let token = strip_scheme(token);
        decode::<SessionClaims>(token, &self.decoding_key, &validation())
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }

    /// Best-effort boolean form of `decode`; any failure is `false`.
    #[must_use]
    pub fn is_valid(&self, token: &str) -> bool {
        self.decode(token).is_ok()
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidToken)
    }
}

fn validation() -> Validation {
    // Expiry is enforced; no audience/issuer claims in this service.
    Validation::new(Algorithm::HS256)
}

fn strip_scheme(token: &str) -> &str {
    token
        .trim()
        .strip_prefix(TOKEN_TYPE)
        .map_or_else(|| token.trim(), str::trim_start)
}

#[cfg(test)]
mod tests {
    use super::{
        APP_TOKEN_LIFETIME, SessionClaims, TokenService, epoch_now, strip_scheme, validation,
    };
    use crate::auth::error::AuthError;
    use anyhow::Result;
    use secrecy::SecretString;
    use uuid::Uuid;

    fn service() -> TokenService {
        TokenService::new(&SecretString::from("test-secret-key".to_string()))
    }

    fn claims() -> SessionClaims {
        SessionClaims {
            id: Uuid::new_v4(),
            aq_id: Some(42),
            session: "s".repeat(64),
            available_credit: 1500.0,
            payment_capacity: 300.5,
            second_credit: true,
            roles: vec!["shopper".to_string()],
            exp: 0,
        }
    }

    #[test]
    fn round_trip_preserves_payload_and_sets_exp() -> Result<(), AuthError> {
        let service = service();
        let input = claims();
        let issued_at = epoch_now();
        let token = service.issue(&input, 600)?;
        let decoded = service.decode_session(&token)?;

        assert_eq!(decoded.id, input.id);
        assert_eq!(decoded.aq_id, input.aq_id);
        assert_eq!(decoded.session, input.session);
        assert_eq!(decoded.roles, input.roles);
        assert!((decoded.available_credit - input.available_credit).abs() < f64::EPSILON);
        // exp lands within a small clock tolerance of issuance + lifetime.
        assert!((decoded.exp - (issued_at + 600)).abs() <= 2);
        Ok(())
    }

    #[test]
    fn decode_accepts_bearer_prefix() -> Result<(), AuthError> {
        let service = service();
        let token = service.issue(&claims(), 600)?;
        let decoded = service.decode(&format!("Bearer {token}"))?;
        assert_eq!(decoded.session.as_deref(), Some(claims().session.as_str()));
        Ok(())
    }

    #[test]
    fn scheme_strip_is_case_sensitive() {
        assert_eq!(strip_scheme("Bearer abc"), "abc");
        // A lowercase label is not a scheme; the value passes through as-is.
        assert_eq!(strip_scheme("bearer abc"), "bearer abc");
        assert_eq!(strip_scheme("  abc  "), "abc");
    }

    #[test]
    fn expired_token_fails_decode() -> Result<(), AuthError> {
        let service = service();
        // Past the default 60s validation leeway.
        let token = service.issue(&claims(), -300)?;
        assert!(matches!(
            service.decode(&token),
            Err(AuthError::InvalidToken)
        ));
        assert!(!service.is_valid(&token));
        Ok(())
    }

    #[test]
    fn tampered_token_fails_decode() -> Result<(), AuthError> {
        let service = service();
        let token = service.issue(&claims(), 600)?;
        let other = TokenService::new(&SecretString::from("other-secret".to_string()));
        assert!(matches!(other.decode(&token), Err(AuthError::InvalidToken)));
        assert!(service.decode("not-a-jwt").is_err());
        Ok(())
    }

    #[test]
    fn pair_shares_payload_with_distinct_lifetimes() -> Result<(), AuthError> {
        let service = service().with_lifetimes(100, 200);
        let pair = service.issue_pair(&claims())?;
        let access = service.decode_session(&pair.token)?;
        let refresh = service.decode_session(&pair.refresh_token)?;
        assert_eq!(access.session, refresh.session);
        assert!(refresh.exp > access.exp);
        Ok(())
    }

    #[test]
    fn app_token_is_effectively_unlimited() -> Result<(), AuthError> {
        let service = service();
        let app_id = Uuid::new_v4();
        let pair = service.issue_app(app_id)?;
        let decoded = service.decode(&pair.token)?;
        assert_eq!(decoded.id, app_id);
        assert!(decoded.session.is_none());
        assert!(decoded.exp >= epoch_now() + APP_TOKEN_LIFETIME - 2);
        Ok(())
    }

    #[test]
    fn validation_requires_expiry() {
        assert!(validation().validate_exp);
    }

    #[test]
    fn session_payload_field_names_are_stable() -> Result<()> {
        // Other services parse these exact keys out of the token.
        let value = serde_json::to_value(claims())?;
        let object = value.as_object().expect("claims serialize to an object");
        for key in [
            "id",
            "aq_id",
            "session",
            "available_credit",
            "payment_capacity",
            "second_credit",
            "roles",
            "exp",
        ] {
            assert!(object.contains_key(key), "missing payload field {key}");
        }
        assert_eq!(object.len(), 8);
        Ok(())
    }
}
