//! Shared server state and auth configuration.

use crate::auth::token::TokenService;
use crate::cache::Cache;
use crate::notify::Notifier;

/// Access tokens issued by login/registration/refresh flows live longer than
/// the generic defaults; the session ledger row expiry follows the access
/// token lifetime.
pub const LOGIN_TOKEN_LIFETIME: i64 = 60 * 60 * 24 * 15;
pub const LOGIN_REFRESH_TOKEN_LIFETIME: i64 = 60 * 60 * 24 * 20;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    login_token_lifetime: i64,
    login_refresh_token_lifetime: i64,
    default_role: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_token_lifetime: LOGIN_TOKEN_LIFETIME,
            login_refresh_token_lifetime: LOGIN_REFRESH_TOKEN_LIFETIME,
            default_role: crate::rbac::DEFAULT_ROLE.to_string(),
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_login_lifetimes(mut self, token: i64, refresh: i64) -> Self {
        self.login_token_lifetime = token;
        self.login_refresh_token_lifetime = refresh;
        self
    }

    #[must_use]
    pub fn with_default_role(mut self, role: String) -> Self {
        self.default_role = role;
        self
    }

    #[must_use]
    pub fn login_token_lifetime(&self) -> i64 {
        self.login_token_lifetime
    }

    #[must_use]
    pub fn login_refresh_token_lifetime(&self) -> i64 {
        self.login_refresh_token_lifetime
    }

    #[must_use]
    pub fn default_role(&self) -> &str {
        &self.default_role
    }
}

/// Everything handlers need besides the database pool.
pub struct AuthState {
    config: AuthConfig,
    tokens: TokenService,
    cache: Cache,
    notifier: Notifier,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, tokens: TokenService, cache: Cache, notifier: Notifier) -> Self {
        Self {
            config,
            tokens,
            cache,
            notifier,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, LOGIN_REFRESH_TOKEN_LIFETIME, LOGIN_TOKEN_LIFETIME};

    #[test]
    fn defaults_match_login_policy() {
        let config = AuthConfig::new();
        assert_eq!(config.login_token_lifetime(), LOGIN_TOKEN_LIFETIME);
        assert_eq!(
            config.login_refresh_token_lifetime(),
            LOGIN_REFRESH_TOKEN_LIFETIME
        );
        assert_eq!(config.default_role(), "shopper");
        // 15 and 20 days respectively.
        assert_eq!(LOGIN_TOKEN_LIFETIME, 1_296_000);
        assert_eq!(LOGIN_REFRESH_TOKEN_LIFETIME, 1_728_000);
    }

    #[test]
    fn builder_overrides() {
        let config = AuthConfig::new()
            .with_login_lifetimes(60, 120)
            .with_default_role("member".to_string());
        assert_eq!(config.login_token_lifetime(), 60);
        assert_eq!(config.login_refresh_token_lifetime(), 120);
        assert_eq!(config.default_role(), "member");
    }
}
