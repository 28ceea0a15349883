//! # Custodia (User Identity & Access Control)
//!
//! `custodia` is a user/identity microservice: accounts, password + JWT
//! authentication, role-based access control with a root bypass, device
//! registration, password resets, session tracking, and a write-through
//! authorization cache in front of the relational source of truth.
//!
//! ## Authorization Model
//!
//! Principals are users (human shoppers) or apps (machine clients). A
//! principal's effective permission set is the union of its direct grants
//! and the grants of every role it holds; a principal holding the `root`
//! role passes every check unconditionally.
//!
//! - **Tokens are identity, not authority:** the JWT carries an id, a random
//!   per-login session marker and a role snapshot; grants are re-resolved
//!   from the cache or the database on every authenticated request.
//! - **Sessions are revocable:** each login writes a ledger row matching the
//!   token's session marker; logout deletes exactly that row.
//! - **The cache never decides:** a missing, corrupt or unreachable cache
//!   falls back to direct resolution. `custodia cache-refresh` repairs
//!   entries lost to eviction or restart.
//!
//! ## Protected Rows
//!
//! `fixed` roles reject update and delete, `fixed` permissions reject delete
//! only, and the `root` role (and any user holding it) is immutable
//! regardless of flags.

pub mod api;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod db;
pub mod identity;
pub mod notify;
pub mod pagination;
pub mod rbac;
pub mod reset;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
