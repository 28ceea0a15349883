//! Client-facing error taxonomy.
//!
//! Storage helpers bubble up `anyhow` errors; everything is translated into a
//! stable `{code, message}` body here. Internal detail never reaches the
//! client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown identifier or wrong password. The message is deliberately the
    /// same for both so accounts cannot be enumerated.
    #[error("The credentials do not match our records.")]
    InvalidCredentials,

    /// Missing, malformed, expired or badly signed bearer token.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Authenticated but lacking the required permission or role.
    #[error("You don't have permission to access this resource")]
    Forbidden,

    /// Delete/update attempt on a `fixed` role or permission.
    #[error("You can't modify a fixed {0}")]
    ProtectedFixed(&'static str),

    /// Any mutation of the `root` role, or deletion of a `root` user.
    #[error("You can't modify the root {0}")]
    ProtectedRoot(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Unique-name/email/phone collision on create.
    #[error("{0} already exists")]
    Conflict(&'static str),

    /// Reset-password code absent, mismatched or expired.
    #[error("The token is invalid.")]
    ResetTokenInvalid,

    /// Malformed request field (bad email, short password, ...).
    #[error("{0}")]
    Validation(String),

    /// The outbound notification could not be delivered; the flow's purpose
    /// (getting a code to the user) did not complete.
    #[error("Failed to deliver notification: {0}")]
    DeliveryFailed(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::ResetTokenInvalid | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::ProtectedFixed(_) | Self::ProtectedRoot(_) => {
                StatusCode::FORBIDDEN
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidToken => "invalid_token",
            Self::Forbidden => "forbidden",
            Self::ProtectedFixed(_) | Self::ProtectedRoot(_) => "protected_entity",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ResetTokenInvalid => "reset_token_invalid",
            Self::Validation(_) => "validation_error",
            Self::DeliveryFailed(_) => "delivery_failed",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(err) => {
                error!("Internal error: {err:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            code: self.code(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::AuthError;
    use anyhow::anyhow;
    use axum::http::StatusCode;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AuthError::InvalidCredentials.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::ProtectedFixed("role").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AuthError::NotFound("User").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::ResetTokenInvalid.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::Internal(anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn protected_messages_distinguish_fixed_from_root() {
        let fixed = AuthError::ProtectedFixed("role").to_string();
        let root = AuthError::ProtectedRoot("role").to_string();
        assert!(fixed.contains("fixed"));
        assert!(root.contains("root"));
        assert_ne!(fixed, root);
    }

    #[test]
    fn credentials_message_does_not_leak_cause() {
        // Same message whether the user is unknown or the password is wrong.
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "The credentials do not match our records."
        );
    }
}
