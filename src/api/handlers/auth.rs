//! Authentication endpoints: login, registration, refresh, logout and the
//! password-reset flow.
//!
//! Every successful credential flow follows the same order: snapshot the
//! user's roles and profile into the token payload, issue the pair, persist
//! the session ledger row, then force-write the authorization cache.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::state::AuthState;
use crate::auth::error::AuthError;
use crate::auth::gateway::{self, Principal};
use crate::auth::password;
use crate::auth::token::{SessionClaims, TokenPair};
use crate::auth::utils::{mask_phone, new_session_marker, random_digits, valid_email};
use crate::cache::mirror;
use crate::identity::{NewUser, User, users};
use crate::rbac::{PrincipalKind, repo as rbac_repo, resolver};
use crate::reset;
use crate::session;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub phone: String,
    pub password: String,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub second_lastname: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Email or phone number.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateTokenRequest {
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateEmailRequest {
    pub username: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateEmailResponse {
    pub id: String,
    pub email: String,
    pub phone: String,
    pub name: Option<String>,
    pub lastname: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub username: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForgotPasswordResponse {
    pub phone: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateTokenNotificationRequest {
    pub username: String,
    pub token: String,
}

/// Issue a token pair for a user and record the login: ledger row first,
/// forced cache write second. Shared by every credential flow.
pub(crate) async fn issue_login(
    pool: &PgPool,
    state: &AuthState,
    user: &User,
) -> Result<TokenPair, AuthError> {
    let profile = users::fetch_profile(pool, user.id).await?;
    let roles = resolver::list_roles(pool, PrincipalKind::User, user.id).await?;
    let session_marker = new_session_marker()?;

    let claims = SessionClaims {
        id: user.id,
        aq_id: user.aq_id,
        session: session_marker.clone(),
        available_credit: profile.as_ref().map_or(0.0, |p| p.available_credit),
        payment_capacity: profile.as_ref().map_or(0.0, |p| p.payment_capacity),
        second_credit: profile.as_ref().is_some_and(|p| p.second_credit),
        roles: roles.into_iter().map(|role| role.name).collect(),
        exp: 0,
    };

    let tokens = state.tokens().clone().with_lifetimes(
        state.config().login_token_lifetime(),
        state.config().login_refresh_token_lifetime(),
    );
    let pair = tokens.issue_pair(&claims)?;

    session::create(
        pool,
        user.id,
        &session_marker,
        state.config().login_token_lifetime(),
    )
    .await?;
    mirror::write_user(pool, state.cache(), user, true).await;

    Ok(pair)
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and logged in", body = TokenPair),
        (status = 400, description = "Invalid registration payload"),
        (status = 409, description = "Email or phone already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    if !valid_email(&payload.email) {
        return Err(AuthError::Validation("The email is invalid.".to_string()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(
            "The password must be at least 6 characters.".to_string(),
        ));
    }

    let role = rbac_repo::find_role_by_name(&pool, state.config().default_role())
        .await?
        .ok_or(AuthError::NotFound("Role"))?;
    let password_hash = password::hash_password(&payload.password)?;
    let new_user = NewUser {
        email: payload.email,
        phone: payload.phone,
        name: payload.name,
        lastname: payload.lastname,
        second_lastname: payload.second_lastname,
        aq_id: None,
    };

    let user = users::create(&pool, &new_user, &password_hash, role.id).await?;
    let pair = issue_login(&pool, &state, &user).await?;
    Ok((StatusCode::CREATED, Json(pair)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 400, description = "Credentials do not match")
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let user = users::find_by_username(&pool, &payload.username)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !password::verify_password(&payload.password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    let pair = issue_login(&pool, &state, &user).await?;
    Ok(Json(pair))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let auth = gateway::authenticate(&headers, &pool, state.tokens()).await?;
    let Principal::User(user) = &auth.principal else {
        return Err(AuthError::InvalidToken);
    };
    let marker = auth.claims.session.ok_or(AuthError::InvalidToken)?;

    session::revoke(&pool, user.id, &marker).await?;
    // The hot entry is only justified while a session is alive.
    if !session::has_active_session(&pool, user.id).await? {
        mirror::remove(state.cache(), user.id).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 200, description = "Fresh token pair issued", body = TokenPair),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    let auth = gateway::authenticate(&headers, &pool, state.tokens()).await?;
    let Principal::User(user) = &auth.principal else {
        return Err(AuthError::InvalidToken);
    };

    let pair = issue_login(&pool, &state, user).await?;
    Ok(Json(pair))
}

#[utoipa::path(
    post,
    path = "/v1/auth/check",
    responses(
        (status = 204, description = "Token is valid"),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "auth"
)]
pub async fn check(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    gateway::authenticate(&headers, &pool, state.tokens()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/auth/generate-token",
    request_body = GenerateTokenRequest,
    responses(
        (status = 200, description = "Token pair issued for the target user", body = TokenPair),
        (status = 403, description = "Caller lacks the generate-token permission"),
        (status = 404, description = "No user with that phone and email")
    ),
    tag = "auth"
)]
pub async fn generate_token(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<GenerateTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let auth = gateway::authenticate(&headers, &pool, state.tokens()).await?;
    gateway::require_permission(
        &pool,
        state.cache(),
        &auth.principal,
        &["User - generate token"],
    )
    .await?;

    let user = users::find_by_phone_and_email(&pool, &payload.phone, &payload.email)
        .await?
        .ok_or(AuthError::NotFound("User"))?;
    let pair = issue_login(&pool, &state, &user).await?;
    Ok(Json(pair))
}

#[utoipa::path(
    post,
    path = "/v1/auth/validate-email",
    request_body = ValidateEmailRequest,
    responses(
        (status = 200, description = "User identity summary", body = ValidateEmailResponse),
        (status = 404, description = "Unknown username")
    ),
    tag = "auth"
)]
pub async fn validate_email(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<ValidateEmailRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let auth = gateway::authenticate(&headers, &pool, state.tokens()).await?;
    gateway::require_permission(
        &pool,
        state.cache(),
        &auth.principal,
        &["User - validate email"],
    )
    .await?;

    let user = users::find_by_username(&pool, &payload.username)
        .await?
        .ok_or(AuthError::NotFound("User"))?;
    Ok(Json(ValidateEmailResponse {
        id: user.id.to_string(),
        email: user.email,
        phone: user.phone,
        name: user.name,
        lastname: user.lastname,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset code sent", body = ForgotPasswordResponse),
        (status = 400, description = "Unknown username"),
        (status = 502, description = "Notification delivery failed")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let user = users::find_by_username(&pool, &payload.username)
        .await?
        .ok_or_else(|| {
            AuthError::Validation("The phone or email has not been registered.".to_string())
        })?;

    let code = random_digits(reset::RESET_CODE_LEN);
    reset::insert(&pool, &payload.username, &code).await?;
    state.notifier().send_reset_code(&user.phone, &code).await?;

    Ok(Json(ForgotPasswordResponse {
        phone: mask_phone(&user.phone),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/validate-token-notification",
    request_body = ValidateTokenNotificationRequest,
    responses(
        (status = 204, description = "Reset code is valid"),
        (status = 400, description = "Reset code invalid or expired")
    ),
    tag = "auth"
)]
pub async fn validate_token_notification(
    pool: Extension<PgPool>,
    Json(payload): Json<ValidateTokenNotificationRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let record = reset::find_by_token_and_username(&pool, &payload.token, &payload.username)
        .await?
        .ok_or(AuthError::ResetTokenInvalid)?;
    if record.expired {
        return Err(AuthError::ResetTokenInvalid);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated, fresh token pair issued", body = TokenPair),
        (status = 400, description = "Reset code invalid or expired")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(
            "The password must be at least 6 characters.".to_string(),
        ));
    }

    let record = reset::find_by_token(&pool, &payload.token)
        .await?
        .ok_or(AuthError::ResetTokenInvalid)?;
    if record.expired {
        return Err(AuthError::ResetTokenInvalid);
    }

    let user = users::find_by_username(&pool, &record.username)
        .await?
        .ok_or(AuthError::NotFound("User"))?;

    // Consume the code before rotating the credential.
    reset::delete(&pool, record.id).await?;
    let password_hash = password::hash_password(&payload.password)?;
    users::set_password(&pool, user.id, &password_hash).await?;

    let pair = issue_login(&pool, &state, &user).await?;
    Ok(Json(pair))
}
