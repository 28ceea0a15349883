//! User administration endpoints.

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::permissions::PermissionResponse;
use crate::api::state::AuthState;
use crate::auth::error::AuthError;
use crate::auth::gateway;
use crate::auth::password;
use crate::auth::utils::valid_email;
use crate::identity::{NewUser, User, UserScope, UserUpdate, devices, users};
use crate::pagination::{PageInfo, PageParams, PageQuery};
use crate::rbac::{PrincipalKind, repo as rbac_repo, resolver};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub phone: String,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub second_lastname: Option<String>,
    pub is_active: bool,
    pub aq_id: Option<i32>,
    pub deleted_at: Option<i64>,
    pub created_at: i64,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            name: user.name.clone(),
            lastname: user.lastname.clone(),
            second_lastname: user.second_lastname.clone(),
            is_active: user.is_active,
            aq_id: user.aq_id,
            deleted_at: user.state.deleted_at(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub data: Vec<UserResponse>,
    pub pagination: PageInfo,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub email: String,
    pub phone: String,
    pub password: String,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub second_lastname: Option<String>,
    pub aq_id: Option<i32>,
    /// Defaults to the configured registration role when absent.
    pub role_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub second_lastname: Option<String>,
    pub aq_id: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncPermissionsRequest {
    pub permissions: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncRolesRequest {
    pub roles: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AmountRequest {
    pub amount: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SecondCreditRequest {
    pub second_credit: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserPermissionsResponse {
    /// Direct grants only.
    pub permissions: Vec<PermissionResponse>,
    /// The effective set: direct plus role-derived grants.
    pub roles_permissions: Vec<PermissionResponse>,
}

async fn authorize(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    required: &[&str],
) -> Result<(), AuthError> {
    let auth = gateway::authenticate(headers, pool, state.tokens()).await?;
    gateway::require_permission(pool, state.cache(), &auth.principal, required).await
}

#[utoipa::path(
    get,
    path = "/v1/users",
    params(PageQuery),
    responses(
        (status = 200, description = "Paginated users, soft-deleted excluded", body = UserListResponse)
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - list"]).await?;
    let params = PageParams::from(query);
    let page = users::list(&pool, &params, UserScope::Default).await?;
    Ok(Json(UserListResponse {
        data: page.items.iter().map(UserResponse::from).collect(),
        pagination: PageInfo::from(&page),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/users/trash",
    params(PageQuery),
    responses(
        (status = 200, description = "Paginated soft-deleted users", body = UserListResponse)
    ),
    tag = "users"
)]
pub async fn list_trash(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - list"]).await?;
    let params = PageParams::from(query);
    let page = users::list(&pool, &params, UserScope::OnlyDeleted).await?;
    Ok(Json(UserListResponse {
        data: page.items.iter().map(UserResponse::from).collect(),
        pagination: PageInfo::from(&page),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 409, description = "Email or phone already registered")
    ),
    tag = "users"
)]
pub async fn create_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - create"]).await?;

    if !valid_email(&payload.email) {
        return Err(AuthError::Validation("The email is invalid.".to_string()));
    }
    let role = match payload.role_id {
        Some(role_id) => rbac_repo::find_role(&pool, role_id)
            .await?
            .ok_or(AuthError::NotFound("Role"))?,
        None => rbac_repo::find_role_by_name(&pool, state.config().default_role())
            .await?
            .ok_or(AuthError::NotFound("Role"))?,
    };

    let password_hash = password::hash_password(&payload.password)?;
    let new_user = NewUser {
        email: payload.email,
        phone: payload.phone,
        name: payload.name,
        lastname: payload.lastname,
        second_lastname: payload.second_lastname,
        aq_id: payload.aq_id,
    };
    let user = users::create(&pool, &new_user, &password_hash, role.id).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    responses(
        (status = 200, description = "User detail", body = UserResponse),
        (status = 404, description = "Unknown or soft-deleted user")
    ),
    tag = "users"
)]
pub async fn get_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - detail"]).await?;
    let user = users::find(&pool, id, UserScope::Default)
        .await?
        .ok_or(AuthError::NotFound("User"))?;
    Ok(Json(UserResponse::from(&user)))
}

#[utoipa::path(
    get,
    path = "/v1/users/aq/{aq_id}",
    responses(
        (status = 200, description = "User detail by external reference", body = UserResponse),
        (status = 404, description = "Unknown external reference")
    ),
    tag = "users"
)]
pub async fn get_user_by_aq(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(aq_id): Path<i32>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - detail"]).await?;
    let user = users::find_by_aq_id(&pool, aq_id)
        .await?
        .ok_or(AuthError::NotFound("User"))?;
    Ok(Json(UserResponse::from(&user)))
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 404, description = "Unknown user")
    ),
    tag = "users"
)]
pub async fn update_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - update"]).await?;
    let update = UserUpdate {
        email: payload.email,
        phone: payload.phone,
        name: payload.name,
        lastname: payload.lastname,
        second_lastname: payload.second_lastname,
        aq_id: payload.aq_id,
    };
    let user = users::update(&pool, id, &update).await?;
    Ok(Json(UserResponse::from(&user)))
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}/password",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 204, description = "Password replaced"),
        (status = 404, description = "Unknown user")
    ),
    tag = "users"
)]
pub async fn update_user_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - update password"]).await?;
    let password_hash = password::hash_password(&payload.password)?;
    users::set_password(&pool, id, &password_hash).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}/permissions",
    responses(
        (status = 200, description = "Direct and effective permissions", body = UserPermissionsResponse)
    ),
    tag = "users"
)]
pub async fn get_user_permissions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - detail"]).await?;
    if users::find(&pool, id, UserScope::Default).await?.is_none() {
        return Err(AuthError::NotFound("User"));
    }

    let direct = resolver::direct_permissions(&pool, PrincipalKind::User, id).await?;
    let effective = resolver::effective_permissions(&pool, PrincipalKind::User, id).await?;
    Ok(Json(UserPermissionsResponse {
        permissions: direct.iter().map(PermissionResponse::from).collect(),
        roles_permissions: effective.iter().map(PermissionResponse::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/users/{id}/sync-permissions",
    request_body = SyncPermissionsRequest,
    responses(
        (status = 204, description = "Direct grants replaced"),
        (status = 404, description = "Unknown user or permission")
    ),
    tag = "users"
)]
pub async fn sync_user_permissions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SyncPermissionsRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - permissions"]).await?;
    users::sync_permissions(&pool, state.cache(), id, &payload.permissions).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/users/{id}/sync-roles",
    request_body = SyncRolesRequest,
    responses(
        (status = 204, description = "Role set replaced"),
        (status = 404, description = "Unknown user or role")
    ),
    tag = "users"
)]
pub async fn sync_user_roles(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SyncRolesRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - roles"]).await?;
    users::sync_roles(&pool, state.cache(), id, &payload.roles).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/users/{id}/activate",
    responses((status = 204, description = "User activated")),
    tag = "users"
)]
pub async fn activate_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - activate"]).await?;
    users::set_active(&pool, id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}/activate",
    responses((status = 204, description = "User deactivated")),
    tag = "users"
)]
pub async fn deactivate_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - activate"]).await?;
    users::set_active(&pool, id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    responses(
        (status = 204, description = "User soft-deleted, cache entry removed"),
        (status = 403, description = "Root users cannot be deleted")
    ),
    tag = "users"
)]
pub async fn soft_delete_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - soft delete"]).await?;
    users::soft_delete(&pool, state.cache(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/users/{id}/restore",
    responses(
        (status = 204, description = "User restored, cache entry recreated"),
        (status = 404, description = "User is not soft-deleted")
    ),
    tag = "users"
)]
pub async fn restore_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - restore"]).await?;
    users::restore(&pool, state.cache(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}/hard",
    responses(
        (status = 204, description = "User removed permanently"),
        (status = 403, description = "Root users cannot be deleted")
    ),
    tag = "users"
)]
pub async fn hard_delete_user(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - delete"]).await?;
    users::hard_delete(&pool, state.cache(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}/devices",
    responses((status = 200, description = "Devices registered by the user")),
    tag = "users"
)]
pub async fn get_user_devices(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - Device - list"]).await?;
    let devices = devices::list_for_user(&pool, id).await?;
    let data: Vec<super::devices::DeviceResponse> = devices
        .iter()
        .map(super::devices::DeviceResponse::from)
        .collect();
    Ok(Json(data))
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}/available-credit",
    request_body = AmountRequest,
    responses((status = 204, description = "Available credit updated")),
    tag = "users"
)]
pub async fn update_available_credit(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AmountRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - Shopper - update payment"]).await?;
    users::update_available_credit(&pool, state.cache(), id, payload.amount).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}/payment-capacity",
    request_body = AmountRequest,
    responses((status = 204, description = "Payment capacity updated")),
    tag = "users"
)]
pub async fn update_payment_capacity(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AmountRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - Shopper - update payment"]).await?;
    users::update_payment_capacity(&pool, state.cache(), id, payload.amount).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}/second-credit",
    request_body = SecondCreditRequest,
    responses((status = 204, description = "Second credit flag updated")),
    tag = "users"
)]
pub async fn update_second_credit(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SecondCreditRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - Shopper - update payment"]).await?;
    users::update_second_credit(&pool, state.cache(), id, payload.second_credit).await?;
    Ok(StatusCode::NO_CONTENT)
}
