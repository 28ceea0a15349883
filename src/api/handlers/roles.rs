//! Role administration endpoints. Mutations are reserved for root-role
//! holders; the `root` role itself rejects update and delete everywhere.

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
use crate::pagination::{PageInfo, PageParams, PageQuery};
use crate::rbac::{ROOT_ROLE, Role, repo};

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    pub id: String,
    pub name: String,
    pub fixed: bool,
    pub created_at: i64,
}

impl From<&Role> for RoleResponse {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id.to_string(),
            name: role.name.clone(),
            fixed: role.fixed,
            created_at: role.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleDetailResponse {
    pub id: String,
    pub name: String,
    pub fixed: bool,
    pub created_at: i64,
    pub permissions: Vec<PermissionResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleListResponse {
    pub data: Vec<RoleResponse>,
    pub pagination: PageInfo,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    pub name: String,
    pub fixed: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub fixed: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleSyncPermissionsRequest {
    pub permissions: Vec<Uuid>,
}

async fn require_list_permission(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
    required: &[&str],
) -> Result<(), AuthError> {
    let auth = gateway::authenticate(headers, pool, state.tokens()).await?;
    gateway::require_permission(pool, state.cache(), &auth.principal, required).await
}

async fn require_root(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<(), AuthError> {
    let auth = gateway::authenticate(headers, pool, state.tokens()).await?;
    gateway::require_role(pool, state.cache(), &auth.principal, &[ROOT_ROLE]).await
}

#[utoipa::path(
    get,
    path = "/v1/roles",
    params(PageQuery),
    responses((status = 200, description = "Paginated roles", body = RoleListResponse)),
    tag = "roles"
)]
pub async fn list_roles(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AuthError> {
    require_list_permission(&headers, &pool, &state, &["User - Role - list"]).await?;
    let params = PageParams::from(query);
    let page = repo::list_roles(&pool, &params).await?;
    Ok(Json(RoleListResponse {
        data: page.items.iter().map(RoleResponse::from).collect(),
        pagination: PageInfo::from(&page),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/roles/list",
    responses((status = 200, description = "All roles ordered by name")),
    tag = "roles"
)]
pub async fn list_all_roles(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    require_list_permission(&headers, &pool, &state, &["User - Role - list"]).await?;
    let roles = repo::all_roles(&pool).await?;
    let data: Vec<RoleResponse> = roles.iter().map(RoleResponse::from).collect();
    Ok(Json(data))
}

#[utoipa::path(
    post,
    path = "/v1/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created; creation is allowed even for fixed roles", body = RoleResponse),
        (status = 409, description = "Name already taken")
    ),
    tag = "roles"
)]
pub async fn create_role(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<CreateRoleRequest>,
) -> Result<impl IntoResponse, AuthError> {
    require_root(&headers, &pool, &state).await?;
    let role = repo::insert_role(&pool, &payload.name, payload.fixed.unwrap_or(true)).await?;
    Ok((StatusCode::CREATED, Json(RoleResponse::from(&role))))
}

#[utoipa::path(
    get,
    path = "/v1/roles/{id}",
    responses(
        (status = 200, description = "Role with its permissions", body = RoleDetailResponse),
        (status = 404, description = "Unknown role")
    ),
    tag = "roles"
)]
pub async fn get_role(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    require_list_permission(&headers, &pool, &state, &["User - Role - detail"]).await?;
    let role = repo::find_role(&pool, id)
        .await?
        .ok_or(AuthError::NotFound("Role"))?;
    let permissions = repo::role_permission_list(&pool, role.id).await?;
    Ok(Json(RoleDetailResponse {
        id: role.id.to_string(),
        name: role.name.clone(),
        fixed: role.fixed,
        created_at: role.created_at,
        permissions: permissions.iter().map(PermissionResponse::from).collect(),
    }))
}

#[utoipa::path(
    put,
    path = "/v1/roles/{id}",
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleResponse),
        (status = 403, description = "Fixed roles and the root role reject updates")
    ),
    tag = "roles"
)]
pub async fn update_role(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AuthError> {
    require_root(&headers, &pool, &state).await?;
    let role = repo::update_role(&pool, id, payload.name.as_deref(), payload.fixed).await?;
    Ok(Json(RoleResponse::from(&role)))
}

#[utoipa::path(
    post,
    path = "/v1/roles/{id}/sync-permissions",
    request_body = RoleSyncPermissionsRequest,
    responses(
        (status = 204, description = "Role permission set replaced"),
        (status = 404, description = "Unknown role or permission")
    ),
    tag = "roles"
)]
pub async fn sync_role_permissions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleSyncPermissionsRequest>,
) -> Result<impl IntoResponse, AuthError> {
    require_root(&headers, &pool, &state).await?;
    repo::sync_role_permissions(&pool, id, &payload.permissions).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v1/roles/{id}",
    responses(
        (status = 204, description = "Role deleted with its associations"),
        (status = 403, description = "Fixed roles and the root role reject deletion")
    ),
    tag = "roles"
)]
pub async fn delete_role(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    require_root(&headers, &pool, &state).await?;
    repo::delete_role(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
