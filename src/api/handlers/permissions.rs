//! Permission administration endpoints. Creation, update and deletion are
//! reserved for root-role holders.

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

use crate::api::state::AuthState;
use crate::auth::error::AuthError;
use crate::auth::gateway;
use crate::pagination::{PageInfo, PageParams, PageQuery};
use crate::rbac::{Permission, ROOT_ROLE, repo};

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionResponse {
    pub id: String,
    pub name: String,
    pub fixed: bool,
    pub created_at: i64,
}

impl From<&Permission> for PermissionResponse {
    fn from(permission: &Permission) -> Self {
        Self {
            id: permission.id.to_string(),
            name: permission.name.clone(),
            fixed: permission.fixed,
            created_at: permission.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionListResponse {
    pub data: Vec<PermissionResponse>,
    pub pagination: PageInfo,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePermissionRequest {
    pub name: String,
    pub fixed: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePermissionRequest {
    pub name: Option<String>,
    pub fixed: Option<bool>,
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
    path = "/v1/permissions",
    params(PageQuery),
    responses((status = 200, description = "Paginated permissions", body = PermissionListResponse)),
    tag = "permissions"
)]
pub async fn list_permissions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AuthError> {
    require_list_permission(&headers, &pool, &state, &["User - Permission - list"]).await?;
    let params = PageParams::from(query);
    let page = repo::list_permissions(&pool, &params).await?;
    Ok(Json(PermissionListResponse {
        data: page.items.iter().map(PermissionResponse::from).collect(),
        pagination: PageInfo::from(&page),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/permissions/list",
    responses((status = 200, description = "All permissions ordered by name")),
    tag = "permissions"
)]
pub async fn list_all_permissions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
) -> Result<impl IntoResponse, AuthError> {
    require_list_permission(&headers, &pool, &state, &["User - Permission - list"]).await?;
    let permissions = repo::all_permissions(&pool).await?;
    let data: Vec<PermissionResponse> = permissions.iter().map(PermissionResponse::from).collect();
    Ok(Json(data))
}

#[utoipa::path(
    post,
    path = "/v1/permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Permission created", body = PermissionResponse),
        (status = 409, description = "Name already taken")
    ),
    tag = "permissions"
)]
pub async fn create_permission(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<CreatePermissionRequest>,
) -> Result<impl IntoResponse, AuthError> {
    require_root(&headers, &pool, &state).await?;
    let permission =
        repo::insert_permission(&pool, &payload.name, payload.fixed.unwrap_or(true)).await?;
    Ok((
        StatusCode::CREATED,
        Json(PermissionResponse::from(&permission)),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/permissions/{id}",
    responses(
        (status = 200, description = "Permission detail", body = PermissionResponse),
        (status = 404, description = "Unknown permission")
    ),
    tag = "permissions"
)]
pub async fn get_permission(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    require_list_permission(&headers, &pool, &state, &["User - Permission - detail"]).await?;
    let permission = repo::find_permission(&pool, id)
        .await?
        .ok_or(AuthError::NotFound("Permission"))?;
    Ok(Json(PermissionResponse::from(&permission)))
}

#[utoipa::path(
    put,
    path = "/v1/permissions/{id}",
    request_body = UpdatePermissionRequest,
    responses(
        (status = 200, description = "Permission updated; fixed blocks delete only", body = PermissionResponse)
    ),
    tag = "permissions"
)]
pub async fn update_permission(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePermissionRequest>,
) -> Result<impl IntoResponse, AuthError> {
    require_root(&headers, &pool, &state).await?;
    let permission =
        repo::update_permission(&pool, id, payload.name.as_deref(), payload.fixed).await?;
    Ok(Json(PermissionResponse::from(&permission)))
}

#[utoipa::path(
    delete,
    path = "/v1/permissions/{id}",
    responses(
        (status = 204, description = "Permission deleted with its grants"),
        (status = 403, description = "Fixed permissions cannot be deleted")
    ),
    tag = "permissions"
)]
pub async fn delete_permission(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    require_root(&headers, &pool, &state).await?;
    repo::delete_permission(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
