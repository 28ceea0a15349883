//! App (machine client) administration endpoints.

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
use crate::auth::token::TokenPair;
use crate::identity::{App, apps};
use crate::pagination::{PageInfo, PageParams, PageQuery};
use crate::rbac::{PrincipalKind, resolver};

#[derive(Debug, Serialize, ToSchema)]
pub struct AppResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
}

impl From<&App> for AppResponse {
    fn from(app: &App) -> Self {
        Self {
            id: app.id.to_string(),
            name: app.name.clone(),
            description: app.description.clone(),
            created_at: app.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppListResponse {
    pub data: Vec<AppResponse>,
    pub pagination: PageInfo,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAppRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAppRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AppSyncPermissionsRequest {
    pub permissions: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AppSyncRolesRequest {
    pub roles: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppPermissionsResponse {
    pub permissions: Vec<PermissionResponse>,
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
    path = "/v1/apps",
    params(PageQuery),
    responses((status = 200, description = "Paginated apps", body = AppListResponse)),
    tag = "apps"
)]
pub async fn list_apps(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - App - list"]).await?;
    let params = PageParams::from(query);
    let page = apps::list(&pool, &params).await?;
    Ok(Json(AppListResponse {
        data: page.items.iter().map(AppResponse::from).collect(),
        pagination: PageInfo::from(&page),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/apps",
    request_body = CreateAppRequest,
    responses(
        (status = 201, description = "App created", body = AppResponse),
        (status = 409, description = "Name already taken")
    ),
    tag = "apps"
)]
pub async fn create_app(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<CreateAppRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - App - create"]).await?;
    let app = apps::insert(&pool, &payload.name, payload.description.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(AppResponse::from(&app))))
}

#[utoipa::path(
    get,
    path = "/v1/apps/{id}",
    responses(
        (status = 200, description = "App detail", body = AppResponse),
        (status = 404, description = "Unknown app")
    ),
    tag = "apps"
)]
pub async fn get_app(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - App - detail"]).await?;
    let app = apps::find(&pool, id)
        .await?
        .ok_or(AuthError::NotFound("App"))?;
    Ok(Json(AppResponse::from(&app)))
}

#[utoipa::path(
    put,
    path = "/v1/apps/{id}",
    request_body = UpdateAppRequest,
    responses((status = 200, description = "App updated", body = AppResponse)),
    tag = "apps"
)]
pub async fn update_app(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAppRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - App - update"]).await?;
    let app = apps::update(
        &pool,
        id,
        payload.name.as_deref(),
        payload.description.as_deref(),
    )
    .await?;
    Ok(Json(AppResponse::from(&app)))
}

#[utoipa::path(
    post,
    path = "/v1/apps/{id}/generate-token",
    responses(
        (status = 200, description = "Long-lived token pair; the access token replaces the stored one", body = TokenPair),
        (status = 404, description = "Unknown app")
    ),
    tag = "apps"
)]
pub async fn generate_app_token(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - App - generate token"]).await?;
    let app = apps::find(&pool, id)
        .await?
        .ok_or(AuthError::NotFound("App"))?;

    let pair = state.tokens().issue_app(app.id)?;
    // Single overwritable column: each generation replaces the last token.
    apps::update_token(&pool, app.id, &pair.token).await?;
    Ok(Json(pair))
}

#[utoipa::path(
    get,
    path = "/v1/apps/{id}/permissions",
    responses(
        (status = 200, description = "Direct and effective permissions", body = AppPermissionsResponse)
    ),
    tag = "apps"
)]
pub async fn get_app_permissions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - App - detail"]).await?;
    if apps::find(&pool, id).await?.is_none() {
        return Err(AuthError::NotFound("App"));
    }

    let direct = resolver::direct_permissions(&pool, PrincipalKind::App, id).await?;
    let effective = resolver::effective_permissions(&pool, PrincipalKind::App, id).await?;
    Ok(Json(AppPermissionsResponse {
        permissions: direct.iter().map(PermissionResponse::from).collect(),
        roles_permissions: effective.iter().map(PermissionResponse::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/apps/{id}/sync-permissions",
    request_body = AppSyncPermissionsRequest,
    responses((status = 204, description = "Direct grants replaced, cache mirrored")),
    tag = "apps"
)]
pub async fn sync_app_permissions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AppSyncPermissionsRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - App - permissions"]).await?;
    apps::sync_permissions(&pool, state.cache(), id, &payload.permissions).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/apps/{id}/sync-roles",
    request_body = AppSyncRolesRequest,
    responses((status = 204, description = "Role set replaced, cache mirrored")),
    tag = "apps"
)]
pub async fn sync_app_roles(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AppSyncRolesRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - App - roles"]).await?;
    apps::sync_roles(&pool, state.cache(), id, &payload.roles).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v1/apps/{id}",
    responses((status = 204, description = "App deleted, cache entry removed")),
    tag = "apps"
)]
pub async fn delete_app(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - App - delete"]).await?;
    apps::delete(&pool, state.cache(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
