//! Device registration endpoints.

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
use crate::identity::{Device, NewDevice, devices};
use crate::pagination::{PageInfo, PageParams, PageQuery};

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceResponse {
    pub id: String,
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub mark: Option<String>,
    pub model: Option<String>,
    pub carrier: Option<String>,
    pub os: Option<String>,
    pub nfc: Option<bool>,
    pub app_version: Option<String>,
    pub created_at: i64,
}

impl From<&Device> for DeviceResponse {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id.to_string(),
            user_id: device.user_id.map(|id| id.to_string()),
            device_id: device.device_id.clone(),
            mark: device.mark.clone(),
            model: device.model.clone(),
            carrier: device.carrier.clone(),
            os: device.os.clone(),
            nfc: device.nfc,
            app_version: device.app_version.clone(),
            created_at: device.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceListResponse {
    pub data: Vec<DeviceResponse>,
    pub pagination: PageInfo,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterDeviceRequest {
    pub user_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub mark: Option<String>,
    pub model: Option<String>,
    pub carrier: Option<String>,
    pub os: Option<String>,
    pub nfc: Option<bool>,
    pub app_version: Option<String>,
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
    path = "/v1/devices",
    params(PageQuery),
    responses((status = 200, description = "Paginated devices", body = DeviceListResponse)),
    tag = "devices"
)]
pub async fn list_devices(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - Device - list"]).await?;
    let params = PageParams::from(query);
    let page = devices::list(&pool, &params).await?;
    Ok(Json(DeviceListResponse {
        data: page.items.iter().map(DeviceResponse::from).collect(),
        pagination: PageInfo::from(&page),
    }))
}

#[utoipa::path(
    post,
    path = "/v1/devices",
    request_body = RegisterDeviceRequest,
    responses((status = 201, description = "Device registered", body = DeviceResponse)),
    tag = "devices"
)]
pub async fn register_device(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(payload): Json<RegisterDeviceRequest>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - Device - create"]).await?;
    let new = NewDevice {
        user_id: payload.user_id,
        device_id: payload.device_id,
        mark: payload.mark,
        model: payload.model,
        carrier: payload.carrier,
        os: payload.os,
        nfc: payload.nfc,
        app_version: payload.app_version,
    };
    let device = devices::insert(&pool, &new).await?;
    Ok((StatusCode::CREATED, Json(DeviceResponse::from(&device))))
}

#[utoipa::path(
    get,
    path = "/v1/devices/{id}",
    responses(
        (status = 200, description = "Device detail", body = DeviceResponse),
        (status = 404, description = "Unknown device")
    ),
    tag = "devices"
)]
pub async fn get_device(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - Device - detail"]).await?;
    let device = devices::find(&pool, id)
        .await?
        .ok_or(AuthError::NotFound("Device"))?;
    Ok(Json(DeviceResponse::from(&device)))
}

#[utoipa::path(
    delete,
    path = "/v1/devices/{id}",
    responses((status = 204, description = "Device removed")),
    tag = "devices"
)]
pub async fn delete_device(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    authorize(&headers, &pool, &state, &["User - Device - delete"]).await?;
    devices::delete(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
