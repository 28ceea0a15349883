//! HTTP server wiring: router, middleware stack and state.

use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod handlers;
mod openapi;
pub mod state;

pub use openapi::ApiDoc;

use crate::auth::token::TokenService;
use crate::cache::Cache;
use crate::cli::globals::GlobalArgs;
use crate::db;
use crate::notify::Notifier;
use handlers::{apps, auth, devices, health, permissions, roles, users};
use state::{AuthConfig, AuthState};

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs) -> Result<()> {
    let pool = db::connect(&dsn).await?;

    // The cache handle degrades to a no-op when redis is unreachable; the
    // service still authorizes from the database.
    let cache = Cache::connect(&globals.redis_url).await;
    let tokens = TokenService::new(&globals.secret_key);
    let notifier = Notifier::new(globals.notification_url.clone(), crate::APP_USER_AGENT)?;
    let auth_state = Arc::new(AuthState::new(AuthConfig::new(), tokens, cache, notifier));

    let app = router()
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CorsLayer::permissive())
                .layer(Extension(auth_state.clone())),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// All documented routes plus the swagger mount.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/", get(|| async { env!("CARGO_PKG_NAME") }))
        .route("/health", get(health::health))
        .route("/v1/auth/register", post(auth::register))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/logout", post(auth::logout))
        .route("/v1/auth/refresh", post(auth::refresh))
        .route("/v1/auth/check", post(auth::check))
        .route("/v1/auth/generate-token", post(auth::generate_token))
        .route("/v1/auth/validate-email", post(auth::validate_email))
        .route("/v1/auth/forgot-password", post(auth::forgot_password))
        .route(
            "/v1/auth/validate-token-notification",
            post(auth::validate_token_notification),
        )
        .route("/v1/auth/reset-password", post(auth::reset_password))
        .route("/v1/users", get(users::list_users).post(users::create_user))
        .route("/v1/users/trash", get(users::list_trash))
        .route("/v1/users/aq/:aq_id", get(users::get_user_by_aq))
        .route(
            "/v1/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::soft_delete_user),
        )
        .route("/v1/users/:id/hard", delete(users::hard_delete_user))
        .route("/v1/users/:id/restore", post(users::restore_user))
        .route("/v1/users/:id/password", put(users::update_user_password))
        .route("/v1/users/:id/permissions", get(users::get_user_permissions))
        .route(
            "/v1/users/:id/sync-permissions",
            post(users::sync_user_permissions),
        )
        .route("/v1/users/:id/sync-roles", post(users::sync_user_roles))
        .route(
            "/v1/users/:id/activate",
            post(users::activate_user).delete(users::deactivate_user),
        )
        .route("/v1/users/:id/devices", get(users::get_user_devices))
        .route(
            "/v1/users/:id/available-credit",
            put(users::update_available_credit),
        )
        .route(
            "/v1/users/:id/payment-capacity",
            put(users::update_payment_capacity),
        )
        .route(
            "/v1/users/:id/second-credit",
            put(users::update_second_credit),
        )
        .route("/v1/apps", get(apps::list_apps).post(apps::create_app))
        .route(
            "/v1/apps/:id",
            get(apps::get_app)
                .put(apps::update_app)
                .delete(apps::delete_app),
        )
        .route("/v1/apps/:id/generate-token", post(apps::generate_app_token))
        .route("/v1/apps/:id/permissions", get(apps::get_app_permissions))
        .route(
            "/v1/apps/:id/sync-permissions",
            post(apps::sync_app_permissions),
        )
        .route("/v1/apps/:id/sync-roles", post(apps::sync_app_roles))
        .route("/v1/roles", get(roles::list_roles).post(roles::create_role))
        .route("/v1/roles/list", get(roles::list_all_roles))
        .route(
            "/v1/roles/:id",
            get(roles::get_role)
                .put(roles::update_role)
                .delete(roles::delete_role),
        )
        .route(
            "/v1/roles/:id/sync-permissions",
            post(roles::sync_role_permissions),
        )
        .route(
            "/v1/permissions",
            get(permissions::list_permissions).post(permissions::create_permission),
        )
        .route(
            "/v1/permissions/list",
            get(permissions::list_all_permissions),
        )
        .route(
            "/v1/permissions/:id",
            get(permissions::get_permission)
                .put(permissions::update_permission)
                .delete(permissions::delete_permission),
        )
        .route(
            "/v1/devices",
            get(devices::list_devices).post(devices::register_device),
        )
        .route(
            "/v1/devices/:id",
            get(devices::get_device).delete(devices::delete_device),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::{ApiDoc, router};
    use utoipa::OpenApi;

    #[test]
    fn router_builds() {
        let _ = router();
    }

    #[test]
    fn openapi_document_includes_core_routes() {
        let doc = ApiDoc::openapi();
        let paths = doc.paths.paths;
        assert!(paths.contains_key("/v1/auth/login"));
        assert!(paths.contains_key("/v1/auth/logout"));
        assert!(paths.contains_key("/v1/users/{id}/sync-roles"));
        assert!(paths.contains_key("/v1/roles/{id}"));
        assert!(paths.contains_key("/health"));
    }
}
