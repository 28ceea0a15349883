//! OpenAPI document for the HTTP surface.

use utoipa::OpenApi;

use super::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "custodia",
        description = "User identity, authentication and access control microservice",
        version = env!("CARGO_PKG_VERSION"),
    ),
    paths(
        handlers::health::health,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::refresh,
        handlers::auth::check,
        handlers::auth::generate_token,
        handlers::auth::validate_email,
        handlers::auth::forgot_password,
        handlers::auth::validate_token_notification,
        handlers::auth::reset_password,
        handlers::users::list_users,
        handlers::users::list_trash,
        handlers::users::create_user,
        handlers::users::get_user,
        handlers::users::get_user_by_aq,
        handlers::users::update_user,
        handlers::users::update_user_password,
        handlers::users::get_user_permissions,
        handlers::users::sync_user_permissions,
        handlers::users::sync_user_roles,
        handlers::users::activate_user,
        handlers::users::deactivate_user,
        handlers::users::soft_delete_user,
        handlers::users::restore_user,
        handlers::users::hard_delete_user,
        handlers::users::get_user_devices,
        handlers::users::update_available_credit,
        handlers::users::update_payment_capacity,
        handlers::users::update_second_credit,
        handlers::apps::list_apps,
        handlers::apps::create_app,
        handlers::apps::get_app,
        handlers::apps::update_app,
        handlers::apps::generate_app_token,
        handlers::apps::get_app_permissions,
        handlers::apps::sync_app_permissions,
        handlers::apps::sync_app_roles,
        handlers::apps::delete_app,
        handlers::roles::list_roles,
        handlers::roles::list_all_roles,
        handlers::roles::create_role,
        handlers::roles::get_role,
        handlers::roles::update_role,
        handlers::roles::sync_role_permissions,
        handlers::roles::delete_role,
        handlers::permissions::list_permissions,
        handlers::permissions::list_all_permissions,
        handlers::permissions::create_permission,
        handlers::permissions::get_permission,
        handlers::permissions::update_permission,
        handlers::permissions::delete_permission,
        handlers::devices::list_devices,
        handlers::devices::register_device,
        handlers::devices::get_device,
        handlers::devices::delete_device,
    ),
    components(schemas(
        crate::auth::error::ErrorBody,
        crate::auth::token::TokenPair,
        crate::pagination::PageInfo,
        handlers::auth::RegisterRequest,
        handlers::auth::LoginRequest,
        handlers::auth::GenerateTokenRequest,
        handlers::auth::ValidateEmailRequest,
        handlers::auth::ValidateEmailResponse,
        handlers::auth::ForgotPasswordRequest,
        handlers::auth::ForgotPasswordResponse,
        handlers::auth::ResetPasswordRequest,
        handlers::auth::ValidateTokenNotificationRequest,
        handlers::users::UserResponse,
        handlers::users::UserListResponse,
        handlers::users::CreateUserRequest,
        handlers::users::UpdateUserRequest,
        handlers::users::UpdatePasswordRequest,
        handlers::users::SyncPermissionsRequest,
        handlers::users::SyncRolesRequest,
        handlers::users::AmountRequest,
        handlers::users::SecondCreditRequest,
        handlers::users::UserPermissionsResponse,
        handlers::apps::AppResponse,
        handlers::apps::AppListResponse,
        handlers::apps::CreateAppRequest,
        handlers::apps::UpdateAppRequest,
        handlers::apps::AppSyncPermissionsRequest,
        handlers::apps::AppSyncRolesRequest,
        handlers::apps::AppPermissionsResponse,
        handlers::roles::RoleResponse,
        handlers::roles::RoleDetailResponse,
        handlers::roles::RoleListResponse,
        handlers::roles::CreateRoleRequest,
        handlers::roles::UpdateRoleRequest,
        handlers::roles::RoleSyncPermissionsRequest,
        handlers::devices::DeviceResponse,
        handlers::devices::DeviceListResponse,
        handlers::devices::RegisterDeviceRequest,
    )),
    tags(
        (name = "auth", description = "Login, registration, sessions and password reset"),
        (name = "users", description = "User administration"),
        (name = "apps", description = "Machine client administration"),
        (name = "roles", description = "Role administration"),
        (name = "permissions", description = "Permission administration"),
        (name = "devices", description = "Device registration"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;
