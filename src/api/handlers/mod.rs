//! HTTP handlers, one module per resource router.

pub mod apps;
pub mod auth;
pub mod devices;
pub mod health;
pub mod permissions;
pub mod roles;
pub mod users;

pub use self::health::health;
