//! Authentication and authorization core: token service, password hashing,
//! the request gateway and the client-facing error taxonomy.

pub mod error;
pub mod gateway;
pub mod password;
pub mod token;
pub mod utils;

pub use error::AuthError;
pub use gateway::{AuthSession, Grants, Principal};
pub use token::{AuthClaims, SessionClaims, TokenPair, TokenService};
