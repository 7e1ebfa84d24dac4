//! Authentication and authorization.
//!
//! Devices authenticate with the shared provisioning password; dashboard
//! users are identified by the gateway in front of the control plane and
//! authorized against the admin allow-list.

pub mod admin;
pub mod identity;
pub mod password;

pub use admin::AdminPolicy;
pub use identity::{ANONYMOUS, IdentitySource, extract_identity, identity_or_anonymous};
pub use password::PasswordGate;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid password")]
    InvalidPassword,

    #[error("Permission denied for {0}")]
    PermissionDenied(String),

    #[error("Malformed password hash: {0}")]
    MalformedHash(String),
}
