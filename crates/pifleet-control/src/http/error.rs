//! HTTP error mapping.
//!
//! Every failure renders as `{"success": false, "error": <message>,
//! "code": <machine code>}`.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::auth::AuthError;
use crate::provisioner::ProvisionError;
use crate::storage::DatabaseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "device_not_found", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
            "code": self.code,
        }));
        (self.status, body).into_response()
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        let message = err.to_string();
        match err {
            ProvisionError::InvalidDeviceId(_) => Self::bad_request("invalid_device_id", message),
            ProvisionError::AuthFailed => {
                Self::new(StatusCode::UNAUTHORIZED, "auth_failed", "Invalid password")
            }
            ProvisionError::DeviceNotFound(_) => Self::not_found(message),
            ProvisionError::Registry(db) => db.into(),
            ProvisionError::TunnelCreateFailed(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "tunnel_create_failed", message)
            }
            ProvisionError::Step { .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "provisioning_failed", message)
            }
            ProvisionError::PersistFailed { .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "persist_failed", message)
            }
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        if err.is_not_found() {
            return Self::not_found(err.to_string());
        }
        error!(error = %err, "Registry operation failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "registry_error",
            "Device registry unavailable",
        )
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidPassword => {
                Self::new(StatusCode::UNAUTHORIZED, "auth_failed", "Invalid password")
            }
            AuthError::PermissionDenied(_) => Self::new(
                StatusCode::FORBIDDEN,
                "permission_denied",
                "Admin access required",
            ),
            AuthError::MalformedHash(_) => {
                error!(error = %err, "Authentication misconfigured");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error",
                )
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("invalid_payload", rejection.body_text())
    }
}

impl From<pifleet_core::Error> for ApiError {
    fn from(err: pifleet_core::Error) -> Self {
        let message = err.to_string();
        match err {
            pifleet_core::Error::InvalidDeviceId(_) => {
                Self::bad_request("invalid_device_id", message)
            }
            pifleet_core::Error::InvalidVncAccount(_) => {
                Self::bad_request("invalid_vnc_account", message)
            }
            _ => Self::bad_request("invalid_payload", message),
        }
    }
}
