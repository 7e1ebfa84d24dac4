//! HTTP surface of the control plane.

mod devices;
mod error;
mod preferences;
mod status;
mod system;

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tower_http::trace::TraceLayer;

use pifleet_core::FleetConfig;

use crate::auth::{AdminPolicy, AuthError, IdentitySource, PasswordGate, identity_or_anonymous};
use crate::monitor::{FleetMonitor, StatusProbe};
use crate::provisioner::{ProvisionSettings, Provisioner};
use crate::storage::FleetDatabase;
use crate::tunnel::TunnelApi;

pub use error::{ApiError, ApiResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: FleetDatabase,
    pub provisioner: Arc<Provisioner>,
    pub monitor: Arc<FleetMonitor>,
    pub admins: AdminPolicy,
    pub identity: Arc<IdentitySource>,
}

impl AppState {
    /// Wire the services from resolved configuration.
    ///
    /// Fails only when the configured provisioning password hash is malformed.
    pub fn from_config(
        config: &FleetConfig,
        db: FleetDatabase,
        tunnels: Arc<dyn TunnelApi>,
        probe: Arc<dyn StatusProbe>,
    ) -> Result<Self, AuthError> {
        let gate = PasswordGate::new(config.provisioning.password_hash.clone())?;
        let provisioner = Provisioner::new(
            db.clone(),
            tunnels,
            gate,
            ProvisionSettings::from_config(config),
        );
        Ok(Self {
            db,
            provisioner: Arc::new(provisioner),
            monitor: Arc::new(FleetMonitor::from_config(probe, &config.monitoring)),
            admins: AdminPolicy::new(&config.auth.admin_emails),
            identity: Arc::new(IdentitySource::from(&config.auth)),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(devices::router())
        .merge(status::router())
        .merge(preferences::router())
        .merge(system::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Caller identity, `anonymous` when the gateway supplied none.
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl FromRequestParts<AppState> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(identity_or_anonymous(&parts.headers, &state.identity)))
    }
}

/// A caller on the admin allow-list; rejects with 403 otherwise.
#[derive(Debug, Clone)]
pub struct Admin(pub String);

impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let email = identity_or_anonymous(&parts.headers, &state.identity);
        state.admins.require_admin(&email)?;
        Ok(Self(email))
    }
}
