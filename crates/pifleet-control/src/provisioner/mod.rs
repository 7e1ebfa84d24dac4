//! Tunnel provisioning.
//!
//! Registration is a linear saga over the external tunnel service:
//!
//! 1. `ResolveTunnel`: reuse the stored tunnel, or (re)create one under the
//!    device's deterministic name after clearing any stale tunnel.
//! 2. `MintCredential`: fetch a connector token for the tunnel.
//! 3. `ConfigureIngress`: replace the tunnel's ingress rules.
//! 4. `BindDns`: drop existing records for the hostname, add the CNAME.
//! 5. `Persist`: upsert the registry row.
//!
//! Steps 1-4 are idempotent on retry. A failure in step 5 leaves a live
//! tunnel with no registry row; it is reported as
//! [`ProvisionError::PersistFailed`] and logged with the tunnel id.

mod locks;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use pifleet_core::{DeviceId, FleetConfig, VncAccount};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::auth::PasswordGate;
use crate::storage::{DatabaseError, Device, DeviceUpsert, FleetDatabase};
use crate::tunnel::ingress::{self, IngressPorts};
use crate::tunnel::{TunnelApi, TunnelApiError, TunnelInfo};

pub use locks::DeviceLocks;

/// Named saga steps, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStep {
    ResolveTunnel,
    MintCredential,
    ConfigureIngress,
    BindDns,
    Persist,
    Teardown,
}

impl SagaStep {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResolveTunnel => "resolve tunnel",
            Self::MintCredential => "mint credential",
            Self::ConfigureIngress => "configure ingress",
            Self::BindDns => "bind DNS",
            Self::Persist => "persist device",
            Self::Teardown => "tear down",
        }
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Invalid device id: {0}")]
    InvalidDeviceId(String),

    #[error("Authentication failed")]
    AuthFailed,

    #[error("Tunnel creation failed: {0}")]
    TunnelCreateFailed(#[source] TunnelApiError),

    #[error("Provisioning step '{step}' failed: {source}")]
    Step {
        step: SagaStep,
        #[source]
        source: TunnelApiError,
    },

    #[error("Tunnel {tunnel_id} provisioned but device record not saved: {source}")]
    PersistFailed {
        tunnel_id: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Registry error: {0}")]
    Registry(#[from] DatabaseError),
}

impl From<pifleet_core::Error> for ProvisionError {
    fn from(e: pifleet_core::Error) -> Self {
        match e {
            pifleet_core::Error::InvalidDeviceId(id) => Self::InvalidDeviceId(id),
            other => Self::InvalidDeviceId(other.to_string()),
        }
    }
}

fn step(at: SagaStep) -> impl Fn(TunnelApiError) -> ProvisionError {
    move |source| ProvisionError::Step { step: at, source }
}

/// Inputs of a registration call.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub device_id: DeviceId,
    pub friendly_name: Option<String>,
    pub location: Option<String>,
    /// `None` keeps whatever is stored.
    pub vnc_account: Option<VncAccount>,
    pub reassign: bool,
}

impl RegistrationRequest {
    pub const fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            friendly_name: None,
            location: None,
            vnc_account: None,
            reassign: false,
        }
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub hostname: String,
    pub tunnel_id: String,
    pub tunnel_token: String,
}

/// Naming and timing knobs for provisioning.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub domain: String,
    pub hostname_suffix: String,
    /// Wait after deleting a tunnel before creating one with the same name.
    pub settle_delay: Duration,
    pub ports: IngressPorts,
}

impl ProvisionSettings {
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            domain: config.fleet.domain.clone(),
            hostname_suffix: config.fleet.hostname_suffix.clone(),
            settle_delay: Duration::from_millis(config.provisioning.settle_delay_ms),
            ports: IngressPorts {
                status: config.provisioning.status_port,
                vnc: config.provisioning.vnc_port,
                ssh: config.provisioning.ssh_port,
            },
        }
    }
}

/// Creates, reuses and replaces per-device tunnels and their DNS bindings.
pub struct Provisioner {
    db: FleetDatabase,
    tunnels: Arc<dyn TunnelApi>,
    locks: DeviceLocks,
    gate: PasswordGate,
    settings: ProvisionSettings,
}

impl Provisioner {
    pub fn new(
        db: FleetDatabase,
        tunnels: Arc<dyn TunnelApi>,
        gate: PasswordGate,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            db,
            tunnels,
            locks: DeviceLocks::new(),
            gate,
            settings,
        }
    }

    /// False when no provisioning password is configured.
    pub const fn registration_open(&self) -> bool {
        self.gate.is_configured()
    }

    /// Check the shared provisioning password.
    pub fn authorize(&self, password: &str) -> Result<(), ProvisionError> {
        self.gate.check(password).map_err(|e| {
            debug!(error = %e, "Provisioning password rejected");
            ProvisionError::AuthFailed
        })
    }

    /// Hostname a new device would get.
    pub fn hostname_for(&self, device_id: &DeviceId) -> String {
        device_id.hostname(&self.settings.hostname_suffix, &self.settings.domain)
    }

    /// Register (or re-register) a device. Calls for the same device id are
    /// serialized.
    #[instrument(skip(self, req), fields(device_id = %req.device_id, reassign = req.reassign))]
    pub async fn register(&self, req: RegistrationRequest) -> Result<Registration, ProvisionError> {
        let _guard = self.locks.lock(req.device_id.as_str()).await;

        let existing = self.db.find_device(req.device_id.as_str()).await?;
        let hostname = existing
            .as_ref()
            .map_or_else(|| self.hostname_for(&req.device_id), |d| d.hostname.clone());
        let stored_tunnel = existing.as_ref().and_then(|d| d.tunnel_id.as_deref());

        let tunnel = self
            .resolve_tunnel(&req.device_id, stored_tunnel, req.reassign)
            .await?;

        let tunnel_token = self
            .tunnels
            .tunnel_token(&tunnel.id)
            .await
            .map_err(step(SagaStep::MintCredential))?;

        self.configure_ingress(&tunnel.id, &hostname).await?;
        self.bind_dns(&hostname, &tunnel).await?;

        let upsert = DeviceUpsert {
            device_id: req.device_id.as_str(),
            hostname: &hostname,
            tunnel_id: &tunnel.id,
            friendly_name: req.friendly_name.as_deref(),
            location: req.location.as_deref(),
            vnc_account: req.vnc_account,
        };
        if let Err(source) = self.db.upsert_device(&upsert).await {
            error!(
                step = %SagaStep::Persist,
                tunnel_id = %tunnel.id,
                hostname = %hostname,
                error = %source,
                "Device record not saved after tunnel provisioning; tunnel is orphaned until reconciled"
            );
            return Err(ProvisionError::PersistFailed {
                tunnel_id: tunnel.id,
                source,
            });
        }

        info!(tunnel_id = %tunnel.id, hostname = %hostname, "Device registered");
        Ok(Registration {
            hostname,
            tunnel_id: tunnel.id,
            tunnel_token,
        })
    }

    async fn resolve_tunnel(
        &self,
        device_id: &DeviceId,
        stored: Option<&str>,
        reassign: bool,
    ) -> Result<TunnelInfo, ProvisionError> {
        let name = device_id.tunnel_name();
        match stored {
            Some(id) if !reassign => {
                debug!(tunnel_id = id, "Reusing stored tunnel");
                Ok(TunnelInfo {
                    id: id.to_string(),
                    name,
                })
            }
            Some(old) => {
                info!(tunnel_id = old, "Reassigning: deleting previous tunnel");
                let deleted = self.delete_tunnel_best_effort(old).await;
                self.create_clean(&name, deleted).await
            }
            None => self.create_clean(&name, false).await,
        }
    }

    /// Create the named tunnel, deleting a same-named leftover first.
    async fn create_clean(
        &self,
        name: &str,
        mut needs_settle: bool,
    ) -> Result<TunnelInfo, ProvisionError> {
        let stale = self
            .tunnels
            .find_tunnel(name)
            .await
            .map_err(step(SagaStep::ResolveTunnel))?;
        if let Some(stale) = stale {
            warn!(tunnel_id = %stale.id, name, "Deleting stale tunnel before create");
            needs_settle |= self.delete_tunnel_best_effort(&stale.id).await;
        }
        if needs_settle && !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        let created = self
            .tunnels
            .create_tunnel(name)
            .await
            .map_err(ProvisionError::TunnelCreateFailed)?;
        info!(tunnel_id = %created.id, name, "Tunnel created");
        Ok(created)
    }

    /// Returns whether a tunnel was actually removed.
    async fn delete_tunnel_best_effort(&self, tunnel_id: &str) -> bool {
        match self.tunnels.delete_tunnel(tunnel_id).await {
            Ok(()) => true,
            Err(e) if e.is_not_found() => {
                debug!(tunnel_id, "Tunnel already gone");
                false
            }
            Err(e) => {
                warn!(tunnel_id, error = %e, "Tunnel delete failed");
                false
            }
        }
    }

    async fn configure_ingress(&self, tunnel_id: &str, hostname: &str) -> Result<(), ProvisionError> {
        let rules = ingress::device_rules(hostname, self.settings.ports);
        ingress::validate(&rules)
            .map_err(TunnelApiError::Config)
            .map_err(step(SagaStep::ConfigureIngress))?;
        self.tunnels
            .put_ingress(tunnel_id, &rules)
            .await
            .map_err(step(SagaStep::ConfigureIngress))
    }

    async fn bind_dns(&self, hostname: &str, tunnel: &TunnelInfo) -> Result<(), ProvisionError> {
        self.release_dns(hostname, SagaStep::BindDns).await?;
        let record = self
            .tunnels
            .create_dns_cname(hostname, &tunnel.routing_target())
            .await
            .map_err(step(SagaStep::BindDns))?;
        debug!(record_id = %record.id, target = %record.content, "DNS record bound");
        Ok(())
    }

    async fn release_dns(&self, hostname: &str, at: SagaStep) -> Result<(), ProvisionError> {
        let records = self
            .tunnels
            .find_dns_records(hostname)
            .await
            .map_err(step(at))?;
        for record in records {
            match self.tunnels.delete_dns_record(&record.id).await {
                Ok(()) => debug!(record_id = %record.id, "DNS record removed"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(step(at)(e)),
            }
        }
        Ok(())
    }

    /// Remove a device: its DNS records, its tunnel, then its registry row.
    #[instrument(skip(self), fields(device_id = %device_id))]
    pub async fn deprovision(&self, device_id: &DeviceId) -> Result<Device, ProvisionError> {
        let _guard = self.locks.lock(device_id.as_str()).await;

        let device = self
            .db
            .find_device(device_id.as_str())
            .await?
            .ok_or_else(|| ProvisionError::DeviceNotFound(device_id.to_string()))?;

        self.release_dns(&device.hostname, SagaStep::Teardown).await?;
        if let Some(tunnel_id) = &device.tunnel_id {
            match self.tunnels.delete_tunnel(tunnel_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!(tunnel_id = %tunnel_id, "Tunnel already gone"),
                Err(e) => return Err(step(SagaStep::Teardown)(e)),
            }
        }
        self.db.remove_device(device_id.as_str()).await?;

        info!(hostname = %device.hostname, "Device removed");
        Ok(device)
    }
}
