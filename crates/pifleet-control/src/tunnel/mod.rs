//! Interface to the external tunnel and DNS service.
//!
//! The provisioner only talks to [`TunnelApi`]. The production backend is
//! [`crate::cloudflare::CloudflareClient`]; [`InMemoryTunnelApi`] keeps the
//! same state machine in process for local runs and tests.

pub mod ingress;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use ingress::{IngressPorts, IngressRule, IngressService};
pub use memory::InMemoryTunnelApi;

/// A tunnel resource as reported by the tunnel service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelInfo {
    pub id: String,
    pub name: String,
}

impl TunnelInfo {
    /// CNAME target routing a hostname into this tunnel.
    pub fn routing_target(&self) -> String {
        routing_target(&self.id)
    }
}

pub fn routing_target(tunnel_id: &str) -> String {
    format!("{tunnel_id}.cfargotunnel.com")
}

/// A DNS record bound to a hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    pub content: String,
}

/// Tunnel service errors.
#[derive(Debug, thiserror::Error)]
pub enum TunnelApiError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Tunnel API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Tunnel not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TunnelApiError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::Api { status: 404, .. })
    }
}

/// Operations the provisioner needs from the tunnel/DNS provider.
#[async_trait]
pub trait TunnelApi: Send + Sync {
    /// Live (non-deleted) tunnel with exactly this name.
    async fn find_tunnel(&self, name: &str) -> Result<Option<TunnelInfo>, TunnelApiError>;

    async fn create_tunnel(&self, name: &str) -> Result<TunnelInfo, TunnelApiError>;

    /// Delete a tunnel together with its connections and routes.
    async fn delete_tunnel(&self, tunnel_id: &str) -> Result<(), TunnelApiError>;

    /// Mint a connector credential for an existing tunnel.
    async fn tunnel_token(&self, tunnel_id: &str) -> Result<String, TunnelApiError>;

    /// Replace the tunnel's ingress configuration.
    async fn put_ingress(
        &self,
        tunnel_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), TunnelApiError>;

    async fn find_dns_records(&self, hostname: &str) -> Result<Vec<DnsRecord>, TunnelApiError>;

    async fn delete_dns_record(&self, record_id: &str) -> Result<(), TunnelApiError>;

    /// Create a proxied CNAME `hostname -> target`.
    async fn create_dns_cname(
        &self,
        hostname: &str,
        target: &str,
    ) -> Result<DnsRecord, TunnelApiError>;
}
