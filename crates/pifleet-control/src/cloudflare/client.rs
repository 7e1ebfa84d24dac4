//! Cloudflare API v4 client.
//!
//! Uses reqwest to manage named tunnels under an account and proxied CNAME
//! records under a zone.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pifleet_core::config::CloudflareConfig;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{
    CreateRecord, CreateTunnel, Envelope, Record, Tunnel, TunnelConfiguration, join_errors,
};
use crate::tunnel::{DnsRecord, IngressRule, TunnelApi, TunnelApiError, TunnelInfo};

/// Cloudflare API client errors.
#[derive(Debug, Error)]
pub enum CloudflareError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloudflare API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<CloudflareError> for TunnelApiError {
    fn from(e: CloudflareError) -> Self {
        match e {
            CloudflareError::Api { status, message } => Self::Api { status, message },
            CloudflareError::Config(msg) => Self::Config(msg),
            other => Self::Http(other.to_string()),
        }
    }
}

/// Cloudflare API v4 client scoped to one account and zone.
#[derive(Debug)]
pub struct CloudflareClient {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    zone_id: String,
}

impl CloudflareClient {
    /// Create a new client.
    pub fn new(config: &CloudflareConfig) -> Result<Self, CloudflareError> {
        if config.api_base.is_empty() {
            return Err(CloudflareError::Config("api_base is empty".into()));
        }
        if config.api_token.is_empty() {
            return Err(CloudflareError::Config("api_token is empty".into()));
        }
        if config.account_id.is_empty() {
            return Err(CloudflareError::Config("account_id is empty".into()));
        }
        if config.zone_id.is_empty() {
            return Err(CloudflareError::Config("zone_id is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let token_val = HeaderValue::from_str(&format!("Bearer {}", config.api_token))
            .map_err(|_| CloudflareError::Config("Invalid token format".into()))?;
        headers.insert(AUTHORIZATION, token_val);

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            zone_id: config.zone_id.clone(),
        })
    }

    pub(crate) fn account_url(&self, path: &str) -> String {
        format!("{}/accounts/{}{}", self.base_url, self.account_id, path)
    }

    pub(crate) fn zone_url(&self, path: &str) -> String {
        format!("{}/zones/{}{}", self.base_url, self.zone_id, path)
    }

    /// Unwrap the v4 envelope, turning HTTP or `success: false` failures
    /// into `Api` errors carrying the envelope's messages.
    async fn read_envelope<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<Option<T>, CloudflareError> {
        let status = resp.status();
        let body = resp.text().await?;
        let reason = || status.canonical_reason().unwrap_or("Unknown").to_string();

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(env) => env,
            Err(e) if status.is_success() => return Err(CloudflareError::Decode(e.to_string())),
            Err(_) => {
                return Err(CloudflareError::Api {
                    status: status.as_u16(),
                    message: reason(),
                });
            }
        };

        if !status.is_success() || !envelope.success {
            return Err(CloudflareError::Api {
                status: status.as_u16(),
                message: join_errors(&envelope.errors).unwrap_or_else(reason),
            });
        }
        Ok(envelope.result)
    }

    async fn required<T: DeserializeOwned>(
        resp: reqwest::Response,
        what: &str,
    ) -> Result<T, CloudflareError> {
        Self::read_envelope(resp)
            .await?
            .ok_or_else(|| CloudflareError::Decode(format!("{what} response has no result")))
    }

    // =========================================================================
    // Tunnels
    // =========================================================================

    /// Live tunnels with exactly this name.
    pub async fn list_tunnels(&self, name: &str) -> Result<Vec<Tunnel>, CloudflareError> {
        let url = self.account_url(&format!("/cfd_tunnel?name={name}&is_deleted=false"));
        let resp = self.http.get(&url).send().await?;
        let tunnels: Vec<Tunnel> = Self::read_envelope(resp).await?.unwrap_or_default();
        Ok(tunnels
            .into_iter()
            .filter(|t| t.name == name && t.deleted_at.is_none())
            .collect())
    }

    /// Create a remotely-managed tunnel with a fresh random secret.
    pub async fn create_named_tunnel(&self, name: &str) -> Result<Tunnel, CloudflareError> {
        let secret: [u8; 32] = rand::random();
        let body = CreateTunnel {
            name,
            config_src: "cloudflare",
            tunnel_secret: STANDARD.encode(secret),
        };
        let resp = self
            .http
            .post(self.account_url("/cfd_tunnel"))
            .json(&body)
            .send()
            .await?;
        Self::required(resp, "create tunnel").await
    }

    /// Drop active connections, then delete the tunnel.
    pub async fn delete_tunnel_cascade(&self, tunnel_id: &str) -> Result<(), CloudflareError> {
        let resp = self
            .http
            .delete(self.account_url(&format!("/cfd_tunnel/{tunnel_id}/connections")))
            .send()
            .await?;
        if let Err(e) = Self::read_envelope::<serde_json::Value>(resp).await {
            debug!(tunnel_id, error = %e, "Connection cleanup failed, deleting tunnel anyway");
        }

        let resp = self
            .http
            .delete(self.account_url(&format!("/cfd_tunnel/{tunnel_id}")))
            .send()
            .await?;
        Self::read_envelope::<serde_json::Value>(resp).await?;
        Ok(())
    }

    pub async fn get_tunnel_token(&self, tunnel_id: &str) -> Result<String, CloudflareError> {
        let resp = self
            .http
            .get(self.account_url(&format!("/cfd_tunnel/{tunnel_id}/token")))
            .send()
            .await?;
        Self::required(resp, "tunnel token").await
    }

    pub async fn put_configuration(
        &self,
        tunnel_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), CloudflareError> {
        let body = TunnelConfiguration::from_rules(rules);
        let resp = self
            .http
            .put(self.account_url(&format!("/cfd_tunnel/{tunnel_id}/configurations")))
            .json(&body)
            .send()
            .await?;
        Self::read_envelope::<serde_json::Value>(resp).await?;
        Ok(())
    }

    // =========================================================================
    // DNS
    // =========================================================================

    pub async fn list_dns_records(&self, hostname: &str) -> Result<Vec<Record>, CloudflareError> {
        let url = self.zone_url(&format!("/dns_records?name={hostname}"));
        let resp = self.http.get(&url).send().await?;
        let records: Vec<Record> = Self::read_envelope(resp).await?.unwrap_or_default();
        Ok(records.into_iter().filter(|r| r.name == hostname).collect())
    }

    pub async fn remove_dns_record(&self, record_id: &str) -> Result<(), CloudflareError> {
        let resp = self
            .http
            .delete(self.zone_url(&format!("/dns_records/{record_id}")))
            .send()
            .await?;
        Self::read_envelope::<serde_json::Value>(resp).await?;
        Ok(())
    }

    /// Create a proxied CNAME with automatic TTL.
    pub async fn add_cname(&self, hostname: &str, target: &str) -> Result<Record, CloudflareError> {
        let body = CreateRecord {
            kind: "CNAME",
            name: hostname,
            content: target,
            proxied: true,
            ttl: 1,
        };
        let resp = self
            .http
            .post(self.zone_url("/dns_records"))
            .json(&body)
            .send()
            .await?;
        Self::required(resp, "create DNS record").await
    }
}

#[async_trait]
impl TunnelApi for CloudflareClient {
    async fn find_tunnel(&self, name: &str) -> Result<Option<TunnelInfo>, TunnelApiError> {
        let tunnels = self.list_tunnels(name).await?;
        if tunnels.len() > 1 {
            warn!(name, count = tunnels.len(), "Multiple live tunnels share a name");
        }
        Ok(tunnels.into_iter().next().map(TunnelInfo::from))
    }

    async fn create_tunnel(&self, name: &str) -> Result<TunnelInfo, TunnelApiError> {
        Ok(self.create_named_tunnel(name).await?.into())
    }

    async fn delete_tunnel(&self, tunnel_id: &str) -> Result<(), TunnelApiError> {
        Ok(self.delete_tunnel_cascade(tunnel_id).await?)
    }

    async fn tunnel_token(&self, tunnel_id: &str) -> Result<String, TunnelApiError> {
        Ok(self.get_tunnel_token(tunnel_id).await?)
    }

    async fn put_ingress(
        &self,
        tunnel_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), TunnelApiError> {
        Ok(self.put_configuration(tunnel_id, rules).await?)
    }

    async fn find_dns_records(&self, hostname: &str) -> Result<Vec<DnsRecord>, TunnelApiError> {
        Ok(self
            .list_dns_records(hostname)
            .await?
            .into_iter()
            .map(DnsRecord::from)
            .collect())
    }

    async fn delete_dns_record(&self, record_id: &str) -> Result<(), TunnelApiError> {
        Ok(self.remove_dns_record(record_id).await?)
    }

    async fn create_dns_cname(
        &self,
        hostname: &str,
        target: &str,
    ) -> Result<DnsRecord, TunnelApiError> {
        Ok(self.add_cname(hostname, target).await?.into())
    }
}
