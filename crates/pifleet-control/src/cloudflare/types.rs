//! Cloudflare API v4 request and response types.
//!
//! Only the fields the control plane reads or writes are modelled.

use serde::{Deserialize, Serialize};

use crate::tunnel::{DnsRecord, IngressRule, TunnelInfo};

/// Standard v4 response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Join envelope errors into one message, `None` when there are none.
pub fn join_errors(errors: &[ApiMessage]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    Some(
        errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Tunnel from `cfd_tunnel` endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Tunnel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub deleted_at: Option<String>,
}

impl From<Tunnel> for TunnelInfo {
    fn from(t: Tunnel) -> Self {
        Self {
            id: t.id,
            name: t.name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateTunnel<'a> {
    pub name: &'a str,
    pub config_src: &'static str,
    pub tunnel_secret: String,
}

/// DNS record from `dns_records` endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Record {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content: String,
}

impl From<Record> for DnsRecord {
    fn from(r: Record) -> Self {
        Self {
            id: r.id,
            name: r.name,
            content: r.content,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateRecord<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'a str,
    pub content: &'a str,
    pub proxied: bool,
    pub ttl: u32,
}

/// Body of `PUT .../configurations`.
#[derive(Debug, Serialize)]
pub struct TunnelConfiguration {
    pub config: IngressConfig,
}

#[derive(Debug, Serialize)]
pub struct IngressConfig {
    pub ingress: Vec<IngressEntry>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct IngressEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub service: String,
}

impl From<&IngressRule> for IngressEntry {
    fn from(rule: &IngressRule) -> Self {
        Self {
            hostname: rule.hostname.clone(),
            path: rule.path_prefix.as_deref().map(path_regex),
            service: rule.service.to_string(),
        }
    }
}

impl TunnelConfiguration {
    pub fn from_rules(rules: &[IngressRule]) -> Self {
        Self {
            config: IngressConfig {
                ingress: rules.iter().map(IngressEntry::from).collect(),
            },
        }
    }
}

/// Ingress `path` values are regular expressions; anchor the prefix and
/// escape metacharacters.
pub fn path_regex(prefix: &str) -> String {
    format!("^{}", regex::escape(prefix))
}
