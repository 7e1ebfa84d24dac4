//! In-process tunnel backend.
//!
//! Keeps tunnels, ingress configurations and DNS records in memory with the
//! same naming and cascade semantics as the hosted service. Used by
//! `--tunnel-backend memory` for local runs and by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{DnsRecord, IngressRule, TunnelApi, TunnelApiError, TunnelInfo};

#[derive(Default)]
struct State {
    tunnels: HashMap<String, TunnelInfo>,
    ingress: HashMap<String, Vec<IngressRule>>,
    dns: HashMap<String, DnsRecord>,
}

#[derive(Default)]
pub struct InMemoryTunnelApi {
    state: Mutex<State>,
    creates: AtomicUsize,
    tokens: AtomicUsize,
    reject_creates: AtomicBool,
}

impl InMemoryTunnelApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create_tunnel` fail (fault injection).
    pub fn reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    /// Seed a tunnel without going through the provisioner.
    pub async fn insert_tunnel(&self, name: &str) -> TunnelInfo {
        let info = TunnelInfo {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        self.state
            .lock()
            .await
            .tunnels
            .insert(info.id.clone(), info.clone());
        info
    }

    pub async fn tunnels_named(&self, name: &str) -> Vec<TunnelInfo> {
        self.state
            .lock()
            .await
            .tunnels
            .values()
            .filter(|t| t.name == name)
            .cloned()
            .collect()
    }

    pub async fn tunnel_exists(&self, tunnel_id: &str) -> bool {
        self.state.lock().await.tunnels.contains_key(tunnel_id)
    }

    pub async fn ingress_for(&self, tunnel_id: &str) -> Option<Vec<IngressRule>> {
        self.state.lock().await.ingress.get(tunnel_id).cloned()
    }

    pub async fn dns_for(&self, hostname: &str) -> Vec<DnsRecord> {
        self.state
            .lock()
            .await
            .dns
            .values()
            .filter(|r| r.name == hostname)
            .cloned()
            .collect()
    }

    /// Number of successful `create_tunnel` calls.
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of credentials minted.
    pub fn token_count(&self) -> usize {
        self.tokens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TunnelApi for InMemoryTunnelApi {
    async fn find_tunnel(&self, name: &str) -> Result<Option<TunnelInfo>, TunnelApiError> {
        Ok(self.tunnels_named(name).await.into_iter().next())
    }

    async fn create_tunnel(&self, name: &str) -> Result<TunnelInfo, TunnelApiError> {
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(TunnelApiError::Api {
                status: 400,
                message: "tunnel creation rejected".into(),
            });
        }
        let mut state = self.state.lock().await;
        if state.tunnels.values().any(|t| t.name == name) {
            return Err(TunnelApiError::Api {
                status: 409,
                message: format!("tunnel with name {name} already exists"),
            });
        }
        let info = TunnelInfo {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        state.tunnels.insert(info.id.clone(), info.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        debug!(tunnel_id = %info.id, name, "In-memory tunnel created");
        Ok(info)
    }

    async fn delete_tunnel(&self, tunnel_id: &str) -> Result<(), TunnelApiError> {
        let mut state = self.state.lock().await;
        if state.tunnels.remove(tunnel_id).is_none() {
            return Err(TunnelApiError::NotFound(tunnel_id.to_string()));
        }
        state.ingress.remove(tunnel_id);
        Ok(())
    }

    async fn tunnel_token(&self, tunnel_id: &str) -> Result<String, TunnelApiError> {
        if !self.tunnel_exists(tunnel_id).await {
            return Err(TunnelApiError::NotFound(tunnel_id.to_string()));
        }
        let n = self.tokens.fetch_add(1, Ordering::SeqCst);
        Ok(format!("token-{tunnel_id}-{n}"))
    }

    async fn put_ingress(
        &self,
        tunnel_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), TunnelApiError> {
        let mut state = self.state.lock().await;
        if !state.tunnels.contains_key(tunnel_id) {
            return Err(TunnelApiError::NotFound(tunnel_id.to_string()));
        }
        state.ingress.insert(tunnel_id.to_string(), rules.to_vec());
        Ok(())
    }

    async fn find_dns_records(&self, hostname: &str) -> Result<Vec<DnsRecord>, TunnelApiError> {
        Ok(self.dns_for(hostname).await)
    }

    async fn delete_dns_record(&self, record_id: &str) -> Result<(), TunnelApiError> {
        self.state
            .lock()
            .await
            .dns
            .remove(record_id)
            .map(|_| ())
            .ok_or_else(|| TunnelApiError::NotFound(record_id.to_string()))
    }

    async fn create_dns_cname(
        &self,
        hostname: &str,
        target: &str,
    ) -> Result<DnsRecord, TunnelApiError> {
        let mut state = self.state.lock().await;
        if state.dns.values().any(|r| r.name == hostname) {
            return Err(TunnelApiError::Api {
                status: 400,
                message: format!("record for {hostname} already exists"),
            });
        }
        let record = DnsRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: hostname.to_string(),
            content: target.to_string(),
        };
        state.dns.insert(record.id.clone(), record.clone());
        Ok(record)
    }
}
