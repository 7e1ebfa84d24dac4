//! Ordered ingress rules for a device tunnel.
//!
//! Rules are evaluated first-match-wins. The device rule set routes status
//! and screenshot paths to the status server, remote-desktop paths to the
//! noVNC proxy, everything else on the hostname to SSH, and ends with an
//! explicit 404.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Local service a rule forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngressService {
    Http(u16),
    Ssh(u16),
    NotFound,
}

impl fmt::Display for IngressService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(port) => write!(f, "http://localhost:{port}"),
            Self::Ssh(port) => write!(f, "ssh://localhost:{port}"),
            Self::NotFound => f.write_str("http_status:404"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    /// `None` matches any hostname.
    pub hostname: Option<String>,
    /// `None` matches any path.
    pub path_prefix: Option<String>,
    pub service: IngressService,
}

impl IngressRule {
    pub fn matches(&self, hostname: &str, path: &str) -> bool {
        self.hostname.as_deref().is_none_or(|h| h == hostname)
            && self.path_prefix.as_deref().is_none_or(|p| path.starts_with(p))
    }

    const fn is_terminal(&self) -> bool {
        self.hostname.is_none() && self.path_prefix.is_none()
    }
}

/// Device-local ports the ingress rules point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngressPorts {
    pub status: u16,
    pub vnc: u16,
    pub ssh: u16,
}

impl Default for IngressPorts {
    fn default() -> Self {
        Self {
            status: 8081,
            vnc: 6080,
            ssh: 22,
        }
    }
}

const STATUS_PREFIXES: [&str; 2] = ["/status", "/screenshot"];
const VNC_PREFIXES: [&str; 2] = ["/vnc", "/websockify"];

/// Rule set for one device hostname.
pub fn device_rules(hostname: &str, ports: IngressPorts) -> Vec<IngressRule> {
    let prefixed = |prefix: &str, service| IngressRule {
        hostname: Some(hostname.to_string()),
        path_prefix: Some(prefix.to_string()),
        service,
    };

    let mut rules: Vec<IngressRule> = STATUS_PREFIXES
        .iter()
        .map(|p| prefixed(p, IngressService::Http(ports.status)))
        .chain(
            VNC_PREFIXES
                .iter()
                .map(|p| prefixed(p, IngressService::Http(ports.vnc))),
        )
        .collect();

    rules.push(IngressRule {
        hostname: Some(hostname.to_string()),
        path_prefix: None,
        service: IngressService::Ssh(ports.ssh),
    });
    rules.push(IngressRule {
        hostname: None,
        path_prefix: None,
        service: IngressService::NotFound,
    });
    rules
}

/// First rule matching `hostname` and `path`.
pub fn resolve<'a>(rules: &'a [IngressRule], hostname: &str, path: &str) -> Option<&'a IngressRule> {
    rules.iter().find(|r| r.matches(hostname, path))
}

/// Check rule ordering: a terminal catch-all 404 must come last, and every
/// other rule must be the first match for its own hostname and prefix.
pub fn validate(rules: &[IngressRule]) -> Result<(), String> {
    let Some((last, body)) = rules.split_last() else {
        return Err("ingress rules are empty".into());
    };
    if !last.is_terminal() || last.service != IngressService::NotFound {
        return Err("last ingress rule must be the catch-all 404".into());
    }
    for (i, rule) in body.iter().enumerate() {
        if rule.is_terminal() {
            return Err(format!("rule {i} matches everything but is not last"));
        }
        let hostname = rule.hostname.as_deref().unwrap_or_default();
        let path = rule.path_prefix.as_deref().unwrap_or("/");
        if !resolve(rules, hostname, path).is_some_and(|first| std::ptr::eq(first, rule)) {
            return Err(format!("rule {i} is shadowed by an earlier rule"));
        }
    }
    Ok(())
}
