//! Configuration resolution for the fleet control plane.
//!
//! Resolution order (lowest to highest priority):
//! 1. Built-in defaults
//! 2. TOML config file (explicit path, else `~/.config/pifleet/config.toml`)
//! 3. Environment variables
//! 4. CLI arguments (applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete control-plane configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FleetConfig {
    pub server: ServerConfig,
    pub fleet: FleetSettings,
    pub cloudflare: CloudflareConfig,
    pub provisioning: ProvisioningConfig,
    pub monitoring: MonitoringConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub database_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            database_path: None,
        }
    }
}

/// Naming of the fleet's public hostnames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    /// DNS zone the device hostnames live in.
    pub domain: String,
    /// Appended to the device id: `{device_id}-{suffix}.{domain}`.
    pub hostname_suffix: String,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            domain: "example.com".to_string(),
            hostname_suffix: "fleet".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudflareConfig {
    pub api_base: String,
    pub account_id: String,
    pub zone_id: String,
    #[serde(skip_serializing)]
    pub api_token: String,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.cloudflare.com/client/v4".to_string(),
            account_id: String::new(),
            zone_id: String::new(),
            api_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Argon2id PHC string of the shared registration password.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Wait after deleting a stale tunnel before creating its replacement.
    pub settle_delay_ms: u64,
    /// Device-local port of the status/screenshot server.
    pub status_port: u16,
    /// Device-local port of the noVNC proxy.
    pub vnc_port: u16,
    pub ssh_port: u16,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            password_hash: None,
            settle_delay_ms: 2000,
            status_port: 8081,
            vnc_port: 6080,
            ssh_port: 22,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Hard ceiling on concurrent outbound probes.
    pub subrequest_ceiling: usize,
    /// Fraction of the ceiling one batch may use.
    pub batch_headroom: f64,
    pub probe_timeout_secs: u64,
    /// Probes one pass may have in flight; defaults to the ceiling.
    pub outbound_budget: Option<usize>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            subrequest_ceiling: 50,
            batch_headroom: 0.8,
            probe_timeout_secs: 15,
            outbound_budget: None,
        }
    }
}

impl MonitoringConfig {
    /// Batch size: `floor(ceiling * headroom)`, at least 1.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn batch_size(&self) -> usize {
        let raw = (self.subrequest_ceiling as f64 * self.batch_headroom).floor() as usize;
        raw.max(1)
    }

    pub fn outbound_budget(&self) -> usize {
        self.outbound_budget.unwrap_or(self.subrequest_ceiling).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Emails allowed to perform admin-gated mutations.
    pub admin_emails: Vec<String>,
    /// Header injected by the authenticating gateway.
    pub identity_header: String,
    /// Cookie carrying the gateway's signed token.
    pub identity_cookie: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_emails: Vec::new(),
            identity_header: "cf-access-authenticated-user-email".to_string(),
            identity_cookie: "CF_Authorization".to_string(),
        }
    }
}

impl FleetConfig {
    /// Reject configurations the control plane cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fleet.domain.trim().is_empty() {
            return Err(Error::Config("fleet.domain must not be empty".into()));
        }
        if self.fleet.hostname_suffix.trim().is_empty() {
            return Err(Error::Config("fleet.hostname_suffix must not be empty".into()));
        }
        if self.monitoring.subrequest_ceiling == 0 {
            return Err(Error::Config(
                "monitoring.subrequest_ceiling must be positive".into(),
            ));
        }
        if !(self.monitoring.batch_headroom > 0.0 && self.monitoring.batch_headroom <= 1.0) {
            return Err(Error::Config(
                "monitoring.batch_headroom must be in (0, 1]".into(),
            ));
        }
        if self.monitoring.outbound_budget() < self.monitoring.batch_size() {
            return Err(Error::Config(format!(
                "monitoring.outbound_budget must be at least the batch size ({})",
                self.monitoring.batch_size()
            )));
        }
        if self.monitoring.probe_timeout_secs == 0 {
            return Err(Error::Config(
                "monitoring.probe_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the default location is optional.
pub fn load_config(path: Option<&Path>) -> Result<FleetConfig> {
    let mut config = match path {
        Some(p) => load_config_file(p)?,
        None => match global_config_path() {
            Some(p) if p.exists() => load_config_file(&p)?,
            _ => FleetConfig::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Default config file location.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pifleet").join("config.toml"))
}

/// Default database location.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".pifleet").join("fleet.db"))
}

fn load_config_file(path: &Path) -> Result<FleetConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {e}", path.display()))
    })
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut FleetConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("PIFLEET_DOMAIN") {
        config.fleet.domain = val;
    }
    if let Some(val) = lookup("PIFLEET_HOSTNAME_SUFFIX") {
        config.fleet.hostname_suffix = val;
    }
    if let Some(val) = lookup("CLOUDFLARE_API_TOKEN") {
        config.cloudflare.api_token = val;
    }
    if let Some(val) = lookup("CLOUDFLARE_ACCOUNT_ID") {
        config.cloudflare.account_id = val;
    }
    if let Some(val) = lookup("CLOUDFLARE_ZONE_ID") {
        config.cloudflare.zone_id = val;
    }
    if let Some(val) = lookup("PIFLEET_PASSWORD_HASH") {
        config.provisioning.password_hash = Some(val);
    }
    if let Some(n) = lookup("PIFLEET_SUBREQUEST_CEILING").and_then(|v| v.parse().ok()) {
        config.monitoring.subrequest_ceiling = n;
    }
    if let Some(n) = lookup("PIFLEET_PROBE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.monitoring.probe_timeout_secs = n;
    }
    if let Some(val) = lookup("PIFLEET_ADMIN_EMAILS") {
        config.auth.admin_emails = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_batch_size_has_headroom() {
        let config = FleetConfig::default();
        assert_eq!(config.monitoring.batch_size(), 40);
        assert_eq!(config.monitoring.outbound_budget(), 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn batch_size_never_zero() {
        let monitoring = MonitoringConfig {
            subrequest_ceiling: 1,
            batch_headroom: 0.5,
            ..MonitoringConfig::default()
        };
        assert_eq!(monitoring.batch_size(), 1);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[fleet]\ndomain = \"h2os.net\"\n\n[monitoring]\nprobe_timeout_secs = 20"
        )
        .unwrap();

        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.fleet.domain, "h2os.net");
        assert_eq!(config.fleet.hostname_suffix, "fleet");
        assert_eq!(config.monitoring.probe_timeout_secs, 20);
        assert_eq!(config.monitoring.subrequest_ceiling, 50);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/pifleet.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PIFLEET_DOMAIN", "fleet.test"),
            ("CLOUDFLARE_API_TOKEN", "cf-token"),
            ("PIFLEET_SUBREQUEST_CEILING", "10"),
            ("PIFLEET_ADMIN_EMAILS", "a@x.io, b@x.io,"),
        ]);
        let mut config = FleetConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(ToString::to_string));

        assert_eq!(config.fleet.domain, "fleet.test");
        assert_eq!(config.cloudflare.api_token, "cf-token");
        assert_eq!(config.monitoring.batch_size(), 8);
        assert_eq!(config.auth.admin_emails, vec!["a@x.io", "b@x.io"]);
    }

    #[test]
    fn budget_below_batch_size_rejected() {
        let mut config = FleetConfig::default();
        config.monitoring.outbound_budget = Some(30);
        assert!(config.validate().is_err());

        config.monitoring.outbound_budget = Some(40);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_headroom_rejected() {
        let mut config = FleetConfig::default();
        config.monitoring.batch_headroom = 1.5;
        assert!(config.validate().is_err());
    }
}
