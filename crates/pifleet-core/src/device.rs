//! Device identity and mutable metadata vocabulary.
//!
//! A [`DeviceId`] is the immutable primary key of a fleet unit. Everything
//! routable about a device (tunnel name, public hostname) is derived from it
//! deterministically, so re-registering the same id always lands on the same
//! external names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Longest accepted device id.
///
/// The derived hostname label (`{id}-{suffix}`) has to fit in a single DNS
/// label of at most 63 octets.
pub const MAX_DEVICE_ID_LEN: usize = 48;

/// Prefix of the deterministic tunnel name (`{prefix}-{device_id}`).
pub const TUNNEL_NAME_PREFIX: &str = "fleet";

/// Validated device identifier.
///
/// Grammar: `[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]?`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Validate and wrap a raw identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        if is_valid_device_id(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(Error::InvalidDeviceId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Public hostname: `{device_id}-{suffix}.{domain}`.
    pub fn hostname(&self, suffix: &str, domain: &str) -> String {
        format!("{}-{suffix}.{domain}", self.0)
    }

    /// Name of the device's tunnel in the external tunnel service.
    pub fn tunnel_name(&self) -> String {
        format!("{TUNNEL_NAME_PREFIX}-{}", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Check a raw string against the device id grammar.
pub fn is_valid_device_id(raw: &str) -> bool {
    let mut chars = raw.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    raw.len() <= MAX_DEVICE_ID_LEN
        && first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Local account a device's remote-desktop session logs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VncAccount {
    Pizero,
    Pi,
}

impl VncAccount {
    pub const ALL: [Self; 2] = [Self::Pizero, Self::Pi];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pizero => "pizero",
            Self::Pi => "pi",
        }
    }
}

impl fmt::Display for VncAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VncAccount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| Error::InvalidVncAccount(s.to_string()))
    }
}

/// String value that explicitly clears a stored VNC account.
pub const VNC_CLEAR_SENTINEL: &str = "none";

/// Requested change to a device's VNC account in a metadata update.
///
/// An absent field means [`VncUpdate::Keep`]; `null` or the
/// [`VNC_CLEAR_SENTINEL`] mean [`VncUpdate::Clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VncUpdate {
    #[default]
    Keep,
    Clear,
    Set(VncAccount),
}

impl VncUpdate {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw == VNC_CLEAR_SENTINEL {
            Ok(Self::Clear)
        } else {
            raw.parse().map(Self::Set)
        }
    }

    pub const fn is_keep(self) -> bool {
        matches!(self, Self::Keep)
    }

    /// Apply this update to a stored value.
    pub fn apply(self, current: Option<VncAccount>) -> Option<VncAccount> {
        match self {
            Self::Keep => current,
            Self::Clear => None,
            Self::Set(account) => Some(account),
        }
    }
}

/// `deserialize_with` helper for `#[serde(default)]` [`VncUpdate`] fields.
pub fn deserialize_vnc_update<'de, D>(deserializer: D) -> std::result::Result<VncUpdate, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(VncUpdate::Clear),
        Some(raw) => VncUpdate::parse(&raw).map_err(serde::de::Error::custom),
    }
}
