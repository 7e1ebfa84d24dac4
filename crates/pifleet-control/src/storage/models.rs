//! Row types and write-side parameter structs for fleet storage.

use serde::{Deserialize, Serialize};

use pifleet_core::{VncAccount, VncUpdate};

/// A registered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub device_id: String,
    pub hostname: String,
    pub tunnel_id: Option<String>,
    pub friendly_name: Option<String>,
    pub location: Option<String>,
    pub vnc_account: Option<String>,
    pub created_at: i64,
    pub last_seen: i64,
}

impl Device {
    /// Parsed VNC account; unknown stored values read as unset.
    pub fn vnc_account(&self) -> Option<VncAccount> {
        self.vnc_account.as_deref().and_then(|v| v.parse().ok())
    }
}

/// Sparse metadata change; `None` / [`VncUpdate::Keep`] leave a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceUpdate {
    pub friendly_name: Option<String>,
    pub location: Option<String>,
    pub vnc_account: VncUpdate,
}

impl DeviceUpdate {
    pub const fn is_empty(&self) -> bool {
        self.friendly_name.is_none() && self.location.is_none() && self.vnc_account.is_keep()
    }
}

/// Stored dashboard preferences for one identity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserPreferences {
    pub email: String,
    /// JSON object, opaque to the control plane.
    pub preferences: String,
    pub updated_at: i64,
}
