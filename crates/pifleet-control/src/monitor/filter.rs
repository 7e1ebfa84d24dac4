//! Result filters for the fleet status view.
//!
//! Filters narrow the returned device list only. They run after the summary
//! is computed, so the summary always describes the whole fleet.

use pifleet_core::{ProbeStatus, StatusSnapshot};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusFilter {
    /// Exact bucket name; `all` or empty means no filter.
    pub status: Option<String>,
    /// Case-insensitive substring of the device location.
    pub location: Option<String>,
    /// Case-insensitive substring of the device id.
    pub device: Option<String>,
}

fn normalized(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

impl StatusFilter {
    pub fn is_empty(&self) -> bool {
        self.status_term().is_none()
            && normalized(self.location.as_ref()).is_none()
            && normalized(self.device.as_ref()).is_none()
    }

    fn status_term(&self) -> Option<String> {
        normalized(self.status.as_ref()).filter(|s| s != "all")
    }

    /// Requested bucket, `Ok(None)` when unfiltered.
    pub fn status(&self) -> Result<Option<ProbeStatus>, String> {
        self.status_term().map(|s| s.parse::<ProbeStatus>()).transpose()
    }

    /// An unknown status name matches nothing.
    pub fn matches(&self, snap: &StatusSnapshot) -> bool {
        match self.status() {
            Ok(Some(wanted)) if snap.status != wanted => return false,
            Err(_) => return false,
            _ => {}
        }
        if let Some(location) = normalized(self.location.as_ref()) {
            let hit = snap
                .location
                .as_deref()
                .is_some_and(|l| l.to_lowercase().contains(&location));
            if !hit {
                return false;
            }
        }
        if let Some(device) = normalized(self.device.as_ref()) {
            if !snap.device_id.to_lowercase().contains(&device) {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, snapshots: Vec<StatusSnapshot>) -> Vec<StatusSnapshot> {
        if self.is_empty() {
            return snapshots;
        }
        snapshots.into_iter().filter(|s| self.matches(s)).collect()
    }
}
