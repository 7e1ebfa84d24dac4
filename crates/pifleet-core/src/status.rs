//! Per-poll status snapshots and the fleet-wide summary.
//!
//! Snapshots are ephemeral: they are produced fresh on every aggregation
//! pass and never persisted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classification of one device for one poll.
///
/// `Healthy`, `Partial` and `Offline` are the device's own vocabulary and are
/// passed through unchanged; `Timeout` and `MonitoringError` are assigned by
/// the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Healthy,
    Partial,
    Offline,
    Timeout,
    MonitoringError,
}

impl ProbeStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Partial => "partial",
            Self::Offline => "offline",
            Self::Timeout => "timeout",
            Self::MonitoringError => "monitoring_error",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "partial" => Ok(Self::Partial),
            "offline" => Ok(Self::Offline),
            "timeout" => Ok(Self::Timeout),
            "monitoring_error" => Ok(Self::MonitoringError),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// Result of probing one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub device_id: String,
    pub hostname: String,
    pub friendly_name: Option<String>,
    pub location: Option<String>,
    pub status: ProbeStatus,
    pub running_count: Option<u32>,
    pub total_count: Option<u32>,
    /// Latency of the HTTP exchange; `None` when no response arrived.
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
    /// Device-reported body, passed through opaquely.
    pub raw_payload: Option<serde_json::Value>,
}

/// Bucket counts over one aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total: usize,
    pub healthy: usize,
    pub partial: usize,
    pub offline: usize,
    pub timeout: usize,
    pub monitoring_error: usize,
    /// Mean over snapshots with a measured response time, `0` if none.
    pub avg_response_time_ms: u64,
}

impl FleetSummary {
    pub fn from_snapshots(snapshots: &[StatusSnapshot]) -> Self {
        let mut summary = Self {
            total: snapshots.len(),
            ..Self::default()
        };
        let mut timed: u64 = 0;
        let mut time_sum: u64 = 0;

        for snap in snapshots {
            match snap.status {
                ProbeStatus::Healthy => summary.healthy += 1,
                ProbeStatus::Partial => summary.partial += 1,
                ProbeStatus::Offline => summary.offline += 1,
                ProbeStatus::Timeout => summary.timeout += 1,
                ProbeStatus::MonitoringError => summary.monitoring_error += 1,
            }
            if let Some(ms) = snap.response_time_ms {
                timed += 1;
                time_sum = time_sum.saturating_add(ms);
            }
        }

        if timed > 0 {
            // Round to nearest.
            summary.avg_response_time_ms = time_sum.saturating_add(timed / 2) / timed;
        }
        debug_assert_eq!(summary.bucket_sum(), summary.total);
        summary
    }

    /// Sum of all buckets; always equals `total`.
    pub const fn bucket_sum(&self) -> usize {
        self.healthy + self.partial + self.offline + self.timeout + self.monitoring_error
    }
}
