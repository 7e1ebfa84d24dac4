//! Probe outcome to status bucket.
//!
//! Precedence:
//! 1. timeout -> `timeout`
//! 2. outbound budget exhausted -> `monitoring_error`
//! 3. non-2xx response (including the tunnel error code) -> `offline`
//! 4. 2xx JSON body -> the device's own `status`, verbatim
//! 5. anything else -> `offline`

use pifleet_core::ProbeStatus;
use serde::Deserialize;
use serde_json::Value;

use super::probe::{ProbeError, ProbeResponse};

/// Status the edge returns when a tunnel has no live connector.
pub const TUNNEL_ERROR_STATUS: u16 = 530;

/// Everything a snapshot needs from one probe outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: ProbeStatus,
    pub running_count: Option<u32>,
    pub total_count: Option<u32>,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
    pub raw_payload: Option<Value>,
}

impl Classification {
    fn failed(status: ProbeStatus, error: impl Into<String>) -> Self {
        Self {
            status,
            running_count: None,
            total_count: None,
            response_time_ms: None,
            error: Some(error.into()),
            raw_payload: None,
        }
    }
}

/// Fields of the device payload the aggregator reads.
#[derive(Deserialize)]
struct DeviceStatusBody {
    status: Option<String>,
    running: Option<u32>,
    total: Option<u32>,
}

pub fn classify(outcome: &Result<ProbeResponse, ProbeError>) -> Classification {
    let resp = match outcome {
        Err(ProbeError::Timeout) => {
            return Classification::failed(ProbeStatus::Timeout, "Request timed out");
        }
        Err(ProbeError::QuotaExhausted) => {
            return Classification::failed(
                ProbeStatus::MonitoringError,
                "Monitoring capacity exhausted",
            );
        }
        Err(ProbeError::Failed(msg)) => {
            return Classification::failed(ProbeStatus::Offline, msg.clone());
        }
        Ok(resp) => resp,
    };

    let response_time_ms = Some(u64::try_from(resp.elapsed.as_millis()).unwrap_or(u64::MAX));

    if !(200..300).contains(&resp.http_status) {
        let error = if resp.http_status == TUNNEL_ERROR_STATUS {
            "Tunnel unreachable".to_string()
        } else {
            format!("HTTP {}", resp.http_status)
        };
        return Classification {
            response_time_ms,
            ..Classification::failed(ProbeStatus::Offline, error)
        };
    }

    let Ok(raw) = serde_json::from_slice::<Value>(&resp.body) else {
        return Classification {
            response_time_ms,
            ..Classification::failed(ProbeStatus::Offline, "Invalid status payload")
        };
    };
    let parsed = serde_json::from_value::<DeviceStatusBody>(raw.clone()).ok();
    let reported = parsed
        .as_ref()
        .and_then(|b| b.status.as_deref())
        .and_then(device_status);

    match (reported, parsed) {
        (Some(status), Some(body)) => Classification {
            status,
            running_count: body.running,
            total_count: body.total,
            response_time_ms,
            error: None,
            raw_payload: Some(raw),
        },
        _ => Classification {
            response_time_ms,
            raw_payload: Some(raw),
            ..Classification::failed(ProbeStatus::Offline, "Unrecognized device status")
        },
    }
}

/// The device's own vocabulary; control-plane-only buckets are not accepted
/// from a payload.
fn device_status(s: &str) -> Option<ProbeStatus> {
    match s {
        "healthy" => Some(ProbeStatus::Healthy),
        "partial" => Some(ProbeStatus::Partial),
        "offline" => Some(ProbeStatus::Offline),
        _ => None,
    }
}
