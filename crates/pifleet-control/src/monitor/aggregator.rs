//! Batched fan-out over the registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use pifleet_core::config::MonitoringConfig;
use pifleet_core::db::unix_timestamp;
use pifleet_core::{FleetSummary, StatusSnapshot};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, info_span};

use super::classify::classify;
use super::filter::StatusFilter;
use super::probe::{ProbeError, StatusProbe};
use crate::storage::{DatabaseError, Device, FleetDatabase};

/// Point-in-time fleet view.
#[derive(Debug, Clone, Serialize)]
pub struct FleetStatus {
    pub summary: FleetSummary,
    pub devices: Vec<StatusSnapshot>,
    /// Unix seconds at which the pass finished.
    pub timestamp: i64,
}

/// Probes every registered device in fixed-size sequential batches.
///
/// Holds no state between passes, so overlapping passes never see each
/// other. Each pass gets its own outbound budget: a probe that finds that
/// budget empty is reported as `monitoring_error` instead of being sent.
pub struct FleetMonitor {
    probe: Arc<dyn StatusProbe>,
    batch_size: usize,
    probe_timeout: Duration,
    outbound_budget: usize,
}

impl FleetMonitor {
    pub fn new(
        probe: Arc<dyn StatusProbe>,
        batch_size: usize,
        probe_timeout: Duration,
        outbound_budget: usize,
    ) -> Self {
        Self {
            probe,
            batch_size: batch_size.max(1),
            probe_timeout,
            outbound_budget: outbound_budget.max(1),
        }
    }

    pub fn from_config(probe: Arc<dyn StatusProbe>, config: &MonitoringConfig) -> Self {
        Self::new(
            probe,
            config.batch_size(),
            Duration::from_secs(config.probe_timeout_secs),
            config.outbound_budget(),
        )
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Read the registry once, probe it, summarize, then filter.
    ///
    /// Only a registry read failure is an error; device failures are data.
    pub async fn fleet_status(
        &self,
        db: &FleetDatabase,
        filter: &StatusFilter,
    ) -> Result<FleetStatus, DatabaseError> {
        let devices = db.list_devices().await?;
        let snapshots = self.poll(&devices).await;
        let summary = FleetSummary::from_snapshots(&snapshots);
        Ok(FleetStatus {
            summary,
            devices: filter.apply(snapshots),
            timestamp: unix_timestamp(),
        })
    }

    /// One snapshot per device, in input order.
    pub async fn poll(&self, devices: &[Device]) -> Vec<StatusSnapshot> {
        let span = info_span!(
            "fleet_poll",
            pass_id = %uuid::Uuid::new_v4(),
            devices = devices.len(),
            batch_size = self.batch_size,
        );
        async {
            let started = Instant::now();
            let budget = Semaphore::new(self.outbound_budget);
            let mut snapshots = Vec::with_capacity(devices.len());
            for (index, batch) in devices.chunks(self.batch_size).enumerate() {
                let results = join_all(batch.iter().map(|d| self.probe_one(&budget, d))).await;
                debug!(batch = index, size = batch.len(), "Batch complete");
                snapshots.extend(results);
            }

            #[cfg(feature = "metrics")]
            pifleet_core::metrics::record_poll_duration(
                started.elapsed().as_secs_f64(),
                devices.len(),
            );
            info!(elapsed = ?started.elapsed(), "Fleet poll complete");
            snapshots
        }
        .instrument(span)
        .await
    }

    async fn probe_one(&self, budget: &Semaphore, device: &Device) -> StatusSnapshot {
        let outcome = match budget.try_acquire() {
            Ok(_permit) => {
                tokio::time::timeout(self.probe_timeout, self.probe.fetch_status(&device.hostname))
                    .await
                    .unwrap_or(Err(ProbeError::Timeout))
            }
            Err(_) => Err(ProbeError::QuotaExhausted),
        };
        if let Err(e) = &outcome {
            debug!(device_id = %device.device_id, error = %e, "Probe failed");
        }

        let c = classify(&outcome);

        #[cfg(feature = "metrics")]
        pifleet_core::metrics::record_probe_outcome(c.status.as_str());

        StatusSnapshot {
            device_id: device.device_id.clone(),
            hostname: device.hostname.clone(),
            friendly_name: device.friendly_name.clone(),
            location: device.location.clone(),
            status: c.status,
            running_count: c.running_count,
            total_count: c.total_count,
            response_time_ms: c.response_time_ms,
            error: c.error,
            raw_payload: c.raw_payload,
        }
    }
}
