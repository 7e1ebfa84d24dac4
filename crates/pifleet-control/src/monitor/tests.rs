//! Aggregator tests with a scripted probe.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pifleet_core::ProbeStatus;

use super::probe::{ProbeError, ProbeResponse, StatusProbe};
use super::{FleetMonitor, StatusFilter};
use crate::storage::{Device, DeviceUpsert, FleetDatabase};

#[derive(Clone)]
enum Script {
    Reply { delay_ms: u64, body: String },
    Status(u16),
    Hang,
}

fn reply(status: &str, delay_ms: u64) -> Script {
    Script::Reply {
        delay_ms,
        body: format!(r#"{{"status":"{status}","running":2,"total":3}}"#),
    }
}

/// Replies per hostname and records peak concurrency.
struct ScriptedProbe {
    scripts: HashMap<String, Script>,
    fallback: Script,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProbe {
    fn new(fallback: Script) -> Self {
        Self {
            scripts: HashMap::new(),
            fallback,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn with(mut self, device_id: &str, script: Script) -> Self {
        self.scripts.insert(hostname(device_id), script);
        self
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusProbe for ScriptedProbe {
    async fn fetch_status(&self, hostname: &str) -> Result<ProbeResponse, ProbeError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let script = self.scripts.get(hostname).unwrap_or(&self.fallback).clone();
        match script {
            Script::Reply { delay_ms, body } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(ProbeResponse {
                    http_status: 200,
                    body: body.into_bytes(),
                    elapsed: Duration::from_millis(delay_ms),
                })
            }
            Script::Status(code) => Ok(ProbeResponse {
                http_status: code,
                body: Vec::new(),
                elapsed: Duration::from_millis(10),
            }),
            Script::Hang => std::future::pending().await,
        }
    }
}

fn hostname(device_id: &str) -> String {
    format!("{device_id}-fleet.example.com")
}

fn device(id: &str) -> Device {
    Device {
        device_id: id.to_string(),
        hostname: hostname(id),
        tunnel_id: Some(format!("t-{id}")),
        friendly_name: None,
        location: None,
        vnc_account: None,
        created_at: 0,
        last_seen: 0,
    }
}

fn devices(n: usize) -> Vec<Device> {
    (0..n).map(|i| device(&format!("pi{i:02}"))).collect()
}

#[tokio::test]
async fn in_flight_never_exceeds_batch_size() {
    let batch = 4;
    let probe = Arc::new(ScriptedProbe::new(reply("healthy", 20)));
    let monitor = FleetMonitor::new(probe.clone(), batch, Duration::from_secs(5), 100);

    let fleet = devices(3 * batch + 1);
    let snapshots = monitor.poll(&fleet).await;

    assert_eq!(snapshots.len(), fleet.len());
    assert!(probe.peak() <= batch, "peak {} > {batch}", probe.peak());
    assert_eq!(probe.peak(), batch);
    assert!(snapshots.iter().all(|s| s.status == ProbeStatus::Healthy));
}

#[tokio::test]
async fn results_follow_registry_order_not_arrival() {
    let probe = ScriptedProbe::new(reply("healthy", 1))
        .with("pi00", reply("healthy", 60))
        .with("pi01", reply("partial", 30));
    let monitor = FleetMonitor::new(Arc::new(probe), 10, Duration::from_secs(5), 100);

    let ids: Vec<_> = monitor
        .poll(&devices(3))
        .await
        .into_iter()
        .map(|s| s.device_id)
        .collect();
    assert_eq!(ids, ["pi00", "pi01", "pi02"]);
}

#[tokio::test]
async fn one_hanging_device_times_out_alone() {
    let probe = ScriptedProbe::new(reply("healthy", 10)).with("pi02", Script::Hang);
    let timeout = Duration::from_millis(200);
    let monitor = FleetMonitor::new(Arc::new(probe), 5, timeout, 100);

    let started = Instant::now();
    let snapshots = monitor.poll(&devices(5)).await;
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    for snap in &snapshots {
        if snap.device_id == "pi02" {
            assert_eq!(snap.status, ProbeStatus::Timeout);
            assert!(snap.response_time_ms.is_none());
            assert!(snap.error.is_some());
        } else {
            assert_eq!(snap.status, ProbeStatus::Healthy, "{}", snap.device_id);
            assert_eq!(snap.running_count, Some(2));
        }
    }
}

#[tokio::test]
async fn empty_budget_is_monitoring_error_not_offline() {
    let monitor = FleetMonitor::new(
        Arc::new(ScriptedProbe::new(reply("healthy", 50))),
        4,
        Duration::from_secs(5),
        2,
    );
    let snapshots = monitor.poll(&devices(4)).await;
    let statuses: Vec<_> = snapshots.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        [
            ProbeStatus::Healthy,
            ProbeStatus::Healthy,
            ProbeStatus::MonitoringError,
            ProbeStatus::MonitoringError
        ]
    );

    // The next pass starts with a fresh budget.
    let again = monitor.poll(&devices(2)).await;
    assert!(again.iter().all(|s| s.status == ProbeStatus::Healthy));
}

#[tokio::test]
async fn overlapping_passes_do_not_share_budget() {
    let config = pifleet_core::config::MonitoringConfig::default();
    let monitor = FleetMonitor::from_config(
        Arc::new(ScriptedProbe::new(reply("healthy", 30))),
        &config,
    );

    let fleet = devices(config.batch_size());
    let (first, second) = tokio::join!(monitor.poll(&fleet), monitor.poll(&fleet));

    for pass in [&first, &second] {
        assert_eq!(pass.len(), fleet.len());
        assert!(
            pass.iter().all(|s| s.status == ProbeStatus::Healthy),
            "a pass reported {} monitoring errors",
            pass.iter()
                .filter(|s| s.status == ProbeStatus::MonitoringError)
                .count()
        );
    }
}

#[tokio::test]
async fn summary_counts_known_statuses() {
    let probe = ScriptedProbe::new(reply("healthy", 10))
        .with("pi03", reply("partial", 10))
        .with("pi04", Script::Status(530))
        .with("pi05", reply("offline", 10));
    let monitor = FleetMonitor::new(Arc::new(probe), 40, Duration::from_secs(5), 100);

    let snapshots = monitor.poll(&devices(6)).await;
    let summary = pifleet_core::FleetSummary::from_snapshots(&snapshots);

    assert_eq!(summary.total, 6);
    assert_eq!(summary.healthy, 3);
    assert_eq!(summary.partial, 1);
    assert_eq!(summary.offline, 2);
    assert_eq!(summary.timeout, 0);
    assert_eq!(summary.bucket_sum(), summary.total);
}

#[tokio::test]
async fn fleet_status_filters_after_summarizing() {
    let db = FleetDatabase::open_in_memory().await.unwrap();
    for (id, location) in [("pi01", "North"), ("pi02", "North"), ("pi03", "South")] {
        db.upsert_device(&DeviceUpsert {
            device_id: id,
            hostname: &hostname(id),
            tunnel_id: &format!("t-{id}"),
            friendly_name: None,
            location: Some(location),
            vnc_account: None,
        })
        .await
        .unwrap();
    }
    let probe = ScriptedProbe::new(reply("healthy", 5)).with("pi02", Script::Status(502));
    let monitor = FleetMonitor::new(Arc::new(probe), 40, Duration::from_secs(5), 100);

    let filter = StatusFilter {
        status: Some("offline".into()),
        ..StatusFilter::default()
    };
    let status = monitor.fleet_status(&db, &filter).await.unwrap();

    assert_eq!(status.summary.total, 3);
    assert_eq!(status.summary.offline, 1);
    assert_eq!(status.devices.len(), 1);
    assert_eq!(status.devices[0].device_id, "pi02");
    assert_eq!(status.devices[0].location.as_deref(), Some("North"));
    assert!(status.timestamp > 0);
}

#[tokio::test]
async fn empty_fleet_has_zero_average() {
    let db = FleetDatabase::open_in_memory().await.unwrap();
    let monitor = FleetMonitor::new(
        Arc::new(ScriptedProbe::new(Script::Hang)),
        40,
        Duration::from_secs(1),
        100,
    );
    let status = monitor
        .fleet_status(&db, &StatusFilter::default())
        .await
        .unwrap();
    assert_eq!(status.summary.total, 0);
    assert_eq!(status.summary.avg_response_time_ms, 0);
    assert!(status.devices.is_empty());
}
