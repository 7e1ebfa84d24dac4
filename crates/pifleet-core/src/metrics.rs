//! `OpenTelemetry` export of fleet traces and metrics.
//!
//! Only compiled with the `metrics` feature. Sets up OTLP exporters for
//! traces and metrics and exposes the fleet's instruments.

use std::sync::OnceLock;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};

/// Errors that can occur during metrics / tracing pipeline initialisation.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("OpenTelemetry SDK error: {0}")]
    Sdk(#[from] opentelemetry_sdk::error::OTelSdkError),
}

/// Keeps the `OpenTelemetry` providers alive.
///
/// Dropping does not flush; call [`MetricsGuard::shutdown`] before exit.
pub struct MetricsGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl MetricsGuard {
    pub fn tracer(&self) -> Tracer {
        self.tracer_provider.tracer("pifleet")
    }

    /// Flush and shut down both providers.
    pub fn shutdown(self) -> Result<(), MetricsError> {
        self.tracer_provider.shutdown()?;
        self.meter_provider.shutdown()?;
        Ok(())
    }
}

/// Initialise the OTLP pipeline for traces and metrics.
///
/// * `endpoint` -- OTLP receiver URL, e.g. `"http://localhost:4317"`.
pub fn init_metrics(endpoint: &str) -> Result<MetricsGuard, MetricsError> {
    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(trace_exporter)
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .build();

    global::set_meter_provider(meter_provider.clone());

    Ok(MetricsGuard {
        tracer_provider,
        meter_provider,
    })
}

struct FleetInstruments {
    probe_outcomes: Counter<u64>,
    poll_duration: Histogram<f64>,
}

fn instruments() -> &'static FleetInstruments {
    static INSTRUMENTS: OnceLock<FleetInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("pifleet");
        FleetInstruments {
            probe_outcomes: meter
                .u64_counter("pifleet.probe.outcomes")
                .with_description("Device probe results by status")
                .build(),
            poll_duration: meter
                .f64_histogram("pifleet.poll.duration")
                .with_unit("s")
                .with_description("Wall-clock time of one aggregation pass")
                .build(),
        }
    })
}

/// Count one classified probe.
pub fn record_probe_outcome(status: &str) {
    instruments()
        .probe_outcomes
        .add(1, &[KeyValue::new("status", status.to_string())]);
}

/// Record the duration of one aggregation pass.
pub fn record_poll_duration(seconds: f64, devices: usize) {
    #[allow(clippy::cast_possible_wrap)]
    let devices = devices as i64;
    instruments()
        .poll_duration
        .record(seconds, &[KeyValue::new("devices", devices)]);
}
