//! Tracing/logging initialisation for the fleet binaries.
//!
//! `EnvFilter` from `RUST_LOG` (falling back to a per-binary default) plus
//! either human-readable or JSON formatting.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- filter used when `RUST_LOG` is unset
///   (e.g. `"pifleet_control=info"`).
/// * `log_json` -- emit structured JSON lines instead of the plain format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let filter = env_filter(default_filter);
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Like [`init_tracing`], additionally exporting spans and metrics over OTLP
/// when `endpoint` is set.
///
/// The returned guard must be held for the lifetime of the process.
#[cfg(feature = "metrics")]
pub fn init_tracing_with_metrics(
    default_filter: &str,
    log_json: bool,
    endpoint: Option<&str>,
) -> Result<Option<crate::metrics::MetricsGuard>, crate::metrics::MetricsError> {
    let Some(endpoint) = endpoint else {
        init_tracing(default_filter, log_json);
        return Ok(None);
    };

    let guard = crate::metrics::init_metrics(endpoint)?;
    let otel = tracing_opentelemetry::layer().with_tracer(guard.tracer());
    let filter = env_filter(default_filter);

    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(otel)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(otel)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(Some(guard))
}
