//! Pi fleet control plane
//!
//! HTTP service that registers devices, provisions their tunnels and reports
//! fleet status.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tracing::{info, warn};

use pifleet_control::auth::password::hash_password;
use pifleet_control::cloudflare::CloudflareClient;
use pifleet_control::http::{AppState, build_router};
use pifleet_control::monitor::HttpStatusProbe;
use pifleet_control::storage::FleetDatabase;
use pifleet_control::tunnel::{InMemoryTunnelApi, TunnelApi};
use pifleet_core::config::{default_database_path, load_config};

const DEFAULT_LOG_FILTER: &str = "pifleet_control=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "pifleet-control")]
#[command(
    version,
    about = "Pi fleet control plane - device registry, tunnels and fleet status"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Address to listen on. Overrides `server.addr` from the config file.
    #[arg(long, env = "PIFLEET_ADDR")]
    addr: Option<SocketAddr>,

    /// Path to the TOML config file.
    #[arg(long, env = "PIFLEET_CONFIG")]
    config: Option<PathBuf>,

    /// Path to SQLite database file.
    #[arg(long, env = "PIFLEET_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Tunnel provider backend.
    #[arg(long, value_enum, default_value_t = TunnelBackend::Cloudflare)]
    tunnel_backend: TunnelBackend,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    /// OTLP endpoint for traces and metrics export.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    metrics_endpoint: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an argon2 hash for `provisioning.password_hash`.
    HashPassword {
        #[arg(long, env = "PIFLEET_PASSWORD")]
        password: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TunnelBackend {
    Cloudflare,
    /// Process-local fake; nothing is provisioned externally.
    Memory,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(Command::HashPassword { password }) = &args.command {
        let hash = hash_password(password).map_err(|e| anyhow::anyhow!("hashing failed: {e}"))?;
        print_line(&hash);
        return Ok(());
    }

    #[cfg(feature = "metrics")]
    let metrics_guard = pifleet_core::tracing_init::init_tracing_with_metrics(
        DEFAULT_LOG_FILTER,
        args.log_json,
        args.metrics_endpoint.as_deref(),
    )?;
    #[cfg(not(feature = "metrics"))]
    pifleet_core::tracing_init::init_tracing(DEFAULT_LOG_FILTER, args.log_json);

    let config = load_config(args.config.as_deref()).context("loading configuration")?;
    let addr = match args.addr {
        Some(addr) => addr,
        None => config
            .server
            .addr
            .parse()
            .with_context(|| format!("invalid server.addr: {}", config.server.addr))?,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        domain = %config.fleet.domain,
        "Starting pifleet-control"
    );

    let db_path = args
        .db_path
        .clone()
        .or_else(|| config.server.database_path.clone())
        .or_else(default_database_path)
        .context("cannot determine database path")?;
    info!(path = %db_path.display(), "Opening fleet database");
    let db = FleetDatabase::open(&db_path).await?;
    info!(devices = db.count_devices().await?, "Fleet registry loaded");

    let tunnels: Arc<dyn TunnelApi> = match args.tunnel_backend {
        TunnelBackend::Cloudflare => Arc::new(CloudflareClient::new(&config.cloudflare)?),
        TunnelBackend::Memory => {
            warn!("Using in-memory tunnel backend; devices will not be reachable");
            Arc::new(InMemoryTunnelApi::new())
        }
    };
    let probe = Arc::new(HttpStatusProbe::new(Duration::from_secs(
        config.monitoring.probe_timeout_secs,
    ))?);

    let state = AppState::from_config(&config, db, tunnels, probe)?;
    if !state.provisioner.registration_open() {
        warn!("No provisioning password hash configured; registration is closed");
    }
    info!(
        batch_size = state.monitor.batch_size(),
        admins = config.auth.admin_emails.len(),
        "Fleet services ready"
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("pifleet-control stopped");

    #[cfg(feature = "metrics")]
    if let Some(Err(e)) = metrics_guard.map(|guard| guard.shutdown()) {
        warn!(error = %e, "Failed to flush telemetry");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal, stopping");
}

#[allow(clippy::print_stdout)]
fn print_line(line: &str) {
    println!("{line}");
}
