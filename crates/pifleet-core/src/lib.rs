//! Pi fleet core library
//!
//! Shared functionality for the fleet control plane:
//! - Device identity, hostname derivation and metadata vocabulary
//! - Status snapshot and fleet summary types
//! - Configuration resolution (defaults, TOML file, environment)
//! - `SQLite` helpers shared by storage layers
//! - Tracing (and optional `OpenTelemetry`) initialisation

pub mod config;
pub mod db;
pub mod device;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod status;
pub mod tracing_init;

pub use config::FleetConfig;
pub use device::{DeviceId, VncAccount, VncUpdate};
pub use error::{Error, Result};
pub use status::{FleetSummary, ProbeStatus, StatusSnapshot};
