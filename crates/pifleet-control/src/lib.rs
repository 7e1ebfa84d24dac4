//! Pi fleet control plane
//!
//! Library for the `pifleet-control` binary:
//! - Device registry persisted in `SQLite`
//! - Tunnel provisioning against the Cloudflare API (create, reuse, replace)
//! - Fleet status aggregation with bounded concurrent probes
//! - Gateway identity and admin authorization
//! - Axum HTTP surface tying the above together

pub mod auth;
pub mod cloudflare;
pub mod http;
pub mod monitor;
pub mod provisioner;
pub mod storage;
pub mod tunnel;
