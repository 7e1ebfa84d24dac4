//! Fleet status aggregation.
//!
//! Fans a `GET /status` out to every registered device in sequential
//! batches sized under the outbound concurrency ceiling, classifies each
//! outcome, and summarizes the fleet.

mod aggregator;
pub mod classify;
pub mod filter;
pub mod probe;

#[cfg(test)]
mod tests;

pub use aggregator::{FleetMonitor, FleetStatus};
pub use filter::StatusFilter;
pub use probe::{HttpStatusProbe, ProbeError, ProbeResponse, StatusProbe};
