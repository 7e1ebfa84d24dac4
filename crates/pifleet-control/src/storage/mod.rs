//! SQLite storage for the fleet control plane.
//!
//! Device registry plus per-user dashboard preferences.

mod db;
mod models;
mod queries;
mod queries_preferences;


pub use db::FleetDatabase;
pub use models::*;
pub use pifleet_core::db::DatabaseError;
pub use queries::DeviceUpsert;
