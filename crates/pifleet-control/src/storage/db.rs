//! Fleet database handle.

pifleet_core::define_database!(FleetDatabase, "Fleet database migrations complete");
