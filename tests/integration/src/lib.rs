//! Cross-module scenario tests for the fleet ledger
//!
//! This test suite validates:
//! - The full maintenance cycle: schedule, complete, parts, due checks
//! - Geofence violation detection and telemetry history saturation
//! - Call atomicity: failed calls leave no writes and consume no ids
//! - Journal continuity on the SQLite backend and tamper detection


#[cfg(test)]
mod maintenance_cycle_tests;

#[cfg(test)]
mod telemetry_geofence_tests;


#[cfg(test)]
mod journal_integrity_tests;
