//! Fleet maintenance and telemetry ledger
//!
//! Tamper-evident records of vehicle registration, the maintenance lifecycle
//! (schedule, complete, cancel, parts) and location telemetry with geofence
//! violation detection, gated by role-based authorization.
//!
//! Hosts talk to [`FleetLedger`]. The component modules hold the rules:
//! - [`access`]: owner, fleet managers, devices, provider authorization
//! - [`vehicles`]: vehicle and service-provider registries
//! - [`maintenance`]: task catalog, schedule, records and due checks
//! - [`telemetry`]: current location and circular history
//! - [`geofence`]: boundaries, distance model and violations

pub mod access;
pub mod context;
pub mod error;
pub mod geofence;
pub mod ledger;
pub mod maintenance;
pub mod telemetry;
pub mod vehicles;

pub use access::{Role, RoleGrant};
pub use context::{CallContext, Principal};
pub use error::{EntityKind, LedgerError, Result};
pub use geofence::{BoundaryDefinition, BoundaryViolation, GeofenceBoundary};
pub use ledger::{FleetLedger, LedgerMetrics};
pub use maintenance::{
    CompletionReport, LastService, MaintenanceRecord, MaintenanceRequest, MaintenanceStatus,
    MaintenanceTaskType, PartReplacement, ScheduledMaintenance,
};
pub use telemetry::{HistoryIndex, LocationSample};
pub use vehicles::{NewProvider, NewVehicle, ServiceProvider, Vehicle};

pub use fleetledger_core::{
    HostOracle, JournalEntry, JournalHealth, LedgerConfig, ManualOracle, SystemOracle,
};
