//! Maintenance lifecycle ledger
//!
//! Task-type catalog, scheduled tasks, completed records and parts lines.
//! A scheduled task moves one way only:
//!
//! ```text
//! Scheduled ──complete──▶ Completed
//!     │
//!     └──────cancel─────▶ Cancelled
//! ```
//!
//! Completion writes an immutable [`MaintenanceRecord`] and raises the
//! vehicle's mileage in the same call.

pub mod catalog;
pub mod records;
pub mod schedule;

pub use catalog::MaintenanceTaskType;
pub use records::{CompletionReport, LastService, MaintenanceRecord, PartReplacement};
pub use schedule::{MaintenanceRequest, MaintenanceStatus, ScheduledMaintenance};
