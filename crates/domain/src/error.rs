//! Ledger errors
//!
//! Every failure is a returned value. The first failing check aborts the call
//! and nothing it staged reaches storage.

use fleetledger_core::{ConfigError, StoreError};
use std::fmt;
use thiserror::Error;

use crate::maintenance::MaintenanceStatus;

/// Kind of entity a lookup or creation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Vehicle,
    TaskType,
    ScheduledTask,
    Provider,
    Record,
    Part,
    Boundary,
    Violation,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Vehicle => "Vehicle",
            EntityKind::TaskType => "Task type",
            EntityKind::ScheduledTask => "Scheduled task",
            EntityKind::Provider => "Service provider",
            EntityKind::Record => "Maintenance record",
            EntityKind::Part => "Part line",
            EntityKind::Boundary => "Geofence boundary",
            EntityKind::Violation => "Boundary violation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Not authorized: {caller} may not {action}")]
    NotAuthorized { caller: String, action: &'static str },

    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: EntityKind, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid mileage: current {current}, proposed {proposed}")]
    InvalidMileage { current: u64, proposed: u64 },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Task {task_id} is already {status}")]
    AlreadyCompleted { task_id: u64, status: MaintenanceStatus },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl LedgerError {
    pub(crate) fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn already_exists(kind: EntityKind, id: impl ToString) -> Self {
        LedgerError::AlreadyExists {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
