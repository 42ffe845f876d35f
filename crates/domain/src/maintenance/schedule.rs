//! Scheduled maintenance and its lifecycle states

use fleetledger_core::Txn;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use super::catalog;
use crate::context::{CallContext, CompoundKey};
use crate::error::{EntityKind, LedgerError, Result};
use crate::vehicles;

pub const SCHEDULED_NAMESPACE: &str = "scheduled_maintenance";
pub const TASK_ID_COUNTER: &str = "next_task_id";

/// Scheduled task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaintenanceStatus {
    /// Planned, awaiting work
    Scheduled,
    /// Work logged by a provider
    Completed,
    /// Withdrawn by the vehicle owner
    Cancelled,
}

impl MaintenanceStatus {
    /// Check if state is terminal (completed or cancelled)
    pub fn is_terminal(&self) -> bool {
        matches!(self, MaintenanceStatus::Completed | MaintenanceStatus::Cancelled)
    }

    /// Check if transition to new state is valid
    pub fn can_transition_to(&self, new_state: MaintenanceStatus) -> bool {
        match (self, new_state) {
            (MaintenanceStatus::Scheduled, MaintenanceStatus::Completed) => true,
            (MaintenanceStatus::Scheduled, MaintenanceStatus::Cancelled) => true,
            // Terminal states cannot transition
            (MaintenanceStatus::Completed, _) => false,
            (MaintenanceStatus::Cancelled, _) => false,
            _ => false,
        }
    }
}

impl fmt::Display for MaintenanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MaintenanceStatus::Scheduled => "scheduled",
            MaintenanceStatus::Completed => "completed",
            MaintenanceStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Planned maintenance for one vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMaintenance {
    pub vehicle_id: String,

    /// Global task id
    pub task_id: u64,

    /// Catalog entry this task performs
    pub task_type_id: String,

    /// Planned date (Unix seconds)
    pub scheduled_date: u64,

    /// Planned odometer reading
    pub scheduled_mileage: u64,

    pub status: MaintenanceStatus,

    pub notes: Option<String>,

    /// Oracle time of scheduling
    pub created_at: u64,

    /// Oracle time of the last status change
    pub updated_at: u64,
}

/// Input for [`schedule_maintenance`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceRequest {
    pub vehicle_id: String,
    pub task_type_id: String,
    pub scheduled_date: u64,
    pub scheduled_mileage: u64,
    pub notes: Option<String>,
}

impl MaintenanceRequest {
    pub fn new(
        vehicle_id: impl Into<String>,
        task_type_id: impl Into<String>,
        scheduled_date: u64,
        scheduled_mileage: u64,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            task_type_id: task_type_id.into(),
            scheduled_date,
            scheduled_mileage,
            notes: None,
        }
    }

    /// Attach free-form notes
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

pub fn get_scheduled(
    txn: &Txn<'_>,
    vehicle_id: &str,
    task_id: u64,
) -> Result<Option<ScheduledMaintenance>> {
    Ok(txn.get(SCHEDULED_NAMESPACE, CompoundKey(vehicle_id, task_id))?)
}

pub fn require_scheduled(
    txn: &Txn<'_>,
    vehicle_id: &str,
    task_id: u64,
) -> Result<ScheduledMaintenance> {
    get_scheduled(txn, vehicle_id, task_id)?.ok_or_else(|| {
        LedgerError::not_found(EntityKind::ScheduledTask, format!("{}/{}", vehicle_id, task_id))
    })
}

pub(crate) fn schedule_maintenance(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    request: MaintenanceRequest,
) -> Result<u64> {
    let vehicle = vehicles::require_vehicle(txn, &request.vehicle_id)?;
    catalog::require_task_type(txn, &request.task_type_id)?;
    vehicles::ensure_vehicle_owner(ctx, &vehicle, "schedule_maintenance")?;

    if request.scheduled_date <= ctx.time {
        return Err(LedgerError::InvalidTimestamp(format!(
            "scheduled date {} is not after current time {}",
            request.scheduled_date, ctx.time
        )));
    }

    let task_id = txn.next_id(TASK_ID_COUNTER)?;
    let task = ScheduledMaintenance {
        vehicle_id: request.vehicle_id,
        task_id,
        task_type_id: request.task_type_id,
        scheduled_date: request.scheduled_date,
        scheduled_mileage: request.scheduled_mileage,
        status: MaintenanceStatus::Scheduled,
        notes: request.notes,
        created_at: ctx.time,
        updated_at: ctx.time,
    };
    txn.put(
        SCHEDULED_NAMESPACE,
        CompoundKey(&task.vehicle_id, task_id),
        &task,
    )?;

    info!(
        vehicle_id = %task.vehicle_id,
        task_id = task_id,
        task_type_id = %task.task_type_id,
        scheduled_date = task.scheduled_date,
        "Maintenance scheduled"
    );

    Ok(task_id)
}

/// Move a task to `to`, failing with `AlreadyCompleted` from terminal states
pub(crate) fn transition(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    vehicle_id: &str,
    task_id: u64,
    to: MaintenanceStatus,
) -> Result<ScheduledMaintenance> {
    let mut task = require_scheduled(txn, vehicle_id, task_id)?;

    if !task.status.can_transition_to(to) {
        warn!(
            vehicle_id = vehicle_id,
            task_id = task_id,
            from = %task.status,
            to = %to,
            "Rejected maintenance transition"
        );
        return Err(LedgerError::AlreadyCompleted {
            task_id,
            status: task.status,
        });
    }

    task.status = to;
    task.updated_at = ctx.time;
    txn.put(SCHEDULED_NAMESPACE, CompoundKey(vehicle_id, task_id), &task)?;

    Ok(task)
}

pub(crate) fn cancel_scheduled_maintenance(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    vehicle_id: &str,
    task_id: u64,
) -> Result<ScheduledMaintenance> {
    let vehicle = vehicles::require_vehicle(txn, vehicle_id)?;
    vehicles::ensure_vehicle_owner(ctx, &vehicle, "cancel_scheduled_maintenance")?;

    let task = transition(txn, ctx, vehicle_id, task_id, MaintenanceStatus::Cancelled)?;

    info!(vehicle_id = vehicle_id, task_id = task_id, "Maintenance cancelled");
    Ok(task)
}
