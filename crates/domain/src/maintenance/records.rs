//! Completed maintenance records, parts lines and due checks
//!
//! Records and parts lines are written once and never changed. A per
//! (vehicle, task type) [`LastService`] marker is kept alongside so the due
//! checks do not have to scan history.

use fleetledger_core::Txn;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::catalog;
use super::schedule::{self, MaintenanceStatus};
use crate::access;
use crate::context::{CallContext, CompoundKey};
use crate::error::{EntityKind, LedgerError, Result};
use crate::vehicles;

pub const RECORD_NAMESPACE: &str = "maintenance_records";
pub const RECORD_ID_COUNTER: &str = "next_record_id";
pub const PART_NAMESPACE: &str = "parts_replaced";
pub const LAST_SERVICE_NAMESPACE: &str = "last_service";
/// record id → vehicle id
const RECORD_INDEX_NAMESPACE: &str = "record_vehicle";

const SECONDS_PER_DAY: u64 = 86_400;

/// Immutable proof of completed work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub vehicle_id: String,

    /// Global record id
    pub record_id: u64,

    /// Scheduled task this record completes
    pub task_id: u64,

    pub task_type_id: String,

    pub provider_id: String,

    pub technician: String,

    pub notes: Option<String>,

    /// Cost in the fleet's smallest currency unit
    pub cost: u64,

    /// Provider-supplied attestation of the work order
    pub verification_hash: Option<String>,

    pub completion_mileage: u64,

    /// Oracle time of completion
    pub completion_date: u64,
}

/// Input for [`log_completed_maintenance`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub vehicle_id: String,
    pub task_id: u64,
    pub mileage: u64,
    pub provider_id: String,
    pub technician: String,
    pub notes: Option<String>,
    pub cost: u64,
    pub verification_hash: Option<String>,
}

impl CompletionReport {
    pub fn new(
        vehicle_id: impl Into<String>,
        task_id: u64,
        mileage: u64,
        provider_id: impl Into<String>,
        technician: impl Into<String>,
        cost: u64,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            task_id,
            mileage,
            provider_id: provider_id.into(),
            technician: technician.into(),
            notes: None,
            cost,
            verification_hash: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_verification_hash(mut self, hash: impl Into<String>) -> Self {
        self.verification_hash = Some(hash.into());
        self
    }
}

/// One replaced part on a maintenance record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartReplacement {
    pub record_id: u64,
    pub part_index: u32,
    pub name: String,
    pub part_number: String,
    /// Always > 0
    pub quantity: u32,
    pub unit_cost: u64,
}

impl PartReplacement {
    pub fn new(
        record_id: u64,
        part_index: u32,
        name: impl Into<String>,
        part_number: impl Into<String>,
        quantity: u32,
        unit_cost: u64,
    ) -> Self {
        Self {
            record_id,
            part_index,
            name: name.into(),
            part_number: part_number.into(),
            quantity,
            unit_cost,
        }
    }

    pub fn total_cost(&self) -> u64 {
        self.unit_cost.saturating_mul(u64::from(self.quantity))
    }
}

/// Most recent completed service of a task type on a vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastService {
    pub record_id: u64,
    pub mileage: u64,
    pub date: u64,
}

pub fn get_record(
    txn: &Txn<'_>,
    vehicle_id: &str,
    record_id: u64,
) -> Result<Option<MaintenanceRecord>> {
    Ok(txn.get(RECORD_NAMESPACE, CompoundKey(vehicle_id, record_id))?)
}

/// Look a record up by id alone, through the record index
pub fn find_record(txn: &Txn<'_>, record_id: u64) -> Result<Option<MaintenanceRecord>> {
    let Some(vehicle_id) = txn.get::<String>(RECORD_INDEX_NAMESPACE, record_id)? else {
        return Ok(None);
    };
    get_record(txn, &vehicle_id, record_id)
}

pub fn get_part(txn: &Txn<'_>, record_id: u64, part_index: u32) -> Result<Option<PartReplacement>> {
    Ok(txn.get(PART_NAMESPACE, part_key(record_id, part_index))?)
}

pub fn get_last_service(
    txn: &Txn<'_>,
    vehicle_id: &str,
    task_type_id: &str,
) -> Result<Option<LastService>> {
    Ok(txn.get(LAST_SERVICE_NAMESPACE, CompoundKey(vehicle_id, task_type_id))?)
}

fn part_key(record_id: u64, part_index: u32) -> String {
    format!("{}/{}", record_id, part_index)
}

pub(crate) fn log_completed_maintenance(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    report: CompletionReport,
) -> Result<u64> {
    let task = schedule::require_scheduled(txn, &report.vehicle_id, report.task_id)?;
    if task.status != MaintenanceStatus::Scheduled {
        warn!(
            vehicle_id = %report.vehicle_id,
            task_id = report.task_id,
            status = %task.status,
            "Completion attempted on closed task"
        );
        return Err(LedgerError::AlreadyCompleted {
            task_id: report.task_id,
            status: task.status,
        });
    }

    if vehicles::get_provider(txn, &report.provider_id)?.is_none() {
        return Err(LedgerError::not_found(EntityKind::Provider, &report.provider_id));
    }
    if !access::is_authorized_provider(txn, &report.provider_id, ctx.caller)? {
        return Err(access::deny(ctx, "log_completed_maintenance"));
    }

    let task = schedule::transition(
        txn,
        ctx,
        &report.vehicle_id,
        report.task_id,
        MaintenanceStatus::Completed,
    )?;

    let record_id = txn.next_id(RECORD_ID_COUNTER)?;
    let record = MaintenanceRecord {
        vehicle_id: report.vehicle_id,
        record_id,
        task_id: report.task_id,
        task_type_id: task.task_type_id,
        provider_id: report.provider_id,
        technician: report.technician,
        notes: report.notes,
        cost: report.cost,
        verification_hash: report.verification_hash,
        completion_mileage: report.mileage,
        completion_date: ctx.time,
    };
    txn.put(
        RECORD_NAMESPACE,
        CompoundKey(&record.vehicle_id, record_id),
        &record,
    )?;
    txn.put(RECORD_INDEX_NAMESPACE, record_id, &record.vehicle_id)?;
    txn.put(
        LAST_SERVICE_NAMESPACE,
        CompoundKey(&record.vehicle_id, &record.task_type_id),
        &LastService {
            record_id,
            mileage: record.completion_mileage,
            date: record.completion_date,
        },
    )?;

    // A lower completion reading aborts the whole call
    let vehicle = vehicles::require_vehicle(txn, &record.vehicle_id)?;
    vehicles::apply_mileage(txn, vehicle, record.completion_mileage, ctx.time)?;

    info!(
        vehicle_id = %record.vehicle_id,
        task_id = record.task_id,
        record_id = record_id,
        provider_id = %record.provider_id,
        mileage = record.completion_mileage,
        "Maintenance completed"
    );

    Ok(record_id)
}

pub(crate) fn add_parts_replaced(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    part: PartReplacement,
) -> Result<PartReplacement> {
    if part.quantity == 0 {
        return Err(LedgerError::InvalidInput("quantity must be greater than 0".to_string()));
    }

    let record = find_record(txn, part.record_id)?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Record, part.record_id))?;

    if !access::is_authorized_provider(txn, &record.provider_id, ctx.caller)? {
        return Err(access::deny(ctx, "add_parts_replaced"));
    }

    let key = part_key(part.record_id, part.part_index);
    if txn.contains(PART_NAMESPACE, &key)? {
        return Err(LedgerError::already_exists(EntityKind::Part, key));
    }
    txn.put(PART_NAMESPACE, &key, &part)?;

    info!(
        record_id = part.record_id,
        part_index = part.part_index,
        part_number = %part.part_number,
        quantity = part.quantity,
        "Part replacement logged"
    );

    Ok(part)
}

/// Whether the vehicle has run a full mileage interval since the last service
///
/// A task type never serviced on this vehicle counts from mileage 0.
pub fn is_maintenance_due_by_mileage(
    txn: &Txn<'_>,
    vehicle_id: &str,
    task_type_id: &str,
) -> Result<bool> {
    let vehicle = vehicles::require_vehicle(txn, vehicle_id)?;
    let task_type = catalog::require_task_type(txn, task_type_id)?;

    let baseline = get_last_service(txn, vehicle_id, task_type_id)?
        .map(|s| s.mileage)
        .unwrap_or(0);

    Ok(vehicle.mileage >= baseline.saturating_add(task_type.mileage_interval))
}

/// Whether a full time interval has passed since the last service
///
/// A task type never serviced on this vehicle counts from registration.
pub fn is_maintenance_due_by_time(
    txn: &Txn<'_>,
    now: u64,
    vehicle_id: &str,
    task_type_id: &str,
) -> Result<bool> {
    let vehicle = vehicles::require_vehicle(txn, vehicle_id)?;
    let task_type = catalog::require_task_type(txn, task_type_id)?;

    let baseline = get_last_service(txn, vehicle_id, task_type_id)?
        .map(|s| s.date)
        .unwrap_or(vehicle.registered_at);
    let interval = u64::from(task_type.time_interval_days).saturating_mul(SECONDS_PER_DAY);

    Ok(now >= baseline.saturating_add(interval))
}
