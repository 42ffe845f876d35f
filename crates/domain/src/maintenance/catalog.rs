//! Maintenance task-type catalog

use fleetledger_core::Txn;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::access;
use crate::context::CallContext;
use crate::error::{EntityKind, LedgerError, Result};

pub const TASK_TYPE_NAMESPACE: &str = "task_types";

/// Lowest allowed priority
pub const MIN_PRIORITY: u8 = 1;
/// Highest allowed priority
pub const MAX_PRIORITY: u8 = 10;

/// Catalog entry describing a recurring maintenance task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceTaskType {
    /// Unique task type identifier, e.g. `OIL`
    pub task_type_id: String,
    pub name: String,
    pub description: String,

    /// Miles between services, always > 0
    pub mileage_interval: u64,

    /// Days between services, always > 0
    pub time_interval_days: u32,

    /// 1 (highest) to 10
    pub priority: u8,
}

impl MaintenanceTaskType {
    pub fn new(
        task_type_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        mileage_interval: u64,
        time_interval_days: u32,
        priority: u8,
    ) -> Self {
        Self {
            task_type_id: task_type_id.into(),
            name: name.into(),
            description: description.into(),
            mileage_interval,
            time_interval_days,
            priority,
        }
    }

    /// Time interval in seconds
    pub fn time_interval_secs(&self) -> u64 {
        u64::from(self.time_interval_days) * 86_400
    }

    /// Check the catalog invariants
    pub fn validate(&self) -> Result<()> {
        if self.task_type_id.is_empty() {
            return Err(LedgerError::InvalidInput("task_type_id cannot be empty".to_string()));
        }
        if self.mileage_interval == 0 || self.time_interval_days == 0 {
            return Err(LedgerError::InvalidInput(format!(
                "invalid interval: mileage {} / days {} must both be greater than 0",
                self.mileage_interval, self.time_interval_days
            )));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(LedgerError::InvalidInput(format!(
                "priority {} outside {}..={}",
                self.priority, MIN_PRIORITY, MAX_PRIORITY
            )));
        }
        Ok(())
    }
}

pub fn get_task_type(txn: &Txn<'_>, task_type_id: &str) -> Result<Option<MaintenanceTaskType>> {
    Ok(txn.get(TASK_TYPE_NAMESPACE, task_type_id)?)
}

pub fn require_task_type(txn: &Txn<'_>, task_type_id: &str) -> Result<MaintenanceTaskType> {
    get_task_type(txn, task_type_id)?
        .ok_or_else(|| LedgerError::not_found(EntityKind::TaskType, task_type_id))
}

pub(crate) fn define_task_type(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    task_type: MaintenanceTaskType,
) -> Result<MaintenanceTaskType> {
    access::ensure_owner(txn, ctx, "define_task_type")?;
    task_type.validate()?;

    if txn.contains(TASK_TYPE_NAMESPACE, &task_type.task_type_id)? {
        return Err(LedgerError::already_exists(
            EntityKind::TaskType,
            &task_type.task_type_id,
        ));
    }

    txn.put(TASK_TYPE_NAMESPACE, &task_type.task_type_id, &task_type)?;

    info!(
        task_type_id = %task_type.task_type_id,
        mileage_interval = task_type.mileage_interval,
        time_interval_days = task_type.time_interval_days,
        priority = task_type.priority,
        "Maintenance task type defined"
    );

    Ok(task_type)
}
