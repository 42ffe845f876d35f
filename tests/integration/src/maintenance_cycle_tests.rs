//! End-to-end maintenance lifecycle
//!
//! Walks a task from scheduling through completion, parts logging and the
//! due checks, and confirms the terminal states hold.

use crate::test_utils::{init_tracing, Fixture, DAY, START_TIME};
use fleetledger_domain::{
    CompletionReport, EntityKind, LedgerError, MaintenanceRequest, MaintenanceStatus,
    PartReplacement,
};

fn schedule_oil_change(fx: &mut Fixture) -> u64 {
    let owner = fx.actors.owner.clone();
    fx.ledger
        .schedule_maintenance(
            &owner,
            MaintenanceRequest::new("V1", "OIL", START_TIME + 7 * DAY, 5_000)
                .with_notes("Synthetic 5W-30"),
        )
        .expect("Failed to schedule maintenance")
}

fn complete(fx: &mut Fixture, task_id: u64, mileage: u64) -> Result<u64, LedgerError> {
    let provider = fx.actors.provider.clone();
    fx.ledger.log_completed_maintenance(
        &provider,
        CompletionReport::new("V1", task_id, mileage, "P1", "Dana Reyes", 8_950)
            .with_verification_hash("9f2c1e"),
    )
}

#[test]
fn test_oil_change_cycle() -> anyhow::Result<()> {
    init_tracing();
    let mut fx = Fixture::new();

    let task_id = schedule_oil_change(&mut fx);
    assert_eq!(task_id, 1);

    let scheduled = fx.ledger.get_scheduled_maintenance("V1", 1)?.unwrap();
    assert_eq!(scheduled.status, MaintenanceStatus::Scheduled);
    assert_eq!(scheduled.notes.as_deref(), Some("Synthetic 5W-30"));

    fx.oracle.advance(DAY);
    let record_id = complete(&mut fx, task_id, 5_200)?;
    assert_eq!(record_id, 1);

    let task = fx.ledger.get_scheduled_maintenance("V1", 1)?.unwrap();
    assert_eq!(task.status, MaintenanceStatus::Completed);
    assert_eq!(task.updated_at, START_TIME + DAY);

    let vehicle = fx.ledger.get_vehicle("V1")?.unwrap();
    assert_eq!(vehicle.mileage, 5_200);

    let record = fx.ledger.get_maintenance_record("V1", 1)?.unwrap();
    assert_eq!(record.task_type_id, "OIL");
    assert_eq!(record.provider_id, "P1");
    assert_eq!(record.completion_mileage, 5_200);
    assert_eq!(record.verification_hash.as_deref(), Some("9f2c1e"));
    assert!(record.notes.is_none());
    assert_eq!(fx.ledger.find_maintenance_record(1)?, Some(record));

    let owner = fx.actors.owner.clone();
    let cancel = fx.ledger.cancel_scheduled_maintenance(&owner, "V1", task_id);
    assert!(matches!(
        cancel,
        Err(LedgerError::AlreadyCompleted {
            task_id: 1,
            status: MaintenanceStatus::Completed
        })
    ));

    Ok(())
}

#[test]
fn test_task_completes_only_once() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let task_id = schedule_oil_change(&mut fx);

    complete(&mut fx, task_id, 5_200)?;
    let second = complete(&mut fx, task_id, 5_300);
    assert!(matches!(second, Err(LedgerError::AlreadyCompleted { .. })));

    // The second attempt changed nothing
    assert_eq!(fx.ledger.get_vehicle("V1")?.unwrap().mileage, 5_200);
    assert!(fx.ledger.get_maintenance_record("V1", 2)?.is_none());
    Ok(())
}

#[test]
fn test_cancelled_task_cannot_complete() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let task_id = schedule_oil_change(&mut fx);
    let owner = fx.actors.owner.clone();

    let cancelled = fx.ledger.cancel_scheduled_maintenance(&owner, "V1", task_id)?;
    assert_eq!(cancelled.status, MaintenanceStatus::Cancelled);

    let result = complete(&mut fx, task_id, 5_200);
    assert!(matches!(
        result,
        Err(LedgerError::AlreadyCompleted {
            status: MaintenanceStatus::Cancelled,
            ..
        })
    ));
    Ok(())
}

#[test]
fn test_cancelled_task_cannot_be_cancelled_again() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let task_id = schedule_oil_change(&mut fx);
    let owner = fx.actors.owner.clone();

    fx.ledger.cancel_scheduled_maintenance(&owner, "V1", task_id)?;
    let journal_len = fx.ledger.journal_len()?;

    let again = fx.ledger.cancel_scheduled_maintenance(&owner, "V1", task_id);
    assert!(matches!(
        again,
        Err(LedgerError::AlreadyCompleted {
            status: MaintenanceStatus::Cancelled,
            ..
        })
    ));
    assert_eq!(fx.ledger.journal_len()?, journal_len);
    Ok(())
}

#[test]
fn test_schedule_rules() {
    let mut fx = Fixture::new();
    let owner = fx.actors.owner.clone();
    let manager = fx.actors.manager.clone();

    let past = fx
        .ledger
        .schedule_maintenance(&owner, MaintenanceRequest::new("V1", "OIL", START_TIME, 5_000));
    assert!(matches!(past, Err(LedgerError::InvalidTimestamp(_))));

    let unknown_type = fx.ledger.schedule_maintenance(
        &owner,
        MaintenanceRequest::new("V1", "BRAKES", START_TIME + DAY, 5_000),
    );
    assert!(matches!(
        unknown_type,
        Err(LedgerError::NotFound {
            kind: EntityKind::TaskType,
            ..
        })
    ));

    let unknown_vehicle = fx.ledger.schedule_maintenance(
        &owner,
        MaintenanceRequest::new("V9", "OIL", START_TIME + DAY, 5_000),
    );
    assert!(matches!(
        unknown_vehicle,
        Err(LedgerError::NotFound {
            kind: EntityKind::Vehicle,
            ..
        })
    ));

    // Fleet managers are not the vehicle's owner
    let not_owner = fx.ledger.schedule_maintenance(
        &manager,
        MaintenanceRequest::new("V1", "OIL", START_TIME + DAY, 5_000),
    );
    assert!(matches!(not_owner, Err(LedgerError::NotAuthorized { .. })));
}

#[test]
fn test_completion_requires_authorized_provider() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let task_id = schedule_oil_change(&mut fx);
    let owner = fx.actors.owner.clone();
    let stranger = fx.actors.stranger.clone();

    let impostor = fx.ledger.log_completed_maintenance(
        &stranger,
        CompletionReport::new("V1", task_id, 5_200, "P1", "Nobody", 0),
    );
    assert!(matches!(impostor, Err(LedgerError::NotAuthorized { .. })));

    let unknown = fx.ledger.log_completed_maintenance(
        &fx.actors.provider.clone(),
        CompletionReport::new("V1", task_id, 5_200, "P9", "Dana Reyes", 0),
    );
    assert!(matches!(
        unknown,
        Err(LedgerError::NotFound {
            kind: EntityKind::Provider,
            ..
        })
    ));

    fx.ledger.set_provider_authorization(&owner, "P1", false)?;
    assert!(!fx.ledger.is_authorized_provider("P1", &fx.actors.provider)?);
    let revoked = complete(&mut fx, task_id, 5_200);
    assert!(matches!(revoked, Err(LedgerError::NotAuthorized { .. })));

    fx.ledger.set_provider_authorization(&owner, "P1", true)?;
    assert_eq!(complete(&mut fx, task_id, 5_200)?, 1);
    Ok(())
}

#[test]
fn test_parts_replaced_policy() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let task_id = schedule_oil_change(&mut fx);
    let record_id = complete(&mut fx, task_id, 5_200)?;
    let provider = fx.actors.provider.clone();
    let owner = fx.actors.owner.clone();

    let filter = PartReplacement::new(record_id, 0, "Oil filter", "OF-221", 1, 1_250);
    let logged = fx.ledger.add_parts_replaced(&provider, filter.clone())?;
    assert_eq!(logged, filter);
    assert_eq!(fx.ledger.get_part(record_id, 0)?, Some(filter));

    let duplicate = fx.ledger.add_parts_replaced(
        &provider,
        PartReplacement::new(record_id, 0, "Drain plug", "DP-7", 1, 300),
    );
    assert!(matches!(
        duplicate,
        Err(LedgerError::AlreadyExists {
            kind: EntityKind::Part,
            ..
        })
    ));

    // Only the record's provider may attach parts
    let by_owner = fx.ledger.add_parts_replaced(
        &owner,
        PartReplacement::new(record_id, 1, "Oil", "5W30-5L", 1, 4_000),
    );
    assert!(matches!(by_owner, Err(LedgerError::NotAuthorized { .. })));

    let zero = fx.ledger.add_parts_replaced(
        &provider,
        PartReplacement::new(record_id, 1, "Oil", "5W30-5L", 0, 4_000),
    );
    assert!(matches!(zero, Err(LedgerError::InvalidInput(_))));

    let missing = fx.ledger.add_parts_replaced(
        &provider,
        PartReplacement::new(42, 0, "Oil", "5W30-5L", 1, 4_000),
    );
    assert!(matches!(
        missing,
        Err(LedgerError::NotFound {
            kind: EntityKind::Record,
            ..
        })
    ));

    fx.ledger.add_parts_replaced(
        &provider,
        PartReplacement::new(record_id, 1, "Oil", "5W30-5L", 5, 800),
    )?;
    assert_eq!(fx.ledger.get_part(record_id, 1)?.unwrap().total_cost(), 4_000);
    Ok(())
}

#[test]
fn test_due_checks_track_last_service() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let owner = fx.actors.owner.clone();

    // Never serviced: baseline mileage 0, vehicle starts at 5000
    assert!(fx.ledger.is_maintenance_due_by_mileage("V1", "OIL")?);
    assert!(!fx.ledger.is_maintenance_due_by_time("V1", "OIL")?);

    let task_id = schedule_oil_change(&mut fx);
    complete(&mut fx, task_id, 5_200)?;

    let last = fx.ledger.get_last_service("V1", "OIL")?.unwrap();
    assert_eq!(last.mileage, 5_200);
    assert_eq!(last.record_id, 1);

    assert!(!fx.ledger.is_maintenance_due_by_mileage("V1", "OIL")?);
    fx.ledger.update_mileage(&owner, "V1", 10_199)?;
    assert!(!fx.ledger.is_maintenance_due_by_mileage("V1", "OIL")?);
    fx.ledger.update_mileage(&owner, "V1", 10_200)?;
    assert!(fx.ledger.is_maintenance_due_by_mileage("V1", "OIL")?);

    fx.oracle.advance(89 * DAY);
    assert!(!fx.ledger.is_maintenance_due_by_time("V1", "OIL")?);
    fx.oracle.advance(DAY);
    assert!(fx.ledger.is_maintenance_due_by_time("V1", "OIL")?);

    let unknown = fx.ledger.is_maintenance_due_by_mileage("V1", "BRAKES");
    assert!(matches!(unknown, Err(LedgerError::NotFound { .. })));
    Ok(())
}

#[test]
fn test_mileage_never_decreases() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let owner = fx.actors.owner.clone();
    let manager = fx.actors.manager.clone();

    let lower = fx.ledger.update_mileage(&owner, "V1", 4_999);
    assert!(matches!(
        lower,
        Err(LedgerError::InvalidMileage {
            current: 5_000,
            proposed: 4_999
        })
    ));

    let by_manager = fx.ledger.update_mileage(&manager, "V1", 6_000);
    assert!(matches!(by_manager, Err(LedgerError::NotAuthorized { .. })));

    assert_eq!(fx.ledger.update_mileage(&owner, "V1", 5_000)?.mileage, 5_000);
    assert_eq!(fx.ledger.update_mileage(&owner, "V1", 6_000)?.mileage, 6_000);
    Ok(())
}
