//! Location telemetry and geofence scenarios

use crate::test_utils::{Fixture, START_TIME};
use fleetledger_domain::{BoundaryDefinition, EntityKind, LedgerError, LocationSample};

#[test]
fn test_boundary_violation_scenario() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let manager = fx.actors.manager.clone();
    let device = fx.actors.device.clone();

    let boundary = fx
        .ledger
        .add_boundary(&manager, "V1", BoundaryDefinition::new("B1", 0, 0, 1_000))?;
    assert!(boundary.active);

    // One degree north of the center
    let far = LocationSample::new(1_000_000, 0, START_TIME).with_motion(80, 0);
    let violations = fx.ledger.record_location(&device, "V1", far)?;
    assert_eq!(violations, vec![1]);

    let violation = fx.ledger.get_violation("V1", 1)?.unwrap();
    assert_eq!(violation.boundary_id, "B1");
    assert_eq!(violation.latitude, 1_000_000);
    assert_eq!(violation.distance_exceeded, 110_320);
    assert_eq!(fx.ledger.violation_count("V1")?, 1);

    // Roughly 157 m from the center
    let near = LocationSample::new(1_000, 1_000, START_TIME);
    assert!(fx.ledger.record_location(&device, "V1", near)?.is_empty());
    assert_eq!(fx.ledger.violation_count("V1")?, 1);

    assert_eq!(fx.ledger.get_current_location("V1")?, Some(near));
    assert_eq!(fx.ledger.get_location_count("V1")?, 2);
    Ok(())
}

#[test]
fn test_inactive_boundaries_are_skipped() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let owner = fx.actors.owner.clone();

    fx.ledger
        .add_boundary(&owner, "V1", BoundaryDefinition::new("DEPOT", 0, 0, 500))?;
    fx.ledger
        .add_boundary(&owner, "V1", BoundaryDefinition::new("REGION", 0, 0, 50_000))?;

    let outside_both = LocationSample::new(1_000_000, 0, START_TIME);
    assert_eq!(fx.ledger.record_location(&owner, "V1", outside_both)?, vec![1, 2]);

    let violations = fx.ledger.list_violations("V1")?;
    let order: Vec<&str> = violations.iter().map(|v| v.boundary_id.as_str()).collect();
    assert_eq!(order, vec!["DEPOT", "REGION"]);

    fx.ledger
        .update_boundary(&owner, "V1", BoundaryDefinition::new("DEPOT", 0, 0, 500), false)?;
    assert_eq!(fx.ledger.record_location(&owner, "V1", outside_both)?, vec![3]);
    assert_eq!(fx.ledger.get_violation("V1", 3)?.unwrap().boundary_id, "REGION");

    let ids: Vec<String> = fx
        .ledger
        .list_boundaries("V1")?
        .into_iter()
        .map(|b| b.boundary_id)
        .collect();
    assert_eq!(ids, vec!["DEPOT", "REGION"]);
    Ok(())
}

#[test]
fn test_boundary_validation() {
    let mut fx = Fixture::new();
    let owner = fx.actors.owner.clone();
    let device = fx.actors.device.clone();

    assert!(matches!(
        fx.ledger.add_boundary(&device, "V1", BoundaryDefinition::new("B1", 0, 0, 1_000)),
        Err(LedgerError::NotAuthorized { .. })
    ));
    assert!(matches!(
        fx.ledger.add_boundary(&owner, "V9", BoundaryDefinition::new("B1", 0, 0, 1_000)),
        Err(LedgerError::NotFound {
            kind: EntityKind::Vehicle,
            ..
        })
    ));
    assert!(matches!(
        fx.ledger.add_boundary(&owner, "V1", BoundaryDefinition::new("B1", 0, 0, 0)),
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(matches!(
        fx.ledger.add_boundary(&owner, "V1", BoundaryDefinition::new("", 0, 0, 1_000)),
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(matches!(
        fx.ledger.add_boundary(&owner, "V1", BoundaryDefinition::new("B1", 0, 180_000_001, 1_000)),
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(matches!(
        fx.ledger.update_boundary(&owner, "V1", BoundaryDefinition::new("B1", 0, 0, 1_000), true),
        Err(LedgerError::NotFound {
            kind: EntityKind::Boundary,
            ..
        })
    ));

    fx.ledger
        .add_boundary(&owner, "V1", BoundaryDefinition::new("B1", 0, 0, 1_000))
        .unwrap();
    assert!(matches!(
        fx.ledger.add_boundary(&owner, "V1", BoundaryDefinition::new("B1", 5, 5, 2_000)),
        Err(LedgerError::AlreadyExists {
            kind: EntityKind::Boundary,
            ..
        })
    ));
}

#[test]
fn test_invalid_fixes_change_nothing() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let device = fx.actors.device.clone();
    let stranger = fx.actors.stranger.clone();

    let good = LocationSample::new(37_774_900, -122_419_400, START_TIME);
    fx.ledger.record_location(&device, "V1", good)?;

    let rejected = [
        (
            device.clone(),
            LocationSample::new(90_000_001, 0, START_TIME),
        ),
        (
            device.clone(),
            LocationSample::new(0, -180_000_001, START_TIME),
        ),
        (
            device.clone(),
            LocationSample::new(0, 0, START_TIME).with_motion(10, 360),
        ),
        (device.clone(), LocationSample::new(0, 0, 0)),
        (device.clone(), LocationSample::new(0, 0, START_TIME + 1)),
        (stranger.clone(), LocationSample::new(0, 0, START_TIME)),
    ];

    for (caller, sample) in rejected {
        assert!(fx.ledger.record_location(&caller, "V1", sample).is_err());
    }

    assert!(matches!(
        fx.ledger
            .record_location(&device, "V1", LocationSample::new(0, 0, START_TIME + 1)),
        Err(LedgerError::InvalidTimestamp(_))
    ));
    assert!(matches!(
        fx.ledger.record_location(&device, "V9", good),
        Err(LedgerError::NotFound {
            kind: EntityKind::Vehicle,
            ..
        })
    ));

    assert_eq!(fx.ledger.get_current_location("V1")?, Some(good));
    assert_eq!(fx.ledger.get_location_count("V1")?, 1);
    assert_eq!(fx.ledger.location_history("V1")?, vec![good]);
    Ok(())
}

#[test]
fn test_history_saturates_at_capacity() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    let device = fx.actors.device.clone();

    for i in 0..150u64 {
        fx.oracle.advance(10);
        let sample = LocationSample::new(i as i64, 0, START_TIME + 10 * (i + 1));
        fx.ledger.record_location(&device, "V1", sample)?;
    }

    assert_eq!(fx.ledger.get_location_count("V1")?, 100);

    let history = fx.ledger.location_history("V1")?;
    assert_eq!(history.len(), 100);
    assert_eq!(history.first().unwrap().latitude, 50);
    assert_eq!(history.last().unwrap().latitude, 149);

    // Slot 0 held fix 0, then fix 100
    assert_eq!(fx.ledger.get_location_at("V1", 0)?.unwrap().latitude, 100);
    assert_eq!(fx.ledger.get_location_at("V1", 49)?.unwrap().latitude, 149);
    assert_eq!(fx.ledger.get_location_at("V1", 50)?.unwrap().latitude, 50);
    assert!(matches!(
        fx.ledger.get_location_at("V1", 100),
        Err(LedgerError::InvalidInput(_))
    ));

    assert_eq!(fx.ledger.get_current_location("V1")?.unwrap().latitude, 149);
    Ok(())
}
