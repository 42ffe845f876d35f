//! Journal continuity on the SQLite backend
//!
//! Verifies the hash chain survives reopen and that on-disk tampering with a
//! journal entry or a journaled record is reported by both the startup check
//! and `verify_journal`.

use crate::test_utils::{
    init_tracing, remove_db, temp_db_path, Actors, Fixture, DAY, START_HEIGHT, START_TIME,
};
use fleetledger_core::SqliteStore;
use fleetledger_domain::{
    CompletionReport, FleetLedger, JournalHealth, LedgerConfig, LocationSample,
    MaintenanceRequest, ManualOracle, Principal,
};

fn seeded_sqlite_ledger(path: &std::path::Path) -> anyhow::Result<Fixture> {
    let oracle = ManualOracle::new(START_TIME, START_HEIGHT);
    let actors = Actors::new();
    let ledger = FleetLedger::open_sqlite(path, oracle.clone(), &actors.owner)?;
    Ok(Fixture::seeded(ledger, oracle, actors))
}

#[test]
fn test_journal_survives_reopen() -> anyhow::Result<()> {
    init_tracing();
    let db_path = temp_db_path("test_journal_reopen");

    {
        let mut fx = seeded_sqlite_ledger(&db_path)?;
        assert_eq!(fx.ledger.backend_name(), "sqlite");

        let device = fx.actors.device.clone();
        fx.ledger.record_location(
            &device,
            "V1",
            LocationSample::new(37_774_900, -122_419_400, START_TIME),
        )?;
        assert_eq!(fx.ledger.journal_len()?, Fixture::SEED_JOURNAL_LEN + 1);
        assert!(fx.ledger.verify_journal()?.is_ok());
    }

    // A different deployer does not take over an existing ledger
    let oracle = ManualOracle::new(START_TIME + 3_600, START_HEIGHT + 10);
    let mut ledger = FleetLedger::open_sqlite(&db_path, oracle, &Principal::from("usurper"))?;
    assert!(ledger.startup_health().is_ok());
    assert_eq!(ledger.owner()?, Some(Actors::new().owner));
    assert_eq!(ledger.journal_len()?, Fixture::SEED_JOURNAL_LEN + 1);
    assert_eq!(ledger.get_vehicle("V1")?.unwrap().mileage, 5_000);
    assert_eq!(ledger.get_location_count("V1")?, 1);

    let owner = Actors::new().owner;
    ledger.update_mileage(&owner, "V1", 5_500)?;
    let last = ledger.journal_entry(Fixture::SEED_JOURNAL_LEN + 2)?.unwrap();
    assert_eq!(last.action, "update_mileage");
    assert_eq!(last.timestamp, START_TIME + 3_600);
    assert!(ledger.verify_journal()?.is_ok());

    drop(ledger);
    remove_db(&db_path);
    Ok(())
}

#[test]
fn test_tampered_entry_detected() -> anyhow::Result<()> {
    init_tracing();
    let db_path = temp_db_path("test_journal_tamper");

    {
        let fx = seeded_sqlite_ledger(&db_path)?;
        let entry = fx.ledger.journal_entry(4)?.unwrap();
        assert_eq!(entry.action, "register_vehicle");
        assert_eq!(entry.subject, "V1");
    }

    {
        let store = SqliteStore::open(&db_path)?;
        let changed = store.__test_execute_raw_sql(
            "UPDATE kv_records \
             SET value = CAST(replace(CAST(value AS TEXT), '\"subject\":\"V1\"', '\"subject\":\"V7\"') AS BLOB) \
             WHERE namespace = 'journal' AND key = '4'",
            &[],
        )?;
        assert_eq!(changed, 1);
    }

    let oracle = ManualOracle::new(START_TIME, START_HEIGHT);
    let mut ledger = FleetLedger::open_sqlite(&db_path, oracle, &Actors::new().owner)?;

    let expected_break = |health: &JournalHealth| {
        matches!(
            health,
            JournalHealth::Corrupted {
                last_good_seq_no: Some(3),
                first_bad_seq_no: 4,
                ..
            }
        )
    };
    assert!(expected_break(ledger.startup_health()));
    assert!(expected_break(&ledger.verify_journal()?));
    assert_eq!(ledger.metrics().journal_corruption_detections_total, 2);

    drop(ledger);
    remove_db(&db_path);
    Ok(())
}

#[test]
fn test_deleted_entry_detected() -> anyhow::Result<()> {
    let db_path = temp_db_path("test_journal_delete");

    {
        seeded_sqlite_ledger(&db_path)?;
    }

    {
        let store = SqliteStore::open(&db_path)?;
        store.__test_execute_raw_sql(
            "DELETE FROM kv_records WHERE namespace = 'journal' AND key = '2'",
            &[],
        )?;
    }

    let oracle = ManualOracle::new(START_TIME, START_HEIGHT);
    let mut ledger = FleetLedger::open_sqlite(&db_path, oracle, &Actors::new().owner)?;
    match ledger.verify_journal()? {
        JournalHealth::Corrupted {
            first_bad_seq_no,
            error_type,
            ..
        } => {
            assert_eq!(first_bad_seq_no, 2);
            assert!(error_type.contains("Missing"));
        }
        JournalHealth::Ok => panic!("deleted journal entry went unnoticed"),
    }

    drop(ledger);
    remove_db(&db_path);
    Ok(())
}

#[test]
fn test_edited_record_detected() -> anyhow::Result<()> {
    init_tracing();
    let db_path = temp_db_path("test_record_tamper");

    {
        let mut fx = seeded_sqlite_ledger(&db_path)?;
        let owner = fx.actors.owner.clone();
        let provider = fx.actors.provider.clone();
        let task_id = fx.ledger.schedule_maintenance(
            &owner,
            MaintenanceRequest::new("V1", "OIL", START_TIME + DAY, 5_000),
        )?;
        fx.ledger.log_completed_maintenance(
            &provider,
            CompletionReport::new("V1", task_id, 5_100, "P1", "Dana Reyes", 8_950),
        )?;
        assert!(fx.ledger.verify_journal()?.is_ok());
    }

    {
        let store = SqliteStore::open(&db_path)?;
        let changed = store.__test_execute_raw_sql(
            "UPDATE kv_records \
             SET value = CAST(replace(CAST(value AS TEXT), '\"cost\":8950', '\"cost\":1') AS BLOB) \
             WHERE namespace = 'maintenance_records'",
            &[],
        )?;
        assert_eq!(changed, 1);
    }

    let oracle = ManualOracle::new(START_TIME, START_HEIGHT);
    let mut ledger = FleetLedger::open_sqlite(&db_path, oracle, &Actors::new().owner)?;
    assert_eq!(ledger.get_maintenance_record("V1", 1)?.unwrap().cost, 1);

    // Written by the completion, the entry after schedule_maintenance
    let completion_seq_no = Fixture::SEED_JOURNAL_LEN + 2;
    for health in [ledger.startup_health().clone(), ledger.verify_journal()?] {
        match health {
            JournalHealth::Corrupted {
                first_bad_seq_no,
                error_type,
                ..
            } => {
                assert_eq!(first_bad_seq_no, completion_seq_no);
                assert!(error_type.contains("maintenance_records"));
            }
            JournalHealth::Ok => panic!("edited maintenance record went unnoticed"),
        }
    }

    drop(ledger);
    remove_db(&db_path);
    Ok(())
}

#[test]
fn test_undecodable_entry_reported_at_open() -> anyhow::Result<()> {
    let db_path = temp_db_path("test_journal_garbage");

    {
        seeded_sqlite_ledger(&db_path)?;
    }

    {
        let store = SqliteStore::open(&db_path)?;
        let changed = store.__test_execute_raw_sql(
            "UPDATE kv_records SET value = X'00FF' WHERE namespace = 'journal' AND key = '2'",
            &[],
        )?;
        assert_eq!(changed, 1);
    }

    let oracle = ManualOracle::new(START_TIME, START_HEIGHT);
    let ledger = FleetLedger::open_sqlite(&db_path, oracle, &Actors::new().owner)?;
    match ledger.startup_health() {
        JournalHealth::Corrupted {
            last_good_seq_no,
            first_bad_seq_no,
            error_type,
        } => {
            assert_eq!(*last_good_seq_no, Some(1));
            assert_eq!(*first_bad_seq_no, 2);
            assert!(error_type.contains("Undecodable"));
        }
        JournalHealth::Ok => panic!("undecodable journal entry went unnoticed"),
    }
    assert_eq!(ledger.get_vehicle("V1")?.unwrap().mileage, 5_000);

    drop(ledger);
    remove_db(&db_path);
    Ok(())
}

#[test]
fn test_ledger_from_toml_config() -> anyhow::Result<()> {
    let db_path = temp_db_path("test_config_ledger");
    let toml = format!(
        "[storage]\nbackend = \"sqlite\"\npath = {:?}\n\n[telemetry]\nhistory_capacity = 3\n",
        db_path.to_string_lossy()
    );
    let config = LedgerConfig::from_toml_str(&toml)?;

    let oracle = ManualOracle::new(START_TIME, START_HEIGHT);
    let actors = Actors::new();
    let ledger = FleetLedger::from_config(config, oracle.clone(), &actors.owner)?;
    let mut fx = Fixture::seeded(ledger, oracle, actors);
    assert_eq!(fx.ledger.backend_name(), "sqlite");

    let device = fx.actors.device.clone();
    for lat in 1..=5 {
        fx.ledger
            .record_location(&device, "V1", LocationSample::new(lat, 0, START_TIME))?;
    }
    let history: Vec<i64> = fx
        .ledger
        .location_history("V1")?
        .iter()
        .map(|s| s.latitude)
        .collect();
    assert_eq!(history, vec![3, 4, 5]);

    drop(fx);
    remove_db(&db_path);
    Ok(())
}
