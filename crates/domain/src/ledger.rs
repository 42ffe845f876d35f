//! Fleet ledger facade
//!
//! [`FleetLedger`] is the single entry point hosts call. Every mutating
//! method runs as one atomic call:
//!
//! 1. Read time and height from the [`HostOracle`]
//! 2. Stage all writes in a fresh [`Txn`] overlay
//! 3. On success, append a journal entry to the same overlay and commit the
//!    batch to the [`KvStore`] in one step
//! 4. On failure, drop the overlay; nothing reaches storage and no counter
//!    advances
//!
//! Query methods open a read-only overlay and never journal.

use fleetledger_core::{
    HostOracle, Journal, JournalDraft, JournalEntry, JournalHealth, KvStore, LedgerConfig,
    MemoryStore, StorageBackend, Txn,
};
#[cfg(feature = "sqlite")]
use fleetledger_core::SqliteStore;
#[cfg(feature = "sqlite")]
use std::path::Path;
use tracing::{debug, error, info};

use crate::access::{self, Role};
use crate::context::{CallContext, Principal};
use crate::error::{LedgerError, Result};
use crate::geofence::{self, BoundaryDefinition, BoundaryViolation, GeofenceBoundary};
use crate::maintenance::{
    catalog, records, schedule, CompletionReport, LastService, MaintenanceRecord,
    MaintenanceRequest, MaintenanceTaskType, PartReplacement, ScheduledMaintenance,
};
use crate::telemetry::{self, LocationSample};
use crate::vehicles::{self, NewProvider, NewVehicle, ServiceProvider, Vehicle};

/// Call counters for the ledger
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerMetrics {
    /// Mutating calls committed to storage
    pub calls_committed_total: u64,
    /// Mutating calls that failed, including failed commits
    pub calls_rejected_total: u64,
    /// Journal verifications performed
    pub journal_checks_total: u64,
    /// Verifications that found a broken chain
    pub journal_corruption_detections_total: u64,
}

/// Tamper-evident fleet maintenance and telemetry ledger
pub struct FleetLedger {
    store: Box<dyn KvStore + Send>,
    oracle: Box<dyn HostOracle + Send>,
    config: LedgerConfig,
    /// Journal health found when the ledger was opened
    startup_health: JournalHealth,
    metrics: LedgerMetrics,
}

impl FleetLedger {
    /// Open a ledger on `store`
    ///
    /// An empty store records `deployer` as the owner. A store that already
    /// has an owner keeps it, and `deployer` is ignored.
    pub fn open(
        store: Box<dyn KvStore + Send>,
        oracle: impl HostOracle + Send + 'static,
        config: LedgerConfig,
        deployer: &Principal,
    ) -> Result<Self> {
        config.validate()?;

        info!(backend = store.backend_name(), "Opening fleet ledger");

        let mut ledger = Self {
            store,
            oracle: Box::new(oracle),
            config,
            startup_health: JournalHealth::Ok,
            metrics: LedgerMetrics::default(),
        };

        ledger.startup_health = ledger.verify_journal()?;
        if !ledger.startup_health.is_ok() {
            error!(health = ?ledger.startup_health, "Ledger opened with a corrupted journal");
        }

        let existing = ledger.read(|txn| access::owner(txn))?;
        match existing {
            Some(owner) => {
                info!(owner = %owner, "Existing ledger owner retained");
            }
            None => {
                ledger.execute(deployer, "initialize_owner", deployer.as_str(), |txn, ctx| {
                    access::initialize_owner(txn, ctx.caller).map(|_| ())
                })?;
            }
        }

        Ok(ledger)
    }

    /// Volatile ledger with default configuration
    pub fn in_memory(oracle: impl HostOracle + Send + 'static, deployer: &Principal) -> Result<Self> {
        Self::open(
            Box::new(MemoryStore::new()),
            oracle,
            LedgerConfig::default(),
            deployer,
        )
    }

    /// Ledger backed by a SQLite file at `path`
    #[cfg(feature = "sqlite")]
    pub fn open_sqlite(
        path: impl AsRef<Path>,
        oracle: impl HostOracle + Send + 'static,
        deployer: &Principal,
    ) -> Result<Self> {
        let mut config = LedgerConfig::default();
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.path = Some(path.as_ref().to_path_buf());
        Self::from_config(config, oracle, deployer)
    }

    /// Build the backend named in `config` and open a ledger on it
    pub fn from_config(
        config: LedgerConfig,
        oracle: impl HostOracle + Send + 'static,
        deployer: &Principal,
    ) -> Result<Self> {
        config.validate()?;

        let store: Box<dyn KvStore + Send> = match config.storage.backend {
            StorageBackend::Memory => Box::new(MemoryStore::new()),
            #[cfg(feature = "sqlite")]
            StorageBackend::Sqlite => {
                let path = config.storage.path.as_ref().ok_or_else(|| {
                    LedgerError::InvalidInput("storage.path is required for sqlite".to_string())
                })?;
                Box::new(SqliteStore::open(path)?)
            }
            #[cfg(not(feature = "sqlite"))]
            StorageBackend::Sqlite => {
                return Err(LedgerError::InvalidInput(
                    "sqlite backend not compiled in".to_string(),
                ))
            }
        };

        Self::open(store, oracle, config, deployer)
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Call and verification counters since open
    pub fn metrics(&self) -> &LedgerMetrics {
        &self.metrics
    }

    /// Journal health found at open
    pub fn startup_health(&self) -> &JournalHealth {
        &self.startup_health
    }

    /// Name of the storage backend
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Run one mutating call atomically and journal it
    fn execute<T, F>(
        &mut self,
        caller: &Principal,
        action: &'static str,
        subject: &str,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Txn<'_>, &CallContext<'_>) -> Result<T>,
    {
        let ctx = CallContext {
            caller,
            time: self.oracle.current_time(),
            height: self.oracle.current_height(),
        };

        match self.stage_and_commit(caller, action, subject, &ctx, op) {
            Ok(value) => {
                self.metrics.calls_committed_total += 1;
                Ok(value)
            }
            Err(e) => {
                self.metrics.calls_rejected_total += 1;
                debug!(action = action, subject = subject, error = %e, "Call rejected");
                Err(e)
            }
        }
    }

    fn stage_and_commit<T, F>(
        &mut self,
        caller: &Principal,
        action: &'static str,
        subject: &str,
        ctx: &CallContext<'_>,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Txn<'_>, &CallContext<'_>) -> Result<T>,
    {
        let (value, batch) = {
            let mut txn = Txn::new(&*self.store);
            let value = op(&mut txn, ctx)?;
            let entry = Journal::append(
                &mut txn,
                JournalDraft {
                    caller: caller.as_str(),
                    action,
                    subject,
                    timestamp: ctx.time,
                    height: ctx.height,
                },
            )?;
            debug!(seq_no = entry.seq_no, action = action, "Call journaled");
            (value, txn.into_batch())
        };

        self.store.commit(batch)?;
        Ok(value)
    }

    fn read<T>(&self, op: impl FnOnce(&Txn<'_>) -> Result<T>) -> Result<T> {
        let txn = Txn::new(&*self.store);
        op(&txn)
    }

    // ---- Access control ----

    /// Current owner, `None` only before initialization
    pub fn owner(&self) -> Result<Option<Principal>> {
        self.read(access::owner)
    }

    /// Whether `principal` owns the ledger
    pub fn is_owner(&self, principal: &Principal) -> Result<bool> {
        self.read(|txn| access::is_owner(txn, principal))
    }

    /// Whether `principal` holds the fleet manager role
    pub fn is_fleet_manager(&self, principal: &Principal) -> Result<bool> {
        self.read(|txn| access::is_fleet_manager(txn, principal))
    }

    /// Whether `principal` may report telemetry
    pub fn is_authorized_device(&self, principal: &Principal) -> Result<bool> {
        self.read(|txn| access::is_authorized_device(txn, principal))
    }

    /// Whether `principal` acts for the authorized provider `provider_id`
    pub fn is_authorized_provider(&self, provider_id: &str, principal: &Principal) -> Result<bool> {
        self.read(|txn| access::is_authorized_provider(txn, provider_id, principal))
    }

    /// Grant the fleet manager role (owner only)
    pub fn add_fleet_manager(&mut self, caller: &Principal, member: &Principal) -> Result<()> {
        self.execute(caller, "add_fleet_manager", member.as_str(), |txn, ctx| {
            access::grant_role(txn, ctx, Role::FleetManager, member)
        })
    }

    /// Returns whether the member held the role
    pub fn remove_fleet_manager(&mut self, caller: &Principal, member: &Principal) -> Result<bool> {
        self.execute(caller, "remove_fleet_manager", member.as_str(), |txn, ctx| {
            access::revoke_role(txn, ctx, Role::FleetManager, member)
        })
    }

    /// Authorize a telemetry device (owner or fleet manager)
    pub fn add_device(&mut self, caller: &Principal, device: &Principal) -> Result<()> {
        self.execute(caller, "add_device", device.as_str(), |txn, ctx| {
            access::grant_role(txn, ctx, Role::Device, device)
        })
    }

    /// Returns whether the device was authorized
    pub fn remove_device(&mut self, caller: &Principal, device: &Principal) -> Result<bool> {
        self.execute(caller, "remove_device", device.as_str(), |txn, ctx| {
            access::revoke_role(txn, ctx, Role::Device, device)
        })
    }

    /// Authorize or suspend a registered provider
    pub fn set_provider_authorization(
        &mut self,
        caller: &Principal,
        provider_id: &str,
        authorized: bool,
    ) -> Result<ServiceProvider> {
        self.execute(caller, "set_provider_authorization", provider_id, |txn, ctx| {
            access::set_provider_authorization(txn, ctx, provider_id, authorized)
        })
    }

    /// Hand the ledger to a new owner (owner only)
    pub fn transfer_ownership(&mut self, caller: &Principal, new_owner: &Principal) -> Result<()> {
        self.execute(caller, "transfer_ownership", new_owner.as_str(), |txn, ctx| {
            access::transfer_ownership(txn, ctx, new_owner)
        })
    }

    // ---- Vehicles and providers ----

    /// Register a new vehicle with its starting mileage
    pub fn register_vehicle(&mut self, caller: &Principal, vehicle: NewVehicle) -> Result<Vehicle> {
        let subject = vehicle.vehicle_id.clone();
        self.execute(caller, "register_vehicle", &subject, |txn, ctx| {
            vehicles::register_vehicle(txn, ctx, vehicle)
        })
    }

    /// Raise a vehicle's odometer; the reading never decreases
    pub fn update_mileage(
        &mut self,
        caller: &Principal,
        vehicle_id: &str,
        new_mileage: u64,
    ) -> Result<Vehicle> {
        self.execute(caller, "update_mileage", vehicle_id, |txn, ctx| {
            vehicles::update_mileage(txn, ctx, vehicle_id, new_mileage)
        })
    }

    /// Activate or deactivate a vehicle
    pub fn set_vehicle_active(
        &mut self,
        caller: &Principal,
        vehicle_id: &str,
        active: bool,
    ) -> Result<Vehicle> {
        self.execute(caller, "set_vehicle_active", vehicle_id, |txn, ctx| {
            vehicles::set_active(txn, ctx, vehicle_id, active)
        })
    }

    /// Vehicle by id
    pub fn get_vehicle(&self, vehicle_id: &str) -> Result<Option<Vehicle>> {
        self.read(|txn| vehicles::get_vehicle(txn, vehicle_id))
    }

    /// Register a service provider bound to its acting principal
    pub fn register_provider(
        &mut self,
        caller: &Principal,
        provider: NewProvider,
    ) -> Result<ServiceProvider> {
        let subject = provider.provider_id.clone();
        self.execute(caller, "register_provider", &subject, |txn, ctx| {
            vehicles::register_provider(txn, ctx, provider)
        })
    }

    /// Service provider by id
    pub fn get_provider(&self, provider_id: &str) -> Result<Option<ServiceProvider>> {
        self.read(|txn| vehicles::get_provider(txn, provider_id))
    }

    // ---- Maintenance ----

    /// Add a maintenance task type to the catalog
    pub fn define_task_type(
        &mut self,
        caller: &Principal,
        task_type: MaintenanceTaskType,
    ) -> Result<MaintenanceTaskType> {
        let subject = task_type.task_type_id.clone();
        self.execute(caller, "define_task_type", &subject, |txn, ctx| {
            catalog::define_task_type(txn, ctx, task_type)
        })
    }

    /// Task type by id
    pub fn get_task_type(&self, task_type_id: &str) -> Result<Option<MaintenanceTaskType>> {
        self.read(|txn| catalog::get_task_type(txn, task_type_id))
    }

    /// Returns the new task id
    pub fn schedule_maintenance(
        &mut self,
        caller: &Principal,
        request: MaintenanceRequest,
    ) -> Result<u64> {
        let subject = request.vehicle_id.clone();
        self.execute(caller, "schedule_maintenance", &subject, |txn, ctx| {
            schedule::schedule_maintenance(txn, ctx, request)
        })
    }

    /// Returns the new record id
    pub fn log_completed_maintenance(
        &mut self,
        caller: &Principal,
        report: CompletionReport,
    ) -> Result<u64> {
        let subject = format!("{}/{}", report.vehicle_id, report.task_id);
        self.execute(caller, "log_completed_maintenance", &subject, |txn, ctx| {
            records::log_completed_maintenance(txn, ctx, report)
        })
    }

    /// Cancel a scheduled task; completed or cancelled tasks are final
    pub fn cancel_scheduled_maintenance(
        &mut self,
        caller: &Principal,
        vehicle_id: &str,
        task_id: u64,
    ) -> Result<ScheduledMaintenance> {
        let subject = format!("{}/{}", vehicle_id, task_id);
        self.execute(caller, "cancel_scheduled_maintenance", &subject, |txn, ctx| {
            schedule::cancel_scheduled_maintenance(txn, ctx, vehicle_id, task_id)
        })
    }

    /// Attach a replaced part to an existing maintenance record
    pub fn add_parts_replaced(
        &mut self,
        caller: &Principal,
        part: PartReplacement,
    ) -> Result<PartReplacement> {
        let subject = format!("{}/{}", part.record_id, part.part_index);
        self.execute(caller, "add_parts_replaced", &subject, |txn, ctx| {
            records::add_parts_replaced(txn, ctx, part)
        })
    }

    /// Scheduled task by vehicle and task id
    pub fn get_scheduled_maintenance(
        &self,
        vehicle_id: &str,
        task_id: u64,
    ) -> Result<Option<ScheduledMaintenance>> {
        self.read(|txn| schedule::get_scheduled(txn, vehicle_id, task_id))
    }

    /// Maintenance record by vehicle and record id
    pub fn get_maintenance_record(
        &self,
        vehicle_id: &str,
        record_id: u64,
    ) -> Result<Option<MaintenanceRecord>> {
        self.read(|txn| records::get_record(txn, vehicle_id, record_id))
    }

    /// Look a record up by id alone
    pub fn find_maintenance_record(&self, record_id: u64) -> Result<Option<MaintenanceRecord>> {
        self.read(|txn| records::find_record(txn, record_id))
    }

    /// Replaced part by record id and index
    pub fn get_part(&self, record_id: u64, part_index: u32) -> Result<Option<PartReplacement>> {
        self.read(|txn| records::get_part(txn, record_id, part_index))
    }

    /// Most recent completion of a task type on a vehicle
    pub fn get_last_service(
        &self,
        vehicle_id: &str,
        task_type_id: &str,
    ) -> Result<Option<LastService>> {
        self.read(|txn| records::get_last_service(txn, vehicle_id, task_type_id))
    }

    /// Whether the mileage interval since the last service has elapsed
    pub fn is_maintenance_due_by_mileage(&self, vehicle_id: &str, task_type_id: &str) -> Result<bool> {
        self.read(|txn| records::is_maintenance_due_by_mileage(txn, vehicle_id, task_type_id))
    }

    /// Evaluated against the oracle's current time
    pub fn is_maintenance_due_by_time(&self, vehicle_id: &str, task_type_id: &str) -> Result<bool> {
        let now = self.oracle.current_time();
        self.read(|txn| records::is_maintenance_due_by_time(txn, now, vehicle_id, task_type_id))
    }

    // ---- Telemetry ----

    /// Store a location fix; returns the ids of any geofence violations
    pub fn record_location(
        &mut self,
        caller: &Principal,
        vehicle_id: &str,
        sample: LocationSample,
    ) -> Result<Vec<u64>> {
        let capacity = self.config.telemetry.history_capacity;
        self.execute(caller, "record_location", vehicle_id, |txn, ctx| {
            telemetry::record_location(txn, ctx, capacity, vehicle_id, sample)
        })
    }

    /// Latest accepted fix for a vehicle
    pub fn get_current_location(&self, vehicle_id: &str) -> Result<Option<LocationSample>> {
        self.read(|txn| telemetry::get_current_location(txn, vehicle_id))
    }

    /// Raw slot read; `index` must be below the buffer capacity
    pub fn get_location_at(&self, vehicle_id: &str, index: u32) -> Result<Option<LocationSample>> {
        let capacity = self.config.telemetry.history_capacity;
        self.read(|txn| telemetry::get_location_at(txn, capacity, vehicle_id, index))
    }

    /// Number of fixes held in the history buffer
    pub fn get_location_count(&self, vehicle_id: &str) -> Result<u32> {
        self.read(|txn| telemetry::get_location_count(txn, vehicle_id))
    }

    /// Stored fixes from oldest to newest
    pub fn location_history(&self, vehicle_id: &str) -> Result<Vec<LocationSample>> {
        self.read(|txn| telemetry::location_history(txn, vehicle_id))
    }

    // ---- Geofence ----

    /// Add a circular geofence to a vehicle
    pub fn add_boundary(
        &mut self,
        caller: &Principal,
        vehicle_id: &str,
        request: BoundaryDefinition,
    ) -> Result<GeofenceBoundary> {
        let subject = format!("{}/{}", vehicle_id, request.boundary_id);
        self.execute(caller, "add_boundary", &subject, |txn, ctx| {
            geofence::add_boundary(txn, ctx, vehicle_id, request)
        })
    }

    /// Replace an existing geofence's circle and active flag
    pub fn update_boundary(
        &mut self,
        caller: &Principal,
        vehicle_id: &str,
        request: BoundaryDefinition,
        active: bool,
    ) -> Result<GeofenceBoundary> {
        let subject = format!("{}/{}", vehicle_id, request.boundary_id);
        self.execute(caller, "update_boundary", &subject, |txn, ctx| {
            geofence::update_boundary(txn, ctx, vehicle_id, request, active)
        })
    }

    /// Geofence by vehicle and boundary id
    pub fn get_boundary(&self, vehicle_id: &str, boundary_id: &str) -> Result<Option<GeofenceBoundary>> {
        self.read(|txn| geofence::get_boundary(txn, vehicle_id, boundary_id))
    }

    /// Geofences of a vehicle in creation order
    pub fn list_boundaries(&self, vehicle_id: &str) -> Result<Vec<GeofenceBoundary>> {
        self.read(|txn| geofence::list_boundaries(txn, vehicle_id))
    }

    /// Violation by vehicle and violation id
    pub fn get_violation(
        &self,
        vehicle_id: &str,
        violation_id: u64,
    ) -> Result<Option<BoundaryViolation>> {
        self.read(|txn| geofence::get_violation(txn, vehicle_id, violation_id))
    }

    /// Violations of a vehicle in detection order
    pub fn list_violations(&self, vehicle_id: &str) -> Result<Vec<BoundaryViolation>> {
        self.read(|txn| geofence::list_violations(txn, vehicle_id))
    }

    /// Number of violations recorded for a vehicle
    pub fn violation_count(&self, vehicle_id: &str) -> Result<u64> {
        self.read(|txn| geofence::violation_count(txn, vehicle_id))
    }

    // ---- Journal ----

    /// Walk the whole journal chain
    pub fn verify_journal(&mut self) -> Result<JournalHealth> {
        let health = Journal::verify(&*self.store)?;
        self.metrics.journal_checks_total += 1;
        if !health.is_ok() {
            self.metrics.journal_corruption_detections_total += 1;
        }
        Ok(health)
    }

    /// Journal entry by sequence number
    pub fn journal_entry(&self, seq_no: u64) -> Result<Option<JournalEntry>> {
        self.read(|txn| Ok(Journal::entry(txn, seq_no)?))
    }

    /// Number of journal entries
    pub fn journal_len(&self) -> Result<u64> {
        self.read(|txn| Ok(Journal::len(txn)?))
    }
}
