//! Vehicle and service-provider registry
//!
//! Canonical vehicle records are the source of truth for ownership and
//! mileage; every other component refers to vehicles by id. Vehicles are
//! never deleted, only deactivated, and mileage never goes down.

use fleetledger_core::Txn;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::access;
use crate::context::{CallContext, Principal};
use crate::error::{EntityKind, LedgerError, Result};

pub const VEHICLE_NAMESPACE: &str = "vehicles";
pub const PROVIDER_NAMESPACE: &str = "providers";

/// Registered vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Unique vehicle identifier
    pub vehicle_id: String,

    /// Identity that registered the vehicle
    pub owner: Principal,

    pub make: String,
    pub model: String,
    pub year: u16,

    /// Odometer reading, never decreases
    pub mileage: u64,

    /// Oracle time of the last mileage change
    pub last_updated: u64,

    /// Oracle time of registration
    pub registered_at: u64,

    /// Whether the vehicle is in service
    pub active: bool,
}

/// Input for [`register_vehicle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVehicle {
    pub vehicle_id: String,
    pub make: String,
    pub model: String,
    pub year: u16,
    pub initial_mileage: u64,
}

impl NewVehicle {
    pub fn new(
        vehicle_id: impl Into<String>,
        make: impl Into<String>,
        model: impl Into<String>,
        year: u16,
        initial_mileage: u64,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            make: make.into(),
            model: model.into(),
            year,
            initial_mileage,
        }
    }
}

/// Service provider allowed to log completed maintenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProvider {
    /// Unique provider identifier
    pub provider_id: String,
    pub name: String,
    pub address: String,

    /// Identity the provider acts as
    pub principal: Principal,

    /// Whether the provider may currently log work
    pub authorized: bool,

    /// Oracle time of registration
    pub registered_at: u64,
}

/// Input for [`register_provider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProvider {
    pub provider_id: String,
    pub name: String,
    pub address: String,
    pub principal: Principal,
}

impl NewProvider {
    pub fn new(
        provider_id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        principal: impl Into<Principal>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            name: name.into(),
            address: address.into(),
            principal: principal.into(),
        }
    }
}

pub fn get_vehicle(txn: &Txn<'_>, vehicle_id: &str) -> Result<Option<Vehicle>> {
    Ok(txn.get(VEHICLE_NAMESPACE, vehicle_id)?)
}

/// Load a vehicle or fail with `NotFound(Vehicle)`
pub fn require_vehicle(txn: &Txn<'_>, vehicle_id: &str) -> Result<Vehicle> {
    get_vehicle(txn, vehicle_id)?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Vehicle, vehicle_id))
}

pub fn get_provider(txn: &Txn<'_>, provider_id: &str) -> Result<Option<ServiceProvider>> {
    Ok(txn.get(PROVIDER_NAMESPACE, provider_id)?)
}

/// Fail with `NotAuthorized` unless the caller registered the vehicle
pub(crate) fn ensure_vehicle_owner(
    ctx: &CallContext<'_>,
    vehicle: &Vehicle,
    action: &'static str,
) -> Result<()> {
    if &vehicle.owner == ctx.caller {
        Ok(())
    } else {
        Err(access::deny(ctx, action))
    }
}

pub(crate) fn register_vehicle(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    request: NewVehicle,
) -> Result<Vehicle> {
    access::ensure_owner_or_manager(txn, ctx, "register_vehicle")?;

    if request.vehicle_id.is_empty() {
        return Err(LedgerError::InvalidInput("vehicle_id cannot be empty".to_string()));
    }
    if txn.contains(VEHICLE_NAMESPACE, &request.vehicle_id)? {
        return Err(LedgerError::already_exists(EntityKind::Vehicle, &request.vehicle_id));
    }

    let vehicle = Vehicle {
        vehicle_id: request.vehicle_id,
        owner: ctx.caller.clone(),
        make: request.make,
        model: request.model,
        year: request.year,
        mileage: request.initial_mileage,
        last_updated: ctx.time,
        registered_at: ctx.time,
        active: true,
    };
    txn.put(VEHICLE_NAMESPACE, &vehicle.vehicle_id, &vehicle)?;

    info!(
        vehicle_id = %vehicle.vehicle_id,
        owner = %vehicle.owner,
        mileage = vehicle.mileage,
        "Vehicle registered"
    );

    Ok(vehicle)
}

pub(crate) fn update_mileage(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    vehicle_id: &str,
    new_mileage: u64,
) -> Result<Vehicle> {
    let vehicle = require_vehicle(txn, vehicle_id)?;
    ensure_vehicle_owner(ctx, &vehicle, "update_mileage")?;
    apply_mileage(txn, vehicle, new_mileage, ctx.time)
}

/// Raise a vehicle's mileage; lower readings fail with `InvalidMileage`
///
/// Equal readings are accepted and only refresh `last_updated`.
pub(crate) fn apply_mileage(
    txn: &mut Txn<'_>,
    mut vehicle: Vehicle,
    new_mileage: u64,
    now: u64,
) -> Result<Vehicle> {
    if new_mileage < vehicle.mileage {
        warn!(
            vehicle_id = %vehicle.vehicle_id,
            current = vehicle.mileage,
            proposed = new_mileage,
            "Rejected mileage rollback"
        );
        return Err(LedgerError::InvalidMileage {
            current: vehicle.mileage,
            proposed: new_mileage,
        });
    }

    vehicle.mileage = new_mileage;
    vehicle.last_updated = now;
    txn.put(VEHICLE_NAMESPACE, &vehicle.vehicle_id, &vehicle)?;

    info!(vehicle_id = %vehicle.vehicle_id, mileage = new_mileage, "Mileage updated");
    Ok(vehicle)
}

pub(crate) fn set_active(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    vehicle_id: &str,
    active: bool,
) -> Result<Vehicle> {
    access::ensure_owner(txn, ctx, "set_vehicle_active")?;

    let vehicle = txn
        .merge::<Vehicle, _>(VEHICLE_NAMESPACE, vehicle_id, |v| v.active = active)?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Vehicle, vehicle_id))?;

    info!(vehicle_id = vehicle_id, active = active, "Vehicle active flag set");
    Ok(vehicle)
}

pub(crate) fn register_provider(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    request: NewProvider,
) -> Result<ServiceProvider> {
    access::ensure_owner(txn, ctx, "register_provider")?;

    if request.provider_id.is_empty() {
        return Err(LedgerError::InvalidInput("provider_id cannot be empty".to_string()));
    }
    if request.principal.is_empty() {
        return Err(LedgerError::InvalidInput(
            "provider principal cannot be empty".to_string(),
        ));
    }
    if txn.contains(PROVIDER_NAMESPACE, &request.provider_id)? {
        return Err(LedgerError::already_exists(EntityKind::Provider, &request.provider_id));
    }

    let provider = ServiceProvider {
        provider_id: request.provider_id,
        name: request.name,
        address: request.address,
        principal: request.principal,
        authorized: true,
        registered_at: ctx.time,
    };
    txn.put(PROVIDER_NAMESPACE, &provider.provider_id, &provider)?;

    info!(
        provider_id = %provider.provider_id,
        principal = %provider.principal,
        "Service provider registered"
    );

    Ok(provider)
}
