//! Geofence boundaries and violation detection
//!
//! A boundary is a named circle (center in micro-degrees, radius in meters)
//! attached to one vehicle. Every recorded location is checked against the
//! vehicle's active boundaries in the order they were added; a fix outside a
//! circle appends a [`BoundaryViolation`] carrying how far past the radius it
//! landed.
//!
//! # Distance model
//!
//! Distances use integer arithmetic only:
//!
//! - Degree deltas are scaled by 111 320 m per degree. That is the equatorial
//!   figure; a real meridional degree varies between 110 574 m and 111 694 m,
//!   so the latitude leg is off by up to about 0.7%.
//! - The longitude leg is scaled by `cos(mean latitude)` using the Bhaskara I
//!   rational approximation in ×10^6 fixed point. Its absolute error is below
//!   0.0016 over the full ±90° range.
//! - The result is the flat (equirectangular) hypotenuse of the two legs. The
//!   error grows with separation and is meant for boundaries of a few
//!   kilometers, not continental distances.
//! - Longitude deltas do not wrap across the antimeridian.

use fleetledger_core::Txn;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::access;
use crate::context::{CallContext, CompoundKey};
use crate::error::{EntityKind, LedgerError, Result};
use crate::telemetry::{validate_coordinates, LocationSample};
use crate::vehicles;

pub const BOUNDARY_NAMESPACE: &str = "geofence_boundaries";
pub const VIOLATION_NAMESPACE: &str = "geofence_violations";
pub const VIOLATION_ID_COUNTER: &str = "next_violation_id";
/// vehicle id → boundary ids in insertion order
const BOUNDARY_INDEX_NAMESPACE: &str = "geofence_boundary_index";
/// vehicle id → violation ids in detection order
const VIOLATION_INDEX_NAMESPACE: &str = "geofence_violation_index";

/// Meters per degree of arc at the equator
pub const METERS_PER_DEGREE: i128 = 111_320;

/// Fixed-point scale for micro-degrees and the cosine factor
const FIXED_POINT: i128 = 1_000_000;

/// 180² in degrees², expressed in micro-degrees²
const BHASKARA_SCALE: i128 = 32_400 * FIXED_POINT * FIXED_POINT;

/// Named circular region around a vehicle's permitted area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeofenceBoundary {
    pub vehicle_id: String,
    pub boundary_id: String,

    /// Center latitude in micro-degrees
    pub center_lat: i64,

    /// Center longitude in micro-degrees
    pub center_lon: i64,

    /// Radius in meters, always > 0
    pub radius: u64,

    /// Inactive boundaries are skipped by the violation check
    pub active: bool,

    /// Oracle height at creation
    pub created_at_height: u64,
}

impl GeofenceBoundary {
    /// Meters past the radius, or `None` when the point is inside
    pub fn excess_distance(&self, latitude: i64, longitude: i64) -> Option<u64> {
        let distance = approximate_distance(self.center_lat, self.center_lon, latitude, longitude);
        (distance > self.radius).then(|| distance - self.radius)
    }
}

/// Input for [`add_boundary`] and [`update_boundary`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryDefinition {
    pub boundary_id: String,
    pub center_lat: i64,
    pub center_lon: i64,
    pub radius: u64,
}

impl BoundaryDefinition {
    pub fn new(boundary_id: impl Into<String>, center_lat: i64, center_lon: i64, radius: u64) -> Self {
        Self {
            boundary_id: boundary_id.into(),
            center_lat,
            center_lon,
            radius,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.boundary_id.is_empty() {
            return Err(LedgerError::InvalidInput("boundary_id cannot be empty".to_string()));
        }
        validate_coordinates(self.center_lat, self.center_lon)?;
        if self.radius == 0 {
            return Err(LedgerError::InvalidInput(
                "radius must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A location fix that fell outside an active boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryViolation {
    pub vehicle_id: String,

    /// Global violation id
    pub violation_id: u64,

    pub boundary_id: String,

    /// Offending latitude in micro-degrees
    pub latitude: i64,

    /// Offending longitude in micro-degrees
    pub longitude: i64,

    /// Device timestamp of the offending fix
    pub timestamp: u64,

    /// Meters beyond the boundary radius
    pub distance_exceeded: u64,

    /// Oracle height at detection
    pub detected_at_height: u64,
}

/// Fixed-point (×10^6) approximation of `cos(latitude)`
///
/// `latitude` is in micro-degrees; values beyond ±90° are clamped.
pub fn cos_correction(latitude: i64) -> i128 {
    let x = i128::from(latitude).abs().min(90 * FIXED_POINT);
    let x2 = x * x;
    (BHASKARA_SCALE - 4 * x2) * FIXED_POINT / (BHASKARA_SCALE + x2)
}

/// Integer square root (floor) by Newton's method
pub fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = n / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// Approximate ground distance in meters between two micro-degree points
pub fn approximate_distance(lat1: i64, lon1: i64, lat2: i64, lon2: i64) -> u64 {
    // Legs in micrometers
    let dlat = (i128::from(lat2) - i128::from(lat1)) * METERS_PER_DEGREE;
    let mean_lat = (i128::from(lat1) + i128::from(lat2)) / 2;
    let cos = cos_correction(mean_lat as i64);
    let dlon = (i128::from(lon2) - i128::from(lon1)) * METERS_PER_DEGREE * cos / FIXED_POINT;

    let sum = (dlat * dlat) as u128 + (dlon * dlon) as u128;
    let meters = isqrt(sum) / FIXED_POINT as u128;
    u64::try_from(meters).unwrap_or(u64::MAX)
}

pub fn get_boundary(
    txn: &Txn<'_>,
    vehicle_id: &str,
    boundary_id: &str,
) -> Result<Option<GeofenceBoundary>> {
    Ok(txn.get(BOUNDARY_NAMESPACE, CompoundKey(vehicle_id, boundary_id))?)
}

/// Boundary ids of a vehicle in insertion order
pub fn boundary_ids(txn: &Txn<'_>, vehicle_id: &str) -> Result<Vec<String>> {
    Ok(txn
        .get(BOUNDARY_INDEX_NAMESPACE, vehicle_id)?
        .unwrap_or_default())
}

/// All boundaries of a vehicle in insertion order
pub fn list_boundaries(txn: &Txn<'_>, vehicle_id: &str) -> Result<Vec<GeofenceBoundary>> {
    let mut boundaries = Vec::new();
    for boundary_id in boundary_ids(txn, vehicle_id)? {
        if let Some(boundary) = get_boundary(txn, vehicle_id, &boundary_id)? {
            boundaries.push(boundary);
        }
    }
    Ok(boundaries)
}

pub fn get_violation(
    txn: &Txn<'_>,
    vehicle_id: &str,
    violation_id: u64,
) -> Result<Option<BoundaryViolation>> {
    Ok(txn.get(VIOLATION_NAMESPACE, CompoundKey(vehicle_id, violation_id))?)
}

fn violation_ids(txn: &Txn<'_>, vehicle_id: &str) -> Result<Vec<u64>> {
    Ok(txn
        .get(VIOLATION_INDEX_NAMESPACE, vehicle_id)?
        .unwrap_or_default())
}

pub fn violation_count(txn: &Txn<'_>, vehicle_id: &str) -> Result<u64> {
    Ok(violation_ids(txn, vehicle_id)?.len() as u64)
}

/// Violations of a vehicle in detection order
pub fn list_violations(txn: &Txn<'_>, vehicle_id: &str) -> Result<Vec<BoundaryViolation>> {
    let mut violations = Vec::new();
    for violation_id in violation_ids(txn, vehicle_id)? {
        if let Some(violation) = get_violation(txn, vehicle_id, violation_id)? {
            violations.push(violation);
        }
    }
    Ok(violations)
}

pub(crate) fn add_boundary(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    vehicle_id: &str,
    request: BoundaryDefinition,
) -> Result<GeofenceBoundary> {
    access::ensure_owner_or_manager(txn, ctx, "add_boundary")?;
    vehicles::require_vehicle(txn, vehicle_id)?;
    request.validate()?;

    if get_boundary(txn, vehicle_id, &request.boundary_id)?.is_some() {
        return Err(LedgerError::already_exists(
            EntityKind::Boundary,
            format!("{}/{}", vehicle_id, request.boundary_id),
        ));
    }

    let boundary = GeofenceBoundary {
        vehicle_id: vehicle_id.to_string(),
        boundary_id: request.boundary_id,
        center_lat: request.center_lat,
        center_lon: request.center_lon,
        radius: request.radius,
        active: true,
        created_at_height: ctx.height,
    };
    txn.put(
        BOUNDARY_NAMESPACE,
        CompoundKey(vehicle_id, &boundary.boundary_id),
        &boundary,
    )?;

    let mut ids = boundary_ids(txn, vehicle_id)?;
    ids.push(boundary.boundary_id.clone());
    txn.put(BOUNDARY_INDEX_NAMESPACE, vehicle_id, &ids)?;

    info!(
        vehicle_id = vehicle_id,
        boundary_id = %boundary.boundary_id,
        radius = boundary.radius,
        "Geofence boundary added"
    );

    Ok(boundary)
}

pub(crate) fn update_boundary(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    vehicle_id: &str,
    request: BoundaryDefinition,
    active: bool,
) -> Result<GeofenceBoundary> {
    access::ensure_owner_or_manager(txn, ctx, "update_boundary")?;
    vehicles::require_vehicle(txn, vehicle_id)?;
    request.validate()?;

    let mut boundary = get_boundary(txn, vehicle_id, &request.boundary_id)?.ok_or_else(|| {
        LedgerError::not_found(
            EntityKind::Boundary,
            format!("{}/{}", vehicle_id, request.boundary_id),
        )
    })?;

    boundary.center_lat = request.center_lat;
    boundary.center_lon = request.center_lon;
    boundary.radius = request.radius;
    boundary.active = active;
    txn.put(
        BOUNDARY_NAMESPACE,
        CompoundKey(vehicle_id, &boundary.boundary_id),
        &boundary,
    )?;

    info!(
        vehicle_id = vehicle_id,
        boundary_id = %boundary.boundary_id,
        radius = boundary.radius,
        active = active,
        "Geofence boundary updated"
    );

    Ok(boundary)
}

/// Check a fix against every active boundary; returns new violation ids
pub(crate) fn check_boundaries(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    vehicle_id: &str,
    sample: &LocationSample,
) -> Result<Vec<u64>> {
    let mut produced = Vec::new();

    for boundary in list_boundaries(txn, vehicle_id)? {
        if !boundary.active {
            continue;
        }
        let Some(excess) = boundary.excess_distance(sample.latitude, sample.longitude) else {
            continue;
        };

        let violation_id = txn.next_id(VIOLATION_ID_COUNTER)?;
        let violation = BoundaryViolation {
            vehicle_id: vehicle_id.to_string(),
            violation_id,
            boundary_id: boundary.boundary_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
            timestamp: sample.timestamp,
            distance_exceeded: excess,
            detected_at_height: ctx.height,
        };
        txn.put(
            VIOLATION_NAMESPACE,
            CompoundKey(vehicle_id, violation_id),
            &violation,
        )?;

        warn!(
            vehicle_id = vehicle_id,
            boundary_id = %violation.boundary_id,
            violation_id = violation_id,
            distance_exceeded = excess,
            "Geofence violation"
        );
        produced.push(violation_id);
    }

    if !produced.is_empty() {
        let mut ids = violation_ids(txn, vehicle_id)?;
        ids.extend_from_slice(&produced);
        txn.put(VIOLATION_INDEX_NAMESPACE, vehicle_id, &ids)?;
    }

    Ok(produced)
}
