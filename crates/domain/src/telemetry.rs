//! Vehicle location telemetry
//!
//! Keeps the latest fix per vehicle plus a fixed-capacity circular history.
//! Each write lands at the cursor, the cursor advances modulo capacity and the
//! stored count saturates at capacity, so once the buffer is full every new
//! fix overwrites the oldest one.
//!
//! Coordinates are signed integers in micro-degrees (degrees × 10^6).

use fleetledger_core::Txn;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::access;
use crate::context::{CallContext, CompoundKey};
use crate::error::{LedgerError, Result};
use crate::geofence;
use crate::vehicles;

pub const CURRENT_LOCATION_NAMESPACE: &str = "current_location";
pub const HISTORY_NAMESPACE: &str = "location_history";
pub const HISTORY_INDEX_NAMESPACE: &str = "location_history_index";

/// Latitude bound in micro-degrees
pub const MAX_LATITUDE: i64 = 90_000_000;
/// Longitude bound in micro-degrees
pub const MAX_LONGITUDE: i64 = 180_000_000;

/// One position fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Latitude in micro-degrees
    pub latitude: i64,

    /// Longitude in micro-degrees
    pub longitude: i64,

    /// Altitude in meters
    pub altitude: i64,

    /// Device timestamp (Unix seconds)
    pub timestamp: u64,

    /// Speed in km/h
    pub speed: u32,

    /// Heading in degrees, 0..360
    pub heading: u16,
}

impl LocationSample {
    /// Create a fix at ground level with no motion
    pub fn new(latitude: i64, longitude: i64, timestamp: u64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: 0,
            timestamp,
            speed: 0,
            heading: 0,
        }
    }

    pub fn with_altitude(mut self, altitude: i64) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn with_motion(mut self, speed: u32, heading: u16) -> Self {
        self.speed = speed;
        self.heading = heading;
        self
    }
}

/// Circular buffer state for one vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryIndex {
    /// Slot the next fix is written to
    pub cursor: u32,

    /// Number of stored fixes, saturates at `capacity`
    pub count: u32,

    /// Slot count fixed at the first write
    pub capacity: u32,
}

impl HistoryIndex {
    pub fn new(capacity: u32) -> Self {
        Self {
            cursor: 0,
            count: 0,
            capacity,
        }
    }

    /// Claim the slot for the next write and advance
    pub fn advance(&mut self) -> u32 {
        let slot = self.cursor;
        self.cursor = (self.cursor + 1) % self.capacity;
        self.count = (self.count + 1).min(self.capacity);
        slot
    }

    /// Slots from oldest to newest fix
    pub fn slots_oldest_first(&self) -> impl Iterator<Item = u32> + '_ {
        let start = if self.count < self.capacity {
            0
        } else {
            self.cursor
        };
        (0..self.count).map(move |i| (start + i) % self.capacity)
    }
}

/// Reject coordinates outside the valid latitude/longitude ranges
pub fn validate_coordinates(latitude: i64, longitude: i64) -> Result<()> {
    if !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
        return Err(LedgerError::InvalidInput(format!(
            "latitude {} outside ±{}",
            latitude, MAX_LATITUDE
        )));
    }
    if !(-MAX_LONGITUDE..=MAX_LONGITUDE).contains(&longitude) {
        return Err(LedgerError::InvalidInput(format!(
            "longitude {} outside ±{}",
            longitude, MAX_LONGITUDE
        )));
    }
    Ok(())
}

pub fn get_current_location(txn: &Txn<'_>, vehicle_id: &str) -> Result<Option<LocationSample>> {
    Ok(txn.get(CURRENT_LOCATION_NAMESPACE, vehicle_id)?)
}

pub fn get_history_index(txn: &Txn<'_>, vehicle_id: &str) -> Result<Option<HistoryIndex>> {
    Ok(txn.get(HISTORY_INDEX_NAMESPACE, vehicle_id)?)
}

/// Number of stored fixes, never more than the buffer capacity
pub fn get_location_count(txn: &Txn<'_>, vehicle_id: &str) -> Result<u32> {
    Ok(get_history_index(txn, vehicle_id)?
        .map(|index| index.count)
        .unwrap_or(0))
}

/// Read a raw buffer slot
///
/// `capacity` bounds the index for vehicles without history yet.
pub fn get_location_at(
    txn: &Txn<'_>,
    capacity: u32,
    vehicle_id: &str,
    index: u32,
) -> Result<Option<LocationSample>> {
    let capacity = get_history_index(txn, vehicle_id)?
        .map(|i| i.capacity)
        .unwrap_or(capacity);
    if index >= capacity {
        return Err(LedgerError::InvalidInput(format!(
            "history index {} outside buffer of {}",
            index, capacity
        )));
    }
    Ok(txn.get(HISTORY_NAMESPACE, CompoundKey(vehicle_id, index))?)
}

/// Stored fixes ordered from oldest to newest
pub fn location_history(txn: &Txn<'_>, vehicle_id: &str) -> Result<Vec<LocationSample>> {
    let Some(index) = get_history_index(txn, vehicle_id)? else {
        return Ok(Vec::new());
    };

    let mut samples = Vec::with_capacity(index.count as usize);
    for slot in index.slots_oldest_first() {
        if let Some(sample) = txn.get(HISTORY_NAMESPACE, CompoundKey(vehicle_id, slot))? {
            samples.push(sample);
        }
    }
    Ok(samples)
}

/// Store a fix and run the geofence check; returns new violation ids
pub(crate) fn record_location(
    txn: &mut Txn<'_>,
    ctx: &CallContext<'_>,
    capacity: u32,
    vehicle_id: &str,
    sample: LocationSample,
) -> Result<Vec<u64>> {
    access::ensure_telemetry_writer(txn, ctx, "record_location")?;
    vehicles::require_vehicle(txn, vehicle_id)?;

    validate_coordinates(sample.latitude, sample.longitude)?;
    if sample.heading >= 360 {
        return Err(LedgerError::InvalidInput(format!(
            "heading {} outside 0..360",
            sample.heading
        )));
    }
    if sample.timestamp == 0 || sample.timestamp > ctx.time {
        return Err(LedgerError::InvalidTimestamp(format!(
            "location timestamp {} must be in 1..={}",
            sample.timestamp, ctx.time
        )));
    }

    txn.put(CURRENT_LOCATION_NAMESPACE, vehicle_id, &sample)?;

    let mut index = get_history_index(txn, vehicle_id)?
        .unwrap_or_else(|| HistoryIndex::new(capacity.max(1)));
    let slot = index.advance();
    txn.put(HISTORY_NAMESPACE, CompoundKey(vehicle_id, slot), &sample)?;
    txn.put(HISTORY_INDEX_NAMESPACE, vehicle_id, &index)?;

    debug!(
        vehicle_id = vehicle_id,
        slot = slot,
        stored = index.count,
        "Location appended to history"
    );

    let violations = geofence::check_boundaries(txn, ctx, vehicle_id, &sample)?;

    info!(
        vehicle_id = vehicle_id,
        latitude = sample.latitude,
        longitude = sample.longitude,
        violations = violations.len(),
        "Location recorded"
    );

    Ok(violations)
}
