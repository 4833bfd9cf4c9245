//! Shared data models for rides, vehicles and drivers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Geo ---

/// A coordinate pair. Serialized as `[lng, lat]` like the backend's GeoJSON points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

impl From<[f64; 2]> for GeoPoint {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self { lng, lat }
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(p: GeoPoint) -> Self {
        [p.lng, p.lat]
    }
}

// --- Ride lifecycle ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    #[serde(alias = "PENDING")]
    Requested,
    Accepted,
    GoingToPickUp,
    DriverArrived,
    InTransit,
    ReachedDestination,
    Completed,
    CancelledByRider,
    CancelledByDriver,
    CancelledByAdmin,
    CancelledForPendingTimeOver,
}

impl RideStatus {
    /// No further transition happens from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RideStatus::Completed
                | RideStatus::CancelledByRider
                | RideStatus::CancelledByDriver
                | RideStatus::CancelledByAdmin
                | RideStatus::CancelledForPendingTimeOver
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_terminal() && *self != RideStatus::Completed
    }

    /// Whether a driver has been assigned (accepted and not yet finished).
    pub fn has_driver(&self) -> bool {
        !self.is_terminal() && *self != RideStatus::Requested
    }

    /// The status a driver advances to from this one, if any.
    pub fn next(&self) -> Option<RideStatus> {
        match self {
            RideStatus::Accepted => Some(RideStatus::GoingToPickUp),
            RideStatus::GoingToPickUp => Some(RideStatus::DriverArrived),
            RideStatus::DriverArrived => Some(RideStatus::InTransit),
            RideStatus::InTransit => Some(RideStatus::ReachedDestination),
            RideStatus::ReachedDestination => Some(RideStatus::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Requested => "REQUESTED",
            RideStatus::Accepted => "ACCEPTED",
            RideStatus::GoingToPickUp => "GOING_TO_PICK_UP",
            RideStatus::DriverArrived => "DRIVER_ARRIVED",
            RideStatus::InTransit => "IN_TRANSIT",
            RideStatus::ReachedDestination => "REACHED_DESTINATION",
            RideStatus::Completed => "COMPLETED",
            RideStatus::CancelledByRider => "CANCELLED_BY_RIDER",
            RideStatus::CancelledByDriver => "CANCELLED_BY_DRIVER",
            RideStatus::CancelledByAdmin => "CANCELLED_BY_ADMIN",
            RideStatus::CancelledForPendingTimeOver => "CANCELLED_FOR_PENDING_TIME_OVER",
        }
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a ride's status log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: RideStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    #[serde(alias = "_id")]
    pub id: String,
    pub status: RideStatus,
    pub rider: String,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub vehicle: Option<String>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    #[serde(default)]
    pub pickup_address: Option<String>,
    #[serde(default)]
    pub dropoff_address: Option<String>,
    pub fare: f64,
    /// Kilometres
    pub distance: f64,
    /// Minutes
    pub duration: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status_history: Vec<StatusHistoryEntry>,
    #[serde(default)]
    pub driver_location: Option<GeoPoint>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

impl Ride {
    /// Record a status change in the history log, kept in timestamp order.
    ///
    /// The entry's status is adopted only if it is at least as new as the
    /// ride's last update, so a late event never rolls back a newer status.
    /// Returns false if an identical entry is already recorded, in which case
    /// nothing changes. Duplicate delivery of the same event is a no-op.
    pub fn record_status(&mut self, entry: StatusHistoryEntry) -> bool {
        if self.status_history.contains(&entry) {
            return false;
        }
        if entry.timestamp >= self.updated_at {
            self.status = entry.status;
            self.updated_at = entry.timestamp;
        }
        let at = self
            .status_history
            .partition_point(|e| e.timestamp <= entry.timestamp);
        self.status_history.insert(at, entry);
        true
    }

    /// Merge the fields present in a patch. The ride id never changes.
    ///
    /// A patch stamped older than the ride's last update keeps the current
    /// status.
    pub fn apply_patch(&mut self, patch: &RidePatch) {
        let stale = patch.updated_at.is_some_and(|t| t < self.updated_at);
        if let Some(status) = patch.status {
            if !stale {
                self.status = status;
            }
        }
        if let Some(driver) = &patch.driver {
            self.driver = Some(driver.clone());
        }
        if let Some(vehicle) = &patch.vehicle {
            self.vehicle = Some(vehicle.clone());
        }
        if let Some(pickup) = patch.pickup {
            self.pickup = pickup;
        }
        if let Some(dropoff) = patch.dropoff {
            self.dropoff = dropoff;
        }
        if let Some(fare) = patch.fare {
            self.fare = fare;
        }
        if let Some(distance) = patch.distance {
            self.distance = distance;
        }
        if let Some(duration) = patch.duration {
            self.duration = duration;
        }
        if let Some(updated_at) = patch.updated_at {
            if !stale {
                self.updated_at = updated_at;
            }
        }
        if let Some(history) = &patch.status_history {
            self.status_history = history.clone();
        }
        if let Some(location) = patch.driver_location {
            self.driver_location = Some(location);
        }
        if let Some(reason) = &patch.cancellation_reason {
            self.cancellation_reason = Some(reason.clone());
        }
    }
}

/// Partial ride document pushed by `ride_update`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RidePatch {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RideStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_history: Option<Vec<StatusHistoryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
}

/// Client-side view of the driver search window.
///
/// Purely informational: the server decides the timeout and reports it as
/// `CANCELLED_FOR_PENDING_TIME_OVER`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchCountdown {
    pub deadline: DateTime<Utc>,
}

impl SearchCountdown {
    pub fn for_ride(ride: &Ride, window: Duration) -> Self {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
        Self {
            deadline: ride.created_at + window,
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

// --- Drivers & vehicles ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverAvailability {
    Offline,
    Available,
    OnTrip,
}

impl DriverAvailability {
    /// Whether the driver should be receiving ride offers.
    pub fn receives_offers(&self) -> bool {
        matches!(self, DriverAvailability::Available | DriverAvailability::OnTrip)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    #[serde(alias = "_id")]
    pub id: String,
    pub plate_number: String,
    pub model: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancelRideRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: RideStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleActiveRequest {
    pub is_active: bool,
}
