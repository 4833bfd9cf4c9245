//! Push channel protocol: envelopes, outbound control commands and inbound events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{GeoPoint, Ride, RidePatch, RideStatus, StatusHistoryEntry};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Control messages sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    JoinRideRoom { ride_id: String },
    LeaveRideRoom { ride_id: String },
}

/// Data messages pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    RideUpdate(RidePatch),
    RideStatusChange {
        ride_id: String,
        status: RideStatus,
        #[serde(default)]
        updated_by: Option<String>,
        timestamp: DateTime<Utc>,
    },
    DriverLocationUpdate {
        ride_id: String,
        location: GeoPoint,
        timestamp: DateTime<Utc>,
    },
    NewRideRequest(Ride),
    RideCancelled {
        ride_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    RideCancelledBeforeAcceptance {
        ride_id: String,
    },
}

/// Names under which event handlers are bound on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    RideUpdate,
    RideStatusChange,
    DriverLocationUpdate,
    NewRideRequest,
    RideCancelled,
    RideCancelledBeforeAcceptance,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::RideUpdate => "ride_update",
            EventName::RideStatusChange => "ride_status_change",
            EventName::DriverLocationUpdate => "driver_location_update",
            EventName::NewRideRequest => "new_ride_request",
            EventName::RideCancelled => "ride_cancelled",
            EventName::RideCancelledBeforeAcceptance => "ride_cancelled_before_acceptance",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ServerEvent {
    pub fn name(&self) -> EventName {
        match self {
            ServerEvent::RideUpdate(_) => EventName::RideUpdate,
            ServerEvent::RideStatusChange { .. } => EventName::RideStatusChange,
            ServerEvent::DriverLocationUpdate { .. } => EventName::DriverLocationUpdate,
            ServerEvent::NewRideRequest(_) => EventName::NewRideRequest,
            ServerEvent::RideCancelled { .. } => EventName::RideCancelled,
            ServerEvent::RideCancelledBeforeAcceptance { .. } => {
                EventName::RideCancelledBeforeAcceptance
            }
        }
    }

    /// The ride this event refers to.
    pub fn ride_id(&self) -> &str {
        match self {
            ServerEvent::RideUpdate(patch) => &patch.id,
            ServerEvent::RideStatusChange { ride_id, .. }
            | ServerEvent::DriverLocationUpdate { ride_id, .. }
            | ServerEvent::RideCancelled { ride_id, .. }
            | ServerEvent::RideCancelledBeforeAcceptance { ride_id } => ride_id,
            ServerEvent::NewRideRequest(ride) => &ride.id,
        }
    }

    /// The status carried by the event, if it carries one.
    pub fn status(&self) -> Option<RideStatus> {
        match self {
            ServerEvent::RideUpdate(patch) => patch.status,
            ServerEvent::RideStatusChange { status, .. } => Some(*status),
            ServerEvent::NewRideRequest(ride) => Some(ride.status),
            _ => None,
        }
    }

    /// History entry for a `ride_status_change` event.
    pub fn history_entry(&self) -> Option<StatusHistoryEntry> {
        match self {
            ServerEvent::RideStatusChange {
                status,
                updated_by,
                timestamp,
                ..
            } => Some(StatusHistoryEntry {
                status: *status,
                timestamp: *timestamp,
                updated_by: updated_by.clone(),
            }),
            _ => None,
        }
    }
}
