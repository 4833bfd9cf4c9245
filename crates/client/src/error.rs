//! Client-side error types.

use rideshare_shared::{ApiError, RideStatus};
use thiserror::Error;

/// Why a ride/driver action did not go through.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("finish the current ride before accepting another")]
    RideAlreadyActive,
    #[error("no pending request for ride {0}")]
    UnknownRequest(String),
    #[error("there is no active ride")]
    NoActiveRide,
    #[error("a ride in status {0} cannot be advanced")]
    CannotAdvance(RideStatus),
    #[error("unknown vehicle {0}")]
    UnknownVehicle(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ActionError {
    /// Message for the user. Server rejections are passed through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            ActionError::Api(e) => e.user_message(),
            other => {
                let msg = other.to_string();
                let mut chars = msg.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => msg,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    #[error("geocoder rate limited")]
    RateLimited,
    #[error("no address for this location")]
    NoResult,
    #[error("geocoder request failed: {0}")]
    Request(String),
}
