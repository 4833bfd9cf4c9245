//! User-initiated mutations on the active ride and the driver's vehicles.
//!
//! Server responses flow back through [`RideSyncEngine`] so a mutation and a
//! push for the same change converge on the same store state.

use std::cell::RefCell;
use std::rc::Rc;

use rideshare_shared::{GeoPoint, Ride, Vehicle};

use crate::api_client::RideApi;
use crate::error::ActionError;
use crate::notifications::NotificationCenter;
use crate::storage::SessionFlags;
use crate::sync::RideSyncEngine;

pub struct RideActions {
    api: Rc<dyn RideApi>,
    engine: Rc<RideSyncEngine>,
    notices: NotificationCenter,
}

impl RideActions {
    pub fn new(api: Rc<dyn RideApi>, engine: Rc<RideSyncEngine>, notices: NotificationCenter) -> Self {
        Self { api, engine, notices }
    }

    /// Cancel the active ride. The ride ends, so the store is refetched.
    pub async fn cancel(&self, reason: &str) -> Result<Ride, ActionError> {
        let result = self.try_cancel(reason).await;
        self.report(&result);
        result
    }

    async fn try_cancel(&self, reason: &str) -> Result<Ride, ActionError> {
        let ride = self.live_ride()?;
        let cancelled = self.api.cancel_ride(&ride.id, reason).await?;
        crate::log_info!("RideActions: cancelled ride {}", cancelled.id);
        self.engine.apply_snapshot(Some(cancelled.clone()));
        let _ = self.engine.refresh().await;
        Ok(cancelled)
    }

    /// Move the active ride to its next status in the lifecycle.
    pub async fn advance(&self) -> Result<Ride, ActionError> {
        let result = self.try_advance().await;
        self.report(&result);
        result
    }

    async fn try_advance(&self) -> Result<Ride, ActionError> {
        let ride = self.live_ride()?;
        let next = ride
            .status
            .next()
            .ok_or(ActionError::CannotAdvance(ride.status))?;
        let updated = self.api.advance_status(&ride.id, next).await?;
        crate::log_info!("RideActions: ride {} is now {}", updated.id, updated.status);
        let finished = updated.status.is_terminal();
        self.engine.apply_snapshot(Some(updated.clone()));
        if finished {
            let _ = self.engine.refresh().await;
        }
        Ok(updated)
    }

    /// Post the driver's location and remember that it was set this session.
    pub async fn save_driver_location(
        &self,
        location: GeoPoint,
        flags: &SessionFlags,
    ) -> Result<(), ActionError> {
        let result = self
            .api
            .update_driver_location(location)
            .await
            .map_err(ActionError::from);
        match &result {
            Ok(()) => {
                flags.mark_driver_location_set();
                self.notices.info("Location updated");
            }
            Err(e) => self.notices.error(e.user_message(), None),
        }
        result
    }

    fn live_ride(&self) -> Result<Ride, ActionError> {
        self.engine
            .store()
            .ride()
            .filter(|r| !r.status.is_terminal())
            .ok_or(ActionError::NoActiveRide)
    }

    fn report<T>(&self, result: &Result<T, ActionError>) {
        if let Err(e) = result {
            crate::log_warn!("RideActions: {}", e);
            self.notices.error(e.user_message(), None);
        }
    }
}

/// The driver's vehicles with an optimistic active toggle.
pub struct VehicleRoster {
    api: Rc<dyn RideApi>,
    vehicles: RefCell<Vec<Vehicle>>,
    notices: NotificationCenter,
}

impl VehicleRoster {
    pub fn new(api: Rc<dyn RideApi>, vehicles: Vec<Vehicle>, notices: NotificationCenter) -> Self {
        Self {
            api,
            vehicles: RefCell::new(vehicles),
            notices,
        }
    }

    pub fn vehicles(&self) -> Vec<Vehicle> {
        self.vehicles.borrow().clone()
    }

    pub fn get(&self, vehicle_id: &str) -> Option<Vehicle> {
        self.vehicles.borrow().iter().find(|v| v.id == vehicle_id).cloned()
    }

    /// Flip the flag locally, then confirm with the server. A rejection
    /// restores the previous value.
    pub async fn set_active(&self, vehicle_id: &str, active: bool) -> Result<Vehicle, ActionError> {
        let previous = self
            .write(vehicle_id, |v| std::mem::replace(&mut v.is_active, active))
            .ok_or_else(|| ActionError::UnknownVehicle(vehicle_id.to_string()))?;

        match self.api.set_vehicle_active(vehicle_id, active).await {
            Ok(vehicle) => {
                self.write(vehicle_id, |v| *v = vehicle.clone());
                Ok(vehicle)
            }
            Err(e) => {
                crate::log_warn!("VehicleRoster: toggle of {} rejected: {}", vehicle_id, e);
                self.write(vehicle_id, |v| v.is_active = previous);
                let err = ActionError::Api(e);
                self.notices.error(err.user_message(), None);
                Err(err)
            }
        }
    }

    fn write<R>(&self, vehicle_id: &str, f: impl FnOnce(&mut Vehicle) -> R) -> Option<R> {
        let mut vehicles = self.vehicles.borrow_mut();
        vehicles.iter_mut().find(|v| v.id == vehicle_id).map(f)
    }
}
