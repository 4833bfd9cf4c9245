//! Reconciles the HTTP view of the active ride with push updates.

use std::cell::Cell;
use std::rc::Rc;

use rideshare_shared::{ApiError, Ride, ServerEvent};

use super::store::RideStore;
use crate::api_client::RideApi;
use crate::notifications::{NotificationCenter, RetryAction};
use crate::ws::RoomTracker;

/// What applying a push event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// The event was for another ride, a duplicate, or nothing is tracked.
    Ignored,
    /// The cached ride was patched in place.
    Patched,
    /// Only the driver location changed.
    LocationUpdated,
    /// The ride reached a terminal status; the cache was invalidated and must
    /// be refetched.
    Refetch { ride_id: String },
    /// Not an active-ride event.
    Unhandled,
}

/// The one write path into the [`RideStore`].
///
/// HTTP snapshots are ground truth for whether a ride exists; push events are
/// applied optimistically while the ride is live. Terminal statuses are never
/// trusted from a push alone: they invalidate the cache, leave the ride room
/// and ask for a refetch.
pub struct RideSyncEngine {
    api: Rc<dyn RideApi>,
    store: Rc<RideStore>,
    rooms: Rc<RoomTracker>,
    notices: NotificationCenter,
    fetches_issued: Cell<u64>,
    fetches_applied: Cell<u64>,
    /// Fetches with a ticket at or below this were issued before the last
    /// invalidation and are never applied.
    fence: Cell<u64>,
}

impl RideSyncEngine {
    pub fn new(
        api: Rc<dyn RideApi>,
        store: Rc<RideStore>,
        rooms: Rc<RoomTracker>,
        notices: NotificationCenter,
    ) -> Self {
        Self {
            api,
            store,
            rooms,
            notices,
            fetches_issued: Cell::new(0),
            fetches_applied: Cell::new(0),
            fence: Cell::new(0),
        }
    }

    pub fn store(&self) -> &Rc<RideStore> {
        &self.store
    }

    pub fn rooms(&self) -> &Rc<RoomTracker> {
        &self.rooms
    }

    pub fn tracked_ride_id(&self) -> Option<String> {
        self.store.ride_id()
    }

    /// Apply a push event to the store without any network round-trip.
    pub fn apply_push(&self, event: &ServerEvent) -> SyncAction {
        if matches!(
            event,
            ServerEvent::NewRideRequest(_) | ServerEvent::RideCancelledBeforeAcceptance { .. }
        ) {
            return SyncAction::Unhandled;
        }

        let ride_id = event.ride_id();

        if self.tracked_ride_id().as_deref() != Some(ride_id) {
            crate::log_debug!(
                "RideSyncEngine: dropping {} for untracked ride {}",
                event.name(),
                ride_id
            );
            return SyncAction::Ignored;
        }

        let ended = self.store.ride().is_some_and(|r| r.status.is_terminal());
        if ended
            && matches!(
                event,
                ServerEvent::RideUpdate(_) | ServerEvent::RideStatusChange { .. }
            )
        {
            crate::log_debug!(
                "RideSyncEngine: ride {} already ended, dropping {}",
                ride_id,
                event.name()
            );
            return SyncAction::Ignored;
        }

        match event {
            ServerEvent::RideUpdate(patch) => {
                if patch.status.is_some_and(|s| s.is_terminal()) {
                    return self.finish(ride_id, |ride| {
                        ride.apply_patch(patch);
                        true
                    });
                }
                let patched = self.store.patch(ride_id, |ride| {
                    ride.apply_patch(patch);
                    true
                });
                self.sync_room();
                if patched.is_some() {
                    SyncAction::Patched
                } else {
                    SyncAction::Ignored
                }
            }
            ServerEvent::RideStatusChange { status, .. } => {
                let Some(entry) = event.history_entry() else {
                    return SyncAction::Ignored;
                };
                if status.is_terminal() {
                    return self.finish(ride_id, |ride| ride.record_status(entry));
                }
                match self.store.patch(ride_id, |ride| ride.record_status(entry)) {
                    Some(_) => {
                        self.sync_room();
                        SyncAction::Patched
                    }
                    None => {
                        crate::log_debug!("RideSyncEngine: duplicate status change for {}", ride_id);
                        SyncAction::Ignored
                    }
                }
            }
            ServerEvent::DriverLocationUpdate { location, .. } => {
                let location = *location;
                match self.store.patch(ride_id, |ride| {
                    if ride.driver_location == Some(location) {
                        return false;
                    }
                    ride.driver_location = Some(location);
                    true
                }) {
                    Some(_) => SyncAction::LocationUpdated,
                    None => SyncAction::Ignored,
                }
            }
            ServerEvent::RideCancelled { reason, .. } => self.finish(ride_id, |ride| {
                if let Some(reason) = reason {
                    ride.cancellation_reason = Some(reason.clone());
                }
                true
            }),
            ServerEvent::NewRideRequest(_) | ServerEvent::RideCancelledBeforeAcceptance { .. } => {
                SyncAction::Unhandled
            }
        }
    }

    /// Apply a push event and, when it ends the ride, refetch before returning.
    pub async fn handle_push(&self, event: &ServerEvent) -> SyncAction {
        let action = self.apply_push(event);
        if let SyncAction::Refetch { .. } = action {
            // Store writes are synchronous, so the invalidation has landed by now.
            let _ = self.refresh().await;
        }
        action
    }

    /// Fetch the active ride and reconcile the store with it.
    ///
    /// A "not found" response is the normal no-active-ride state. Other
    /// failures are recorded on the store and surfaced with a retry action.
    pub async fn refresh(&self) -> Result<Option<Ride>, ApiError> {
        let ticket = self.fetches_issued.get() + 1;
        self.fetches_issued.set(ticket);
        self.store.set_loading();

        let result = match self.api.fetch_active_ride().await {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        };

        if ticket < self.fetches_applied.get() || ticket <= self.fence.get() {
            crate::log_debug!("RideSyncEngine: discarding stale fetch #{}", ticket);
            return result;
        }
        self.fetches_applied.set(ticket);

        match &result {
            Ok(snapshot) => {
                self.apply_snapshot(snapshot.clone());
            }
            Err(e) => {
                let message = e.user_message();
                crate::log_error!("RideSyncEngine: active ride fetch failed: {}", e);
                self.store.set_failed(message.clone(), e.is_retryable());
                let retry = e.is_retryable().then_some(RetryAction::RefetchActiveRide);
                self.notices.error(message, retry);
            }
        }
        result
    }

    /// Reconcile the store with an authoritative snapshot.
    ///
    /// `None` means the server has no active ride: any cached ride is cleared
    /// and its room left. Running this twice with the same input changes
    /// nothing the second time.
    pub fn apply_snapshot(&self, snapshot: Option<Ride>) {
        match snapshot {
            Some(ride) => {
                if let Some(previous) = self.tracked_ride_id() {
                    if previous != ride.id {
                        self.rooms.leave(&previous);
                    }
                }
                self.store.replace(ride);
                self.sync_room();
            }
            None => {
                if let Some(previous) = self.tracked_ride_id() {
                    crate::log_info!("RideSyncEngine: server has no active ride, clearing {}", previous);
                    self.rooms.leave(&previous);
                }
                self.store.clear();
            }
        }
    }

    /// Mark the cached ride stale and discard every fetch already in flight.
    /// The next [`refresh`](Self::refresh) is the first one that can land.
    pub fn invalidate(&self) {
        self.fence.set(self.fetches_issued.get());
        if self.store.ride().is_some() {
            self.store.invalidate();
        }
    }

    /// Drop all ride state. Used on logout.
    pub fn reset(&self) {
        self.rooms.leave_current();
        self.store.clear();
    }

    fn finish(&self, ride_id: &str, f: impl FnOnce(&mut Ride) -> bool) -> SyncAction {
        if self.store.ride().is_some_and(|r| r.status.is_terminal()) {
            crate::log_debug!("RideSyncEngine: ride {} already ended", ride_id);
            return SyncAction::Ignored;
        }
        crate::log_info!("RideSyncEngine: ride {} ended, refetching", ride_id);
        self.store.patch(ride_id, f);
        self.invalidate();
        self.rooms.leave(ride_id);
        SyncAction::Refetch {
            ride_id: ride_id.to_string(),
        }
    }

    /// Hold the room of a live ride; never join for a finished one.
    fn sync_room(&self) {
        let Some(ride) = self.store.ride() else {
            return;
        };
        if ride.status.is_terminal() {
            self.rooms.leave(&ride.id);
        } else {
            self.rooms.join(&ride.id);
        }
    }
}
