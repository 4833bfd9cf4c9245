//! Driver-side ride offers.
//!
//! Unlike [`RideChannelSession`](crate::session::RideChannelSession), this
//! channel belongs to the driver page: it is opened when the page mounts and
//! closed when it unmounts. It runs its own connection and its own active-ride
//! engine so that its room follows the driver's current ride.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_util::StreamExt;
use rideshare_shared::{DriverAvailability, EventName, Ride, RideStatus, ServerEvent};

use crate::api_client::RideApi;
use crate::error::ActionError;
use crate::notifications::NotificationCenter;
use crate::sync::{RideStore, RideSyncEngine, SyncAction};
use crate::ws::{ChannelSignal, ConnectionManager, Connector, EventHandler, ListenerRegistry, RoomTracker};

/// Offers the driver has not decided on yet, in arrival order, unique by ride id.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IncomingRequestQueue {
    requests: Vec<Ride>,
}

impl IncomingRequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an offer. Returns false for a ride id that is already queued.
    pub fn push(&mut self, ride: Ride) -> bool {
        if self.contains(&ride.id) {
            return false;
        }
        self.requests.push(ride);
        true
    }

    pub fn remove(&mut self, ride_id: &str) -> Option<Ride> {
        let pos = self.requests.iter().position(|r| r.id == ride_id)?;
        Some(self.requests.remove(pos))
    }

    pub fn contains(&self, ride_id: &str) -> bool {
        self.requests.iter().any(|r| r.id == ride_id)
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.requests.iter().map(|r| r.id.clone()).collect()
    }

    pub fn to_vec(&self) -> Vec<Ride> {
        self.requests.clone()
    }
}

type QueueObserver = Rc<dyn Fn(&[Ride])>;

pub struct DriverRequestChannel {
    api: Rc<dyn RideApi>,
    connection: Rc<ConnectionManager>,
    listeners: ListenerRegistry,
    engine: Rc<RideSyncEngine>,
    queue: Rc<RefCell<IncomingRequestQueue>>,
    observers: Rc<RefCell<Vec<QueueObserver>>>,
    availability: Cell<DriverAvailability>,
    notices: NotificationCenter,
    signals: RefCell<Option<UnboundedReceiver<ChannelSignal>>>,
    closed: Cell<bool>,
}

impl DriverRequestChannel {
    pub fn open(
        api: Rc<dyn RideApi>,
        connector: Rc<dyn Connector>,
        notices: NotificationCenter,
        availability: DriverAvailability,
    ) -> Rc<Self> {
        let (signal_tx, signal_rx) = unbounded();
        let connection = Rc::new(ConnectionManager::new(connector, signal_tx));
        let rooms = RoomTracker::new(connection.clone());
        let engine = Rc::new(RideSyncEngine::new(
            api.clone(),
            Rc::new(RideStore::new()),
            rooms,
            notices.clone(),
        ));

        let channel = Rc::new(Self {
            api,
            connection,
            listeners: ListenerRegistry::new(),
            engine,
            queue: Rc::new(RefCell::new(IncomingRequestQueue::new())),
            observers: Rc::new(RefCell::new(Vec::new())),
            availability: Cell::new(DriverAvailability::Offline),
            notices,
            signals: RefCell::new(Some(signal_rx)),
            closed: Cell::new(false),
        });
        channel.set_availability(availability);
        channel
    }

    pub fn availability(&self) -> DriverAvailability {
        self.availability.get()
    }

    pub fn connection(&self) -> &Rc<ConnectionManager> {
        &self.connection
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn engine(&self) -> &Rc<RideSyncEngine> {
        &self.engine
    }

    pub fn pending_requests(&self) -> Vec<Ride> {
        self.queue.borrow().to_vec()
    }

    pub fn active_ride(&self) -> Option<Ride> {
        self.engine.store().ride()
    }

    /// Observe queue changes (new offers, accept, decline, cancellation).
    pub fn on_queue_change(&self, observer: impl Fn(&[Ride]) + 'static) {
        self.observers.borrow_mut().push(Rc::new(observer));
    }

    /// Offers are received only while available or on a trip. Going offline
    /// tears the connection down and drops pending offers.
    pub fn set_availability(&self, availability: DriverAvailability) {
        if self.closed.get() {
            return;
        }
        let previous = self.availability.replace(availability);

        if availability.receives_offers() {
            if let Err(e) = self.connection.ensure_connected() {
                crate::log_warn!("DriverRequestChannel: push channel unavailable: {}", e);
            }
            self.attach();
        } else if previous.receives_offers() {
            crate::log_info!("DriverRequestChannel: driver offline, closing channel");
            self.listeners.detach_all();
            self.engine.rooms().leave_current();
            self.connection.disconnect();
            self.update_queue(|q| {
                q.clear();
                true
            });
        }
    }

    fn attach(&self) {
        let handlers: Vec<(EventName, EventHandler)> = vec![
            (EventName::NewRideRequest, self.offer_handler()),
            (EventName::RideCancelledBeforeAcceptance, self.withdrawn_handler()),
            (EventName::RideCancelled, self.withdrawn_handler()),
            (EventName::RideUpdate, self.active_ride_handler()),
            (EventName::RideStatusChange, self.active_ride_handler()),
            (EventName::DriverLocationUpdate, self.active_ride_handler()),
        ];
        self.listeners.attach_once(handlers);
    }

    fn offer_handler(&self) -> EventHandler {
        let queue = self.queue.clone();
        let observers = self.observers.clone();
        Rc::new(move |event| {
            let ServerEvent::NewRideRequest(ride) = event else {
                return SyncAction::Unhandled;
            };
            if ride.status != RideStatus::Requested {
                return SyncAction::Ignored;
            }
            let queued = queue.borrow_mut().push(ride.clone());
            if !queued {
                return SyncAction::Ignored;
            }
            crate::log_info!("DriverRequestChannel: new offer {}", ride.id);
            notify_observers(&queue, &observers);
            SyncAction::Patched
        })
    }

    /// Offers withdrawn before the driver answered. A `ride_cancelled` for the
    /// driver's own active ride goes to the engine instead.
    fn withdrawn_handler(&self) -> EventHandler {
        let queue = self.queue.clone();
        let observers = self.observers.clone();
        let notices = self.notices.clone();
        let engine = self.engine.clone();
        Rc::new(move |event| {
            let ride_id = event.ride_id();
            let removed = queue.borrow_mut().remove(ride_id);
            match removed {
                Some(_) => {
                    notices.info("A ride request was cancelled by the rider");
                    notify_observers(&queue, &observers);
                    SyncAction::Patched
                }
                None if matches!(event, ServerEvent::RideCancelled { .. }) => {
                    engine.apply_push(event)
                }
                None => SyncAction::Ignored,
            }
        })
    }

    fn active_ride_handler(&self) -> EventHandler {
        let engine = self.engine.clone();
        Rc::new(move |event| engine.apply_push(event))
    }

    /// Accept an offer. Every other pending offer is dropped: an accepted ride
    /// supersedes them.
    pub async fn accept(&self, ride_id: &str) -> Result<Ride, ActionError> {
        let result = self.try_accept(ride_id).await;
        if let Err(e) = &result {
            self.notices.error(e.user_message(), None);
        }
        result
    }

    async fn try_accept(&self, ride_id: &str) -> Result<Ride, ActionError> {
        if self
            .active_ride()
            .is_some_and(|r| !r.status.is_terminal())
        {
            return Err(ActionError::RideAlreadyActive);
        }
        if !self.queue.borrow().contains(ride_id) {
            return Err(ActionError::UnknownRequest(ride_id.to_string()));
        }

        match self.api.accept_ride(ride_id).await {
            Ok(ride) => {
                crate::log_info!("DriverRequestChannel: accepted {}", ride.id);
                self.update_queue(|q| {
                    q.clear();
                    true
                });
                self.engine.apply_snapshot(Some(ride.clone()));
                self.availability.set(DriverAvailability::OnTrip);
                Ok(ride)
            }
            Err(e) => {
                if e.is_not_found() {
                    // The offer is gone server-side.
                    self.update_queue(|q| q.remove(ride_id).is_some());
                }
                Err(ActionError::Api(e))
            }
        }
    }

    /// Decline an offer; only that offer leaves the queue.
    pub async fn decline(&self, ride_id: &str) -> Result<(), ActionError> {
        if !self.queue.borrow().contains(ride_id) {
            return Err(ActionError::UnknownRequest(ride_id.to_string()));
        }
        match self.api.reject_ride(ride_id).await {
            Ok(()) => {
                self.update_queue(|q| q.remove(ride_id).is_some());
                Ok(())
            }
            Err(e) => {
                let err = ActionError::Api(e);
                self.notices.error(err.user_message(), None);
                Err(err)
            }
        }
    }

    /// Reload the driver's own active ride from the server.
    pub async fn refresh_active_ride(&self) {
        let _ = self.engine.refresh().await;
    }

    /// Process one signal from this channel's connection.
    pub async fn handle_signal(&self, signal: ChannelSignal) -> Option<SyncAction> {
        if self.closed.get() {
            return None;
        }
        self.connection.apply_signal(&signal);
        let ChannelSignal::Event(envelope) = signal else {
            return None;
        };
        let action = self.listeners.dispatch(&envelope.payload)?;
        if let SyncAction::Refetch { .. } = action {
            let _ = self.engine.refresh().await;
        }
        Some(action)
    }

    pub async fn run(self: Rc<Self>) {
        let Some(mut signals) = self.signals.borrow_mut().take() else {
            return;
        };
        while let Some(signal) = signals.next().await {
            if self.closed.get() {
                break;
            }
            self.handle_signal(signal).await;
        }
    }

    /// Page unmount: unbind, leave the room and close the connection.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.listeners.detach_all();
        self.engine.rooms().leave_current();
        self.connection.disconnect();
    }

    fn update_queue(&self, f: impl FnOnce(&mut IncomingRequestQueue) -> bool) {
        let changed = f(&mut self.queue.borrow_mut());
        if changed {
            notify_observers(&self.queue, &self.observers);
        }
    }
}

fn notify_observers(queue: &RefCell<IncomingRequestQueue>, observers: &RefCell<Vec<QueueObserver>>) {
    let snapshot = queue.borrow().to_vec();
    let observers: Vec<QueueObserver> = observers.borrow().clone();
    for observer in observers {
        observer(&snapshot);
    }
}
