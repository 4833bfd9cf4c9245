#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_channel::oneshot;
use rideshare_client::ws::{ChannelError, ChannelHandle, ChannelSignal, Connector};
use rideshare_client::{ClientConfig, RideApi, RideChannelSession};
use rideshare_shared::{
    ApiError, ClientCommand, GeoPoint, Ride, RideStatus, ServerEvent, StatusHistoryEntry, Vehicle,
    WsEnvelope,
};

pub fn ride(id: &str, status: RideStatus) -> Ride {
    let created = Utc::now() - Duration::minutes(1);
    Ride {
        id: id.to_string(),
        status,
        rider: "rider-1".to_string(),
        driver: status.has_driver().then(|| "driver-1".to_string()),
        vehicle: None,
        pickup: GeoPoint::new(-73.9857, 40.7484),
        dropoff: GeoPoint::new(-73.9680, 40.7851),
        pickup_address: None,
        dropoff_address: None,
        fare: 18.5,
        distance: 5.2,
        duration: 14.0,
        created_at: created,
        updated_at: created,
        status_history: vec![StatusHistoryEntry {
            status: RideStatus::Requested,
            timestamp: created,
            updated_by: Some("rider-1".to_string()),
        }],
        driver_location: None,
        cancellation_reason: None,
    }
}

pub fn status_change(ride_id: &str, status: RideStatus) -> ServerEvent {
    ServerEvent::RideStatusChange {
        ride_id: ride_id.to_string(),
        status,
        updated_by: Some("driver-1".to_string()),
        timestamp: Utc::now(),
    }
}

pub fn event(payload: ServerEvent) -> ChannelSignal {
    ChannelSignal::Event(WsEnvelope {
        id: uuid::Uuid::new_v4().to_string(),
        payload,
        ts: Utc::now(),
        correlation_id: None,
    })
}

pub fn http_error(status: u16, body: &str) -> ApiError {
    ApiError::Http {
        status,
        body: body.to_string(),
    }
}

pub fn join(id: &str) -> ClientCommand {
    ClientCommand::JoinRideRoom {
        ride_id: id.to_string(),
    }
}

pub fn leave(id: &str) -> ClientCommand {
    ClientCommand::LeaveRideRoom {
        ride_id: id.to_string(),
    }
}

/// Scripted stand-in for the HTTP API.
///
/// `fetch_active_ride` first drains `queued` responses, then falls back to
/// `active`. Mutation results default to success built from the request.
#[derive(Default)]
pub struct MockRideApi {
    pub active: RefCell<Option<Result<Option<Ride>, ApiError>>>,
    pub queued: RefCell<VecDeque<Result<Option<Ride>, ApiError>>>,
    pub hold_next_fetch: RefCell<Option<oneshot::Receiver<()>>>,
    pub fetches: Cell<u32>,
    pub accept_result: RefCell<Option<Result<Ride, ApiError>>>,
    pub reject_error: RefCell<Option<ApiError>>,
    pub cancel_error: RefCell<Option<ApiError>>,
    pub advance_error: RefCell<Option<ApiError>>,
    pub vehicle_error: RefCell<Option<ApiError>>,
    pub location_error: RefCell<Option<ApiError>>,
    pub calls: RefCell<Vec<String>>,
}

impl MockRideApi {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn with_active(ride: Option<Ride>) -> Rc<Self> {
        let api = Self::new();
        api.set_active(ride);
        api
    }

    pub fn set_active(&self, ride: Option<Ride>) {
        *self.active.borrow_mut() = Some(Ok(ride));
    }

    pub fn fail_active(&self, error: ApiError) {
        *self.active.borrow_mut() = Some(Err(error));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

#[async_trait(?Send)]
impl RideApi for MockRideApi {
    async fn fetch_active_ride(&self) -> Result<Option<Ride>, ApiError> {
        self.fetches.set(self.fetches.get() + 1);
        let response = self
            .queued
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.active.borrow().clone().unwrap_or(Ok(None)));
        let gate = self.hold_next_fetch.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        response
    }

    async fn accept_ride(&self, ride_id: &str) -> Result<Ride, ApiError> {
        self.record(format!("accept:{ride_id}"));
        match self.accept_result.borrow_mut().take() {
            Some(result) => result,
            None => Ok(ride(ride_id, RideStatus::Accepted)),
        }
    }

    async fn reject_ride(&self, ride_id: &str) -> Result<(), ApiError> {
        self.record(format!("reject:{ride_id}"));
        match self.reject_error.borrow_mut().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn cancel_ride(&self, ride_id: &str, reason: &str) -> Result<Ride, ApiError> {
        self.record(format!("cancel:{ride_id}:{reason}"));
        if let Some(e) = self.cancel_error.borrow_mut().take() {
            return Err(e);
        }
        let mut cancelled = ride(ride_id, RideStatus::CancelledByRider);
        cancelled.cancellation_reason = Some(reason.to_string());
        Ok(cancelled)
    }

    async fn advance_status(&self, ride_id: &str, status: RideStatus) -> Result<Ride, ApiError> {
        self.record(format!("advance:{ride_id}:{status}"));
        if let Some(e) = self.advance_error.borrow_mut().take() {
            return Err(e);
        }
        Ok(ride(ride_id, status))
    }

    async fn set_vehicle_active(&self, vehicle_id: &str, active: bool) -> Result<Vehicle, ApiError> {
        self.record(format!("vehicle:{vehicle_id}:{active}"));
        if let Some(e) = self.vehicle_error.borrow_mut().take() {
            return Err(e);
        }
        Ok(Vehicle {
            id: vehicle_id.to_string(),
            plate_number: "KA-01-1234".to_string(),
            model: "Corolla".to_string(),
            is_active: active,
        })
    }

    async fn update_driver_location(&self, location: GeoPoint) -> Result<(), ApiError> {
        self.record(format!("location:{},{}", location.lng, location.lat));
        match self.location_error.borrow_mut().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Connector that never touches the network. Each `open` hands out a fresh
/// command channel whose traffic can be inspected with [`sent`](Self::sent).
#[derive(Default)]
pub struct RecordingConnector {
    pub opens: Cell<u32>,
    pub fail: Cell<bool>,
    outbound: RefCell<Vec<UnboundedReceiver<WsEnvelope<ClientCommand>>>>,
    signals: RefCell<Option<UnboundedSender<ChannelSignal>>>,
    log: RefCell<Vec<ClientCommand>>,
}

impl RecordingConnector {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn unavailable() -> Rc<Self> {
        let connector = Self::new();
        connector.fail.set(true);
        connector
    }

    /// Every command sent so far, across all opened connections, in order.
    pub fn sent(&self) -> Vec<ClientCommand> {
        for rx in self.outbound.borrow_mut().iter_mut() {
            while let Ok(Some(envelope)) = rx.try_next() {
                self.log.borrow_mut().push(envelope.payload);
            }
        }
        self.log.borrow().clone()
    }

    /// Push a signal the way the connection loop would.
    pub fn emit(&self, signal: ChannelSignal) {
        if let Some(tx) = self.signals.borrow().as_ref() {
            let _ = tx.unbounded_send(signal);
        }
    }
}

impl Connector for RecordingConnector {
    fn open(&self, signals: UnboundedSender<ChannelSignal>) -> Result<ChannelHandle, ChannelError> {
        self.opens.set(self.opens.get() + 1);
        if self.fail.get() {
            return Err(ChannelError::Unavailable("no transport".to_string()));
        }
        let (tx, rx) = unbounded();
        self.outbound.borrow_mut().push(rx);
        *self.signals.borrow_mut() = Some(signals);
        Ok(ChannelHandle::new(tx))
    }
}

pub fn session(api: Rc<MockRideApi>, connector: Rc<RecordingConnector>) -> Rc<RideChannelSession> {
    RideChannelSession::create(ClientConfig::default(), api, connector)
}

/// A mounted session whose connection is already up.
pub async fn connected_session(
    api: Rc<MockRideApi>,
    connector: Rc<RecordingConnector>,
) -> Rc<RideChannelSession> {
    let session = session(api, connector);
    session.mount();
    session.handle_signal(ChannelSignal::Connected).await;
    session
}
