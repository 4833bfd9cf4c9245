//! The per-login ride channel session.
//!
//! One `RideChannelSession` exists per signed-in user. It owns the push
//! connection, the ride room, the listener bindings and the active ride store.
//! Pages come and go without touching any of that; only the application shell
//! calls [`dispose`](RideChannelSession::dispose), on logout.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_util::StreamExt;
use rideshare_shared::EventName;

use crate::api_client::RideApi;
use crate::config::ClientConfig;
use crate::notifications::NotificationCenter;
use crate::sync::{RideStore, RideSyncEngine, SyncAction};
use crate::ws::{ChannelSignal, ConnectionManager, Connector, EventHandler, ListenerRegistry, RoomTracker};

const RIDE_EVENTS: [EventName; 4] = [
    EventName::RideUpdate,
    EventName::RideStatusChange,
    EventName::DriverLocationUpdate,
    EventName::RideCancelled,
];

pub struct RideChannelSession {
    config: ClientConfig,
    api: Rc<dyn RideApi>,
    connector: Rc<dyn Connector>,
    connection: Rc<ConnectionManager>,
    rooms: Rc<RoomTracker>,
    listeners: ListenerRegistry,
    engine: Rc<RideSyncEngine>,
    notices: NotificationCenter,
    signals: RefCell<Option<UnboundedReceiver<ChannelSignal>>>,
    was_connected: Cell<bool>,
    disposed: Cell<bool>,
}

impl RideChannelSession {
    pub fn create(
        config: ClientConfig,
        api: Rc<dyn RideApi>,
        connector: Rc<dyn Connector>,
    ) -> Rc<Self> {
        let (signal_tx, signal_rx) = unbounded();
        let connection = Rc::new(ConnectionManager::new(connector.clone(), signal_tx));
        let rooms = RoomTracker::new(connection.clone());
        let notices = NotificationCenter::new();
        let engine = Rc::new(RideSyncEngine::new(
            api.clone(),
            Rc::new(RideStore::new()),
            rooms.clone(),
            notices.clone(),
        ));

        Rc::new(Self {
            config,
            api,
            connector,
            connection,
            rooms,
            listeners: ListenerRegistry::new(),
            engine,
            notices,
            signals: RefCell::new(Some(signal_rx)),
            was_connected: Cell::new(false),
            disposed: Cell::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> Rc<dyn RideApi> {
        self.api.clone()
    }

    pub fn connector(&self) -> Rc<dyn Connector> {
        self.connector.clone()
    }

    pub fn connection(&self) -> &Rc<ConnectionManager> {
        &self.connection
    }

    pub fn rooms(&self) -> &Rc<RoomTracker> {
        &self.rooms
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn engine(&self) -> &Rc<RideSyncEngine> {
        &self.engine
    }

    pub fn store(&self) -> &Rc<RideStore> {
        self.engine.store()
    }

    pub fn notices(&self) -> &NotificationCenter {
        &self.notices
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Called by every consumer when it mounts. Connects and binds the ride
    /// handlers the first time; later calls are no-ops. There is no matching
    /// unmount call.
    pub fn mount(&self) {
        if self.disposed.get() {
            crate::log_warn!("RideChannelSession: mount after dispose ignored");
            return;
        }

        if let Err(e) = self.connection.ensure_connected() {
            // The HTTP source stays authoritative; we just lose push updates.
            crate::log_warn!("RideChannelSession: push channel unavailable: {}", e);
        }

        let handlers = RIDE_EVENTS.iter().map(|name| {
            let engine = self.engine.clone();
            let handler: EventHandler = Rc::new(move |event| engine.apply_push(event));
            (*name, handler)
        });
        self.listeners.attach_once(handlers);
    }

    /// Process one signal from the connection loop.
    pub async fn handle_signal(&self, signal: ChannelSignal) -> Option<SyncAction> {
        if self.disposed.get() {
            return None;
        }
        self.connection.apply_signal(&signal);

        match signal {
            ChannelSignal::Connected => {
                if self.was_connected.replace(true) {
                    // Pushes may have been missed while the socket was down.
                    crate::log_info!("RideChannelSession: reconnected, refetching active ride");
                    self.engine.invalidate();
                    let _ = self.engine.refresh().await;
                }
                None
            }
            ChannelSignal::Disconnected { reason } => {
                crate::log_warn!("RideChannelSession: disconnected ({:?})", reason);
                None
            }
            ChannelSignal::Error(e) => {
                crate::log_warn!("RideChannelSession: channel error: {}", e);
                None
            }
            ChannelSignal::Event(envelope) => {
                let action = self.listeners.dispatch(&envelope.payload)?;
                if let SyncAction::Refetch { .. } = action {
                    let _ = self.engine.refresh().await;
                }
                Some(action)
            }
        }
    }

    /// Pump connection signals until the session is disposed.
    pub async fn run(self: Rc<Self>) {
        let Some(mut signals) = self.signals.borrow_mut().take() else {
            crate::log_debug!("RideChannelSession: signal pump already running");
            return;
        };
        while let Some(signal) = signals.next().await {
            if self.disposed.get() {
                break;
            }
            self.handle_signal(signal).await;
        }
    }

    /// Refetch the active ride every `poll_interval` until disposed.
    pub async fn poll(self: Rc<Self>) {
        loop {
            crate::timer::sleep(self.config.poll_interval).await;
            if self.disposed.get() {
                break;
            }
            let _ = self.engine.refresh().await;
        }
    }

    /// Tear everything down. Only the session owner calls this (logout).
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        crate::log_info!("RideChannelSession: disposing");
        self.listeners.detach_all();
        self.engine.reset();
        self.connection.disconnect();
        self.rooms.reset();
        self.notices.drain();
    }
}
