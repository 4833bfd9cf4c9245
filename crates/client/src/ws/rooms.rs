//! Ride room membership: at most one room per tracker.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rideshare_shared::ClientCommand;

use super::connection::ConnectionState;
use super::manager::{ConnectionManager, ListenerId};

/// Tracks the one ride room this client belongs to.
///
/// `join`/`leave` are idempotent. When the connection is not up yet the
/// intended room is only recorded and announced once the connection reports
/// `Connected`; after a reconnect the held room is announced again because the
/// server forgets memberships with the socket.
pub struct RoomTracker {
    connection: Rc<ConnectionManager>,
    held: RefCell<Option<String>>,
    /// Whether the server has been told about `held` on the current socket.
    announced: Cell<bool>,
    listener: Cell<Option<ListenerId>>,
}

impl RoomTracker {
    pub fn new(connection: Rc<ConnectionManager>) -> Rc<Self> {
        let tracker = Rc::new(Self {
            connection: connection.clone(),
            held: RefCell::new(None),
            announced: Cell::new(false),
            listener: Cell::new(None),
        });

        let weak: Weak<RoomTracker> = Rc::downgrade(&tracker);
        let id = connection.on_state_change(move |state| {
            if let Some(tracker) = weak.upgrade() {
                tracker.on_connection_state(state);
            }
        });
        tracker.listener.set(Some(id));
        tracker
    }

    /// The room currently held, if any.
    pub fn current(&self) -> Option<String> {
        self.held.borrow().clone()
    }

    pub fn is_announced(&self) -> bool {
        self.announced.get()
    }

    /// Join `ride_id`'s room, leaving any other room first.
    /// Returns false if that room was already held.
    pub fn join(&self, ride_id: &str) -> bool {
        let previous = self.held.borrow().clone();
        if previous.as_deref() == Some(ride_id) {
            crate::log_debug!("RoomTracker: already in room {}", ride_id);
            return false;
        }

        if let Some(old) = previous {
            self.leave(&old);
        }

        *self.held.borrow_mut() = Some(ride_id.to_string());
        if self.connection.is_connected() {
            self.announce(ride_id);
        } else {
            crate::log_debug!("RoomTracker: not connected, deferring join of {}", ride_id);
        }
        true
    }

    /// Leave `ride_id`'s room if it is the one held. Returns false otherwise.
    pub fn leave(&self, ride_id: &str) -> bool {
        if self.held.borrow().as_deref() != Some(ride_id) {
            crate::log_debug!("RoomTracker: not in room {}, nothing to leave", ride_id);
            return false;
        }

        if self.announced.get() {
            crate::log_info!("RoomTracker: leaving room {}", ride_id);
            if let Err(e) = self.connection.send(ClientCommand::LeaveRideRoom {
                ride_id: ride_id.to_string(),
            }) {
                crate::log_warn!("RoomTracker: leave of {} not sent: {}", ride_id, e);
            }
        }
        *self.held.borrow_mut() = None;
        self.announced.set(false);
        true
    }

    /// Leave whatever room is held.
    pub fn leave_current(&self) -> bool {
        match self.current() {
            Some(id) => self.leave(&id),
            None => false,
        }
    }

    /// Forget membership without telling the server (the socket is going away).
    pub fn reset(&self) {
        *self.held.borrow_mut() = None;
        self.announced.set(false);
    }

    fn announce(&self, ride_id: &str) {
        crate::log_info!("RoomTracker: joining room {}", ride_id);
        match self.connection.send(ClientCommand::JoinRideRoom {
            ride_id: ride_id.to_string(),
        }) {
            Ok(()) => self.announced.set(true),
            Err(e) => crate::log_warn!("RoomTracker: join of {} not sent: {}", ride_id, e),
        }
    }

    fn on_connection_state(&self, state: &ConnectionState) {
        if state.is_connected() {
            if self.announced.get() {
                return;
            }
            if let Some(id) = self.current() {
                self.announce(&id);
            }
        } else {
            self.announced.set(false);
        }
    }
}

impl Drop for RoomTracker {
    fn drop(&mut self) {
        if let Some(id) = self.listener.take() {
            self.connection.remove_state_listener(id);
        }
    }
}
