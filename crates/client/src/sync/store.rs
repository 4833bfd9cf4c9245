//! The single store holding the session's active ride.
//!
//! Both the HTTP layer and the push layer write here through
//! [`RideSyncEngine`](super::RideSyncEngine); components only read. Every write
//! bumps `version`, so a caller that needs a write to have landed before it
//! continues can compare versions instead of waiting on a timer.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rideshare_shared::Ride;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Failed { message: String, retryable: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RideState {
    pub ride: Option<Ride>,
    pub status: LoadStatus,
    /// Set when the cached ride must not be trusted until the next fetch lands.
    pub stale: bool,
    pub version: u64,
}

impl Default for RideState {
    fn default() -> Self {
        Self {
            ride: None,
            status: LoadStatus::Idle,
            stale: false,
            version: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    Loading,
    Replaced { version: u64 },
    Patched { version: u64 },
    Invalidated { version: u64 },
    Cleared { version: u64 },
    LoadFailed { version: u64 },
}

type Observer = Rc<dyn Fn(&StoreEvent, &RideState)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

#[derive(Default)]
pub struct RideStore {
    state: RefCell<RideState>,
    observers: RefCell<Vec<(ObserverId, Observer)>>,
    next_observer: Cell<u64>,
}

impl RideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RideState {
        self.state.borrow().clone()
    }

    pub fn ride(&self) -> Option<Ride> {
        self.state.borrow().ride.clone()
    }

    pub fn ride_id(&self) -> Option<String> {
        self.state.borrow().ride.as_ref().map(|r| r.id.clone())
    }

    pub fn version(&self) -> u64 {
        self.state.borrow().version
    }

    pub fn is_stale(&self) -> bool {
        self.state.borrow().stale
    }

    pub fn set_loading(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.status == LoadStatus::Loading {
                return;
            }
            state.status = LoadStatus::Loading;
        }
        self.notify(StoreEvent::Loading);
    }

    /// Store a server-confirmed ride, replacing whatever was cached.
    pub fn replace(&self, ride: Ride) -> u64 {
        let version = self.write(|state| {
            state.ride = Some(ride);
            state.stale = false;
            state.status = LoadStatus::Ready;
        });
        self.notify(StoreEvent::Replaced { version });
        version
    }

    /// Drop the cached ride. Returns `None` when the store was already empty
    /// and settled.
    pub fn clear(&self) -> Option<u64> {
        {
            let state = self.state.borrow();
            if state.ride.is_none() && state.status == LoadStatus::Ready && !state.stale {
                return None;
            }
        }
        let version = self.write(|state| {
            state.ride = None;
            state.stale = false;
            state.status = LoadStatus::Ready;
        });
        self.notify(StoreEvent::Cleared { version });
        Some(version)
    }

    /// Modify the cached ride in place if it is `ride_id`.
    ///
    /// `f` returns whether it changed anything; `None` is returned when no
    /// matching ride is cached or nothing changed.
    pub fn patch(&self, ride_id: &str, f: impl FnOnce(&mut Ride) -> bool) -> Option<u64> {
        {
            let mut state = self.state.borrow_mut();
            let ride = state.ride.as_mut().filter(|r| r.id == ride_id)?;
            if !f(ride) {
                return None;
            }
            state.version += 1;
        }
        let version = self.version();
        self.notify(StoreEvent::Patched { version });
        Some(version)
    }

    /// Mark the cached ride as untrusted until the next fetch replaces it.
    pub fn invalidate(&self) -> u64 {
        let version = self.write(|state| state.stale = true);
        self.notify(StoreEvent::Invalidated { version });
        version
    }

    /// Record a failed fetch. The cached ride, if any, is kept.
    pub fn set_failed(&self, message: String, retryable: bool) -> u64 {
        let version = self.write(|state| {
            state.status = LoadStatus::Failed { message, retryable };
        });
        self.notify(StoreEvent::LoadFailed { version });
        version
    }

    pub fn subscribe(&self, observer: impl Fn(&StoreEvent, &RideState) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer.get());
        self.next_observer.set(id.0 + 1);
        self.observers.borrow_mut().push((id, Rc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.observers.borrow_mut().retain(|(oid, _)| *oid != id);
    }

    fn write(&self, f: impl FnOnce(&mut RideState)) -> u64 {
        let mut state = self.state.borrow_mut();
        f(&mut state);
        state.version += 1;
        state.version
    }

    fn notify(&self, event: StoreEvent) {
        let observers: Vec<Observer> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        if observers.is_empty() {
            return;
        }
        let state = self.snapshot();
        for observer in observers {
            observer(&event, &state);
        }
    }
}
