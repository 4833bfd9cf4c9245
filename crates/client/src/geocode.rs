//! Reverse geocoding for pickup and dropoff coordinates.
//!
//! Public geocoders rate-limit aggressively, so lookups go through a single
//! queue: one request in flight, spaced by `interval`, results memoized per
//! rounded coordinate.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::oneshot;
use rideshare_shared::{GeoPoint, Ride};

use crate::error::GeocodeError;

/// Shown when a lookup fails. Never memoized, so a later lookup retries.
pub const ADDRESS_UNAVAILABLE: &str = "Address unavailable";

const KEY_SCALE: f64 = 1e5;

#[async_trait(?Send)]
pub trait Geocoder {
    async fn reverse(&self, point: GeoPoint) -> Result<String, GeocodeError>;
}

type CacheKey = (i64, i64);

fn cache_key(point: GeoPoint) -> CacheKey {
    (
        (point.lat * KEY_SCALE).round() as i64,
        (point.lng * KEY_SCALE).round() as i64,
    )
}

struct Pending {
    point: GeoPoint,
    reply: oneshot::Sender<String>,
}

/// Releases the drain flag however the drain ends. A drain dropped midway
/// also drops the waiting replies so their callers requeue.
struct DrainGuard<'a> {
    queue: &'a GeocodeQueue,
    finished: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let abandoned = std::mem::take(&mut *self.queue.pending.borrow_mut());
            drop(abandoned);
        }
        self.queue.draining.set(false);
    }
}

pub struct GeocodeQueue {
    geocoder: Rc<dyn Geocoder>,
    interval: Duration,
    cache: RefCell<HashMap<CacheKey, String>>,
    pending: RefCell<VecDeque<Pending>>,
    draining: Cell<bool>,
    requests_made: Cell<u64>,
}

impl GeocodeQueue {
    pub fn new(geocoder: Rc<dyn Geocoder>, interval: Duration) -> Self {
        Self {
            geocoder,
            interval,
            cache: RefCell::new(HashMap::new()),
            pending: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
            requests_made: Cell::new(0),
        }
    }

    pub fn cached(&self, point: GeoPoint) -> Option<String> {
        self.cache.borrow().get(&cache_key(point)).cloned()
    }

    /// Number of lookups actually sent to the geocoder.
    pub fn requests_made(&self) -> u64 {
        self.requests_made.get()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Queue a lookup. The receiver resolves once the queue reaches it.
    pub fn enqueue(&self, point: GeoPoint) -> oneshot::Receiver<String> {
        let (reply, rx) = oneshot::channel();
        self.pending.borrow_mut().push_back(Pending { point, reply });
        rx
    }

    /// Resolve an address, draining the queue if nobody else is.
    ///
    /// If the drain serving this lookup is dropped before reaching it, the
    /// lookup is queued again.
    pub async fn resolve(&self, point: GeoPoint) -> String {
        loop {
            if let Some(hit) = self.cached(point) {
                return hit;
            }
            let rx = self.enqueue(point);
            self.drain().await;
            if let Ok(address) = rx.await {
                return address;
            }
            crate::log_debug!("GeocodeQueue: drain abandoned, requeueing {:?}", point);
        }
    }

    /// Work through queued lookups one at a time. Re-entrant calls return
    /// immediately; the running drain picks up their entries.
    pub async fn drain(&self) {
        if self.draining.replace(true) {
            return;
        }
        let mut guard = DrainGuard {
            queue: self,
            finished: false,
        };

        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(Pending { point, reply }) = next else {
                break;
            };

            let address = match self.cached(point) {
                Some(hit) => hit,
                None => self.lookup(point).await,
            };
            // The caller may have gone away.
            let _ = reply.send(address);
        }

        guard.finished = true;
    }

    async fn lookup(&self, point: GeoPoint) -> String {
        if self.requests_made.get() > 0 && !self.interval.is_zero() {
            crate::timer::sleep(self.interval).await;
        }
        self.requests_made.set(self.requests_made.get() + 1);

        match self.geocoder.reverse(point).await {
            Ok(address) => {
                self.cache.borrow_mut().insert(cache_key(point), address.clone());
                address
            }
            Err(e) => {
                crate::log_warn!("GeocodeQueue: lookup for {:?} failed: {}", point, e);
                ADDRESS_UNAVAILABLE.to_string()
            }
        }
    }

    /// Fill in missing pickup and dropoff addresses.
    pub async fn resolve_ride_addresses(&self, ride: &mut Ride) {
        if ride.pickup_address.is_none() {
            ride.pickup_address = Some(self.resolve(ride.pickup).await);
        }
        if ride.dropoff_address.is_none() {
            ride.dropoff_address = Some(self.resolve(ride.dropoff).await);
        }
    }
}
