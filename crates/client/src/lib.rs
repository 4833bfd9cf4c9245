//! Rideshare client - real-time active ride synchronization
//!
//! This crate keeps a client's view of its active ride consistent across HTTP
//! snapshots and push events, and delivers ride offers to drivers. It runs in
//! the browser (WASM) and on desktop.

#[macro_use]
pub mod logging;

pub mod actions;
pub mod api_client;
pub mod config;
pub mod driver;
pub mod error;
pub mod geocode;
pub mod hooks;
pub mod notifications;
pub mod session;
pub mod storage;
pub mod sync;
pub mod timer;
pub mod ws;

pub use actions::{RideActions, VehicleRoster};
pub use api_client::{ApiClient, RideApi};
pub use config::ClientConfig;
pub use driver::{DriverRequestChannel, IncomingRequestQueue};
pub use error::{ActionError, GeocodeError};
pub use geocode::{GeocodeQueue, Geocoder, ADDRESS_UNAVAILABLE};
pub use notifications::{Notice, NoticeLevel, NotificationCenter, RetryAction};
pub use session::RideChannelSession;
pub use storage::{SessionFlags, Storage};
pub use sync::{LoadStatus, RideState, RideStore, RideSyncEngine, StoreEvent, SyncAction};
