//! Active ride state and its reconciliation.

mod engine;
mod store;

pub use engine::{RideSyncEngine, SyncAction};
pub use store::{LoadStatus, ObserverId, RideState, RideStore, StoreEvent};
