//! Push channel plumbing for real-time ride updates.
//!
//! This module provides:
//! - A connection with auto-reconnect ([`Connector`], [`ChannelHandle`])
//! - A per-session owner of that connection ([`ConnectionManager`])
//! - Ride room membership ([`RoomTracker`])
//! - Handler bindings attached once per connection ([`ListenerRegistry`])
//!
//! # Architecture
//!
//! ```text
//!   ┌───────────────────┐   commands   ┌──────────────────┐
//!   │    RoomTracker    │ ───────────▶ │ ConnectionManager│ ──▶ socket
//!   └───────────────────┘              └──────────────────┘
//!             ▲ state changes                   │ ChannelSignal
//!             └─────────────────────────────────┤
//!                                               ▼
//!                                    ┌──────────────────┐
//!                                    │ ListenerRegistry │ ──▶ RideSyncEngine
//!                                    └──────────────────┘
//! ```
//!
//! Components never read socket events directly; handlers write into the ride
//! store and components read from the store.

mod connection;
mod listeners;
mod manager;
mod rooms;

pub use connection::{
    ChannelError, ChannelHandle, ChannelSignal, ConnectionState, Connector, ReconnectConfig,
    WsConnector,
};
pub use listeners::{EventHandler, ListenerRegistry};
pub use manager::{ConnectionManager, ListenerId, StateListener};
pub use rooms::RoomTracker;
