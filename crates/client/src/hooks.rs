//! Dioxus bindings for the ride session.
//!
//! The session lives in context for the whole login. Hooks only subscribe to
//! its store; their cleanups never detach listeners or leave rooms. The driver
//! page is the exception: its request channel is page-scoped and closes when
//! the page unmounts.

use std::rc::Rc;

use dioxus::prelude::*;
use rideshare_shared::{DriverAvailability, Ride};

use crate::driver::DriverRequestChannel;
use crate::session::RideChannelSession;
use crate::sync::RideState;
use crate::ws::ConnectionState;

/// Install the session for the signed-in user and start its signal pump and
/// poller. Call once, from the application shell.
pub fn use_ride_session_provider(
    create: impl FnOnce() -> Rc<RideChannelSession>,
) -> Rc<RideChannelSession> {
    let session = use_context_provider(create);
    use_hook(|| {
        spawn(session.clone().run());
        spawn(session.clone().poll());
    });
    session
}

pub fn use_ride_session() -> Rc<RideChannelSession> {
    use_context::<Rc<RideChannelSession>>()
}

/// The active ride, kept in sync with the session store.
pub fn use_active_ride() -> Signal<RideState> {
    let session = use_ride_session();
    let state = use_signal(|| session.store().snapshot());

    let observer = use_hook(|| {
        session.mount();
        let id = session.store().subscribe(move |_, snapshot| {
            let mut state = state;
            state.set(snapshot.clone());
        });
        let engine = session.engine().clone();
        spawn(async move {
            let _ = engine.refresh().await;
        });
        id
    });

    let store = session.store().clone();
    use_drop(move || store.unsubscribe(observer));

    state
}

/// Push channel state, for connection indicators.
pub fn use_connection_state() -> Signal<ConnectionState> {
    let session = use_ride_session();
    let state = use_signal(|| session.connection().state());

    let listener = use_hook(|| {
        session.connection().on_state_change(move |next| {
            let mut state = state;
            state.set(next.clone());
        })
    });

    let connection = session.connection().clone();
    use_drop(move || connection.remove_state_listener(listener));

    state
}

#[derive(Clone)]
pub struct DriverRequests {
    pub channel: Rc<DriverRequestChannel>,
    pub requests: Signal<Vec<Ride>>,
}

/// Open the driver's offer channel for the lifetime of the calling page.
pub fn use_driver_requests(availability: DriverAvailability) -> DriverRequests {
    let session = use_ride_session();
    let requests = use_signal(Vec::<Ride>::new);

    let channel = use_hook(|| {
        let channel = DriverRequestChannel::open(
            session.api(),
            session.connector(),
            session.notices().clone(),
            availability,
        );
        channel.on_queue_change(move |queue| {
            let mut requests = requests;
            requests.set(queue.to_vec());
        });
        spawn(channel.clone().run());
        let pending = channel.clone();
        spawn(async move { pending.refresh_active_ride().await });
        channel
    });

    if channel.availability() != availability {
        channel.set_availability(availability);
    }

    let closing = channel.clone();
    use_drop(move || closing.close());

    DriverRequests { channel, requests }
}
