mod common;

use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;
use common::*;
use futures_channel::oneshot;
use futures_util::future::join as join_futures;
use rideshare_client::ws::ChannelSignal;
use rideshare_client::{LoadStatus, NoticeLevel, RetryAction, StoreEvent, SyncAction};
use rideshare_shared::{GeoPoint, ProblemDetails, RidePatch, RideStatus, ServerEvent};

fn record_events(session: &rideshare_client::RideChannelSession) -> Rc<RefCell<Vec<StoreEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    session.store().subscribe(move |e, _| sink.borrow_mut().push(*e));
    events
}

#[tokio::test]
async fn completed_status_leaves_room_invalidates_and_refetches() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::InTransit)));
    let connector = RecordingConnector::new();
    let session = connected_session(api.clone(), connector.clone()).await;
    session.engine().refresh().await.unwrap();
    let events = record_events(&session);

    api.set_active(Some(ride("r1", RideStatus::Completed)));
    let action = session
        .handle_signal(event(status_change("r1", RideStatus::Completed)))
        .await;

    assert_eq!(
        action,
        Some(SyncAction::Refetch {
            ride_id: "r1".into()
        })
    );
    assert_eq!(connector.sent(), vec![join("r1"), leave("r1")]);
    assert!(events
        .borrow()
        .iter()
        .any(|e| matches!(e, StoreEvent::Invalidated { .. })));
    assert_eq!(api.fetches.get(), 2);

    let state = session.store().snapshot();
    assert!(!state.stale);
    assert_eq!(state.ride.map(|r| r.status), Some(RideStatus::Completed));
}

#[tokio::test]
async fn terminal_ride_update_patch_also_refetches() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::Accepted)));
    let connector = RecordingConnector::new();
    let session = connected_session(api.clone(), connector.clone()).await;
    session.engine().refresh().await.unwrap();

    api.set_active(None);
    let patch = RidePatch {
        id: "r1".into(),
        status: Some(RideStatus::CancelledByAdmin),
        ..Default::default()
    };
    let action = session.handle_signal(event(ServerEvent::RideUpdate(patch))).await;

    assert!(matches!(action, Some(SyncAction::Refetch { .. })));
    assert_eq!(connector.sent(), vec![join("r1"), leave("r1")]);
    assert!(session.store().ride().is_none());
}

#[tokio::test]
async fn duplicate_terminal_events_refetch_once() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::InTransit)));
    let connector = RecordingConnector::new();
    let session = connected_session(api.clone(), connector.clone()).await;
    session.engine().refresh().await.unwrap();

    api.set_active(Some(ride("r1", RideStatus::Completed)));
    let completed = status_change("r1", RideStatus::Completed);
    session.handle_signal(event(completed.clone())).await;
    let second = session.handle_signal(event(completed)).await;

    assert_eq!(second, Some(SyncAction::Ignored));
    assert_eq!(api.fetches.get(), 2);
    assert_eq!(connector.sent(), vec![join("r1"), leave("r1")]);
}

#[tokio::test]
async fn server_reporting_no_ride_clears_the_store_idempotently() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::Accepted)));
    let connector = RecordingConnector::new();
    let session = connected_session(api.clone(), connector.clone()).await;
    session.engine().refresh().await.unwrap();
    session.store().invalidate();

    api.set_active(None);
    session.engine().refresh().await.unwrap();
    assert!(session.store().ride().is_none());
    assert_eq!(connector.sent(), vec![join("r1"), leave("r1")]);

    let settled = session.store().snapshot();
    session.engine().apply_snapshot(None);
    assert_eq!(session.store().snapshot(), settled);
    assert_eq!(connector.sent(), vec![join("r1"), leave("r1")]);
}

#[tokio::test]
async fn events_for_other_rides_are_dropped() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::Accepted)));
    let connector = RecordingConnector::new();
    let session = connected_session(api.clone(), connector.clone()).await;
    session.engine().refresh().await.unwrap();
    let before = session.store().snapshot();

    let action = session
        .handle_signal(event(status_change("r2", RideStatus::Completed)))
        .await;
    let moved = session
        .handle_signal(event(ServerEvent::DriverLocationUpdate {
            ride_id: "r2".into(),
            location: GeoPoint::new(1.0, 2.0),
            timestamp: Utc::now(),
        }))
        .await;

    assert_eq!(action, Some(SyncAction::Ignored));
    assert_eq!(moved, Some(SyncAction::Ignored));
    assert_eq!(session.store().snapshot(), before);
    assert_eq!(api.fetches.get(), 1);
    assert_eq!(connector.sent(), vec![join("r1")]);
}

#[tokio::test]
async fn events_without_a_tracked_ride_are_dropped() {
    let connector = RecordingConnector::new();
    let session = connected_session(MockRideApi::new(), connector.clone()).await;

    let action = session
        .handle_signal(event(status_change("r1", RideStatus::Accepted)))
        .await;

    assert_eq!(action, Some(SyncAction::Ignored));
    assert!(session.store().ride().is_none());
    assert!(connector.sent().is_empty());
}

#[tokio::test]
async fn duplicate_status_change_is_recorded_once() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::Requested)));
    let session = connected_session(api.clone(), RecordingConnector::new()).await;
    session.engine().refresh().await.unwrap();

    let accepted = status_change("r1", RideStatus::Accepted);
    let first = session.handle_signal(event(accepted.clone())).await;
    let second = session.handle_signal(event(accepted)).await;

    assert_eq!(first, Some(SyncAction::Patched));
    assert_eq!(second, Some(SyncAction::Ignored));

    let ride = session.store().ride().unwrap();
    let history: Vec<RideStatus> = ride.status_history.iter().map(|h| h.status).collect();
    assert_eq!(history, vec![RideStatus::Requested, RideStatus::Accepted]);
    assert_eq!(ride.status, RideStatus::Accepted);
}

#[tokio::test]
async fn driver_location_update_touches_only_the_location() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::GoingToPickUp)));
    let connector = RecordingConnector::new();
    let session = connected_session(api.clone(), connector.clone()).await;
    session.engine().refresh().await.unwrap();

    let location = GeoPoint::new(-73.99, 40.75);
    let action = session
        .handle_signal(event(ServerEvent::DriverLocationUpdate {
            ride_id: "r1".into(),
            location,
            timestamp: Utc::now(),
        }))
        .await;

    assert_eq!(action, Some(SyncAction::LocationUpdated));
    let ride = session.store().ride().unwrap();
    assert_eq!(ride.driver_location, Some(location));
    assert_eq!(ride.status, RideStatus::GoingToPickUp);
    assert_eq!(api.fetches.get(), 1);
    assert_eq!(connector.sent(), vec![join("r1")]);
}

#[tokio::test]
async fn not_found_means_no_active_ride_without_a_notice() {
    let api = MockRideApi::new();
    api.fail_active(http_error(404, ""));
    let session = connected_session(api.clone(), RecordingConnector::new()).await;

    let result = session.engine().refresh().await;

    assert_eq!(result, Ok(None));
    assert!(session.notices().is_empty());
    assert_eq!(session.store().snapshot().status, LoadStatus::Ready);
}

#[tokio::test]
async fn transient_failure_is_surfaced_with_retry() {
    let api = MockRideApi::new();
    api.fail_active(http_error(503, ""));
    let session = connected_session(api.clone(), RecordingConnector::new()).await;

    assert!(session.engine().refresh().await.is_err());

    let notices = session.notices().list();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert_eq!(notices[0].retry, Some(RetryAction::RefetchActiveRide));
    assert!(matches!(
        session.store().snapshot().status,
        LoadStatus::Failed {
            retryable: true,
            ..
        }
    ));
}

#[tokio::test]
async fn rejected_fetch_message_is_shown_verbatim_without_retry() {
    let api = MockRideApi::new();
    let body = ProblemDetails::new(403, "Forbidden", "Your account is suspended").to_body();
    api.fail_active(http_error(403, &body));
    let session = connected_session(api.clone(), RecordingConnector::new()).await;

    assert!(session.engine().refresh().await.is_err());

    let notices = session.notices().list();
    assert_eq!(notices[0].message, "Your account is suspended");
    assert_eq!(notices[0].retry, None);
}

#[tokio::test]
async fn older_fetch_completing_late_is_discarded() {
    let api = MockRideApi::new();
    let (release, gate) = oneshot::channel();
    *api.hold_next_fetch.borrow_mut() = Some(gate);
    api.queued
        .borrow_mut()
        .push_back(Ok(Some(ride("r1", RideStatus::Requested))));
    api.queued
        .borrow_mut()
        .push_back(Ok(Some(ride("r1", RideStatus::Accepted))));
    let session = connected_session(api.clone(), RecordingConnector::new()).await;
    let engine = session.engine().clone();

    let slow = engine.refresh();
    let fast = async {
        let result = engine.refresh().await;
        let _ = release.send(());
        result
    };
    let (slow_result, fast_result) = join_futures(slow, fast).await;

    assert_eq!(
        slow_result.unwrap().map(|r| r.status),
        Some(RideStatus::Requested)
    );
    assert_eq!(
        fast_result.unwrap().map(|r| r.status),
        Some(RideStatus::Accepted)
    );
    assert_eq!(
        session.store().ride().map(|r| r.status),
        Some(RideStatus::Accepted)
    );
}

#[tokio::test]
async fn store_observers_see_each_write_with_increasing_versions() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::Accepted)));
    let session = connected_session(api.clone(), RecordingConnector::new()).await;
    let events = record_events(&session);

    session.engine().refresh().await.unwrap();
    session
        .handle_signal(event(status_change("r1", RideStatus::GoingToPickUp)))
        .await;

    let events = events.borrow();
    assert!(matches!(events[0], StoreEvent::Loading));
    let (replaced, patched) = match (&events[1], &events[2]) {
        (StoreEvent::Replaced { version: a }, StoreEvent::Patched { version: b }) => (*a, *b),
        other => panic!("unexpected events {:?}", other),
    };
    assert!(patched > replaced);
}

#[tokio::test]
async fn late_status_change_after_completion_is_ignored() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::InTransit)));
    let connector = RecordingConnector::new();
    let session = connected_session(api.clone(), connector.clone()).await;
    session.engine().refresh().await.unwrap();

    api.set_active(Some(ride("r1", RideStatus::Completed)));
    session
        .handle_signal(event(status_change("r1", RideStatus::Completed)))
        .await;

    let late = ServerEvent::RideStatusChange {
        ride_id: "r1".into(),
        status: RideStatus::ReachedDestination,
        updated_by: Some("driver-1".into()),
        timestamp: Utc::now() - chrono::Duration::seconds(5),
    };
    let action = session.handle_signal(event(late)).await;
    let patch = RidePatch {
        id: "r1".into(),
        status: Some(RideStatus::InTransit),
        ..Default::default()
    };
    let update = session.handle_signal(event(ServerEvent::RideUpdate(patch))).await;

    assert_eq!(action, Some(SyncAction::Ignored));
    assert_eq!(update, Some(SyncAction::Ignored));
    assert_eq!(
        session.store().ride().map(|r| r.status),
        Some(RideStatus::Completed)
    );
    assert_eq!(connector.sent(), vec![join("r1"), leave("r1")]);
    assert_eq!(api.fetches.get(), 2);
}

#[tokio::test]
async fn older_status_change_does_not_undo_a_newer_update() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::GoingToPickUp)));
    let connector = RecordingConnector::new();
    let session = connected_session(api.clone(), connector.clone()).await;
    session.engine().refresh().await.unwrap();

    let now = Utc::now();
    let patch = RidePatch {
        id: "r1".into(),
        status: Some(RideStatus::InTransit),
        updated_at: Some(now),
        ..Default::default()
    };
    session.handle_signal(event(ServerEvent::RideUpdate(patch))).await;
    let arrived = ServerEvent::RideStatusChange {
        ride_id: "r1".into(),
        status: RideStatus::DriverArrived,
        updated_by: Some("driver-1".into()),
        timestamp: now - chrono::Duration::seconds(10),
    };
    let action = session.handle_signal(event(arrived)).await;

    assert_eq!(action, Some(SyncAction::Patched));
    let cached = session.store().ride().unwrap();
    assert_eq!(cached.status, RideStatus::InTransit);
    assert_eq!(
        cached.status_history.last().map(|e| e.status),
        Some(RideStatus::DriverArrived)
    );
    assert_eq!(connector.sent(), vec![join("r1")]);
}

#[tokio::test]
async fn fetch_in_flight_across_a_terminal_push_is_discarded() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::InTransit)));
    let connector = RecordingConnector::new();
    let session = connected_session(api.clone(), connector.clone()).await;
    session.engine().refresh().await.unwrap();

    let (release, gate) = oneshot::channel();
    *api.hold_next_fetch.borrow_mut() = Some(gate);
    api.queued
        .borrow_mut()
        .push_back(Ok(Some(ride("r1", RideStatus::InTransit))));
    api.set_active(Some(ride("r1", RideStatus::Completed)));

    let engine = session.engine().clone();
    let background = engine.refresh();
    let terminal = async {
        let action = session
            .handle_signal(event(status_change("r1", RideStatus::Completed)))
            .await;
        let _ = release.send(());
        action
    };
    let (background_result, action) = join_futures(background, terminal).await;

    assert_eq!(
        background_result.unwrap().map(|r| r.status),
        Some(RideStatus::InTransit)
    );
    assert!(matches!(action, Some(SyncAction::Refetch { .. })));
    let state = session.store().snapshot();
    assert!(!state.stale);
    assert_eq!(state.ride.map(|r| r.status), Some(RideStatus::Completed));
    assert_eq!(connector.sent(), vec![join("r1"), leave("r1")]);
    assert_eq!(api.fetches.get(), 3);
}

#[tokio::test]
async fn fetch_in_flight_across_a_reconnect_is_discarded() {
    let api = MockRideApi::with_active(Some(ride("r1", RideStatus::Accepted)));
    let connector = RecordingConnector::new();
    let session = connected_session(api.clone(), connector.clone()).await;
    session.engine().refresh().await.unwrap();

    let (release, gate) = oneshot::channel();
    *api.hold_next_fetch.borrow_mut() = Some(gate);
    api.queued
        .borrow_mut()
        .push_back(Ok(Some(ride("r1", RideStatus::Accepted))));
    api.set_active(Some(ride("r1", RideStatus::DriverArrived)));

    let engine = session.engine().clone();
    let background = engine.refresh();
    let reconnect = async {
        session.handle_signal(ChannelSignal::Connected).await;
        let _ = release.send(());
    };
    join_futures(background, reconnect).await;

    let state = session.store().snapshot();
    assert!(!state.stale);
    assert_eq!(
        state.ride.map(|r| r.status),
        Some(RideStatus::DriverArrived)
    );
    assert_eq!(api.fetches.get(), 3);
}
