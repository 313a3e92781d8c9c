mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Notify, mpsc, watch};

use dropin_sync::coordinator::{CoordinatorConfig, PlatformEvent, SyncCoordinator};
use dropin_sync::db::QueueStore;
use dropin_sync::operations::OperationError;
use dropin_sync::relay::SyncRelay;

use common::ScriptedHandler;

fn fast_timers(auto_sync: bool) -> CoordinatorConfig {
    CoordinatorConfig {
        poll_interval: Duration::from_millis(50),
        stats_interval: Duration::from_millis(20),
        auto_sync,
        start_online: true,
    }
}

#[tokio::test]
async fn only_one_pass_runs_at_a_time() {
    let store = common::store().await;
    let gate = Arc::new(Notify::new());
    let handler = Arc::new(ScriptedHandler::ok("meal_served").gated(Arc::clone(&gate)));
    let manager = common::manager(&store);
    manager.enqueue_operation(&common::meal(1)).await.unwrap();
    let coordinator = common::coordinator(manager, common::registry(vec![handler.clone()]), true);

    let first = coordinator.spawn_sync(false);
    common::wait_for(|| coordinator.status().is_syncing).await;

    assert!(coordinator.trigger_sync(false).await.is_none());
    assert!(coordinator.trigger_sync(true).await.is_none());

    gate.notify_one();
    let result = first.await.unwrap().expect("first pass should have run");

    assert_eq!(result.completed, 1);
    assert_eq!(handler.calls(), 1);
    assert_eq!(coordinator.sync_passes(), 1);
    assert!(!coordinator.status().is_syncing);
}

#[tokio::test]
async fn offline_instances_do_not_sync() {
    let store = common::store().await;
    let handler = Arc::new(ScriptedHandler::ok("meal_served"));
    let manager = common::manager(&store);
    manager.enqueue_operation(&common::meal(1)).await.unwrap();
    let coordinator = common::coordinator(manager, common::registry(vec![handler.clone()]), false);

    assert!(coordinator.trigger_sync(false).await.is_none());
    assert_eq!(handler.calls(), 0);
    assert_eq!(coordinator.sync_passes(), 0);
    assert_eq!(common::pending(&store).await.len(), 1);
}

#[tokio::test]
async fn successful_pass_updates_status() {
    let store = common::store().await;
    let manager = common::manager(&store);
    for q in 1..=3 {
        manager.enqueue_operation(&common::meal(q)).await.unwrap();
    }
    let coordinator = common::coordinator(
        manager,
        common::registry(vec![Arc::new(ScriptedHandler::ok("meal_served"))]),
        true,
    );

    let result = coordinator.trigger_sync(true).await.unwrap();
    assert!(result.success);

    let status = coordinator.status();
    assert!(status.last_sync_time.is_some());
    assert!(status.sync_error.is_none());
    assert!(status.progress.is_none());
    assert_eq!(status.sync_stats.pending, 0);
}

#[tokio::test]
async fn failed_pass_records_error_until_next_success() {
    let store = common::store().await;
    let manager = common::manager(&store);
    manager.enqueue_operation(&common::meal(1)).await.unwrap();
    let coordinator = common::coordinator(
        manager,
        common::registry(vec![
            Arc::new(ScriptedHandler::failing(
                "meal_served",
                OperationError::Validation("quantity out of range".into()),
            )),
            Arc::new(ScriptedHandler::ok("guest_check_in")),
        ]),
        true,
    );

    let result = coordinator.trigger_sync(false).await.unwrap();
    assert!(!result.success);
    let status = coordinator.status();
    assert_eq!(
        status.sync_error.as_deref(),
        Some("1 operation(s) failed to sync")
    );
    assert!(status.last_sync_time.is_none());

    store
        .add_to_queue(
            "guest_check_in",
            &json!({ "guest_id": "g-7", "checked_in_at": "2026-03-04T08:30:00Z" }),
        )
        .await
        .unwrap();

    let result = coordinator.trigger_sync(false).await.unwrap();
    assert!(result.success);
    let status = coordinator.status();
    assert!(status.sync_error.is_none());
    assert!(status.last_sync_time.is_some());
    assert_eq!(status.sync_stats.failed, 1);
}

#[tokio::test]
async fn reconnect_starts_a_sync_without_manual_trigger() {
    let store = common::store().await;
    let handler = Arc::new(ScriptedHandler::ok("meal_served"));
    let manager = common::manager(&store);
    for q in 1..=3 {
        manager.enqueue_operation(&common::meal(q)).await.unwrap();
    }
    let coordinator = common::coordinator(manager, common::registry(vec![handler.clone()]), false);

    let (events, events_rx) = mpsc::channel(4);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(Arc::clone(&coordinator).run(events_rx, None, shutdown_rx));

    events.send(PlatformEvent::Connectivity(true)).await.unwrap();
    common::wait_for_pending(&store, 0).await;

    assert!(coordinator.status().is_online);
    assert_eq!(handler.calls(), 3);
    assert_eq!(coordinator.sync_passes(), 1);

    shutdown.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("coordinator did not stop")
        .unwrap();
}

#[tokio::test]
async fn going_offline_stops_syncing() {
    let store = common::store().await;
    let coordinator = common::coordinator(common::manager(&store), common::registry(vec![]), true);

    coordinator
        .handle_event(PlatformEvent::Connectivity(false))
        .await;

    assert!(!coordinator.status().is_online);
    assert!(coordinator.trigger_sync(false).await.is_none());
}

#[tokio::test]
async fn becoming_visible_syncs_when_auto_sync_is_on() {
    let store = common::store().await;
    let manager = common::manager(&store);
    manager.enqueue_operation(&common::meal(1)).await.unwrap();
    let coordinator = common::coordinator(
        manager,
        common::registry(vec![Arc::new(ScriptedHandler::ok("meal_served"))]),
        true,
    );

    coordinator
        .handle_event(PlatformEvent::Visibility(true))
        .await;
    assert_eq!(coordinator.status().sync_stats.pending, 1);

    common::wait_for_pending(&store, 0).await;
    common::wait_for(|| coordinator.sync_passes() == 1).await;
}

#[tokio::test]
async fn auto_sync_off_ignores_visibility() {
    let store = common::store().await;
    let manager = common::manager(&store);
    manager.enqueue_operation(&common::meal(1)).await.unwrap();
    let coordinator = common::coordinator(
        manager,
        common::registry(vec![Arc::new(ScriptedHandler::ok("meal_served"))]),
        true,
    );
    coordinator.set_auto_sync(false);

    coordinator
        .handle_event(PlatformEvent::Visibility(true))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(coordinator.sync_passes(), 0);
    assert_eq!(common::pending(&store).await.len(), 1);

    // A manual trigger still works.
    assert!(coordinator.trigger_sync(false).await.unwrap().success);
}

#[tokio::test]
async fn relay_trigger_starts_a_sync() {
    let store = common::store().await;
    let manager = common::manager(&store);
    manager.enqueue_operation(&common::meal(1)).await.unwrap();
    let coordinator = common::coordinator(
        manager,
        common::registry(vec![Arc::new(ScriptedHandler::ok("meal_served"))]),
        true,
    );

    let relay = SyncRelay::new(true);
    let (_events, events_rx) = mpsc::channel(4);
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(Arc::clone(&coordinator).run(events_rx, Some(relay.subscribe()), shutdown_rx));

    assert_eq!(relay.request_sync_now(), 1);
    common::wait_for_pending(&store, 0).await;

    shutdown.send(true).unwrap();
}

#[tokio::test]
async fn status_changes_are_published() {
    let store = common::store().await;
    let coordinator = common::coordinator(common::manager(&store), common::registry(vec![]), false);
    let mut rx = coordinator.subscribe();

    assert!(coordinator.set_online(true));
    assert!(!coordinator.set_online(true));

    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().is_online);
}

// ── Timers ──────────────────────────────────────────────────────

#[tokio::test]
async fn poll_timer_picks_up_pending_work() {
    let store = common::store().await;
    let handler = Arc::new(ScriptedHandler::ok("meal_served"));
    let coordinator = SyncCoordinator::new(
        Arc::new(common::manager(&store)),
        Arc::new(common::registry(vec![handler.clone()])),
        fast_timers(true),
    );

    let (_events, events_rx) = mpsc::channel(4);
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(Arc::clone(&coordinator).run(events_rx, None, shutdown_rx));

    // Written straight to the store, so nothing but the timer can notice it.
    store
        .add_to_queue("meal_served", &common::meal_json())
        .await
        .unwrap();

    common::wait_for_pending(&store, 0).await;
    assert_eq!(handler.calls(), 1);
    assert!(coordinator.sync_passes() >= 1);

    shutdown.send(true).unwrap();
}

#[tokio::test]
async fn stats_timer_runs_without_auto_sync() {
    let store = common::store().await;
    let coordinator = SyncCoordinator::new(
        Arc::new(common::manager(&store)),
        Arc::new(common::registry(vec![Arc::new(ScriptedHandler::ok("meal_served"))])),
        fast_timers(false),
    );

    let (_events, events_rx) = mpsc::channel(4);
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(Arc::clone(&coordinator).run(events_rx, None, shutdown_rx));

    for _ in 0..2 {
        store
            .add_to_queue("meal_served", &common::meal_json())
            .await
            .unwrap();
    }

    common::wait_for(|| coordinator.status().sync_stats.pending == 2).await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(coordinator.sync_passes(), 0);
    assert_eq!(common::pending(&store).await.len(), 2);

    shutdown.send(true).unwrap();
}
