//! End-to-end tests for the junction controller.
//!
//! Each test spawns a real [`JunctionRegistry`] with paused tokio time, so
//! worker deadlines fire deterministically as the test sleeps. Observations
//! are taken between phase boundaries rather than exactly on them.

#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::sleep;
use velocity_core::{JunctionRegistry, VelocityConfig};
use velocity_types::{Direction, JunctionEvent, JunctionMode, JunctionState, SignalColor, VehicleId};

const CONFIG: &str = r"
timing:
  emergency_duration_ms: 5000
  signal_green_duration_ms: 4000
  signal_yellow_duration_ms: 1000
junctions:
  j1:
    name: First
    lat: 10.0
    lng: 20.0
  j2:
    name: Second
    lat: 11.0
    lng: 21.0
";

async fn start() -> (JunctionRegistry, broadcast::Receiver<JunctionEvent>) {
    let config = VelocityConfig::parse(CONFIG).unwrap();
    config.validate().unwrap();
    let (tx, rx) = broadcast::channel::<JunctionEvent>(256);
    let registry = JunctionRegistry::spawn(&config, Arc::new(tx));
    registry.start_all().await.unwrap();
    (registry, rx)
}

async fn state(registry: &JunctionRegistry, id: &str) -> JunctionState {
    registry.junction(id).await.unwrap().unwrap()
}

fn drain(rx: &mut broadcast::Receiver<JunctionEvent>) -> Vec<JunctionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn green_count(state: &JunctionState) -> usize {
    state.signals.count(SignalColor::Green)
}

#[tokio::test(start_paused = true)]
async fn rotation_follows_green_and_yellow_durations() {
    let (registry, _rx) = start().await;

    sleep(Duration::from_millis(3500)).await;
    let s = state(&registry, "j1").await;
    assert_eq!(s.signals.color(Direction::North), SignalColor::Green);

    // 4500: North YELLOW, nothing GREEN.
    sleep(Duration::from_millis(1000)).await;
    let s = state(&registry, "j1").await;
    assert_eq!(s.signals.color(Direction::North), SignalColor::Yellow);
    assert_eq!(green_count(&s), 0);

    // 5500: South GREEN.
    sleep(Duration::from_millis(1000)).await;
    let s = state(&registry, "j1").await;
    assert_eq!(s.signals.color(Direction::North), SignalColor::Red);
    assert_eq!(s.signals.color(Direction::South), SignalColor::Green);
    assert_eq!(s.current_cycle_signal, Direction::South);

    // 20500: a full rotation later North is GREEN again.
    sleep(Duration::from_millis(15_000)).await;
    let s = state(&registry, "j1").await;
    assert_eq!(s.current_cycle_signal, Direction::North);
    assert_eq!(s.signals.color(Direction::North), SignalColor::Green);
    assert_eq!(green_count(&s), 1);

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn never_more_than_one_green() {
    let (registry, _rx) = start().await;

    for _ in 0..100 {
        sleep(Duration::from_millis(250)).await;
        for id in ["j1", "j2"] {
            let s = state(&registry, id).await;
            assert!(green_count(&s) <= 1, "{id}: {:?}", s.signals);
        }
    }

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn emergency_overrides_and_reverts_to_north() {
    let (registry, mut rx) = start().await;

    // 9500: South is YELLOW.
    sleep(Duration::from_millis(9500)).await;
    assert_eq!(
        state(&registry, "j1").await.signals.color(Direction::South),
        SignalColor::Yellow
    );
    drain(&mut rx);

    assert!(
        registry
            .trigger_emergency("j1", VehicleId::from("amb-7"))
            .await
            .unwrap()
    );

    let s = state(&registry, "j1").await;
    assert_eq!(s.mode, JunctionMode::Emergency);
    assert!(s.emergency_active);
    assert_eq!(s.triggered_by, Some(VehicleId::from("amb-7")));
    assert_eq!(s.signals.color(Direction::North), SignalColor::Green);
    assert_eq!(s.signals.count(SignalColor::Red), 3);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    match &events[0] {
        JunctionEvent::JunctionUpdate(update) => {
            assert_eq!(update.junction_id.as_str(), "j1");
            assert_eq!(update.triggered_by, Some(VehicleId::from("amb-7")));
        }
        JunctionEvent::JunctionLocationUpdated(_) => panic!("expected junction update"),
    }

    // The emergency pattern holds through the window.
    sleep(Duration::from_millis(4500)).await;
    assert_eq!(state(&registry, "j1").await.mode, JunctionMode::Emergency);

    // After the window the rotation restarts at North, not South.
    sleep(Duration::from_millis(1000)).await;
    let s = state(&registry, "j1").await;
    assert_eq!(s.mode, JunctionMode::AutoCycle);
    assert!(!s.emergency_active);
    assert_eq!(s.current_cycle_signal, Direction::North);
    assert_eq!(s.signals.color(Direction::North), SignalColor::Green);

    // The other junction was never disturbed.
    assert_eq!(state(&registry, "j2").await.mode, JunctionMode::AutoCycle);

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn retrigger_extends_the_window() {
    let (registry, _rx) = start().await;

    registry
        .trigger_emergency("j1", VehicleId::from("amb-1"))
        .await
        .unwrap();
    sleep(Duration::from_millis(2500)).await;
    registry
        .trigger_emergency("j1", VehicleId::from("amb-2"))
        .await
        .unwrap();

    // 5500: past the first window, still preempted.
    sleep(Duration::from_millis(3000)).await;
    let s = state(&registry, "j1").await;
    assert_eq!(s.mode, JunctionMode::Emergency);
    assert_eq!(s.triggered_by, Some(VehicleId::from("amb-2")));

    // 8000: past the second window.
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(state(&registry, "j1").await.mode, JunctionMode::AutoCycle);

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_junction_is_inert() {
    let (registry, mut rx) = start().await;
    drain(&mut rx);
    let before = registry.all().await.unwrap();

    assert!(
        !registry
            .trigger_emergency("nope", VehicleId::from("amb-1"))
            .await
            .unwrap()
    );
    assert!(!registry.request_auto_cycle("nope").await.unwrap());
    assert!(!registry.update_location("nope", 0.0, 0.0).await.unwrap());

    assert!(drain(&mut rx).is_empty());
    assert_eq!(registry.all().await.unwrap(), before);

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_auto_cycle_ends_emergency_early() {
    let (registry, _rx) = start().await;

    registry
        .trigger_emergency("j2", VehicleId::from("amb-1"))
        .await
        .unwrap();
    sleep(Duration::from_millis(1000)).await;
    assert!(registry.request_auto_cycle("j2").await.unwrap());

    let s = state(&registry, "j2").await;
    assert_eq!(s.mode, JunctionMode::AutoCycle);
    assert_eq!(s.signals.color(Direction::North), SignalColor::Green);

    // The cancelled reversion must not restart the rotation at 5000: North
    // turns YELLOW on its own schedule at 5000 and stays YELLOW until 6000.
    sleep(Duration::from_millis(4500)).await;
    let s = state(&registry, "j2").await;
    assert_eq!(s.signals.color(Direction::North), SignalColor::Yellow);

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn location_update_is_broadcast_and_keeps_mode() {
    let (registry, mut rx) = start().await;
    drain(&mut rx);

    assert!(registry.update_location("j1", 51.5, -0.12).await.unwrap());

    let s = state(&registry, "j1").await;
    assert!((s.lat - 51.5).abs() < f64::EPSILON);
    assert!(s.last_updated.is_some());
    assert_eq!(s.mode, JunctionMode::AutoCycle);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name(), "junction_location_updated");

    registry.shutdown().await;
}
