use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use amr_ua::Builder;
use amr_ua::catalog::NodeCatalog;
use amr_ua::error::{Error, TransportError};
use amr_ua::publish::{ChannelBridge, PublishScheduler, PublishState};
use amr_ua::snapshot::PublishSnapshot;
use amr_ua::telemetry::{self, TelemetryUpdate, UPDATE_DATA};
use amr_ua::value::Variant;

fn catalog() -> NodeCatalog {
    NodeCatalog::builder()
        .build()
        .expect("Failed to build catalog")
}

#[test]
fn test_snapshots_reach_bridge() {
    let catalog = catalog();
    let (bridge, rx) = ChannelBridge::unbounded();
    let scheduler = PublishScheduler::builder(catalog.space().clone(), bridge)
        .with_interval(Duration::from_millis(20))
        .build()
        .expect("Failed to start scheduler");

    let first = rx.recv_timeout(Duration::from_secs(2)).expect("No snapshot");
    assert_eq!(first.len(), 16);
    assert_eq!(
        first.get(telemetry::ROBOT_POSE_X).unwrap().value,
        Variant::Double(0.0)
    );

    let update = TelemetryUpdate {
        x: 7.0,
        ..Default::default()
    };
    catalog
        .dispatcher()
        .invoke(UPDATE_DATA, &update.to_inputs())
        .unwrap();

    let seen = (0..100)
        .filter_map(|_| rx.recv_timeout(Duration::from_secs(2)).ok())
        .any(|snap| snap.get(telemetry::ROBOT_POSE_X).unwrap().value == Variant::Double(7.0));
    assert!(seen, "update never published");

    let stats = scheduler.stop();
    assert!(stats.published >= 2);
    assert_eq!(stats.failed, 0);
}

#[test]
fn test_configured_subset_in_order() {
    let catalog = catalog();
    let (bridge, rx) = ChannelBridge::unbounded();
    let _scheduler = PublishScheduler::builder(catalog.space().clone(), bridge)
        .with_interval(Duration::from_millis(10))
        .with_variables([telemetry::BATTERY_SOC, telemetry::ROBOT_POSE_X])
        .build()
        .unwrap();

    let snap = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let names: Vec<_> = snap.fields().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["BatterySoC", "RobotPoseX"]);
}

#[test]
fn test_build_validation() {
    let catalog = catalog();
    let (bridge, _rx) = ChannelBridge::unbounded();
    let err = PublishScheduler::builder(catalog.space().clone(), bridge)
        .with_variables(["NoSuchVariable"])
        .build()
        .err()
        .unwrap();
    assert_eq!(err, Error::NotFound("NoSuchVariable".into()));

    let (bridge, _rx) = ChannelBridge::unbounded();
    let err = PublishScheduler::builder(catalog.space().clone(), bridge)
        .with_interval(Duration::ZERO)
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_busy_ticks_are_dropped() {
    let catalog = catalog();
    let calls = Arc::new(AtomicU64::new(0));
    let (started_tx, started_rx) = flume::unbounded::<()>();
    let (gate_tx, gate_rx) = flume::unbounded::<()>();

    let bridge = {
        let calls = calls.clone();
        move |_: &PublishSnapshot| -> Result<(), TransportError> {
            calls.fetch_add(1, Ordering::SeqCst);
            let _ = started_tx.send(());
            // Blocks until released; returns at once after the gate is dropped.
            let _ = gate_rx.recv();
            Ok(())
        }
    };

    let scheduler = PublishScheduler::builder(catalog.space().clone(), bridge)
        .with_interval(Duration::from_millis(10))
        .build()
        .unwrap();

    started_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("First publish never started");
    thread::sleep(Duration::from_millis(150));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.state(), PublishState::Publishing);
    let stats = scheduler.stats();
    assert!(stats.dropped >= 3, "dropped only {}", stats.dropped);
    assert_eq!(stats.published, 0);

    drop(gate_tx);
    started_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("Publishing did not resume");

    let stats = scheduler.stop();
    assert!(stats.published >= 1);
    assert!(calls.load(Ordering::SeqCst) >= 2);
}

#[test]
fn test_transport_failure_does_not_stop_ticks() {
    let catalog = catalog();
    let attempts = Arc::new(AtomicU64::new(0));
    let bridge = {
        let attempts = attempts.clone();
        move |_: &PublishSnapshot| -> Result<(), TransportError> {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Unavailable("broker down".into()))
        }
    };

    let scheduler = PublishScheduler::builder(catalog.space().clone(), bridge)
        .with_interval(Duration::from_millis(10))
        .build()
        .unwrap();

    for _ in 0..200 {
        if attempts.load(Ordering::SeqCst) >= 3 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    let stats = scheduler.stop();
    assert!(stats.failed >= 3, "failed only {}", stats.failed);
    assert_eq!(stats.published, 0);
}

#[test]
fn test_panicking_bridge_does_not_stall_publishing() {
    let catalog = catalog();
    let calls = Arc::new(AtomicU64::new(0));
    let bridge = {
        let calls = calls.clone();
        move |_: &PublishSnapshot| -> Result<(), TransportError> {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("bridge exploded");
            }
            Ok(())
        }
    };

    let scheduler = PublishScheduler::builder(catalog.space().clone(), bridge)
        .with_interval(Duration::from_millis(10))
        .build()
        .unwrap();

    for _ in 0..200 {
        if scheduler.stats().published >= 2 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    let stats = scheduler.stop();
    assert_eq!(stats.failed, 1);
    assert!(stats.published >= 2, "published only {}", stats.published);
    assert!(calls.load(Ordering::SeqCst) >= 3);
}

#[test]
fn test_no_publish_after_stop() {
    let catalog = catalog();
    let (bridge, rx) = ChannelBridge::unbounded();
    let scheduler = PublishScheduler::builder(catalog.space().clone(), bridge)
        .with_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let stats = scheduler.stop();
    let received = 1 + rx.drain().count() as u64;
    assert_eq!(received, stats.published);

    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_full_channel_counts_as_failure() {
    let catalog = catalog();
    let (bridge, rx) = ChannelBridge::bounded(1);
    let scheduler = PublishScheduler::builder(catalog.space().clone(), bridge)
        .with_interval(Duration::from_millis(10))
        .build()
        .unwrap();

    for _ in 0..200 {
        if scheduler.stats().failed > 0 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    let stats = scheduler.stop();
    assert_eq!(stats.published, 1);
    assert!(stats.failed >= 1);
    assert_eq!(rx.len(), 1);
}
