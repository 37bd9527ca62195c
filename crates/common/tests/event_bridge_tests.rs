//! Event Bridge Integration Tests
//!
//! Tests for the channel carrying monitor events from reader threads to the
//! Tokio runtime, and for the shutdown signal those threads observe.
//!
//! # Test Scenarios
//! - Events from many threads arrive intact and in per-thread order
//! - Receiver closes once every sender is dropped
//! - Shutdown wakes both async waiters and blocking sleepers
//!
//! Run with: `cargo test -p common --test event_bridge_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, hid_keyboard_snapshot, with_timeout};
use common::{MonitorEvent, ReportSink, create_event_bridge, shutdown_channel};
use hid::DeviceIdentity;
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// Event Flow Tests
// ============================================================================

#[tokio::test]
async fn test_events_from_many_readers() {
    let (sender, receiver) = create_event_bridge();

    let handles: Vec<_> = (1..=4u8)
        .map(|address| {
            let sender = sender.clone();
            thread::spawn(move || {
                let identity = DeviceIdentity::new(1, address);
                let mut text = String::new();
                for token in ["a", "b", "c"] {
                    text.push_str(token);
                    sender.report_decoded_stream(identity, &text);
                }
                sender.report_disconnected(identity);
            })
        })
        .collect();
    drop(sender);

    for handle in handles {
        handle.join().unwrap();
    }

    let mut per_device: HashMap<DeviceIdentity, Vec<MonitorEvent>> = HashMap::new();
    while let Ok(event) = with_timeout(DEFAULT_TEST_TIMEOUT, receiver.recv())
        .await
        .expect("receiver did not close")
    {
        per_device.entry(event.identity()).or_default().push(event);
    }

    assert_eq!(per_device.len(), 4);
    for (identity, events) in per_device {
        assert_eq!(
            events,
            vec![
                MonitorEvent::DecodedStream {
                    identity,
                    text: "a".to_string()
                },
                MonitorEvent::DecodedStream {
                    identity,
                    text: "ab".to_string()
                },
                MonitorEvent::DecodedStream {
                    identity,
                    text: "abc".to_string()
                },
                MonitorEvent::Disconnected { identity },
            ]
        );
    }
}

#[tokio::test]
async fn test_device_events_carry_snapshot() {
    let (sender, receiver) = create_event_bridge();
    let device = hid_keyboard_snapshot(2, 7);

    sender.report_baseline(&device);
    sender.report_new_device(&device);
    sender.report_error(device.identity, "Pipe error");

    assert_eq!(
        receiver.recv().await.unwrap(),
        MonitorEvent::Baseline {
            device: device.clone()
        }
    );
    assert_eq!(
        receiver.recv().await.unwrap(),
        MonitorEvent::NewDevice {
            device: device.clone()
        }
    );
    assert_eq!(
        receiver.recv().await.unwrap(),
        MonitorEvent::Error {
            identity: device.identity,
            message: "Pipe error".to_string()
        }
    );
    assert!(receiver.try_recv().is_none());
}

#[test]
fn test_event_json_tags() {
    let identity = DeviceIdentity::new(1, 2);
    let json = serde_json::to_value(MonitorEvent::Error {
        identity,
        message: "Access denied".to_string(),
    })
    .unwrap();

    assert_eq!(json["event"], "error");
    assert_eq!(json["message"], "Access denied");
    assert_eq!(json["identity"]["bus"], 1);
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_shutdown_wakes_async_and_blocking_waiters() {
    let (trigger, listener) = shutdown_channel();

    let blocking = listener.clone();
    let sleeper = thread::spawn(move || blocking.sleep(Duration::from_secs(30)));

    let mut waiter = listener.clone();
    let task = tokio::spawn(async move { waiter.triggered().await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let started = Instant::now();
    trigger.trigger();

    with_timeout(DEFAULT_TEST_TIMEOUT, task)
        .await
        .expect("async waiter not woken")
        .unwrap();
    assert!(sleeper.join().unwrap());
    assert!(started.elapsed() < DEFAULT_TEST_TIMEOUT);
    assert!(listener.is_triggered());
}

#[test]
fn test_dropped_trigger_counts_as_shutdown() {
    let (trigger, listener) = shutdown_channel();
    assert!(!listener.is_triggered());
    assert!(!listener.sleep(Duration::from_millis(10)));

    drop(trigger);
    assert!(listener.is_triggered());
    assert!(listener.sleep(Duration::from_secs(30)));
}
