//! Monitor integration tests
//!
//! Drives discovery and readers end to end against the scripted bus:
//! - New device detection across arbitrary enumeration sequences
//! - Hot-plugged keyboard decoded until it disconnects
//! - Non-HID devices reported but left to their kernel drivers
//! - Events flowing through the event bridge to the renderer
//!
//! Run with: `cargo test -p monitor --test monitor_tests`

use common::test_utils::{
    DEFAULT_TEST_TIMEOUT, RecordingSink, class_snapshot, hid_keyboard_snapshot, hid_snapshot,
    snapshot, with_timeout,
};
use common::{MonitorEvent, create_event_bridge, shutdown_channel};
use hid::{DeviceClass, DeviceIdentity};
use monitor::config::OutputFormat;
use monitor::usb::mock::MockBus;
use monitor::usb::{BusError, ReadLoopConfig};
use monitor::{DiscoveryConfig, DiscoveryLoop, run_renderer};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fast_config() -> DiscoveryConfig {
    DiscoveryConfig {
        poll_interval: Duration::from_millis(10),
        read: ReadLoopConfig {
            timeout: Duration::from_millis(5),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Poll until `done` returns true or the test timeout passes
fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + DEFAULT_TEST_TIMEOUT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

// ============================================================================
// Discovery properties
// ============================================================================

proptest! {
    #[test]
    fn prop_no_duplicate_discovery(
        rounds in prop::collection::vec(prop::collection::vec((1u8..3, 1u8..6), 0..5), 1..8)
    ) {
        let bus = Arc::new(MockBus::new());
        let sink = Arc::new(RecordingSink::new());
        let (_trigger, shutdown) = shutdown_channel();

        for round in &rounds {
            let devices = round.iter().map(|&(b, a)| snapshot(b, a)).collect();
            bus.push_enumeration(Ok(devices));
        }

        let mut discovery = DiscoveryLoop::new(bus, sink.clone(), fast_config(), shutdown);
        for _ in &rounds {
            discovery.step();
        }

        // Every identity is reported exactly once, either as baseline or new
        let mut reported = sink.baseline();
        reported.extend(sink.new_devices());
        let unique: HashSet<DeviceIdentity> = reported.iter().copied().collect();
        prop_assert_eq!(unique.len(), reported.len());

        let seen: HashSet<DeviceIdentity> = rounds
            .iter()
            .flatten()
            .map(|&(b, a)| DeviceIdentity::new(b, a))
            .collect();
        prop_assert_eq!(unique, seen);
        prop_assert_eq!(discovery.registry().len(), reported.len());

        // Baseline is exactly the first round
        let first: HashSet<DeviceIdentity> = rounds[0]
            .iter()
            .map(|&(b, a)| DeviceIdentity::new(b, a))
            .collect();
        prop_assert_eq!(sink.baseline().into_iter().collect::<HashSet<_>>(), first);
    }
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_hot_plugged_keyboard_decoded_until_disconnect() {
    let bus = Arc::new(MockBus::new());
    let sink = Arc::new(RecordingSink::new());
    let (trigger, shutdown) = shutdown_channel();
    let kbd = hid_keyboard_snapshot(1, 4);

    bus.push_enumeration(Ok(vec![]));
    bus.push_enumeration(Ok(vec![kbd.clone()]));
    bus.script_reads(
        kbd.identity,
        vec![
            Ok(vec![0, 0, 41, 0, 0, 0, 0, 0]),
            Err(BusError::TimedOut),
            Ok(vec![0, 0, 4, 5, 0, 0, 0, 0]),
            Err(BusError::Disconnected),
        ],
    );

    let mut discovery = DiscoveryLoop::new(bus.clone(), sink.clone(), fast_config(), shutdown);
    assert!(discovery.step().is_empty());
    assert_eq!(discovery.step(), vec![kbd.clone()]);

    assert!(wait_for(|| !sink.disconnects().is_empty()));

    assert_eq!(sink.streams(kbd.identity), vec!["[ESC]", "[ESC]ab"]);
    // Timeouts are not reported
    assert!(sink.errors(kbd.identity).is_empty());
    assert_eq!(sink.disconnects(), vec![kbd.identity]);

    // The device stays known; re-enumerating it reports nothing
    assert!(wait_for(|| bus.close_count(kbd.identity) == 1));
    assert!(discovery.step().is_empty());
    assert!(discovery.registry().contains(kbd.identity));
    assert_eq!(bus.open_count(kbd.identity), 1);
    // Released on exit
    assert!(!bus.was_claimed(kbd.identity));

    trigger.trigger();
}

#[test]
fn test_kernel_driver_detached_before_reading() {
    let bus = Arc::new(MockBus::new());
    let sink = Arc::new(RecordingSink::new());
    let (trigger, shutdown) = shutdown_channel();
    let kbd = hid_keyboard_snapshot(2, 3);

    bus.push_enumeration(Ok(vec![]));
    bus.push_enumeration(Ok(vec![kbd.clone()]));
    bus.set_driver_attached(kbd.identity, true);
    bus.script_reads(kbd.identity, vec![Err(BusError::Disconnected)]);

    let mut discovery = DiscoveryLoop::new(bus.clone(), sink.clone(), fast_config(), shutdown);
    discovery.step();
    discovery.step();

    assert!(wait_for(|| !sink.disconnects().is_empty()));
    assert_eq!(bus.detach_calls(kbd.identity), 1);
    trigger.trigger();
}

#[test]
fn test_detach_failure_reported() {
    let bus = Arc::new(MockBus::new());
    let sink = Arc::new(RecordingSink::new());
    let (trigger, shutdown) = shutdown_channel();
    let kbd = hid_keyboard_snapshot(2, 4);

    bus.push_enumeration(Ok(vec![]));
    bus.push_enumeration(Ok(vec![kbd.clone()]));
    bus.set_driver_attached(kbd.identity, true);
    bus.fail_detach(kbd.identity, BusError::Access);

    let mut discovery = DiscoveryLoop::new(bus.clone(), sink.clone(), fast_config(), shutdown);
    discovery.step();
    discovery.step();

    assert!(wait_for(|| !sink.errors(kbd.identity).is_empty()));
    assert_eq!(bus.read_attempts(kbd.identity), 0);
    assert!(sink.streams(kbd.identity).is_empty());
    trigger.trigger();
}

#[test]
fn test_hid_device_with_out_endpoint_reports_setup_error() {
    let bus = Arc::new(MockBus::new());
    let sink = Arc::new(RecordingSink::new());
    let (trigger, shutdown) = shutdown_channel();
    let device = hid_snapshot(3, 2, 0x02, 8);

    bus.push_enumeration(Ok(vec![]));
    bus.push_enumeration(Ok(vec![device.clone()]));

    let mut discovery = DiscoveryLoop::new(bus.clone(), sink.clone(), fast_config(), shutdown);
    discovery.step();
    discovery.step();

    assert!(wait_for(|| !sink.errors(device.identity).is_empty()));
    assert_eq!(sink.new_devices(), vec![device.identity]);
    assert_eq!(bus.open_count(device.identity), 0);
    trigger.trigger();
}

#[test]
fn test_mass_storage_keeps_its_driver() {
    let bus = Arc::new(MockBus::new());
    let sink = Arc::new(RecordingSink::new());
    let (trigger, shutdown) = shutdown_channel();
    let storage = class_snapshot(1, 12, DeviceClass::MassStorage);

    bus.push_enumeration(Ok(vec![]));
    bus.push_enumeration(Ok(vec![storage.clone()]));
    bus.set_driver_attached(storage.identity, true);

    let mut discovery = DiscoveryLoop::new(bus.clone(), sink.clone(), fast_config(), shutdown);
    discovery.step();
    discovery.step();
    // Give a wrongly spawned reader time to act
    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(sink.new_devices(), vec![storage.identity]);
    assert_eq!(bus.detach_calls(storage.identity), 0);
    assert_eq!(bus.open_count(storage.identity), 0);
    assert!(sink.errors(storage.identity).is_empty());
    trigger.trigger();
}

#[tokio::test]
async fn test_shutdown_stops_idle_readers() {
    let bus = Arc::new(MockBus::new());
    let sink = Arc::new(RecordingSink::new());
    let (trigger, shutdown) = shutdown_channel();
    let kbd = hid_keyboard_snapshot(1, 8);

    bus.push_enumeration(Ok(vec![]));
    bus.push_enumeration(Ok(vec![kbd.clone()]));

    let discovery = DiscoveryLoop::new(bus.clone(), sink.clone(), fast_config(), shutdown);
    let task = tokio::spawn(discovery.run());

    // Wait until the idle reader is polling
    let deadline = Instant::now() + DEFAULT_TEST_TIMEOUT;
    while bus.read_attempts(kbd.identity) < 2 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(bus.read_attempts(kbd.identity) >= 2);

    trigger.trigger();
    with_timeout(DEFAULT_TEST_TIMEOUT, task)
        .await
        .expect("discovery did not stop")
        .unwrap();

    // Reader released the device on its way out
    assert_eq!(bus.close_count(kbd.identity), 1);
    assert!(sink.disconnects().is_empty());
}

#[tokio::test]
async fn test_events_reach_renderer() {
    let bus = Arc::new(MockBus::new());
    let (sender, receiver) = create_event_bridge();
    let (trigger, shutdown) = shutdown_channel();
    let kbd = hid_keyboard_snapshot(1, 9);
    let known = snapshot(1, 1);

    bus.push_enumeration(Ok(vec![known.clone()]));
    bus.push_enumeration(Ok(vec![known.clone(), kbd.clone()]));
    bus.script_reads(
        kbd.identity,
        vec![
            Ok(vec![0, 0, 11, 0, 0, 0, 0, 0]),
            Err(BusError::Disconnected),
        ],
    );

    let mut discovery = DiscoveryLoop::new(bus, Arc::new(sender), fast_config(), shutdown);
    discovery.step();
    discovery.step();

    let mut events = Vec::new();
    while events.len() < 4 {
        let event = with_timeout(DEFAULT_TEST_TIMEOUT, receiver.recv())
            .await
            .expect("no event received")
            .unwrap();
        events.push(event);
    }

    assert_eq!(events[0], MonitorEvent::Baseline { device: known });
    assert_eq!(events[1], MonitorEvent::NewDevice { device: kbd.clone() });
    assert_eq!(
        events[2],
        MonitorEvent::DecodedStream {
            identity: kbd.identity,
            text: "h".to_string()
        }
    );
    assert_eq!(
        events[3],
        MonitorEvent::Disconnected {
            identity: kbd.identity
        }
    );

    // Dropping the loop and its readers closes the bridge
    trigger.trigger();
    discovery.join_readers().await;
    drop(discovery);
    let rendered = with_timeout(DEFAULT_TEST_TIMEOUT, run_renderer(receiver, OutputFormat::Json))
        .await
        .expect("renderer did not stop");
    assert_eq!(rendered, 0);
}
