//! Test utilities for usb-hid-monitor
//!
//! Provides snapshot builders, a recording report sink, and async timeout
//! helpers for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::ReportSink;
//! use common::test_utils::{RecordingSink, hid_keyboard_snapshot};
//!
//! let sink = RecordingSink::new();
//! let device = hid_keyboard_snapshot(1, 4);
//! sink.report_new_device(&device);
//! assert_eq!(sink.new_devices(), vec![device.identity]);
//! ```

use crate::channel::{MonitorEvent, ReportSink};
use hid::{DeviceClass, DeviceIdentity, DeviceSnapshot, EndpointDescriptor};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a snapshot of a device without an interrupt endpoint
///
/// # Arguments
/// * `bus` - Bus number
/// * `address` - Device address
pub fn snapshot(bus: u8, address: u8) -> DeviceSnapshot {
    DeviceSnapshot {
        identity: DeviceIdentity::new(bus, address),
        device_class: DeviceClass::Unknown,
        vendor_id: 0x1234,
        product_id: 0x5678,
        endpoint: None,
    }
}

/// Create a snapshot of a boot keyboard (endpoint 0x81, 8-byte packets)
pub fn hid_keyboard_snapshot(bus: u8, address: u8) -> DeviceSnapshot {
    hid_snapshot(bus, address, 0x81, 8)
}

/// Create a snapshot of a HID device with a specific interrupt endpoint
///
/// # Arguments
/// * `bus` - Bus number
/// * `address` - Device address
/// * `endpoint` - Endpoint address
/// * `max_packet_size` - Maximum packet size
pub fn hid_snapshot(bus: u8, address: u8, endpoint: u8, max_packet_size: u16) -> DeviceSnapshot {
    DeviceSnapshot {
        identity: DeviceIdentity::new(bus, address),
        device_class: DeviceClass::Hid,
        vendor_id: 0x046d,
        product_id: 0xc31c,
        endpoint: Some(EndpointDescriptor {
            interface_number: 0,
            interface_class: DeviceClass::Hid.code(),
            address: endpoint,
            max_packet_size,
        }),
    }
}

/// Create a snapshot of a device whose first interface has the given class
///
/// Uses a bulk-sized IN endpoint 0x81, like a flash drive or hub.
pub fn class_snapshot(bus: u8, address: u8, class: DeviceClass) -> DeviceSnapshot {
    DeviceSnapshot {
        identity: DeviceIdentity::new(bus, address),
        device_class: class,
        vendor_id: 0x0781,
        product_id: 0x5567,
        endpoint: Some(EndpointDescriptor {
            interface_number: 0,
            interface_class: class.code(),
            address: 0x81,
            max_packet_size: 512,
        }),
    }
}

/// Report sink that records every event for later inspection
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far, in emission order
    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Identities reported as baseline devices
    pub fn baseline(&self) -> Vec<DeviceIdentity> {
        self.filter_identities(|e| matches!(e, MonitorEvent::Baseline { .. }))
    }

    /// Identities reported as newly attached devices
    pub fn new_devices(&self) -> Vec<DeviceIdentity> {
        self.filter_identities(|e| matches!(e, MonitorEvent::NewDevice { .. }))
    }

    /// Identities reported as disconnected
    pub fn disconnects(&self) -> Vec<DeviceIdentity> {
        self.filter_identities(|e| matches!(e, MonitorEvent::Disconnected { .. }))
    }

    /// Successive decoded stream texts for one device
    pub fn streams(&self, identity: DeviceIdentity) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MonitorEvent::DecodedStream { identity: id, text } if id == identity => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Error messages reported for one device
    pub fn errors(&self, identity: DeviceIdentity) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MonitorEvent::Error {
                    identity: id,
                    message,
                } if id == identity => Some(message),
                _ => None,
            })
            .collect()
    }

    fn filter_identities(&self, pred: impl Fn(&MonitorEvent) -> bool) -> Vec<DeviceIdentity> {
        self.events()
            .iter()
            .filter(|e| pred(e))
            .map(|e| e.identity())
            .collect()
    }
}

impl ReportSink for RecordingSink {
    fn emit(&self, event: MonitorEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

/// Tracing layer that records every event emitted on the current thread
///
/// # Example
///
/// ```
/// use common::test_utils::LogCapture;
/// use tracing::Level;
///
/// let ((), logs) = LogCapture::capture(|| tracing::warn!("Device 001:004 disconnected"));
/// assert_eq!(logs.at_least(Level::WARN), vec!["Device 001:004 disconnected"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<(Level, String)>>>,
}

impl LogCapture {
    /// Run `f` with a capturing subscriber installed on this thread
    pub fn capture<T>(f: impl FnOnce() -> T) -> (T, LogCapture) {
        let logs = LogCapture::default();
        let subscriber = tracing_subscriber::registry().with(logs.clone());
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, logs)
    }

    /// Messages at `level` or more severe
    pub fn at_least(&self, level: Level) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(l, _)| *l <= level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((*event.metadata().level(), visitor.0));
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Example
/// ```
/// use common::test_utils::with_timeout;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
/// assert_eq!(result.unwrap(), 42);
/// # }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_builders() {
        let plain = snapshot(1, 2);
        assert!(plain.endpoint.is_none());

        let kbd = hid_keyboard_snapshot(1, 3);
        assert_eq!(kbd.device_class, DeviceClass::Hid);
        let ep = kbd.endpoint.unwrap();
        assert_eq!(ep.address, 0x81);
        assert_eq!(ep.max_packet_size, 8);
        assert!(kbd.has_hid_endpoint());

        let storage = class_snapshot(1, 4, DeviceClass::MassStorage);
        assert!(!storage.has_hid_endpoint());
    }

    #[test]
    fn test_log_capture_levels() {
        let ((), logs) = LogCapture::capture(|| {
            tracing::debug!("quiet");
            tracing::info!("status");
            tracing::error!("failure {}", 7);
        });

        assert_eq!(logs.at_least(Level::ERROR), vec!["failure 7"]);
        assert_eq!(logs.at_least(Level::INFO), vec!["status", "failure 7"]);
        assert_eq!(logs.at_least(Level::DEBUG).len(), 3);
    }

    #[test]
    fn test_recording_sink_filters() {
        let sink = RecordingSink::new();
        let a = hid_keyboard_snapshot(1, 1);
        let b = hid_keyboard_snapshot(1, 2);

        sink.report_baseline(&a);
        sink.report_new_device(&b);
        sink.report_decoded_stream(b.identity, "x");
        sink.report_decoded_stream(b.identity, "xy");
        sink.report_error(b.identity, "Timeout");
        sink.report_disconnected(b.identity);

        assert_eq!(sink.baseline(), vec![a.identity]);
        assert_eq!(sink.new_devices(), vec![b.identity]);
        assert_eq!(sink.streams(b.identity), vec!["x", "xy"]);
        assert!(sink.streams(a.identity).is_empty());
        assert_eq!(sink.errors(b.identity), vec!["Timeout"]);
        assert_eq!(sink.disconnects(), vec![b.identity]);
        assert_eq!(sink.events().len(), 6);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert!(result.is_err());
    }
}
