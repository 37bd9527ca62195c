//! Event bridge between reader threads and the Tokio runtime
//!
//! Reader loops run on dedicated blocking threads. They never format output
//! themselves; they emit [`MonitorEvent`]s through a [`ReportSink`], and the
//! runtime side drains the [`EventReceiver`] and renders them.

use async_channel::{Receiver, Sender, unbounded};
use hid::{DeviceIdentity, DeviceSnapshot};
use serde::Serialize;
use tracing::debug;

/// Events produced by the discovery and reader loops
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Device present when monitoring started
    Baseline {
        device: DeviceSnapshot,
    },

    /// Device attached after monitoring started
    NewDevice {
        device: DeviceSnapshot,
    },

    /// A device's decoded stream advanced
    DecodedStream {
        identity: DeviceIdentity,
        /// Full stream so far
        text: String,
    },

    /// Read, detach, or setup failure for a device
    Error {
        identity: DeviceIdentity,
        message: String,
    },

    /// Device went away while being read
    Disconnected {
        identity: DeviceIdentity,
    },
}

impl MonitorEvent {
    /// Device the event is about
    pub fn identity(&self) -> DeviceIdentity {
        match self {
            MonitorEvent::Baseline { device } | MonitorEvent::NewDevice { device } => {
                device.identity
            }
            MonitorEvent::DecodedStream { identity, .. }
            | MonitorEvent::Error { identity, .. }
            | MonitorEvent::Disconnected { identity } => *identity,
        }
    }
}

/// Output sink for monitor reports
///
/// Implementations must be callable from any thread. Only [`ReportSink::emit`]
/// is required; the `report_*` helpers build the matching event.
pub trait ReportSink: Send + Sync {
    fn emit(&self, event: MonitorEvent);

    fn report_baseline(&self, snapshot: &DeviceSnapshot) {
        self.emit(MonitorEvent::Baseline {
            device: snapshot.clone(),
        });
    }

    fn report_new_device(&self, snapshot: &DeviceSnapshot) {
        self.emit(MonitorEvent::NewDevice {
            device: snapshot.clone(),
        });
    }

    fn report_decoded_stream(&self, identity: DeviceIdentity, text: &str) {
        self.emit(MonitorEvent::DecodedStream {
            identity,
            text: text.to_string(),
        });
    }

    fn report_error(&self, identity: DeviceIdentity, message: &str) {
        self.emit(MonitorEvent::Error {
            identity,
            message: message.to_string(),
        });
    }

    fn report_disconnected(&self, identity: DeviceIdentity) {
        self.emit(MonitorEvent::Disconnected { identity });
    }
}

impl<T: ReportSink + ?Sized> ReportSink for std::sync::Arc<T> {
    fn emit(&self, event: MonitorEvent) {
        (**self).emit(event)
    }
}

/// Sending half of the event bridge (usable from blocking threads)
#[derive(Clone)]
pub struct EventSender {
    event_tx: Sender<MonitorEvent>,
}

impl EventSender {
    /// Send an event without awaiting
    ///
    /// The channel is unbounded, so this never blocks.
    pub fn send(&self, event: MonitorEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

impl ReportSink for EventSender {
    fn emit(&self, event: MonitorEvent) {
        if let Err(e) = self.send(event) {
            debug!("Dropping monitor event, receiver closed: {}", e);
        }
    }
}

/// Receiving half of the event bridge (async)
pub struct EventReceiver {
    event_rx: Receiver<MonitorEvent>,
}

impl EventReceiver {
    /// Receive the next event
    ///
    /// Fails once every sender has been dropped and the queue is drained.
    pub async fn recv(&self) -> crate::Result<MonitorEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&self) -> Option<MonitorEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// Create the event bridge
///
/// Returns (EventSender for producers, EventReceiver for the renderer)
pub fn create_event_bridge() -> (EventSender, EventReceiver) {
    let (event_tx, event_rx) = unbounded();
    (EventSender { event_tx }, EventReceiver { event_rx })
}
