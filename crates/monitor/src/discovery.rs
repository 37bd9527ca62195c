//! Device discovery loop
//!
//! Periodically re-enumerates the bus, diffs the result against the
//! [`DeviceRegistry`], and starts a reader thread for every device seen for
//! the first time whose first interface is a HID interface. Other devices are
//! registered and reported but keep their kernel drivers.
//!
//! The loop has two states:
//! - `Initializing`: the first successful enumeration registers every device
//!   and reports it as baseline inventory
//! - `Watching`: later enumerations report and read only new devices
//!
//! Disappearing devices are never detected here; their reader notices the
//! disconnect. Enumeration errors are logged and retried on the next tick.

use crate::registry::DeviceRegistry;
use crate::usb::{BusError, ReadLoopConfig, ReadLoopExit, UsbBus, check_filter, spawn_reader};
use common::{ReportSink, ShutdownListener};
use hid::{DeviceIdentity, DeviceSnapshot};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Default bus polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Discovery loop settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Delay between enumerations
    pub poll_interval: Duration,
    /// Also start readers for devices present at startup
    pub monitor_existing: bool,
    /// VID:PID filters restricting which devices get a reader (empty = all)
    pub filters: Vec<String>,
    /// Settings handed to every reader
    pub read: ReadLoopConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            monitor_existing: false,
            filters: Vec::new(),
            read: ReadLoopConfig::default(),
        }
    }
}

/// Discovery state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Initializing,
    Watching,
}

/// Running reader thread
struct ReaderHandle {
    identity: DeviceIdentity,
    handle: JoinHandle<ReadLoopExit>,
}

/// The top-level discovery loop
pub struct DiscoveryLoop<B: UsbBus, S: ReportSink + 'static> {
    bus: Arc<B>,
    sink: Arc<S>,
    registry: Arc<DeviceRegistry>,
    config: DiscoveryConfig,
    shutdown: ShutdownListener,
    state: DiscoveryState,
    readers: Vec<ReaderHandle>,
}

impl<B: UsbBus, S: ReportSink + 'static> DiscoveryLoop<B, S> {
    pub fn new(
        bus: Arc<B>,
        sink: Arc<S>,
        config: DiscoveryConfig,
        shutdown: ShutdownListener,
    ) -> Self {
        Self::with_registry(bus, sink, Arc::new(DeviceRegistry::new()), config, shutdown)
    }

    /// Create a loop sharing an existing registry
    pub fn with_registry(
        bus: Arc<B>,
        sink: Arc<S>,
        registry: Arc<DeviceRegistry>,
        config: DiscoveryConfig,
        shutdown: ShutdownListener,
    ) -> Self {
        Self {
            bus,
            sink,
            registry,
            config,
            shutdown,
            state: DiscoveryState::Initializing,
            readers: Vec::new(),
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Reader threads not yet reaped
    pub fn active_readers(&self) -> usize {
        self.readers.len()
    }

    /// Run one discovery cycle synchronously
    ///
    /// Returns the devices newly registered by this cycle.
    pub fn step(&mut self) -> Vec<DeviceSnapshot> {
        let result = self.bus.enumerate();
        self.apply_enumeration(result)
    }

    /// Diff an enumeration result against the registry
    ///
    /// Returns the devices newly registered by this call.
    pub fn apply_enumeration(
        &mut self,
        result: Result<Vec<DeviceSnapshot>, BusError>,
    ) -> Vec<DeviceSnapshot> {
        self.reap_readers();

        let devices = match result {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to enumerate USB devices: {}", e);
                return Vec::new();
            }
        };

        match self.state {
            DiscoveryState::Initializing => self.register_baseline(devices),
            DiscoveryState::Watching => self.register_new(devices),
        }
    }

    fn register_baseline(&mut self, devices: Vec<DeviceSnapshot>) -> Vec<DeviceSnapshot> {
        debug!("Registering baseline devices");

        let mut registered = Vec::new();
        for device in devices {
            if !self.registry.insert(device.identity) {
                continue;
            }
            debug!("Baseline device [{}] {}", device.identity, device.summary());
            self.sink.report_baseline(&device);
            if self.config.monitor_existing {
                self.start_reader(&device);
            }
            registered.push(device);
        }

        info!("Watching for new devices ({} known)", self.registry.len());
        self.state = DiscoveryState::Watching;
        registered
    }

    fn register_new(&mut self, devices: Vec<DeviceSnapshot>) -> Vec<DeviceSnapshot> {
        let mut registered = Vec::new();
        for device in devices {
            if !self.registry.insert(device.identity) {
                continue;
            }
            debug!("New device [{}] {}", device.identity, device.summary());
            self.sink.report_new_device(&device);
            self.start_reader(&device);
            registered.push(device);
        }
        registered
    }

    fn start_reader(&mut self, device: &DeviceSnapshot) {
        // Never detach drivers from storage, hubs or other non-HID interfaces
        if !device.has_hid_endpoint() {
            debug!(
                "Device {} ({}) has no HID interface, not reading",
                device.identity, device.device_class
            );
            return;
        }

        if !check_filter(device.vendor_id, device.product_id, &self.config.filters) {
            debug!(
                "Device {} ({:04x}:{:04x}) ignored by filter",
                device.identity, device.vendor_id, device.product_id
            );
            return;
        }

        match spawn_reader(
            self.bus.clone(),
            self.sink.clone(),
            device.clone(),
            self.config.read.clone(),
            self.shutdown.clone(),
        ) {
            Ok(handle) => self.readers.push(ReaderHandle {
                identity: device.identity,
                handle,
            }),
            Err(e) => {
                debug!("Failed to spawn reader for device {}: {}", device.identity, e);
                self.sink
                    .report_error(device.identity, &format!("Failed to spawn reader: {}", e));
            }
        }
    }

    /// Join reader threads that have already finished
    fn reap_readers(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.readers)
            .into_iter()
            .partition(|r| r.handle.is_finished());
        self.readers = running;

        for reader in finished {
            join_reader(reader);
        }
    }

    /// Run until shutdown is requested
    ///
    /// On shutdown every reader observes the same signal; this waits for all
    /// of them to finish, which takes at most one read timeout.
    pub async fn run(mut self) {
        info!(
            "Discovery started (poll interval {:?})",
            self.config.poll_interval
        );

        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.triggered() => {
                    info!("Discovery shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    let result = enumerate_blocking(self.bus.clone()).await;
                    self.apply_enumeration(result);
                }
            }
        }

        self.join_readers().await;
        info!("Discovery stopped");
    }

    /// Wait for every reader thread to exit
    pub async fn join_readers(&mut self) {
        let readers = std::mem::take(&mut self.readers);
        if readers.is_empty() {
            return;
        }

        debug!("Waiting for {} reader(s) to stop", readers.len());
        let joined = tokio::task::spawn_blocking(move || {
            for reader in readers {
                join_reader(reader);
            }
        })
        .await;

        if let Err(e) = joined {
            error!("Failed to join reader threads: {}", e);
        }
    }
}

/// Enumerate on the blocking pool
async fn enumerate_blocking<B: UsbBus>(bus: Arc<B>) -> Result<Vec<DeviceSnapshot>, BusError> {
    match tokio::task::spawn_blocking(move || bus.enumerate()).await {
        Ok(result) => result,
        Err(e) => Err(BusError::Other(format!("Enumeration task failed: {}", e))),
    }
}

fn join_reader(reader: ReaderHandle) {
    match reader.handle.join() {
        Ok(exit) => debug!("Reader for device {} exited: {:?}", reader.identity, exit),
        Err(e) => error!("Reader for device {} panicked: {:?}", reader.identity, e),
    }
}
