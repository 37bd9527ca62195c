//! Per-device reader loop
//!
//! Each monitored device gets a dedicated OS thread running a [`ReadLoop`].
//! Reads are blocking with a fixed timeout, so a reader never stalls
//! discovery or other devices, and shutdown is observed within one timeout.
//!
//! Lifecycle of a reader:
//! 1. Validate the endpoint descriptor captured at discovery time
//! 2. Open the device, detach a competing kernel driver, claim the interface
//! 3. Read reports until the device disconnects or shutdown is requested
//!
//! Setup failures end the reader without retry. Timeouts and other transient
//! read errors never end it.

use crate::usb::bus::{EndpointChannel, UsbBus};
use crate::usb::transfers::{BusError, ErrorClass};
use common::{ReportSink, ShutdownListener};
use hid::{DecodedStream, DeviceIdentity, DeviceSnapshot, EndpointDescriptor, decode_report};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default timeout for a single interrupt read (5 seconds)
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Reader loop tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadLoopConfig {
    /// Timeout of each interrupt read
    pub timeout: Duration,
    /// Initial delay after a transient (non-timeout) error; zero disables backoff
    pub backoff_base: Duration,
    /// Upper bound for the backoff delay
    pub backoff_max: Duration,
}

impl Default for ReadLoopConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_READ_TIMEOUT,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::from_secs(5),
        }
    }
}

impl ReadLoopConfig {
    /// Delay before the next read after `consecutive` transient errors
    pub fn backoff(&self, consecutive: u32) -> Duration {
        if self.backoff_base.is_zero() || consecutive == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (consecutive - 1).min(16);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

/// Fatal reader setup failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("Device exposes no endpoint descriptor")]
    MissingEndpoint,

    #[error("Endpoint {0:#04x} is not an IN endpoint")]
    NotInEndpoint(u8),

    #[error("Endpoint {0:#04x} reports a zero max packet size")]
    ZeroPacketSize(u8),

    #[error("Failed to open device: {0}")]
    Open(BusError),

    #[error("Failed to detach kernel driver from interface {interface}: {source}")]
    Detach { interface: u8, source: BusError },

    #[error("Failed to claim interface {interface}: {source}")]
    Claim { interface: u8, source: BusError },
}

/// Why a reader loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLoopExit {
    /// The device was unplugged
    Disconnected,
    /// Shutdown was requested
    Cancelled,
    /// Setup failed; the device stays registered but unmonitored
    SetupFailed(SetupError),
}

/// Validate the endpoint captured in a snapshot
pub fn acquire_endpoint(snapshot: &DeviceSnapshot) -> Result<EndpointDescriptor, SetupError> {
    let endpoint = snapshot.endpoint.ok_or(SetupError::MissingEndpoint)?;
    if !endpoint.is_in() {
        return Err(SetupError::NotInEndpoint(endpoint.address));
    }
    if endpoint.max_packet_size == 0 {
        return Err(SetupError::ZeroPacketSize(endpoint.address));
    }
    Ok(endpoint)
}

/// Reader for one device
pub struct ReadLoop<B: UsbBus, S: ReportSink> {
    bus: Arc<B>,
    sink: Arc<S>,
    snapshot: DeviceSnapshot,
    config: ReadLoopConfig,
    shutdown: ShutdownListener,
    stream: DecodedStream,
}

impl<B: UsbBus, S: ReportSink> ReadLoop<B, S> {
    pub fn new(
        bus: Arc<B>,
        sink: Arc<S>,
        snapshot: DeviceSnapshot,
        config: ReadLoopConfig,
        shutdown: ShutdownListener,
    ) -> Self {
        Self {
            bus,
            sink,
            snapshot,
            config,
            shutdown,
            stream: DecodedStream::new(),
        }
    }

    fn identity(&self) -> DeviceIdentity {
        self.snapshot.identity
    }

    /// Decoded stream accumulated so far
    pub fn stream(&self) -> &DecodedStream {
        &self.stream
    }

    /// Run the reader until disconnect, shutdown, or setup failure
    pub fn run(mut self) -> ReadLoopExit {
        let identity = self.identity();
        info!("Reader started for device {}", identity);

        let exit = match self.setup() {
            Ok((channel, endpoint)) => self.read_loop(channel, endpoint),
            Err(e) => {
                debug!("Reader setup failed for device {}: {}", identity, e);
                self.sink.report_error(identity, &e.to_string());
                ReadLoopExit::SetupFailed(e)
            }
        };

        info!("Reader stopped for device {}: {:?}", identity, exit);
        exit
    }

    /// Acquire endpoint, open, negotiate driver ownership, claim
    fn setup(&self) -> Result<(B::Channel, EndpointDescriptor), SetupError> {
        let identity = self.identity();
        let endpoint = acquire_endpoint(&self.snapshot)?;
        let interface = endpoint.interface_number;

        let mut channel = self.bus.open(identity).map_err(SetupError::Open)?;

        match channel.is_driver_attached(interface) {
            Ok(true) => {
                debug!(
                    "Detaching kernel driver from interface {} on device {}",
                    interface, identity
                );
                channel
                    .detach_driver(interface)
                    .map_err(|source| SetupError::Detach { interface, source })?;
            }
            Ok(false) => {
                debug!("No kernel driver active on interface {}", interface);
            }
            Err(e) => {
                // Not supported on every platform; claiming will tell
                debug!(
                    "Could not check kernel driver status for interface {} on device {}: {}",
                    interface, identity, e
                );
            }
        }

        channel
            .claim_interface(interface)
            .map_err(|source| SetupError::Claim { interface, source })?;

        Ok((channel, endpoint))
    }

    fn read_loop(&mut self, mut channel: B::Channel, endpoint: EndpointDescriptor) -> ReadLoopExit {
        let identity = self.identity();
        let max_len = usize::from(endpoint.max_packet_size);
        let mut consecutive_errors: u32 = 0;

        debug!(
            "Reading device {} endpoint {:#04x} ({} bytes, timeout {:?})",
            identity, endpoint.address, max_len, self.config.timeout
        );

        loop {
            if self.shutdown.is_triggered() {
                return ReadLoopExit::Cancelled;
            }

            match channel.read_endpoint(endpoint.address, max_len, self.config.timeout) {
                Ok(report) => {
                    consecutive_errors = 0;
                    self.process_report(&report);
                }
                Err(e) => match e.class() {
                    ErrorClass::Disconnect => {
                        debug!("Device {} disconnected", identity);
                        self.sink.report_disconnected(identity);
                        return ReadLoopExit::Disconnected;
                    }
                    ErrorClass::Timeout => {
                        debug!("Read timed out on device {}", identity);
                    }
                    ErrorClass::Transient => {
                        consecutive_errors = consecutive_errors.saturating_add(1);
                        debug!("Error reading data from device {}: {}", identity, e);
                        self.sink.report_error(identity, &e.to_string());

                        let delay = self.config.backoff(consecutive_errors);
                        if !delay.is_zero() && self.shutdown.sleep(delay) {
                            return ReadLoopExit::Cancelled;
                        }
                    }
                },
            }
        }
    }

    /// Decode one raw report and emit the stream if it advanced
    ///
    /// Returns the number of tokens appended.
    pub fn process_report(&mut self, report: &[u8]) -> usize {
        let identity = self.identity();
        debug!("Received {} bytes from device {}: {:?}", report.len(), identity, report);

        let added = self.stream.extend(decode_report(report));
        if added > 0 {
            self.sink.report_decoded_stream(identity, self.stream.as_str());
        }
        added
    }
}

/// Spawn a reader thread for a device
///
/// The thread is named after the device identity. Fails only if the OS
/// refuses to create a thread.
pub fn spawn_reader<B, S>(
    bus: Arc<B>,
    sink: Arc<S>,
    snapshot: DeviceSnapshot,
    config: ReadLoopConfig,
    shutdown: ShutdownListener,
) -> std::io::Result<JoinHandle<ReadLoopExit>>
where
    B: UsbBus,
    S: ReportSink + 'static,
{
    let name = format!(
        "hid-reader-{:03}-{:03}",
        snapshot.identity.bus, snapshot.identity.address
    );
    let reader = ReadLoop::new(bus, sink, snapshot, config, shutdown);

    std::thread::Builder::new()
        .name(name)
        .spawn(move || reader.run())
}
