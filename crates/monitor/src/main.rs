//! usb-hid-monitor
//!
//! Watches the USB bus, reports devices that appear after startup, and
//! decodes the keyboard reports of new HID devices.

use anyhow::{Context, Result};
use clap::Parser;
use common::{create_event_bridge, setup_logging, shutdown_channel};
use monitor::config::{self, MonitorConfig, OutputFormat};
use monitor::usb::{RusbBus, UsbBus};
use monitor::{DiscoveryLoop, run_renderer};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-hid-monitor")]
#[command(
    author,
    version,
    about = "USB HID monitor - Detect new USB devices and decode keyboard input"
)]
#[command(long_about = "
Polls the USB bus, reports every device attached after startup, and decodes
the interrupt reports of new HID keyboards into readable key names.

EXAMPLES:
    # Run with default config
    usb-hid-monitor

    # Also read devices that are already plugged in
    usb-hid-monitor --monitor-existing

    # Emit events as JSON lines on stdout
    usb-hid-monitor --json

    # List USB devices and exit
    usb-hid-monitor --list-devices

CONFIGURATION:
    The monitor looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-hid-monitor/monitor.toml
    3. /etc/usb-hid-monitor/monitor.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Start readers for devices present at startup
    #[arg(long)]
    monitor_existing: bool,

    /// Emit events as JSON lines on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = MonitorConfig::default();
        let path = MonitorConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Load configuration first (to get log level from config if not specified)
    let mut config = if let Some(ref path) = args.config {
        MonitorConfig::load(Some(config::expand_path(path)))
            .context("Failed to load configuration")?
    } else {
        MonitorConfig::load_or_default()
    };

    if args.monitor_existing {
        config.monitor.monitor_existing = true;
    }
    if args.json {
        config.output.format = OutputFormat::Json;
    }

    // Use CLI log level if specified, otherwise use config value
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.monitor.log_level);

    config::validate_log_level(log_level)?;
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-hid-monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let bus = Arc::new(RusbBus::new().context("Failed to initialize USB context")?);

    if args.list_devices {
        return list_devices_mode(&bus);
    }

    run_monitor(config, bus).await
}

/// List USB devices and exit
fn list_devices_mode(bus: &RusbBus) -> Result<()> {
    info!("Listing USB devices...");

    let devices = bus.enumerate().context("Failed to enumerate USB devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
    } else {
        println!("Found {} USB device(s):\n", devices.len());
        for device in devices {
            println!("  [{}] {}", device.identity, device.summary());
            if let Some(endpoint) = device.endpoint {
                println!(
                    "      Interface {} (class {:#04x}) Endpoint {:#04x} Max packet size: {}",
                    endpoint.interface_number,
                    endpoint.interface_class,
                    endpoint.address,
                    endpoint.max_packet_size
                );
            }
        }
    }

    Ok(())
}

/// Run discovery and rendering until Ctrl+C
async fn run_monitor(config: MonitorConfig, bus: Arc<RusbBus>) -> Result<()> {
    let (sender, receiver) = create_event_bridge();
    let (trigger, shutdown) = shutdown_channel();

    let format = config.output.format;
    let renderer = tokio::spawn(run_renderer(receiver, format));

    let discovery = DiscoveryLoop::new(bus, Arc::new(sender), config.discovery_config(), shutdown);
    let discovery_handle = tokio::spawn(discovery.run());

    info!("Press Ctrl+C to stop");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
        Err(e) => {
            error!("Error waiting for Ctrl+C: {}", e);
        }
    }

    trigger.trigger();

    // Discovery joins its readers before returning, which drops the last sender
    if let Err(e) = discovery_handle.await {
        error!("Discovery task failed: {}", e);
    }

    match renderer.await {
        Ok(rendered) => info!("Monitor stopped ({} events)", rendered),
        Err(e) => error!("Renderer task failed: {}", e),
    }

    Ok(())
}
