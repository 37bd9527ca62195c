//! Event rendering
//!
//! Drains the event bridge on the runtime side and turns every
//! [`MonitorEvent`] into output, either as log lines or as JSON lines on
//! stdout.

use crate::config::OutputFormat;
use common::{EventReceiver, MonitorEvent};
use std::io::Write;
use tracing::{error, info, warn};

/// Render one event as a log line
pub fn render_text(event: &MonitorEvent) {
    match event {
        MonitorEvent::Baseline { device } => {
            info!("Known device [{}] {}", device.identity, device.summary());
        }
        MonitorEvent::NewDevice { device } => {
            warn!("New device found: [{}] {}", device.identity, device.summary());
        }
        MonitorEvent::DecodedStream { identity, text } => {
            info!("Decoded stream from device {}: {}", identity, text);
        }
        MonitorEvent::Error { identity, message } => {
            error!("Device {}: {}", identity, message);
        }
        MonitorEvent::Disconnected { identity } => {
            warn!("Device {} disconnected", identity);
        }
    }
}

/// Serialize one event as a single JSON line
pub fn to_json_line(event: &MonitorEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}

fn render_json(event: &MonitorEvent) {
    let line = match to_json_line(event) {
        Ok(line) => line,
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            return;
        }
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
        error!("Failed to write event: {}", e);
    }
}

/// Render a single event in the given format
pub fn render(event: &MonitorEvent, format: OutputFormat) {
    match format {
        OutputFormat::Text => render_text(event),
        OutputFormat::Json => render_json(event),
    }
}

/// Render events until every sender has been dropped
///
/// Returns the number of events rendered.
pub async fn run_renderer(events: EventReceiver, format: OutputFormat) -> usize {
    let mut rendered = 0;
    while let Ok(event) = events.recv().await {
        render(&event, format);
        rendered += 1;
    }
    rendered
}
