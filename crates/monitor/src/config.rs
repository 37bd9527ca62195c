//! Monitor configuration management

use crate::discovery::DiscoveryConfig;
use crate::usb::ReadLoopConfig;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lowest accepted polling interval
const MIN_POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub read: ReadSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "MonitorSettings::default_log_level")]
    pub log_level: String,
    /// Delay between bus enumerations in milliseconds
    #[serde(default = "MonitorSettings::default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Start readers for devices already attached at startup
    #[serde(default)]
    pub monitor_existing: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            poll_interval_ms: Self::default_poll_interval(),
            monitor_existing: false,
        }
    }
}

impl MonitorSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_poll_interval() -> u64 {
        1000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadSettings {
    /// Timeout of each interrupt read in milliseconds
    #[serde(default = "ReadSettings::default_timeout")]
    pub timeout_ms: u64,
    /// Initial backoff after a transient read error (0 = disabled)
    #[serde(default)]
    pub backoff_base_ms: u64,
    /// Maximum backoff after repeated transient read errors
    #[serde(default = "ReadSettings::default_backoff_max")]
    pub backoff_max_ms: u64,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout(),
            backoff_base_ms: 0,
            backoff_max_ms: Self::default_backoff_max(),
        }
    }
}

impl ReadSettings {
    fn default_timeout() -> u64 {
        5000 // 5 seconds
    }

    fn default_backoff_max() -> u64 {
        5000
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsbSettings {
    /// VID:PID patterns of devices to read (empty = all)
    #[serde(default)]
    pub filters: Vec<String>,
}

/// Event output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Log lines
    #[default]
    Text,
    /// One JSON object per line on stdout
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default)]
    pub format: OutputFormat,
}

impl MonitorConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-hid-monitor/monitor.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: MonitorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-hid-monitor").join("monitor.toml")
        } else {
            PathBuf::from(".config/usb-hid-monitor/monitor.toml")
        }
    }

    /// Settings for the discovery loop and its readers
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            poll_interval: Duration::from_millis(self.monitor.poll_interval_ms),
            monitor_existing: self.monitor.monitor_existing,
            filters: self.usb.filters.clone(),
            read: ReadLoopConfig {
                timeout: Duration::from_millis(self.read.timeout_ms),
                backoff_base: Duration::from_millis(self.read.backoff_base_ms),
                backoff_max: Duration::from_millis(self.read.backoff_max_ms),
            },
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        validate_log_level(&self.monitor.log_level)?;

        if self.monitor.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(anyhow!(
                "Invalid poll_interval_ms {}, must be at least {}",
                self.monitor.poll_interval_ms,
                MIN_POLL_INTERVAL_MS
            ));
        }

        if self.read.timeout_ms == 0 {
            return Err(anyhow!("Invalid timeout_ms 0, must be greater than 0"));
        }

        if self.read.backoff_max_ms < self.read.backoff_base_ms {
            return Err(anyhow!(
                "Invalid backoff_max_ms {}, must not be below backoff_base_ms {}",
                self.read.backoff_max_ms,
                self.read.backoff_base_ms
            ));
        }

        // Validate USB filters (VID:PID format)
        for filter in &self.usb.filters {
            Self::validate_filter(filter)?;
        }

        Ok(())
    }

    /// Validate a USB device filter pattern (VID:PID)
    fn validate_filter(filter: &str) -> Result<()> {
        let parts: Vec<&str> = filter.split(':').collect();
        if parts.len() != 2 {
            return Err(anyhow!(
                "Invalid filter format '{}', expected VID:PID (e.g., '0x1234:0x5678' or '0x1234:*')",
                filter
            ));
        }

        let (vid, pid) = (parts[0], parts[1]);

        // Validate VID
        if vid != "*" {
            Self::validate_hex_id(vid, "VID")?;
        }

        // Validate PID
        if pid != "*" {
            Self::validate_hex_id(pid, "PID")?;
        }

        Ok(())
    }

    /// Validate a hex ID (VID or PID)
    fn validate_hex_id(id: &str, name: &str) -> Result<()> {
        let Some(hex_part) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
            return Err(anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
                name,
                id
            ));
        };

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))?;

        Ok(())
    }
}

/// Accepted log levels
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a log level from the config file or the command line
pub fn validate_log_level(level: &str) -> Result<()> {
    if !LOG_LEVELS.contains(&level) {
        return Err(anyhow!(
            "Invalid log level '{}', must be one of: {}",
            level,
            LOG_LEVELS.join(", ")
        ));
    }
    Ok(())
}

/// Expand `~` in a user-supplied config path
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
