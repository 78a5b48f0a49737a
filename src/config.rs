//! Configuration for easybus
//!
//! Centralized link and acquisition configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BusError, Result};

/// Main configuration for one instrument session
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Link Configuration
    // -------------------------------------------------------------------------
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,

    /// Link speed; EASYBus converters run at 4800 baud
    pub baud_rate: u32,

    /// Per-command reply timeout (milliseconds)
    pub timeout_ms: u64,

    /// Verify the check bytes of every reply
    pub verify_checksums: bool,

    // -------------------------------------------------------------------------
    // Instrument Configuration
    // -------------------------------------------------------------------------
    /// Instrument address on the link
    pub address: u8,

    /// JSON file with error/status/unit tables. `None` means no resolution.
    pub lookup_path: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // Acquisition Configuration
    // -------------------------------------------------------------------------
    /// Pause between two samples (milliseconds)
    pub sample_interval_ms: u64,

    /// Number of samples to take; `None` runs until interrupted
    pub sample_count: Option<u64>,

    /// CSV file the collected rows are exported to
    pub export_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 4800,
            timeout_ms: 500,
            verify_checksums: false,
            address: 1,
            lookup_path: None,
            sample_interval_ms: 1000,
            sample_count: None,
            export_path: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reply timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Sampling interval as a `Duration`
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Reject settings the link cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            return Err(BusError::Config("port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(BusError::Config("baud rate must be positive".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(BusError::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the serial port path
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.config.port = port.into();
        self
    }

    /// Set the baud rate
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.config.baud_rate = baud;
        self
    }

    /// Set the reply timeout (in milliseconds)
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Enable or disable reply check-byte verification
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.config.verify_checksums = verify;
        self
    }

    /// Set the instrument address
    pub fn address(mut self, address: u8) -> Self {
        self.config.address = address;
        self
    }

    /// Set the lookup table file
    pub fn lookup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.lookup_path = Some(path.into());
        self
    }

    /// Set the sampling interval (in milliseconds)
    pub fn sample_interval_ms(mut self, ms: u64) -> Self {
        self.config.sample_interval_ms = ms;
        self
    }

    /// Limit the number of samples
    pub fn sample_count(mut self, count: u64) -> Self {
        self.config.sample_count = Some(count);
        self
    }

    /// Set the CSV export file
    pub fn export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.export_path = Some(path.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
