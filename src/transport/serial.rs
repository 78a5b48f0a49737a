//! Serial transport
//!
//! Runs the protocol over a serial port (EASYBus converters enumerate as
//! USB serial devices).

use std::io::{self, Write};
use std::time::Duration;

use bytes::Bytes;
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};

use crate::config::Config;
use crate::error::TransportError;

use super::{read_reply, Transport};

/// Quiet time after a full frame that ends the reply (about 10 characters at 4800 baud)
const TRAILING_TIMEOUT: Duration = Duration::from_millis(20);

/// Blocking serial link to one instrument
pub struct SerialTransport {
    /// Open port; read timeout is the reply timeout
    port: Box<dyn SerialPort>,

    /// Port path for logging
    port_name: String,

    /// Reply timeout
    timeout: Duration,
}

impl SerialTransport {
    /// Open the port named in `config` (8N1, timeout from config)
    pub fn open(config: &Config) -> Result<Self, TransportError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(config.timeout())
            .open()
            .map_err(|e| {
                TransportError::Serial(format!(
                    "failed to open '{}' at {} baud: {}",
                    config.port, config.baud_rate, e
                ))
            })?;

        tracing::debug!(port = %config.port, baud = config.baud_rate, "Serial port opened");

        Ok(Self {
            port,
            port_name: config.port.clone(),
            timeout: config.timeout(),
        })
    }

    /// Get the port path
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Transport for SerialTransport {
    fn send_receive(&mut self, request: &[u8], expected_len: usize) -> Result<Bytes, TransportError> {
        // Drop stale bytes from an earlier, timed out exchange
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| TransportError::Serial(e.to_string()))?;

        self.port.write_all(request)?;
        self.port.flush()?;

        let reply = read_reply(&mut self.port, expected_len, |port| {
            port.set_timeout(TRAILING_TIMEOUT).map_err(io::Error::from)
        });

        // Restore the reply timeout even if the read failed
        self.port
            .set_timeout(self.timeout)
            .map_err(|e| TransportError::Serial(e.to_string()))?;

        match &reply {
            Err(TransportError::Timeout) => {
                tracing::debug!(port = %self.port_name, "Reply timeout");
            }
            Ok(frame) if frame.len() != expected_len => {
                tracing::debug!(port = %self.port_name, len = frame.len(), expected_len, "Reply length differs");
            }
            _ => {}
        }
        reply
    }
}
