//! Command definitions
//!
//! Static descriptions of the protocol operations an instrument understands.

use std::fmt;

use crate::error::{BusError, Result};

/// Generic "indirect register read" selector; the sub-parameter picks the register
pub const INDIRECT_READ: u8 = 15;

/// The two reply shapes of the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameLength {
    /// One data word (6 bytes)
    Short,
    /// Two data words (9 bytes)
    Long,
}

impl FrameLength {
    /// Number of bytes in a frame of this shape
    pub const fn bytes(self) -> usize {
        match self {
            FrameLength::Short => 6,
            FrameLength::Long => 9,
        }
    }

    /// Classify a byte count
    pub fn from_len(len: usize) -> Result<Self> {
        match len {
            6 => Ok(FrameLength::Short),
            9 => Ok(FrameLength::Long),
            other => Err(BusError::UnsupportedFrameLength(other)),
        }
    }
}

impl fmt::Display for FrameLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.bytes())
    }
}

/// One protocol operation
///
/// `H` is the device's handler tag: a small `Copy` enum the device matches on
/// when the reply arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor<H> {
    /// Protocol operation code
    pub code: u8,

    /// Register selector for indirect reads
    pub sub_parameter: Option<[u8; 2]>,

    /// Reply shape the instrument answers with
    pub expected_length: FrameLength,

    /// Diagnostic label, never used for dispatch
    pub name: String,

    /// Which device handler interprets the reply
    pub handler: H,
}

impl<H> CommandDescriptor<H> {
    /// Direct command
    pub fn new(name: impl Into<String>, code: u8, expected_length: FrameLength, handler: H) -> Self {
        Self {
            code,
            sub_parameter: None,
            expected_length,
            name: name.into(),
            handler,
        }
    }

    /// Indirect register read
    ///
    /// The reply is always long; word 2 holds the register content.
    pub fn indirect(name: impl Into<String>, register: [u8; 2], handler: H) -> Self {
        Self {
            code: INDIRECT_READ,
            sub_parameter: Some(register),
            expected_length: FrameLength::Long,
            name: name.into(),
            handler,
        }
    }

    /// True if this descriptor answers to `code` and, when given, `sub_parameter`
    pub fn matches(&self, code: u8, sub_parameter: Option<[u8; 2]>) -> bool {
        self.code == code && (sub_parameter.is_none() || self.sub_parameter == sub_parameter)
    }
}
