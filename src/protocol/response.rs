//! Response definitions
//!
//! A [`ResponseMessage`] wraps one complete reply frame and decodes it lazily.
//! The first decode fixes the interpretation; repeating the same decode
//! returns the cached result, asking for a different one is an error.

use bytes::Bytes;

use crate::error::{BusError, Result};

use super::codec::{
    convert_u16, convert_u32, decimal_places_u16, decimal_places_u32, decode_u16, decode_u32,
    WORD1_HI, WORD1_LO, WORD2_HI, WORD2_LO,
};
use super::FrameLength;

/// A decoded quantity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Raw word (identifiers, status bits, unit codes)
    Integer(u32),
    /// Measurement with the error split applied, not yet scaled
    Float(f64),
}

impl Number {
    /// Numeric value as `f64`
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(v) => f64::from(v),
            Number::Float(v) => v,
        }
    }

    /// Integer value, if this is a raw word
    pub fn as_u32(self) -> Option<u32> {
        match self {
            Number::Integer(v) => Some(v),
            Number::Float(_) => None,
        }
    }
}

/// How a message was decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoding {
    Word16,
    Word32,
    Value16,
    Value32,
}

impl Decoding {
    fn name(self) -> &'static str {
        match self {
            Decoding::Word16 => "16-bit word",
            Decoding::Word32 => "32-bit word",
            Decoding::Value16 => "16-bit value",
            Decoding::Value32 => "32-bit value",
        }
    }
}

/// One received reply frame
#[derive(Debug, Clone)]
pub struct ResponseMessage {
    raw: Bytes,
    length_class: FrameLength,
    decoding: Option<Decoding>,
    decoded_value: Option<Number>,
    decoded_error: Option<u8>,
}

impl ResponseMessage {
    /// Wrap a complete frame; only 6 and 9 byte frames are accepted
    pub fn new(raw: impl Into<Bytes>) -> Result<Self> {
        let raw = raw.into();
        let length_class = FrameLength::from_len(raw.len())?;

        Ok(Self {
            raw,
            length_class,
            decoding: None,
            decoded_value: None,
            decoded_error: None,
        })
    }

    // =========================================================================
    // Frame Accessors
    // =========================================================================

    /// The raw frame bytes
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Frame shape derived from the byte count
    pub fn length_class(&self) -> FrameLength {
        self.length_class
    }

    /// Address byte echoed by the instrument
    pub fn address(&self) -> u8 {
        self.raw[0]
    }

    /// First data word (offsets 3-4), without error split
    pub fn word1(&self) -> u16 {
        convert_u16(self.raw[WORD1_HI], self.raw[WORD1_LO])
    }

    /// Second data word (offsets 6-7) of a long frame
    pub fn word2(&self) -> Option<u16> {
        match self.length_class {
            FrameLength::Long => Some(convert_u16(self.raw[WORD2_HI], self.raw[WORD2_LO])),
            FrameLength::Short => None,
        }
    }

    /// Decimal places of the measurement, chosen by frame shape
    pub fn decimal_places(&self) -> u8 {
        match self.length_class {
            FrameLength::Short => decimal_places_u16(self.raw[WORD1_HI]),
            FrameLength::Long => decimal_places_u32(self.raw[WORD1_HI]),
        }
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    /// Decoded value, `None` until a decode method has run
    pub fn decoded_value(&self) -> Option<Number> {
        self.decoded_value
    }

    /// Error code split off by `decode_16` / `decode_32`
    pub fn decoded_error(&self) -> Option<u8> {
        self.decoded_error
    }

    /// The measurement, if one was decoded without an error code
    ///
    /// `None` means "no value": either nothing was decoded yet or the
    /// instrument reported an error/status code instead of a measurement.
    pub fn reading(&self) -> Option<f64> {
        match (self.decoded_value, self.decoded_error) {
            (Some(Number::Float(value)), Some(0)) => Some(value),
            _ => None,
        }
    }

    /// Decode word 1 as a 16-bit measurement with error split
    pub fn decode_16(&mut self) -> Result<(u8, f64)> {
        self.begin(Decoding::Value16)?;
        let (error, value) = match self.cached_split() {
            Some(cached) => cached,
            None => decode_u16(self.raw[WORD1_HI], self.raw[WORD1_LO]),
        };
        Ok(self.store_split(Decoding::Value16, error, value))
    }

    /// Decode both words of a long frame as a 32-bit measurement with error split
    pub fn decode_32(&mut self) -> Result<(u8, f64)> {
        self.require_long()?;
        self.begin(Decoding::Value32)?;
        let (error, value) = match self.cached_split() {
            Some(cached) => cached,
            None => decode_u32(
                self.raw[WORD1_HI],
                self.raw[WORD1_LO],
                self.raw[WORD2_HI],
                self.raw[WORD2_LO],
            ),
        };
        Ok(self.store_split(Decoding::Value32, error, value))
    }

    /// Decode the measurement with the width chosen by frame shape
    ///
    /// Short frames decode 16 bits, long frames 32 bits.
    pub fn decode(&mut self) -> Result<(u8, f64)> {
        match self.length_class {
            FrameLength::Short => self.decode_16(),
            FrameLength::Long => self.decode_32(),
        }
    }

    /// Decode word 1 as a raw 16-bit quantity
    pub fn value_16(&mut self) -> Result<u16> {
        self.begin(Decoding::Word16)?;
        let word = self.word1();
        self.decoding = Some(Decoding::Word16);
        self.decoded_value = Some(Number::Integer(u32::from(word)));
        Ok(word)
    }

    /// Decode words 1 and 2 of a long frame as a raw 32-bit quantity
    ///
    /// The check byte at offset 5 is skipped.
    pub fn value_32(&mut self) -> Result<u32> {
        self.require_long()?;
        self.begin(Decoding::Word32)?;
        let word = convert_u32(self.word1(), self.word2().unwrap_or_default());
        self.decoding = Some(Decoding::Word32);
        self.decoded_value = Some(Number::Integer(word));
        Ok(word)
    }

    fn begin(&self, requested: Decoding) -> Result<()> {
        match self.decoding {
            Some(existing) if existing != requested => Err(BusError::DecodeWidthConflict {
                existing: existing.name(),
                requested: requested.name(),
            }),
            _ => Ok(()),
        }
    }

    fn cached_split(&self) -> Option<(u8, f64)> {
        match (self.decoded_error, self.decoded_value) {
            (Some(error), Some(Number::Float(value))) => Some((error, value)),
            _ => None,
        }
    }

    fn store_split(&mut self, decoding: Decoding, error: u8, value: f64) -> (u8, f64) {
        self.decoding = Some(decoding);
        self.decoded_error = Some(error);
        self.decoded_value = Some(Number::Float(value));
        (error, value)
    }

    fn require_long(&self) -> Result<()> {
        if self.length_class != FrameLength::Long {
            return Err(BusError::FrameLengthMismatch {
                expected: FrameLength::Long.bytes(),
                actual: self.raw.len(),
            });
        }
        Ok(())
    }
}
