//! Frame codec
//!
//! Pure functions turning raw frame bytes into numeric quantities, plus the
//! request encoder and the check-byte algorithm.
//!
//! ## Frame Layout
//! ```text
//!  offset:  0      1      2       3      4      5       6      7      8
//!         ┌──────┬──────┬──────┬──────┬──────┬──────┬──────┬──────┬──────┐
//!         │ addr │ code │ chk  │ hi   │ lo   │ chk  │ hi   │ lo   │ chk  │
//!         └──────┴──────┴──────┴──────┴──────┴──────┴──────┴──────┴──────┘
//!          header block          data word 1           data word 2
//! ```
//!
//! Every block is two bytes followed by a check byte over those two bytes.
//! Short (6 byte) replies carry one data word, long (9 byte) replies two.
//!
//! ## Data Words
//! - 16 bit: bits 15..14 decimal places, bits 13..0 biased mantissa
//!   (bias 2048). Mantissas from 0x3FE0 upward are error codes.
//! - 32 bit: bits 27..24 decimal places, bits 23..0 biased mantissa
//!   (bias 0x200000). Mantissas from 0xFFFFE0 upward are error codes.
//!
//! Decoders never scale by the decimal places; callers do that with [`scale`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BusError, Result};

/// Length of every request frame
pub const REQUEST_LEN: usize = 6;

/// Offset of the high byte of the first data word
pub const WORD1_HI: usize = 3;
/// Offset of the low byte of the first data word
pub const WORD1_LO: usize = 4;
/// Offset of the high byte of the second data word (offset 5 is a check byte)
pub const WORD2_HI: usize = 6;
/// Offset of the low byte of the second data word
pub const WORD2_LO: usize = 7;

const MANTISSA_MASK_16: u16 = 0x3FFF;
const ERROR_BASE_16: u16 = 0x3FE0;
const BIAS_16: f64 = 2048.0;

const MANTISSA_MASK_32: u32 = 0x00FF_FFFF;
const ERROR_BASE_32: u32 = 0x00FF_FFE0;
const BIAS_32: f64 = 2_097_152.0;

const CHECK_POLYNOMIAL: u16 = 0x0700;

// =============================================================================
// Word Conversion (no error split)
// =============================================================================

/// Combine two bytes into a big-endian 16-bit word
#[inline]
pub fn convert_u16(hi: u8, lo: u8) -> u16 {
    (u16::from(hi) << 8) | u16::from(lo)
}

/// Combine two 16-bit words into a 32-bit word
#[inline]
pub fn convert_u32(hi: u16, lo: u16) -> u32 {
    (u32::from(hi) << 16) | u32::from(lo)
}

// =============================================================================
// Value Decoding (with error split)
// =============================================================================

/// Decode a 16-bit data word into `(error, value)`
///
/// `error` is 0 for a valid measurement. Error mantissas yield a code in
/// `1..=32` and a value of `0.0`.
pub fn decode_u16(hi: u8, lo: u8) -> (u8, f64) {
    let mantissa = convert_u16(hi, lo) & MANTISSA_MASK_16;

    if mantissa >= ERROR_BASE_16 {
        return ((mantissa - ERROR_BASE_16 + 1) as u8, 0.0);
    }

    (0, f64::from(mantissa) - BIAS_16)
}

/// Decode a 32-bit data word spread over two blocks into `(error, value)`
///
/// Takes the bytes at offsets 3, 4, 6 and 7 of a long frame.
pub fn decode_u32(hi1: u8, lo1: u8, hi2: u8, lo2: u8) -> (u8, f64) {
    let word = convert_u32(convert_u16(hi1, lo1), convert_u16(hi2, lo2));
    let mantissa = word & MANTISSA_MASK_32;

    if mantissa >= ERROR_BASE_32 {
        return ((mantissa - ERROR_BASE_32 + 1) as u8, 0.0);
    }

    (0, f64::from(mantissa) - BIAS_32)
}

/// Decimal places encoded in a 16-bit data word
#[inline]
pub fn decimal_places_u16(hi: u8) -> u8 {
    hi >> 6
}

/// Decimal places encoded in a 32-bit data word
#[inline]
pub fn decimal_places_u32(hi1: u8) -> u8 {
    hi1 & 0x0F
}

/// Apply decimal places to a decoded value
#[inline]
pub fn scale(value: f64, decimal_places: u8) -> f64 {
    value / 10f64.powi(i32::from(decimal_places))
}

// =============================================================================
// Check Bytes
// =============================================================================

/// Check byte protecting a two-byte block
pub fn check_byte(b0: u8, b1: u8) -> u8 {
    let mut crc = convert_u16(b0, b1);

    for _ in 0..16 {
        if crc & 0x8000 != 0 {
            crc = (crc << 1) ^ CHECK_POLYNOMIAL;
        } else {
            crc <<= 1;
        }
    }

    !((crc >> 8) as u8)
}

/// Verify every complete three-byte block of a frame
///
/// Returns the offset of the first bad check byte as an error.
pub fn verify_frame(raw: &[u8]) -> Result<()> {
    for (block, chunk) in raw.chunks_exact(3).enumerate() {
        if check_byte(chunk[0], chunk[1]) != chunk[2] {
            return Err(BusError::ChecksumMismatch {
                offset: block * 3 + 2,
            });
        }
    }
    Ok(())
}

// =============================================================================
// Request Encoding
// =============================================================================

/// Encode a request frame
///
/// Format: address, code, check, p0, p1, check. A missing sub-parameter is
/// sent as two zero bytes.
pub fn encode_request(address: u8, code: u8, sub_parameter: Option<[u8; 2]>) -> Bytes {
    let [p0, p1] = sub_parameter.unwrap_or([0, 0]);

    let mut frame = BytesMut::with_capacity(REQUEST_LEN);
    put_block(&mut frame, address, code);
    put_block(&mut frame, p0, p1);

    frame.freeze()
}

/// Encode a reply frame with one data word (short) or two (long)
///
/// This is what an instrument sends back; used by simulators and tests.
pub fn encode_reply(address: u8, code: u8, word1: u16, word2: Option<u16>) -> Bytes {
    let mut frame = BytesMut::with_capacity(9);
    put_block(&mut frame, address, code);
    put_block(&mut frame, (word1 >> 8) as u8, word1 as u8);
    if let Some(word2) = word2 {
        put_block(&mut frame, (word2 >> 8) as u8, word2 as u8);
    }
    frame.freeze()
}

fn put_block(frame: &mut BytesMut, b0: u8, b1: u8) {
    frame.put_u8(b0);
    frame.put_u8(b1);
    frame.put_u8(check_byte(b0, b1));
}
