//! Transport Module
//!
//! The byte-level link to one instrument.
//!
//! ## Architecture
//! - Strict request-then-reply, one exchange in flight
//! - Timeouts are owned by the transport, not by the session
//! - A session borrows its transport exclusively for its whole lifetime
//! - Replies are returned as received, too short or too long; the session
//!   rejects any length it did not expect

mod scripted;
#[cfg(feature = "serial")]
mod serial;

use std::io::{self, ErrorKind, Read};

use bytes::Bytes;

use crate::error::TransportError;

pub use scripted::ScriptedTransport;
#[cfg(feature = "serial")]
pub use serial::SerialTransport;

/// Synchronous send/receive capability
pub trait Transport {
    /// Send `request` and block until a reply of `expected_len` bytes arrives
    ///
    /// A reply of a different length may be returned; the caller validates it.
    fn send_receive(&mut self, request: &[u8], expected_len: usize) -> Result<Bytes, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_receive(&mut self, request: &[u8], expected_len: usize) -> Result<Bytes, TransportError> {
        (**self).send_receive(request, expected_len)
    }
}

/// Upper bound on bytes read past the expected frame
pub const MAX_TRAILING: usize = 9;

/// Read one reply from a byte stream
///
/// Reads until `expected_len` bytes arrived, runs `settle` (a serial link
/// shortens its read timeout there), then keeps reading until the stream
/// times out so that an overlong reply comes back overlong. At most
/// [`MAX_TRAILING`] extra bytes are taken.
///
/// A timeout before the first byte is [`TransportError::Timeout`]; a timeout
/// inside the frame returns the partial frame.
pub fn read_reply<R, F>(reader: &mut R, expected_len: usize, settle: F) -> Result<Bytes, TransportError>
where
    R: Read,
    F: FnOnce(&mut R) -> io::Result<()>,
{
    let mut buffer = vec![0u8; expected_len + MAX_TRAILING];
    let mut filled = 0;

    // Step 1: The expected frame
    while filled < expected_len {
        match reader.read(&mut buffer[filled..expected_len]) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(ref e) if is_timeout(e) => {
                if filled == 0 {
                    return Err(TransportError::Timeout);
                }
                tracing::debug!(filled, expected_len, "Partial reply");
                buffer.truncate(filled);
                return Ok(Bytes::from(buffer));
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Step 2: Anything the instrument sends past it
    settle(reader)?;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(ref e) if is_timeout(e) => break,
            Err(e) => return Err(e.into()),
        }
    }

    if filled > expected_len {
        tracing::debug!(filled, expected_len, "Overlong reply");
    }
    buffer.truncate(filled);
    Ok(Bytes::from(buffer))
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock)
}
