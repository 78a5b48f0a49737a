//! Protocol Module
//!
//! Defines the fixed-frame command/response protocol spoken on the
//! instrument link.
//!
//! ## Request Format
//! ```text
//! ┌──────────┬──────────┬─────────┬──────────┬──────────┬─────────┐
//! │ Addr (1) │ Code (1) │ Chk (1) │  P0 (1)  │  P1 (1)  │ Chk (1) │
//! └──────────┴──────────┴─────────┴──────────┴──────────┴─────────┘
//! ```
//!
//! ### Reply Formats
//! - Short (6 bytes): header block + one data word
//! - Long (9 bytes): header block + two data words
//!
//! ### Codes
//! - 0: measured value
//! - 3: system status
//! - 6 / 7: min / max value
//! - 12: ID number
//! - 15: indirect register read (register selected by P0/P1)

mod codec;
mod command;
mod registry;
mod response;

pub use codec::{
    check_byte, convert_u16, convert_u32, decimal_places_u16, decimal_places_u32, decode_u16,
    decode_u32, encode_reply, encode_request, scale, verify_frame, REQUEST_LEN, WORD1_HI, WORD1_LO,
    WORD2_HI, WORD2_LO,
};
pub use command::{CommandDescriptor, FrameLength, INDIRECT_READ};
pub use registry::CommandRegistry;
pub use response::{Number, ResponseMessage};
