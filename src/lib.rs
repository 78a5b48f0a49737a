//! # easybus
//!
//! Command/response protocol engine for EASYBus laboratory instruments:
//! - Fixed-frame binary codec (6 and 9 byte replies, check bytes)
//! - Per-device command registries with tagged handler dispatch
//! - Lazily decoded, width-dispatched response messages
//! - A session state machine: init → prepare → sample* → close
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Host application / logger                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ prepare / sample / close
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    DeviceSession                             │
//! │        (state machine, single execute choke point)           │
//! └───────┬─────────────────────┬───────────────────┬───────────┘
//!         │                     │                   │
//!         ▼                     ▼                   ▼
//!  ┌─────────────┐      ┌──────────────┐    ┌──────────────┐
//!  │  Registry   │      │  Transport   │    │ Device (e.g. │
//!  │(descriptors)│      │ (send/recv)  │    │  GMH 3710)   │
//!  └─────────────┘      └──────┬───────┘    └──────┬───────┘
//!                              │ raw frame         │ handlers
//!                              ▼                   ▼
//!                      ┌──────────────┐    ┌──────────────┐
//!                      │ FrameCodec / │    │ Lookup table │
//!                      │ResponseMessage│   │  + DataSet   │
//!                      └──────────────┘    └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod lookup;
pub mod data;
pub mod transport;
pub mod session;
pub mod devices;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BusError, Result, TransportError};
pub use config::Config;
pub use session::{Device, DeviceSession, SampleOutcome, SessionState};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of easybus
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
