//! Error types for easybus
//!
//! Provides a unified error type for all protocol operations, plus the
//! narrower transport error produced by the instrument link.

use thiserror::Error;

/// Result type alias using BusError
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors raised by a [`Transport`](crate::transport::Transport)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport timed out waiting for reply")]
    Timeout,

    #[error("transport closed by peer")]
    Closed,

    #[error("serial port error: {0}")]
    Serial(String),

    #[error("transport IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Unified error type for easybus operations
#[derive(Debug, Error)]
pub enum BusError {
    // -------------------------------------------------------------------------
    // Link Errors
    // -------------------------------------------------------------------------
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("frame length mismatch: expected {expected} bytes, got {actual}")]
    FrameLengthMismatch { expected: usize, actual: usize },

    #[error("unsupported frame length: {0} bytes")]
    UnsupportedFrameLength(usize),

    #[error("check byte mismatch at offset {offset}")]
    ChecksumMismatch { offset: usize },

    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("duplicate command: code {code}, sub-parameter {sub_parameter:?}")]
    DuplicateCommand {
        code: u8,
        sub_parameter: Option<[u8; 2]>,
    },

    // -------------------------------------------------------------------------
    // Decode / Handler Errors
    // -------------------------------------------------------------------------
    #[error("message already decoded as {existing}, cannot decode as {requested}")]
    DecodeWidthConflict {
        existing: &'static str,
        requested: &'static str,
    },

    #[error("handler for '{command}' failed: {reason}")]
    Handler { command: String, reason: String },

    // -------------------------------------------------------------------------
    // Session Errors
    // -------------------------------------------------------------------------
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("{sequence} aborted at step {step} ('{command}'): {reason}")]
    SequenceAbort {
        sequence: &'static str,
        step: usize,
        command: String,
        reason: String,
    },

    // -------------------------------------------------------------------------
    // Data Set Errors
    // -------------------------------------------------------------------------
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column already exists: {0}")]
    DuplicateColumn(String),

    #[error("column '{column}' expects {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
    },

    // -------------------------------------------------------------------------
    // Configuration / IO Errors
    // -------------------------------------------------------------------------
    #[error("lookup table error: {0}")]
    Lookup(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
