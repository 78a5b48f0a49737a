//! Session Module
//!
//! The protocol engine that drives one instrument.
//!
//! ## Responsibilities
//! - Own the device's command registry (built once by `init_commands`)
//! - Funnel every exchange through `execute`
//! - Sequence the lifecycle: prepare → sample* → close
//! - Turn sampled replies into result rows
//!
//! ## State Machine
//! ```text
//!  Uninitialized ──init_commands──▶ Ready ──prepare──▶ Active ──close──▶ Closed
//!                                    ▲  │                │  ▲
//!                                    └──┘ prepare failed └──┘ sample
//! ```

use std::fmt;

use crate::config::Config;
use crate::data::{DataSet, Row, Value};
use crate::error::{BusError, Result};
use crate::lookup::Lookup;
use crate::protocol::{encode_request, verify_frame, CommandDescriptor, CommandRegistry, ResponseMessage};
use crate::transport::Transport;

// =============================================================================
// Device Variants
// =============================================================================

/// One step of the prepare sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Sequence index of the command in the registry
    pub index: usize,

    /// A failing required step aborts the sequence
    pub required: bool,
}

impl Step {
    pub const fn required(index: usize) -> Self {
        Self { index, required: true }
    }

    pub const fn optional(index: usize) -> Self {
        Self { index, required: false }
    }
}

/// What a handler may touch besides its own device state
pub struct HandlerContext<'a> {
    /// Label resolution for error, status and unit codes
    pub lookup: &'a dyn Lookup,

    /// Result columns (e.g. to put the display unit into a header)
    pub data: &'a mut DataSet,
}

/// An instrument model
///
/// Implementors supply the command table, the handler for each command and
/// the command sequences of the lifecycle. The session engine is shared.
pub trait Device {
    /// Tag selecting a handler; stored in each [`CommandDescriptor`]
    type Handler: Copy + fmt::Debug;

    /// Display name, used as the log tag
    fn name(&self) -> &str;

    /// Register the device's commands
    fn init_commands(&self, registry: &mut CommandRegistry<Self::Handler>);

    /// Declare the result columns
    fn init_columns(&self, data: &mut DataSet) -> Result<()>;

    /// Interpret a reply; errors make the command fail
    fn handle(
        &mut self,
        handler: Self::Handler,
        message: &mut ResponseMessage,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<()>;

    /// Commands run by `prepare`
    fn prepare_steps(&self) -> Vec<Step>;

    /// Commands run by `close`
    fn close_steps(&self) -> Vec<usize>;

    /// Command run by every `sample`
    fn sample_command(&self) -> usize;

    /// Physical value of a sampled reply; `None` when the reply carries no value
    fn reading(&self, message: &mut ResponseMessage) -> Result<Option<f64>>;

    /// Column the reading is stored in
    fn reading_column(&self) -> &str {
        "value"
    }
}

// =============================================================================
// Session
// =============================================================================

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
    Active,
    Closed,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one `sample` call
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// A value was read and stored as a row
    Reading(Row),

    /// The instrument answered without a measurement
    Missed {
        /// Error/status code from the reply, if any
        error: Option<u8>,

        /// Text for `error` from the lookup table
        description: Option<String>,
    },
}

/// Drives one instrument over one exclusively borrowed transport
///
/// ## Concurrency Model: strictly sequential
///
/// One exchange is in flight at a time and nothing is shared. To poll several
/// instruments, hold one session per instrument and sample them in turn.
pub struct DeviceSession<'a, D: Device> {
    /// Instrument address on the link
    address: u8,

    /// Model-specific handlers and state
    device: D,

    /// Command table, immutable after `init_commands`
    registry: CommandRegistry<D::Handler>,

    /// Link to the instrument (borrowed for the session's lifetime)
    transport: &'a mut dyn Transport,

    /// Label resolution
    lookup: &'a dyn Lookup,

    /// Rows produced by sampling
    data: DataSet,

    state: SessionState,

    /// Error of the most recent failed `execute`
    last_error: Option<BusError>,

    verify_checksums: bool,
}

impl<'a, D: Device> DeviceSession<'a, D> {
    /// Create a session; call `init_commands` before anything else
    pub fn new(address: u8, device: D, transport: &'a mut dyn Transport, lookup: &'a dyn Lookup) -> Self {
        Self {
            address,
            device,
            registry: CommandRegistry::new(),
            transport,
            lookup,
            data: DataSet::new(),
            state: SessionState::Uninitialized,
            last_error: None,
            verify_checksums: false,
        }
    }

    /// Create a session from the address and check-byte setting in `config`
    pub fn from_config(
        config: &Config,
        device: D,
        transport: &'a mut dyn Transport,
        lookup: &'a dyn Lookup,
    ) -> Self {
        let mut session = Self::new(config.address, device, transport, lookup);
        session.verify_checksums = config.verify_checksums;
        session
    }

    /// Populate the registry and result columns
    ///
    /// Idempotent: only the first call has an effect.
    pub fn init_commands(&mut self) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Ok(());
        }

        self.device.init_columns(&mut self.data)?;
        self.device.init_commands(&mut self.registry);
        self.state = SessionState::Ready;

        tracing::debug!(
            device = %self.device.name(),
            commands = self.registry.len(),
            "Commands initialized"
        );
        Ok(())
    }

    // =========================================================================
    // Command Execution
    // =========================================================================

    /// Execute one command
    ///
    /// Builds the request, exchanges it, validates the reply length, wraps the
    /// reply and runs the descriptor's handler. Returns `None` on transport
    /// failure, length mismatch or handler failure; the cause is kept in
    /// `last_error`.
    ///
    /// # Panics
    ///
    /// Panics if `init_commands` has not run.
    pub fn execute(&mut self, descriptor: &CommandDescriptor<D::Handler>) -> Option<ResponseMessage> {
        match self.try_execute(descriptor) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::error!(
                    device = %self.device.name(),
                    command = %descriptor.name,
                    error = %e,
                    "Command failed"
                );
                self.last_error = Some(e);
                None
            }
        }
    }

    /// Execute the command registered at `index`
    pub fn run_command(&mut self, index: usize) -> Option<ResponseMessage> {
        let descriptor = match self.registry.get_command(index) {
            Ok(descriptor) => descriptor.clone(),
            Err(e) => {
                tracing::error!(device = %self.device.name(), error = %e, "Unknown command");
                self.last_error = Some(e);
                return None;
            }
        };

        self.execute(&descriptor)
    }

    fn try_execute(&mut self, descriptor: &CommandDescriptor<D::Handler>) -> Result<ResponseMessage> {
        assert!(
            self.state != SessionState::Uninitialized,
            "execute called before init_commands"
        );

        // Step 1: Build the request
        let request = encode_request(self.address, descriptor.code, descriptor.sub_parameter);
        let expected = descriptor.expected_length.bytes();

        tracing::debug!(
            device = %self.device.name(),
            command = %descriptor.name,
            code = descriptor.code,
            "Executing command"
        );
        tracing::trace!(request = ?&request[..], expected, "Request frame");

        // Step 2: Exchange it
        let raw = self.transport.send_receive(&request, expected)?;
        tracing::trace!(reply = ?&raw[..], "Reply frame");

        // Step 3: Validate the reply
        if raw.len() != expected {
            return Err(BusError::FrameLengthMismatch {
                expected,
                actual: raw.len(),
            });
        }
        if self.verify_checksums {
            verify_frame(&raw)?;
        }

        // Step 4: Hand it to the device
        let mut message = ResponseMessage::new(raw)?;
        let mut ctx = HandlerContext {
            lookup: self.lookup,
            data: &mut self.data,
        };
        self.device.handle(descriptor.handler, &mut message, &mut ctx)?;

        Ok(message)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Run the device's prepare sequence
    ///
    /// Moves Ready → Active only if every required step succeeds. On failure
    /// the session stays Ready; effects of earlier steps are kept.
    pub fn prepare(&mut self) -> Result<()> {
        self.require_state("prepare", SessionState::Ready)?;

        for (position, step) in self.device.prepare_steps().into_iter().enumerate() {
            if self.run_command(step.index).is_some() {
                continue;
            }

            if step.required {
                return Err(self.sequence_abort("prepare", position, step.index));
            }
            tracing::warn!(
                device = %self.device.name(),
                step = position,
                "Optional prepare step failed, continuing"
            );
        }

        self.state = SessionState::Active;
        tracing::info!(device = %self.device.name(), "Session active");
        Ok(())
    }

    /// Take one sample
    ///
    /// A reply without a measurement yields `SampleOutcome::Missed` and the
    /// session stays Active. A failed exchange is returned as an error, also
    /// without leaving Active.
    pub fn sample(&mut self) -> Result<SampleOutcome> {
        self.require_state("sample", SessionState::Active)?;

        let index = self.device.sample_command();
        let mut message = match self.run_command(index) {
            Some(message) => message,
            None => return Err(self.command_failed(index)),
        };

        let value = match self.device.reading(&mut message)? {
            Some(value) => value,
            None => return Ok(self.missed(&message)),
        };

        let mut row = self.data.create_row();
        row.set(self.device.reading_column(), Value::Float(value))?;
        self.data.push(row.clone());

        tracing::info!(device = %self.device.name(), value, "Sample");
        Ok(SampleOutcome::Reading(row))
    }

    /// Run the device's close sequence and end the session
    ///
    /// The session is Closed afterwards even if a step failed; the sequence
    /// stops at the first failure.
    pub fn close(&mut self) -> Result<()> {
        self.require_state("close", SessionState::Active)?;

        let mut result = Ok(());
        for (position, index) in self.device.close_steps().into_iter().enumerate() {
            if self.run_command(index).is_none() {
                result = Err(self.sequence_abort("close", position, index));
                break;
            }
        }

        self.state = SessionState::Closed;
        match &result {
            Ok(()) => tracing::info!(device = %self.device.name(), "Session closed"),
            Err(e) => tracing::warn!(device = %self.device.name(), error = %e, "Session closed after failure"),
        }
        result
    }

    fn require_state(&self, operation: &'static str, required: SessionState) -> Result<()> {
        if self.state != required {
            return Err(BusError::InvalidState {
                operation,
                state: self.state.name(),
            });
        }
        Ok(())
    }

    fn missed(&self, message: &ResponseMessage) -> SampleOutcome {
        let error = message.decoded_error().filter(|&code| code != 0);
        let description = error
            .and_then(|code| self.lookup.resolve_error(code))
            .map(|d| d.text.clone());

        match (error, &description) {
            (Some(code), None) => tracing::warn!(
                device = %self.device.name(),
                code,
                "Missed sample, error code has no description"
            ),
            _ => tracing::warn!(
                device = %self.device.name(),
                ?error,
                description = description.as_deref().unwrap_or("no value"),
                "Missed sample"
            ),
        }

        SampleOutcome::Missed { error, description }
    }

    fn failure_reason(&self) -> String {
        self.last_error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn command_name(&self, index: usize) -> String {
        self.registry
            .get_command(index)
            .map(|c| c.name.clone())
            .unwrap_or_else(|_| format!("#{}", index))
    }

    fn command_failed(&self, index: usize) -> BusError {
        BusError::CommandFailed {
            command: self.command_name(index),
            reason: self.failure_reason(),
        }
    }

    fn sequence_abort(&self, sequence: &'static str, step: usize, index: usize) -> BusError {
        BusError::SequenceAbort {
            sequence,
            step,
            command: self.command_name(index),
            reason: self.failure_reason(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Error of the most recent failed `execute`
    pub fn last_error(&self) -> Option<&BusError> {
        self.last_error.as_ref()
    }

    pub fn registry(&self) -> &CommandRegistry<D::Handler> {
        &self.registry
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Collected rows and their columns
    pub fn data(&self) -> &DataSet {
        &self.data
    }

    /// Take the rows sampled so far out of the session
    pub fn drain_rows(&mut self) -> Vec<Row> {
        self.data.drain_rows()
    }

    /// End the session and keep the collected data
    pub fn into_data(self) -> DataSet {
        self.data
    }
}
