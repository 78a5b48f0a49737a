//! Tests for DeviceSession
//!
//! These tests verify:
//! - The execute pipeline (request bytes, length validation, handler dispatch)
//! - Lifecycle transitions: init → prepare → sample* → close
//! - Failure handling of required/optional steps and missed samples
//! - Optional check byte verification

use easybus::data::{ColumnType, DataSet, Value};
use easybus::lookup::LookupTable;
use easybus::protocol::{
    encode_reply, encode_request, scale, CommandDescriptor, CommandRegistry, FrameLength,
    ResponseMessage,
};
use easybus::session::{HandlerContext, Step};
use easybus::transport::ScriptedTransport;
use easybus::{BusError, Config, Device, DeviceSession, SampleOutcome, SessionState, TransportError};

const ADDR: u8 = 1;

// =============================================================================
// Test Device
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Value,
    Status,
    Reject,
}

const VALUE: usize = 0;
const STATUS: usize = 1;
const ID: usize = 2;
const REJECT: usize = 3;

#[derive(Debug, Default)]
struct ProbeDevice {
    handled: Vec<Probe>,
    status: Option<u16>,
    prepare: Vec<Step>,
    close: Vec<usize>,
}

impl ProbeDevice {
    fn new() -> Self {
        Self {
            prepare: vec![Step::required(STATUS), Step::required(ID)],
            close: vec![STATUS, STATUS],
            ..Self::default()
        }
    }

    fn with_prepare(steps: Vec<Step>) -> Self {
        Self {
            prepare: steps,
            ..Self::new()
        }
    }
}

impl Device for ProbeDevice {
    type Handler = Probe;

    fn name(&self) -> &str {
        "probe"
    }

    fn init_commands(&self, registry: &mut CommandRegistry<Probe>) {
        registry.add_command(CommandDescriptor::new("value", 0, FrameLength::Short, Probe::Value));
        registry.add_command(CommandDescriptor::new("status", 3, FrameLength::Short, Probe::Status));
        registry.add_command(CommandDescriptor::new("id", 12, FrameLength::Long, Probe::Status));
        registry.add_command(CommandDescriptor::new("reject", 9, FrameLength::Short, Probe::Reject));
    }

    fn init_columns(&self, data: &mut DataSet) -> easybus::Result<()> {
        data.add_column("timestamp", "Time", ColumnType::Timestamp)?;
        data.add_column("value", "Value", ColumnType::Float)
    }

    fn handle(
        &mut self,
        handler: Probe,
        message: &mut ResponseMessage,
        _ctx: &mut HandlerContext<'_>,
    ) -> easybus::Result<()> {
        self.handled.push(handler);
        match handler {
            Probe::Value => {
                message.decode()?;
            }
            Probe::Status => self.status = Some(message.value_16()?),
            Probe::Reject => {
                return Err(BusError::Handler {
                    command: "reject".to_string(),
                    reason: "always fails".to_string(),
                })
            }
        }
        Ok(())
    }

    fn prepare_steps(&self) -> Vec<Step> {
        self.prepare.clone()
    }

    fn close_steps(&self) -> Vec<usize> {
        self.close.clone()
    }

    fn sample_command(&self) -> usize {
        VALUE
    }

    fn reading(&self, message: &mut ResponseMessage) -> easybus::Result<Option<f64>> {
        let (error, value) = message.decode()?;
        Ok((error == 0).then(|| scale(value, message.decimal_places())))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn value_frame(value: i32) -> Vec<u8> {
    encode_reply(ADDR, 0, (value + 2048) as u16, None).to_vec()
}

fn error_frame(code: u16) -> Vec<u8> {
    encode_reply(ADDR, 0, 0x3FE0 + code - 1, None).to_vec()
}

fn status_frame(word: u16) -> Vec<u8> {
    encode_reply(ADDR, 3, word, None).to_vec()
}

fn id_frame() -> Vec<u8> {
    encode_reply(ADDR, 12, 0x1234, Some(0x5678)).to_vec()
}

fn active_script(transport: &mut ScriptedTransport) {
    transport.push_reply(status_frame(0)).push_reply(id_frame());
}

// =============================================================================
// Initialization Tests
// =============================================================================

#[test]
fn test_init_commands_moves_to_ready() {
    let mut transport = ScriptedTransport::new();
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);

    assert_eq!(session.state(), SessionState::Uninitialized);
    session.init_commands().unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.registry().len(), 4);
    assert_eq!(session.data().columns().len(), 2);
}

#[test]
fn test_init_commands_is_idempotent() {
    let mut transport = ScriptedTransport::new();
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);

    session.init_commands().unwrap();
    session.init_commands().unwrap();

    assert_eq!(session.registry().len(), 4);
    assert_eq!(session.data().columns().len(), 2);
}

#[test]
#[should_panic(expected = "init_commands")]
fn test_execute_before_init_panics() {
    let mut transport = ScriptedTransport::new();
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);

    let descriptor = CommandDescriptor::new("value", 0, FrameLength::Short, Probe::Value);
    session.execute(&descriptor);
}

#[test]
fn test_from_config_uses_address() {
    let mut transport = ScriptedTransport::new();
    let lookup = LookupTable::empty();
    let config = Config::builder().address(7).build();

    let session = DeviceSession::from_config(&config, ProbeDevice::new(), &mut transport, &lookup);
    assert_eq!(session.address(), 7);
}

// =============================================================================
// Execute Tests
// =============================================================================

#[test]
fn test_execute_sends_encoded_request() {
    let mut transport = ScriptedTransport::new();
    transport.push_reply(status_frame(0x0005));
    let lookup = LookupTable::empty();

    {
        let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
        session.init_commands().unwrap();

        let mut message = session.run_command(STATUS).unwrap();
        assert_eq!(message.value_16().unwrap(), 0x0005);
        assert_eq!(session.device().status, Some(0x0005));
        assert_eq!(session.device().handled, vec![Probe::Status]);
    }

    assert_eq!(transport.requests().len(), 1);
    assert_eq!(transport.requests()[0], encode_request(ADDR, 3, None));
}

#[test]
fn test_execute_rejects_length_mismatch() {
    for width in [FrameLength::Short, FrameLength::Long] {
        for len in 5..=10usize {
            let mut frame = vec![ADDR, 3, 0, 0, 0, 0, 0, 0, 0, 0];
            frame.truncate(len);

            let mut transport = ScriptedTransport::new();
            transport.push_reply(frame);
            let lookup = LookupTable::empty();
            let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
            session.init_commands().unwrap();

            let descriptor = CommandDescriptor::new("probe", 3, width, Probe::Status);
            let result = session.execute(&descriptor);

            if len == width.bytes() {
                assert!(result.is_some(), "{} reply to {} command", len, width);
                assert!(session.last_error().is_none());
            } else {
                assert!(result.is_none(), "{} reply to {} command", len, width);
                assert!(session.device().handled.is_empty());
                match session.last_error() {
                    Some(BusError::FrameLengthMismatch { expected, actual }) => {
                        assert_eq!(*expected, width.bytes());
                        assert_eq!(*actual, len);
                    }
                    other => panic!("Expected FrameLengthMismatch, got {:?}", other),
                }
            }
        }
    }
}

#[test]
fn test_execute_transport_failure() {
    let mut transport = ScriptedTransport::new();
    transport.push_timeout().push_closed();
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();

    assert!(session.run_command(STATUS).is_none());
    assert!(matches!(
        session.last_error(),
        Some(BusError::Transport(TransportError::Timeout))
    ));

    assert!(session.run_command(STATUS).is_none());
    assert!(matches!(
        session.last_error(),
        Some(BusError::Transport(TransportError::Closed))
    ));
}

#[test]
fn test_execute_handler_failure() {
    let mut transport = ScriptedTransport::new();
    transport.push_reply(encode_reply(ADDR, 9, 0, None));
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();

    assert!(session.run_command(REJECT).is_none());
    assert!(matches!(session.last_error(), Some(BusError::Handler { .. })));
}

#[test]
fn test_run_command_unknown_index() {
    let mut transport = ScriptedTransport::new();
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();

    assert!(session.run_command(42).is_none());
    assert!(matches!(session.last_error(), Some(BusError::CommandNotFound(_))));
}

#[test]
fn test_verify_checksums_rejects_corrupt_reply() {
    let mut corrupt = status_frame(0x0001);
    corrupt[4] ^= 0x80;

    let mut transport = ScriptedTransport::new();
    transport.push_reply(corrupt.clone()).push_reply(corrupt);
    let lookup = LookupTable::empty();

    // Disabled by default
    {
        let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
        session.init_commands().unwrap();
        assert!(session.run_command(STATUS).is_some());
    }

    let config = Config::builder().address(ADDR).verify_checksums(true).build();
    let mut session = DeviceSession::from_config(&config, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();

    assert!(session.run_command(STATUS).is_none());
    assert!(matches!(
        session.last_error(),
        Some(BusError::ChecksumMismatch { offset: 5 })
    ));
}

// =============================================================================
// Prepare Tests
// =============================================================================

#[test]
fn test_prepare_moves_to_active() {
    let mut transport = ScriptedTransport::new();
    active_script(&mut transport);
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();

    session.prepare().unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.device().handled, vec![Probe::Status, Probe::Status]);
}

#[test]
fn test_prepare_before_init_fails() {
    let mut transport = ScriptedTransport::new();
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);

    assert!(matches!(
        session.prepare(),
        Err(BusError::InvalidState { operation: "prepare", state: "uninitialized" })
    ));
}

#[test]
fn test_prepare_required_step_failure_stays_ready() {
    let mut transport = ScriptedTransport::new();
    transport
        .push_reply(status_frame(0))
        .push_timeout()
        .push_reply(status_frame(1));
    let lookup = LookupTable::empty();
    let device = ProbeDevice::with_prepare(vec![
        Step::required(STATUS),
        Step::required(ID),
        Step::required(STATUS),
    ]);
    let mut session = DeviceSession::new(ADDR, device, &mut transport, &lookup);
    session.init_commands().unwrap();

    match session.prepare() {
        Err(BusError::SequenceAbort { sequence, step, command, .. }) => {
            assert_eq!(sequence, "prepare");
            assert_eq!(step, 1);
            assert_eq!(command, "id");
        }
        other => panic!("Expected SequenceAbort, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Ready);

    // The first step's effect is kept, the third step never ran
    assert_eq!(session.device().status, Some(0));
    assert_eq!(session.device().handled, vec![Probe::Status]);

    // Sampling fails fast without touching the link
    assert!(matches!(
        session.sample(),
        Err(BusError::InvalidState { operation: "sample", state: "ready" })
    ));
}

#[test]
fn test_prepare_optional_step_failure_continues() {
    let mut transport = ScriptedTransport::new();
    transport.push_timeout().push_reply(id_frame());
    let lookup = LookupTable::empty();
    let device = ProbeDevice::with_prepare(vec![Step::optional(STATUS), Step::required(ID)]);
    let mut session = DeviceSession::new(ADDR, device, &mut transport, &lookup);
    session.init_commands().unwrap();

    session.prepare().unwrap();
    assert_eq!(session.state(), SessionState::Active);
}

#[test]
fn test_prepare_can_be_retried() {
    let mut transport = ScriptedTransport::new();
    transport.push_timeout();
    active_script(&mut transport);
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();

    assert!(session.prepare().is_err());
    assert_eq!(session.state(), SessionState::Ready);

    session.prepare().unwrap();
    assert_eq!(session.state(), SessionState::Active);
}

// =============================================================================
// Sample Tests
// =============================================================================

#[test]
fn test_sample_produces_row() {
    let mut transport = ScriptedTransport::new();
    active_script(&mut transport);
    transport.push_reply(value_frame(215));
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();
    session.prepare().unwrap();

    match session.sample().unwrap() {
        SampleOutcome::Reading(row) => {
            assert_eq!(row.get("value").unwrap(), &Value::Float(215.0));
            assert!(row.timestamp().is_some());
        }
        other => panic!("Expected a reading, got {:?}", other),
    }
    assert_eq!(session.data().len(), 1);
}

#[test]
fn test_sample_error_code_is_missed() {
    let mut transport = ScriptedTransport::new();
    active_script(&mut transport);
    transport.push_reply(error_frame(2)).push_reply(value_frame(-15));

    let mut lookup = LookupTable::empty();
    lookup.add_error(2, "Value below display range");

    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();
    session.prepare().unwrap();

    assert_eq!(
        session.sample().unwrap(),
        SampleOutcome::Missed {
            error: Some(2),
            description: Some("Value below display range".to_string()),
        }
    );
    assert_eq!(session.state(), SessionState::Active);
    assert!(session.data().is_empty());

    // The next sample works normally
    assert!(matches!(session.sample().unwrap(), SampleOutcome::Reading(_)));
    assert_eq!(session.data().len(), 1);
}

#[test]
fn test_sample_unresolved_error_code() {
    let mut transport = ScriptedTransport::new();
    active_script(&mut transport);
    transport.push_reply(error_frame(9));
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();
    session.prepare().unwrap();

    assert_eq!(
        session.sample().unwrap(),
        SampleOutcome::Missed {
            error: Some(9),
            description: None,
        }
    );
}

#[test]
fn test_sample_exchange_failure_stays_active() {
    let mut transport = ScriptedTransport::new();
    active_script(&mut transport);
    transport.push_timeout().push_reply(value_frame(1));
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();
    session.prepare().unwrap();

    assert!(matches!(session.sample(), Err(BusError::CommandFailed { .. })));
    assert_eq!(session.state(), SessionState::Active);
    assert!(matches!(session.sample().unwrap(), SampleOutcome::Reading(_)));
}

#[test]
fn test_drain_rows_empties_data() {
    let mut transport = ScriptedTransport::new();
    active_script(&mut transport);
    transport.push_reply(value_frame(10)).push_reply(value_frame(20));
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();
    session.prepare().unwrap();

    session.sample().unwrap();
    let first = session.drain_rows();
    assert_eq!(first.len(), 1);
    assert!(session.data().is_empty());

    session.sample().unwrap();
    let second = session.drain_rows();
    assert_eq!(second[0].get("value").unwrap(), &Value::Float(20.0));
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_runs_sequence() {
    let mut transport = ScriptedTransport::new();
    active_script(&mut transport);
    transport.push_reply(status_frame(1)).push_reply(status_frame(2));
    let lookup = LookupTable::empty();

    {
        let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
        session.init_commands().unwrap();
        session.prepare().unwrap();
        session.close().unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.device().status, Some(2));
    }

    assert_eq!(transport.requests().len(), 4);
    assert_eq!(transport.remaining(), 0);
}

#[test]
fn test_close_failure_still_closes() {
    let mut transport = ScriptedTransport::new();
    active_script(&mut transport);
    transport.push_timeout().push_reply(status_frame(2));
    let lookup = LookupTable::empty();

    {
        let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
        session.init_commands().unwrap();
        session.prepare().unwrap();

        match session.close() {
            Err(BusError::SequenceAbort { sequence, step, .. }) => {
                assert_eq!(sequence, "close");
                assert_eq!(step, 0);
            }
            other => panic!("Expected SequenceAbort, got {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Closed);

        assert!(matches!(session.sample(), Err(BusError::InvalidState { .. })));
        assert!(matches!(session.close(), Err(BusError::InvalidState { .. })));
    }

    // The second close step never ran
    assert_eq!(transport.remaining(), 1);
}

#[test]
fn test_close_requires_active() {
    let mut transport = ScriptedTransport::new();
    let lookup = LookupTable::empty();
    let mut session = DeviceSession::new(ADDR, ProbeDevice::new(), &mut transport, &lookup);
    session.init_commands().unwrap();

    assert!(matches!(
        session.close(),
        Err(BusError::InvalidState { operation: "close", state: "ready" })
    ));
    assert_eq!(session.state(), SessionState::Ready);
}
