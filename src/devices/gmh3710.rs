//! GMH 3710 precision thermometer
//!
//! Reads the temperature as the sampled value. Prepare reads the system
//! status, the ID number and the display unit; close reads the min/max
//! memory.

use std::collections::BTreeMap;

use crate::data::{ColumnType, DataSet};
use crate::error::{BusError, Result};
use crate::protocol::{scale, CommandDescriptor, CommandRegistry, FrameLength, ResponseMessage};
use crate::session::{Device, HandlerContext, Step};

/// Sequence index of "measured value"
pub const MEASURED_VALUE: usize = 0;
/// Sequence index of "system status"
pub const SYSTEM_STATUS: usize = 1;
/// Sequence index of "min value"
pub const MIN_VALUE: usize = 2;
/// Sequence index of "max value"
pub const MAX_VALUE: usize = 3;
/// Sequence index of "ID number"
pub const ID_NUMBER: usize = 4;
/// Sequence index of "display unit"
pub const DISPLAY_UNIT: usize = 12;

/// Handler tags of the GMH 3710 command table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gmh3710Handler {
    MeasuredValue,
    SystemStatus,
    MinValue,
    MaxValue,
    IdNumber,
    DisplayUnit,
    /// Store the raw content of the given register
    Register(u8),
}

/// Indirect registers read through code 15
const REGISTERS: [(&str, u8); 13] = [
    ("Read min. measuring range", 176),
    ("Read max. measuring range", 177),
    ("Read measuring range unit", 178),
    ("Read measuring range type", 180),
    ("Read display type", 199),
    ("Read min. display range", 200),
    ("Read max. display range", 201),
    ("Read display unit", 202),
    ("Read channel count", 208),
    ("Read slope correction", 214),
    ("Read offset", 216),
    ("Read power-off delay", 222),
    ("Read program ID", 254),
];

/// State collected from a GMH 3710
#[derive(Debug, Clone, Default)]
pub struct Gmh3710 {
    /// Raw system status word
    pub status_word: Option<u16>,

    /// Labels of the status bits that are set
    pub system_state: Vec<String>,

    /// Min memory, in display units
    pub min_value: Option<f64>,

    /// Max memory, in display units
    pub max_value: Option<f64>,

    pub id_number: Option<u32>,

    /// Raw display unit code, kept even if it has no label
    pub unit_code: Option<u16>,

    /// Display unit label
    pub unit: Option<String>,

    /// Last measured value
    pub last_value: Option<f64>,

    /// Raw content of indirect registers, by register number
    pub registers: BTreeMap<u8, u16>,
}

impl Gmh3710 {
    pub const NAME: &'static str = "GMH 3710";

    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a measurement-type reply into display units
    ///
    /// `Ok(None)` if the instrument sent an error code instead.
    fn decode_value(
        &self,
        message: &mut ResponseMessage,
        ctx: &HandlerContext<'_>,
        what: &str,
    ) -> Result<Option<f64>> {
        let (error, value) = message.decode()?;
        if error == 0 {
            return Ok(Some(scale(value, message.decimal_places())));
        }

        match ctx.lookup.resolve_error(error) {
            Some(description) => tracing::warn!(
                device = Self::NAME,
                what,
                code = error,
                "{}",
                description.text
            ),
            None => tracing::warn!(device = Self::NAME, what, code = error, "Unresolved error code"),
        }
        Ok(None)
    }

    fn handle_system_status(&mut self, message: &mut ResponseMessage, ctx: &HandlerContext<'_>) -> Result<()> {
        let word = message.value_16()?;
        let bits = ctx.lookup.resolve_status_bits(u32::from(word));

        for bit in &bits {
            tracing::warn!(device = Self::NAME, bit = bit.bit, "{}", bit.text);
        }
        if bits.is_empty() {
            if word == 0 {
                tracing::info!(device = Self::NAME, "Nothing to report!");
            } else {
                tracing::warn!(device = Self::NAME, status = word, "Unresolved status bits");
            }
        }

        self.status_word = Some(word);
        self.system_state = bits.into_iter().map(|b| b.text.clone()).collect();
        Ok(())
    }

    fn handle_display_unit(&mut self, message: &ResponseMessage, ctx: &mut HandlerContext<'_>) -> Result<()> {
        let code = message.word2().ok_or_else(|| BusError::Handler {
            command: "display unit".to_string(),
            reason: "reply carries no register word".to_string(),
        })?;
        self.unit_code = Some(code);

        let label = match ctx.lookup.resolve_unit(code) {
            Some(unit) => unit.value.clone(),
            None => {
                tracing::warn!(device = Self::NAME, code, "Unit is unknown");
                self.unit = None;
                return Ok(());
            }
        };

        ctx.data.column_mut("value")?.description = format!("Temperature [{}]", label);
        tracing::info!(device = Self::NAME, code, unit = %label, "Display unit");
        self.unit = Some(label);
        Ok(())
    }
}

impl Device for Gmh3710 {
    type Handler = Gmh3710Handler;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn init_commands(&self, registry: &mut CommandRegistry<Gmh3710Handler>) {
        use Gmh3710Handler::*;

        registry.add_command(CommandDescriptor::new("Read measured value", 0, FrameLength::Short, MeasuredValue));
        registry.add_command(CommandDescriptor::new("Read system status", 3, FrameLength::Short, SystemStatus));
        registry.add_command(CommandDescriptor::new("Read min. value", 6, FrameLength::Short, MinValue));
        registry.add_command(CommandDescriptor::new("Read max. value", 7, FrameLength::Short, MaxValue));
        registry.add_command(CommandDescriptor::new("Read ID number", 12, FrameLength::Long, IdNumber));

        for (name, register) in REGISTERS {
            let handler = if register == 202 { DisplayUnit } else { Register(register) };
            registry.add_command(CommandDescriptor::indirect(name, [register, 0], handler));
        }
    }

    fn init_columns(&self, data: &mut DataSet) -> Result<()> {
        data.add_column("timestamp", "Date/Time", ColumnType::Timestamp)?;
        data.add_column("value", "Temperature", ColumnType::Float)?;
        Ok(())
    }

    fn handle(
        &mut self,
        handler: Gmh3710Handler,
        message: &mut ResponseMessage,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<()> {
        match handler {
            Gmh3710Handler::MeasuredValue => {
                let value = self.decode_value(message, ctx, "measured value")?;
                if let Some(value) = value {
                    tracing::info!(device = Self::NAME, "{:.2}", value);
                }
                self.last_value = value;
            }
            Gmh3710Handler::SystemStatus => self.handle_system_status(message, ctx)?,
            Gmh3710Handler::MinValue => {
                self.min_value = self.decode_value(message, ctx, "min value")?;
                tracing::info!(device = Self::NAME, min = ?self.min_value, "Min value");
            }
            Gmh3710Handler::MaxValue => {
                self.max_value = self.decode_value(message, ctx, "max value")?;
                tracing::info!(device = Self::NAME, max = ?self.max_value, "Max value");
            }
            Gmh3710Handler::IdNumber => {
                let id = message.value_32()?;
                tracing::info!(device = Self::NAME, "ID: {:x}", id);
                self.id_number = Some(id);
            }
            Gmh3710Handler::DisplayUnit => self.handle_display_unit(message, ctx)?,
            Gmh3710Handler::Register(register) => {
                let word = message.word2().unwrap_or_else(|| message.word1());
                tracing::debug!(device = Self::NAME, register, word, "Register");
                self.registers.insert(register, word);
            }
        }
        Ok(())
    }

    fn prepare_steps(&self) -> Vec<Step> {
        // The status read may fail on older firmware without aborting prepare
        vec![
            Step::optional(SYSTEM_STATUS),
            Step::required(ID_NUMBER),
            Step::required(DISPLAY_UNIT),
        ]
    }

    fn close_steps(&self) -> Vec<usize> {
        vec![MIN_VALUE, MAX_VALUE]
    }

    fn sample_command(&self) -> usize {
        MEASURED_VALUE
    }

    fn reading(&self, message: &mut ResponseMessage) -> Result<Option<f64>> {
        let (error, value) = message.decode()?;
        if error != 0 {
            return Ok(None);
        }
        Ok(Some(scale(value, message.decimal_places())))
    }
}
