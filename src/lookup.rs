//! Semantic lookup tables
//!
//! Maps raw error codes, status bits and unit codes to human-readable labels.
//! Device handlers consume the read-only [`Lookup`] capability; the JSON
//! backed [`LookupTable`] is the stock implementation.
//!
//! ## File Format
//! ```text
//! {
//!   "error":  [ { "code": 1, "text": "Range exceeded" }, ... ],
//!   "status": [ { "bit": "0x0001", "text": "Alarm max" }, ... ],
//!   "units":  [ { "code": 1, "value": "°C" }, ... ]
//! }
//! ```
//!
//! Malformed entries are skipped with a warning. A missing or empty list
//! simply resolves nothing.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BusError, Result};

/// Text for an instrument error code
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorDescription {
    pub code: u8,
    pub text: String,
}

/// Label for one bit of the system status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDescription {
    pub bit: u32,
    pub text: String,
}

/// Display label for a unit code
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnitLabel {
    pub code: u16,
    pub value: String,
}

/// Read-only label resolution
pub trait Lookup {
    /// Description of an error code
    fn resolve_error(&self, code: u8) -> Option<&ErrorDescription>;

    /// Every status entry whose bit mask intersects `value`
    fn resolve_status_bits(&self, value: u32) -> Vec<&StatusDescription>;

    /// Label of a unit code
    fn resolve_unit(&self, code: u16) -> Option<&UnitLabel>;
}

#[derive(Debug, Deserialize)]
struct LookupFile {
    #[serde(default)]
    error: Vec<Value>,
    #[serde(default)]
    status: Vec<Value>,
    #[serde(default)]
    units: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    bit: BitField,
    text: String,
}

/// Status bits are written either as numbers or as prefixed strings ("0x0004")
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BitField {
    Number(u32),
    Text(String),
}

impl BitField {
    fn parse(&self) -> Option<u32> {
        match self {
            BitField::Number(n) => Some(*n),
            BitField::Text(s) => parse_prefixed(s.trim()),
        }
    }
}

fn parse_prefixed(s: &str) -> Option<u32> {
    let lower = s.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u32::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        u32::from_str_radix(oct, 8).ok()
    } else {
        lower.parse().ok()
    }
}

/// In-memory error/status/unit tables
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    errors: Vec<ErrorDescription>,
    status: Vec<StatusDescription>,
    units: Vec<UnitLabel>,
}

impl LookupTable {
    /// Table that resolves nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load tables from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            BusError::Lookup(format!("cannot read {}: {}", path.display(), e))
        })?;
        let table = Self::from_json(&text)?;

        tracing::debug!(
            path = %path.display(),
            errors = table.errors.len(),
            status = table.status.len(),
            units = table.units.len(),
            "Loaded lookup table"
        );
        if !table.is_complete() {
            tracing::warn!(path = %path.display(), "Lookup table has empty lists");
        }

        Ok(table)
    }

    /// Parse tables from a JSON document
    pub fn from_json(text: &str) -> Result<Self> {
        let file: LookupFile = serde_json::from_str(text)?;

        let errors = file
            .error
            .into_iter()
            .filter_map(|v| parse_entry::<ErrorDescription>("error", v))
            .collect();

        let status = file
            .status
            .into_iter()
            .filter_map(|v| parse_entry::<RawStatus>("status", v))
            .filter_map(|raw| match raw.bit.parse() {
                Some(bit) => Some(StatusDescription {
                    bit,
                    text: raw.text,
                }),
                None => {
                    tracing::warn!(text = %raw.text, "Skipping status entry with bad bit mask");
                    None
                }
            })
            .collect();

        let units = file
            .units
            .into_iter()
            .filter_map(|v| parse_entry::<UnitLabel>("units", v))
            .collect();

        Ok(Self {
            errors,
            status,
            units,
        })
    }

    /// Add an error description
    pub fn add_error(&mut self, code: u8, text: impl Into<String>) {
        self.errors.push(ErrorDescription {
            code,
            text: text.into(),
        });
    }

    /// Add a status bit label
    pub fn add_status(&mut self, bit: u32, text: impl Into<String>) {
        self.status.push(StatusDescription {
            bit,
            text: text.into(),
        });
    }

    /// Add a unit label
    pub fn add_unit(&mut self, code: u16, value: impl Into<String>) {
        self.units.push(UnitLabel {
            code,
            value: value.into(),
        });
    }

    /// True when all three lists hold at least one entry
    pub fn is_complete(&self) -> bool {
        !self.errors.is_empty() && !self.status.is_empty() && !self.units.is_empty()
    }
}

fn parse_entry<T: serde::de::DeserializeOwned>(list: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!(list, error = %e, "Skipping malformed lookup entry");
            None
        }
    }
}

impl Lookup for LookupTable {
    fn resolve_error(&self, code: u8) -> Option<&ErrorDescription> {
        self.errors.iter().find(|e| e.code == code)
    }

    fn resolve_status_bits(&self, value: u32) -> Vec<&StatusDescription> {
        self.status.iter().filter(|s| s.bit & value != 0).collect()
    }

    fn resolve_unit(&self, code: u16) -> Option<&UnitLabel> {
        self.units.iter().find(|u| u.code == code)
    }
}
