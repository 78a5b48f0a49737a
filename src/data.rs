//! Result data set
//!
//! Typed columns and the rows produced by sampling. Every successful sample
//! becomes one [`Row`]; the collected [`DataSet`] can be exported as CSV.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local};

use crate::error::{BusError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column value type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Timestamp,
    Float,
    Integer,
    String,
}

impl ColumnType {
    fn name(self) -> &'static str {
        match self {
            ColumnType::Timestamp => "a timestamp",
            ColumnType::Float => "a float",
            ColumnType::Integer => "an integer",
            ColumnType::String => "a string",
        }
    }
}

/// One result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Position in the row
    pub index: usize,

    /// Key used by handlers and rows
    pub name: String,

    /// Header text for export
    pub description: String,

    pub kind: ColumnType,
}

/// One cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Timestamp(DateTime<Local>),
    Float(f64),
    Integer(i64),
    String(String),
}

impl Value {
    /// Default cell for a column type; timestamps default to now
    pub fn default_for(kind: ColumnType) -> Self {
        match kind {
            ColumnType::Timestamp => Value::Timestamp(Local::now()),
            ColumnType::Float => Value::Float(0.0),
            ColumnType::Integer => Value::Integer(0),
            ColumnType::String => Value::String(String::new()),
        }
    }

    /// Type of this value
    pub fn kind(&self) -> ColumnType {
        match self {
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Float(_) => ColumnType::Float,
            Value::Integer(_) => ColumnType::Integer,
            Value::String(_) => ColumnType::String,
        }
    }

    /// Text written to an export file; floats keep their full precision
    pub fn to_field(&self) -> String {
        match self {
            Value::Float(v) => v.to_string(),
            other => other.to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Display form for logs; floats are rounded to two places
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Timestamp(t) => write!(f, "{}", t.format(TIMESTAMP_FORMAT)),
            Value::Float(v) => write!(f, "{:.2}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
        }
    }
}

/// One sampled row, cells keyed by column name
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    /// Get a cell by column name
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.cells
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| BusError::ColumnNotFound(name.to_string()))
    }

    /// Set a cell, which must keep its column type
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let cell = self
            .cells
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| BusError::ColumnNotFound(name.to_string()))?;

        if cell.kind() != value.kind() {
            return Err(BusError::ColumnType {
                column: name.to_string(),
                expected: cell.kind().name(),
            });
        }

        *cell = value;
        Ok(())
    }

    /// First timestamp cell of the row
    pub fn timestamp(&self) -> Option<DateTime<Local>> {
        self.cells.iter().find_map(|(_, v)| match v {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        })
    }

    /// Cells in column order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.cells.iter().map(|(_, v)| v)
    }
}

/// Columns plus the rows collected so far
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl DataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column; names must be unique
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        kind: ColumnType,
    ) -> Result<()> {
        let name = name.into();
        if self.columns.iter().any(|c| c.name == name) {
            return Err(BusError::DuplicateColumn(name));
        }

        self.columns.push(Column {
            index: self.columns.len(),
            name,
            description: description.into(),
            kind,
        });
        Ok(())
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| BusError::ColumnNotFound(name.to_string()))
    }

    /// Get a column by name for modification
    pub fn column_mut(&mut self, name: &str) -> Result<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| BusError::ColumnNotFound(name.to_string()))
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// New row with a default cell per column; not yet stored
    pub fn create_row(&self) -> Row {
        Row {
            cells: self
                .columns
                .iter()
                .map(|c| (c.name.clone(), Value::default_for(c.kind)))
                .collect(),
        }
    }

    /// Store a row
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Remove and return the stored rows
    pub fn drain_rows(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Write a header of column descriptions followed by every row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut sink = CsvSink::new(writer, self)?;
        for row in &self.rows {
            sink.write_row(row)?;
        }
        Ok(())
    }

    /// Export to a CSV file
    pub fn export_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_csv(file)?;
        tracing::info!(path = %path.display(), rows = self.rows.len(), "Exported rows");
        Ok(())
    }
}

/// Incremental CSV export
///
/// The header is written on creation and every row is flushed as soon as it
/// is written, so a long acquisition keeps nothing in memory and loses
/// nothing when it is cut short.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl CsvSink<File> {
    /// Create (or truncate) `path` and write the header of `data`
    pub fn create(path: &Path, data: &DataSet) -> Result<Self> {
        let sink = Self::new(File::create(path)?, data)?;
        tracing::debug!(path = %path.display(), "CSV export started");
        Ok(sink)
    }
}

impl<W: Write> CsvSink<W> {
    /// Write the column descriptions of `data` as header
    pub fn new(writer: W, data: &DataSet) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(data.columns().iter().map(|c| c.description.as_str()))?;
        writer.flush()?;

        Ok(Self { writer, rows: 0 })
    }

    /// Append one row and flush it
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        self.writer.write_record(row.values().map(Value::to_field))?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Number of rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Get the underlying writer back
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| BusError::Io(e.into_error()))
    }
}
