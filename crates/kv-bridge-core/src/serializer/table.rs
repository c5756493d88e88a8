// crates/kv-bridge-core/src/serializer/table.rs
// ============================================================================
// Module: Tabular Serializer
// Description: Typed column tables encoded as CSV with dtype-annotated headers.
// Purpose: Persist data frames so column order and dtypes survive a round trip.
// Dependencies: csv, serde
// ============================================================================

//! ## Overview
//! A [`Table`] is an ordered list of named, typed columns of equal length.
//! [`CsvSerializer`] writes one header record of `name:dtype` fields followed
//! by one record per row. Column names may contain `:`; the dtype is always
//! the text after the last colon.
//!
//! An empty table (no columns) encodes to an empty byte sequence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use super::Serializer;
use super::SerializerError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Values of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    /// 64-bit signed integers.
    Int(Vec<i64>),
    /// 64-bit floats.
    Float(Vec<f64>),
    /// Booleans.
    Bool(Vec<bool>),
    /// UTF-8 text.
    Text(Vec<String>),
}

impl ColumnData {
    /// Returns the dtype label written in CSV headers.
    #[must_use]
    pub const fn dtype(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
        }
    }

    /// Returns the number of values in the column.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Int(values) => values.len(),
            Self::Float(values) => values.len(),
            Self::Bool(values) => values.len(),
            Self::Text(values) => values.len(),
        }
    }

    /// Returns true when the column has no values.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates an empty column for a header dtype label.
    fn empty_for(dtype: &str) -> Option<Self> {
        match dtype {
            "int" => Some(Self::Int(Vec::new())),
            "float" => Some(Self::Float(Vec::new())),
            "bool" => Some(Self::Bool(Vec::new())),
            "text" => Some(Self::Text(Vec::new())),
            _ => None,
        }
    }

    /// Renders the cell at `row` as CSV text.
    fn cell(&self, row: usize) -> Option<String> {
        match self {
            Self::Int(values) => values.get(row).map(ToString::to_string),
            Self::Float(values) => values.get(row).map(ToString::to_string),
            Self::Bool(values) => values.get(row).map(ToString::to_string),
            Self::Text(values) => values.get(row).cloned(),
        }
    }

    /// Parses a CSV cell and appends it to the column.
    fn push_cell(&mut self, raw: &str) -> Result<(), String> {
        match self {
            Self::Int(values) => {
                values.push(raw.parse().map_err(|_| format!("invalid int value: {raw}"))?);
            }
            Self::Float(values) => {
                values.push(raw.parse().map_err(|_| format!("invalid float value: {raw}"))?);
            }
            Self::Bool(values) => {
                values.push(raw.parse().map_err(|_| format!("invalid bool value: {raw}"))?);
            }
            Self::Text(values) => values.push(raw.to_string()),
        }
        Ok(())
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column values.
    pub data: ColumnData,
}

impl Column {
    /// Creates a named column.
    #[must_use]
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Ordered set of columns sharing one row count.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    /// Columns in display order.
    pub columns: Vec<Column>,
}

impl Table {
    /// Creates a table from columns.
    #[must_use]
    pub const fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
        }
    }

    /// Returns the row count, or `None` when column lengths disagree.
    #[must_use]
    pub fn row_count(&self) -> Option<usize> {
        let mut lengths = self.columns.iter().map(|column| column.data.len());
        let first = lengths.next().unwrap_or(0);
        lengths.all(|len| len == first).then_some(first)
    }

    /// Returns the column with the given name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }
}

// ============================================================================
// SECTION: Serializer
// ============================================================================

/// CSV codec for [`Table`] values.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSerializer;

impl CsvSerializer {
    /// Creates a CSV serializer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer for CsvSerializer {
    type Value = Table;

    fn serialize(&self, value: &Table) -> Result<Vec<u8>, SerializerError> {
        if value.columns.is_empty() {
            return Ok(Vec::new());
        }
        let rows = value.row_count().ok_or_else(|| {
            SerializerError::Serialize("table columns have different lengths".to_string())
        })?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        let header: Vec<String> = value
            .columns
            .iter()
            .map(|column| format!("{}:{}", column.name, column.data.dtype()))
            .collect();
        writer.write_record(&header).map_err(|err| SerializerError::Serialize(err.to_string()))?;
        for row in 0 .. rows {
            let mut record = Vec::with_capacity(value.columns.len());
            for column in &value.columns {
                let cell = column.data.cell(row).ok_or_else(|| {
                    SerializerError::Serialize(format!(
                        "column {} is missing row {row}",
                        column.name
                    ))
                })?;
                record.push(cell);
            }
            writer
                .write_record(&record)
                .map_err(|err| SerializerError::Serialize(err.to_string()))?;
        }
        writer.into_inner().map_err(|err| SerializerError::Serialize(err.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Table, SerializerError> {
        if bytes.is_empty() {
            return Ok(Table::default());
        }
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
        let header =
            reader.headers().map_err(|err| SerializerError::Deserialize(err.to_string()))?.clone();
        let mut columns = Vec::with_capacity(header.len());
        for field in &header {
            let (name, dtype) = field.rsplit_once(':').ok_or_else(|| {
                SerializerError::Deserialize(format!("header field missing dtype: {field}"))
            })?;
            let data = ColumnData::empty_for(dtype).ok_or_else(|| {
                SerializerError::Deserialize(format!("unknown column dtype: {dtype}"))
            })?;
            columns.push(Column::new(name, data));
        }
        for record in reader.records() {
            let record = record.map_err(|err| SerializerError::Deserialize(err.to_string()))?;
            if record.len() != columns.len() {
                return Err(SerializerError::Deserialize(format!(
                    "record has {} fields, expected {}",
                    record.len(),
                    columns.len()
                )));
            }
            for (column, raw) in columns.iter_mut().zip(record.iter()) {
                column.data.push_cell(raw).map_err(SerializerError::Deserialize)?;
            }
        }
        Ok(Table::new(columns))
    }

    fn extension(&self) -> &'static str {
        "csv"
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    fn sample() -> Table {
        Table::new(vec![
            Column::new("id", ColumnData::Int(vec![1, 2])),
            Column::new("score:raw", ColumnData::Float(vec![0.5, -1.25])),
            Column::new("flag", ColumnData::Bool(vec![true, false])),
            Column::new("label", ColumnData::Text(vec!["a, b".to_string(), String::new()])),
        ])
    }

    #[test]
    fn header_carries_dtypes_in_column_order() {
        let bytes = CsvSerializer.serialize(&sample()).expect("serialize");
        let text = String::from_utf8(bytes).expect("utf8");
        let header = text.lines().next().expect("header");
        assert_eq!(header, "id:int,score:raw:float,flag:bool,label:text");
    }

    #[test]
    fn ragged_table_is_outside_domain() {
        let table = Table::new(vec![
            Column::new("a", ColumnData::Int(vec![1])),
            Column::new("b", ColumnData::Int(vec![1, 2])),
        ]);
        assert!(matches!(CsvSerializer.serialize(&table), Err(SerializerError::Serialize(_))));
    }

    #[test]
    fn unknown_dtype_is_rejected() {
        let result = CsvSerializer.deserialize(b"a:decimal\n1\n");
        assert!(matches!(result, Err(SerializerError::Deserialize(_))));
    }

    #[test]
    fn bad_cell_is_rejected() {
        let result = CsvSerializer.deserialize(b"a:int\nnope\n");
        assert!(matches!(result, Err(SerializerError::Deserialize(_))));
    }

    #[test]
    fn empty_table_round_trips() {
        let bytes = CsvSerializer.serialize(&Table::default()).expect("serialize");
        assert!(bytes.is_empty());
        assert_eq!(CsvSerializer.deserialize(&bytes).expect("deserialize"), Table::default());
    }

    #[test]
    fn sample_round_trips() {
        let table = sample();
        let bytes = CsvSerializer.serialize(&table).expect("serialize");
        assert_eq!(CsvSerializer.deserialize(&bytes).expect("deserialize"), table);
    }
}
