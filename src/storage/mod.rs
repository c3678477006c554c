//! Tabular persistence of places, points and directions.
//!
//! The pipeline only talks to [`TabularStore`], which deals in string rows
//! under a header. Column names come from the configured [`Schema`]; the
//! mapping between pipeline values and rows lives in [`records`].

mod csv_store;
mod memory;
pub mod records;
pub mod schema;

pub use csv_store::CsvStore;
pub use memory::MemoryStore;
pub use schema::Schema;

use std::fmt;

use crate::error::StorageError;

/// The three logical tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Places,
    Points,
    Directions,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Places, Table::Points, Table::Directions];

    pub fn name(self) -> &'static str {
        match self {
            Table::Places => "places",
            Table::Points => "points",
            Table::Directions => "directions",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type Row = Vec<String>;

/// Contents of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableData {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

impl TableData {
    /// Position of `column` in the header.
    pub fn column(&self, table: Table, column: &str) -> Result<usize, StorageError> {
        self.header
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| StorageError::MissingColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }
}

pub trait TabularStore: Send + Sync {
    /// Appends `rows` to `table`, creating it with `header` when it does not
    /// exist yet. Every row must be as wide as the header.
    fn append_rows(&self, table: Table, header: &[String], rows: &[Row]) -> Result<(), StorageError>;

    /// Reads a whole table. A table that was never written is empty.
    fn read_table(&self, table: Table) -> Result<TableData, StorageError>;
}

/// Rejects rows whose width differs from the header.
pub(crate) fn check_widths(header: &[String], rows: &[Row]) -> Result<(), StorageError> {
    match rows.iter().find(|r| r.len() != header.len()) {
        Some(row) => Err(StorageError::RowWidth {
            expected: header.len(),
            actual: row.len(),
        }),
        None => Ok(()),
    }
}

/// An existing table must carry exactly the configured header.
pub(crate) fn check_header(table: Table, existing: &[String], header: &[String]) -> Result<(), StorageError> {
    if existing == header {
        return Ok(());
    }
    Err(StorageError::HeaderMismatch {
        table: table.to_string(),
        existing: existing.join(","),
    })
}
