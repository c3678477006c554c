use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use tracing::debug;

use super::{Row, TableData, Table, TabularStore, check_header, check_widths};
use crate::error::StorageError;

/// One CSV file per table in a directory: `places.csv`, `points.csv`,
/// `directions.csv`.
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    /// Creates the directory if it does not exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn path(&self, table: Table) -> PathBuf {
        self.dir.join(format!("{}.csv", table.name()))
    }

    fn read_header(path: &Path) -> Result<Vec<String>, StorageError> {
        let mut reader = ReaderBuilder::new().from_path(path)?;
        Ok(reader.headers()?.iter().map(str::to_string).collect())
    }
}

impl TabularStore for CsvStore {
    fn append_rows(&self, table: Table, header: &[String], rows: &[Row]) -> Result<(), StorageError> {
        check_widths(header, rows)?;
        let path = self.path(table);
        let file_exists = path.exists();
        debug!(path = %path.display(), file_exists, rows = rows.len(), "Appending CSV rows");

        if file_exists {
            check_header(table, &Self::read_header(&path)?, header)?;
        }

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|source| StorageError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if !file_exists {
            writer.write_record(header)?;
        }
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush().map_err(|source| StorageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    fn read_table(&self, table: Table) -> Result<TableData, StorageError> {
        let path = self.path(table);
        if !path.exists() {
            return Ok(TableData::default());
        }
        let mut reader = ReaderBuilder::new().flexible(true).from_path(&path)?;
        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let row: Row = record?.iter().map(str::to_string).collect();
            check_widths(&header, std::slice::from_ref(&row))?;
            rows.push(row);
        }
        Ok(TableData { header, rows })
    }
}
