use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Row, Table, TableData, TabularStore, check_header, check_widths};
use crate::error::StorageError;

/// In-process tables, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<Table, TableData>>,
    failing_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` appends fail as if the backend were unreachable.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }
}

impl TabularStore for MemoryStore {
    fn append_rows(&self, table: Table, header: &[String], rows: &[Row]) -> Result<(), StorageError> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Io {
                path: format!("memory:{table}"),
                source: std::io::Error::other("store unavailable"),
            });
        }
        check_widths(header, rows)?;

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let data = tables.entry(table).or_insert_with(|| TableData {
            header: header.to_vec(),
            rows: Vec::new(),
        });
        check_header(table, &data.header, header)?;
        data.rows.extend_from_slice(rows);
        Ok(())
    }

    fn read_table(&self, table: Table) -> Result<TableData, StorageError> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tables.get(&table).cloned().unwrap_or_default())
    }
}
