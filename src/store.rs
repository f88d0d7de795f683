use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{PortalError, Result};
use crate::schema::ALL_TABLES;
use crate::table::{Row, Table, row_values};

/// A spreadsheet-like backend addressed as a set of named tables.
///
/// Every call is a full round-trip; nothing is cached between calls.
pub trait RecordStore: Send + Sync {
    /// All rows of `table` with its live header.
    fn load(&self, table: &str) -> Result<Table>;

    /// Discards every row of `table` and writes `header` followed by `rows`.
    fn replace_all(&self, table: &str, header: &[String], rows: &[Row]) -> Result<()>;

    /// Adds one line at the end of `table`. Values are taken as given;
    /// a line of the wrong length misaligns on the next load.
    fn append(&self, table: &str, values: &[String]) -> Result<()>;
}

impl<S: RecordStore + ?Sized> RecordStore for Box<S> {
    fn load(&self, table: &str) -> Result<Table> {
        (**self).load(table)
    }

    fn replace_all(&self, table: &str, header: &[String], rows: &[Row]) -> Result<()> {
        (**self).replace_all(table, header, rows)
    }

    fn append(&self, table: &str, values: &[String]) -> Result<()> {
        (**self).append(table, values)
    }
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn load(&self, table: &str) -> Result<Table> {
        (**self).load(table)
    }

    fn replace_all(&self, table: &str, header: &[String], rows: &[Row]) -> Result<()> {
        (**self).replace_all(table, header, rows)
    }

    fn append(&self, table: &str, values: &[String]) -> Result<()> {
        (**self).append(table, values)
    }
}

/// In-process store holding raw value grids, one per table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with the five catalog tables present and empty apart from
    /// their header line.
    pub fn with_catalog() -> Self {
        let store = Self::new();
        for kind in ALL_TABLES {
            store.insert_table(&Table::new(kind.sheet_name(), kind.header()));
        }
        store
    }

    pub fn insert_table(&self, table: &Table) {
        let mut guard = self.sheets.lock().expect("memory store lock poisoned");
        guard.insert(table.name.clone(), table.to_grid());
    }

    pub fn insert_grid(&self, name: &str, grid: Vec<Vec<String>>) {
        let mut guard = self.sheets.lock().expect("memory store lock poisoned");
        guard.insert(name.to_string(), grid);
    }

    pub fn table_names(&self) -> Vec<String> {
        let guard = self.sheets.lock().expect("memory store lock poisoned");
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        names
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, table: &str) -> Result<Table> {
        let guard = self.sheets.lock().expect("memory store lock poisoned");
        let grid = guard
            .get(table)
            .ok_or_else(|| PortalError::unavailable(table, "no such table"))?;
        Ok(Table::from_grid(table, grid.clone()))
    }

    fn replace_all(&self, table: &str, header: &[String], rows: &[Row]) -> Result<()> {
        let mut guard = self.sheets.lock().expect("memory store lock poisoned");
        let grid = guard
            .get_mut(table)
            .ok_or_else(|| PortalError::unavailable(table, "no such table"))?;
        grid.clear();
        grid.push(header.to_vec());
        grid.extend(rows.iter().map(|row| row_values(header, row)));
        Ok(())
    }

    fn append(&self, table: &str, values: &[String]) -> Result<()> {
        let mut guard = self.sheets.lock().expect("memory store lock poisoned");
        let grid = guard
            .get_mut(table)
            .ok_or_else(|| PortalError::unavailable(table, "no such table"))?;
        grid.push(values.to_vec());
        Ok(())
    }
}
