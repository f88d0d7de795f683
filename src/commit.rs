use std::collections::BTreeSet;

use tracing::info;

use crate::error::{PortalError, Result};
use crate::schema::TableKind;
use crate::store::RecordStore;
use crate::table::{Table, has_duplicate_columns, without_trailing_blank_rows};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// The table exactly as loaded, possibly edited.
    Native,
    /// A native table with some rows hidden by filters.
    Filtered,
    /// The product of a join; carries columns of other tables.
    Joined,
}

/// What the presentation layer shows: a table plus how it was derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    /// Target table in the store.
    pub table: String,
    pub data: Table,
    pub provenance: Provenance,
}

impl View {
    pub fn native(data: Table) -> Self {
        Self {
            table: data.name.clone(),
            data,
            provenance: Provenance::Native,
        }
    }

    pub fn derived(table: &str, data: Table, provenance: Provenance) -> Self {
        Self {
            table: table.to_string(),
            data,
            provenance,
        }
    }

    /// Whether a save action may be offered: native provenance, no repeated
    /// column names and the exact catalog column set. Tables outside the
    /// catalog are checked against their live header at commit time.
    pub fn committable(&self) -> bool {
        if self.provenance != Provenance::Native || has_duplicate_columns(&self.data.header) {
            return false;
        }
        match TableKind::from_sheet_name(&self.table) {
            Some(kind) => same_columns(kind.columns(), &self.data.header),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub table: String,
    pub rows_written: usize,
}

/// A save request captured from the view on screen at the moment the user
/// asked for it.
#[derive(Debug, Clone)]
pub struct SaveCommand {
    pub table: String,
    pub view: View,
}

impl SaveCommand {
    pub fn from_view(view: &View) -> Self {
        Self {
            table: view.table.clone(),
            view: view.clone(),
        }
    }

    pub fn execute(&self, store: &impl RecordStore) -> Result<CommitReport> {
        commit(store, &self.table, &self.view)
    }
}

/// Replaces the whole of `table` with the contents of `view`.
///
/// The view's columns must be exactly the authoritative schema: the catalog
/// columns for known tables, the live header otherwise. Filtered or joined
/// views are refused even when their columns line up, and so is any header
/// that repeats a column name. Cells are written in schema order; trailing
/// all-empty rows are not written. Store failures come back unchanged.
pub fn commit(store: &impl RecordStore, table: &str, view: &View) -> Result<CommitReport> {
    let schema = authoritative_schema(store, table)?;
    let schema_refs: Vec<&str> = schema.iter().map(String::as_str).collect();
    let stray_column = view
        .data
        .rows
        .iter()
        .flat_map(|row| row.keys())
        .any(|col| !schema_refs.contains(&col.as_str()));
    let repeated = has_duplicate_columns(&schema) || has_duplicate_columns(&view.data.header);
    if repeated || !same_columns(&schema_refs, &view.data.header) || stray_column {
        return Err(PortalError::SchemaMismatch {
            table: table.to_string(),
            expected: schema,
            found: view.data.header.clone(),
        });
    }
    if view.provenance != Provenance::Native {
        return Err(PortalError::PartialView {
            table: table.to_string(),
        });
    }

    let rows = without_trailing_blank_rows(&view.data.rows);
    store.replace_all(table, &schema, rows)?;
    info!(table, rows = rows.len(), "table committed");
    Ok(CommitReport {
        table: table.to_string(),
        rows_written: rows.len(),
    })
}

fn authoritative_schema(store: &impl RecordStore, table: &str) -> Result<Vec<String>> {
    match TableKind::from_sheet_name(table) {
        Some(kind) => Ok(kind.header()),
        None => Ok(store.load(table)?.header),
    }
}

fn same_columns(schema: &[&str], header: &[String]) -> bool {
    let expected: BTreeSet<&str> = schema.iter().copied().collect();
    let found: BTreeSet<&str> = header.iter().map(String::as_str).collect();
    expected == found && header.len() == schema.len()
}
