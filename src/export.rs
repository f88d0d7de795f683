use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::warn;

use crate::join;
use crate::schema::{ALL_TABLES, TableKind};
use crate::store::RecordStore;
use crate::table::Table;

pub struct ExportReport {
    pub sheets: usize,
    pub rows: usize,
    pub errors: Vec<String>,
}

/// Writes every catalog table plus the joined overview to one workbook.
/// A table that fails to load is skipped and reported in `errors`.
pub fn export_workbook(store: &impl RecordStore, path: &Path) -> Result<ExportReport> {
    let mut errors = Vec::new();
    let mut loaded: Vec<(TableKind, Table)> = Vec::new();
    for kind in ALL_TABLES {
        match store.load(kind.sheet_name()) {
            Ok(table) => loaded.push((kind, table)),
            Err(err) => {
                warn!(table = kind.sheet_name(), error = %err, "export skipped table");
                errors.push(format!("{}: {err}", kind.sheet_name()));
            }
        }
    }

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let mut sheets = 0usize;
    let mut rows = 0usize;

    for (kind, table) in &loaded {
        let sheet = workbook.add_worksheet();
        sheet.set_name(kind.sheet_name())?;
        write_table(sheet, table, &bold)?;
        sheets += 1;
        rows += table.len();
    }

    let find = |wanted: TableKind| loaded.iter().find(|(k, _)| *k == wanted).map(|(_, t)| t);
    if let (Some(players), Some(skills), Some(personality)) = (
        find(TableKind::Players),
        find(TableKind::Skills),
        find(TableKind::Personality),
    ) {
        let overview = join::overview(players, skills, personality);
        let sheet = workbook.add_worksheet();
        sheet.set_name("Overview")?;
        write_table(sheet, &overview, &bold)?;
        sheets += 1;
    }

    workbook
        .save(path)
        .with_context(|| format!("save workbook {}", path.display()))?;

    Ok(ExportReport {
        sheets,
        rows,
        errors,
    })
}

fn write_table(worksheet: &mut Worksheet, table: &Table, header_format: &Format) -> Result<()> {
    for (row_idx, line) in table.to_grid().iter().enumerate() {
        for (col_idx, value) in line.iter().enumerate() {
            if row_idx == 0 {
                worksheet
                    .write_string_with_format(0, col_idx as u16, value, header_format)
                    .with_context(|| format!("write header cell {col_idx}"))?;
            } else {
                worksheet
                    .write_string(row_idx as u32, col_idx as u16, value)
                    .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
            }
        }
    }
    Ok(())
}
