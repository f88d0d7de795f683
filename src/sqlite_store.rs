use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::{PortalError, Result};
use crate::schema::ALL_TABLES;
use crate::store::RecordStore;
use crate::table::{Row, Table, row_values};

/// A local workbook file: each table is a list of JSON-encoded lines with
/// the header at index 0.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates `name` with `header` unless it already exists.
    pub fn create_table(&self, name: &str, header: &[String]) -> anyhow::Result<bool> {
        let mut conn = self.conn.lock().expect("sqlite store lock poisoned");
        let tx = conn.transaction().context("begin create table")?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO sheets (name) VALUES (?1)",
                params![name],
            )
            .context("insert sheet")?;
        if inserted > 0 {
            let header_json = serde_json::to_string(header).context("encode header")?;
            tx.execute(
                "INSERT INTO sheet_rows (sheet, row_idx, cells_json) VALUES (?1, 0, ?2)",
                params![name, header_json],
            )
            .context("insert header")?;
        }
        tx.commit().context("commit create table")?;
        Ok(inserted > 0)
    }

    /// Makes sure the five catalog tables exist; returns how many were new.
    pub fn ensure_catalog(&self) -> anyhow::Result<usize> {
        let mut created = 0;
        for kind in ALL_TABLES {
            if self.create_table(kind.sheet_name(), &kind.header())? {
                created += 1;
            }
        }
        Ok(created)
    }
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS sheets (
            name TEXT PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS sheet_rows (
            sheet TEXT NOT NULL REFERENCES sheets(name),
            row_idx INTEGER NOT NULL,
            cells_json TEXT NOT NULL,
            PRIMARY KEY (sheet, row_idx)
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn sheet_exists(conn: &Connection, table: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sheets WHERE name = ?1",
        params![table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|err| sqlite_error(table, err))
}

fn sqlite_error(table: &str, err: rusqlite::Error) -> PortalError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            PortalError::transient(table, format!("sqlite busy: {err}"))
        }
        _ => PortalError::unavailable(table, format!("sqlite error: {err}")),
    }
}

fn encode_line(table: &str, cells: &[String]) -> Result<String> {
    serde_json::to_string(cells)
        .map_err(|err| PortalError::unavailable(table, format!("encode row: {err}")))
}

impl RecordStore for SqliteStore {
    fn load(&self, table: &str) -> Result<Table> {
        let conn = self.conn.lock().expect("sqlite store lock poisoned");
        if !sheet_exists(&conn, table)? {
            return Err(PortalError::unavailable(table, "no such table"));
        }
        let mut stmt = conn
            .prepare("SELECT cells_json FROM sheet_rows WHERE sheet = ?1 ORDER BY row_idx")
            .map_err(|err| sqlite_error(table, err))?;
        let lines = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))
            .map_err(|err| sqlite_error(table, err))?;

        let mut grid = Vec::new();
        for line in lines {
            let raw = line.map_err(|err| sqlite_error(table, err))?;
            let cells: Vec<String> = serde_json::from_str(&raw)
                .map_err(|err| PortalError::unavailable(table, format!("corrupt row: {err}")))?;
            grid.push(cells);
        }
        debug!(table, lines = grid.len(), "sqlite load");
        Ok(Table::from_grid(table, grid))
    }

    fn replace_all(&self, table: &str, header: &[String], rows: &[Row]) -> Result<()> {
        let mut conn = self.conn.lock().expect("sqlite store lock poisoned");
        let tx = conn.transaction().map_err(|err| sqlite_error(table, err))?;
        if !sheet_exists(&tx, table)? {
            return Err(PortalError::unavailable(table, "no such table"));
        }
        tx.execute("DELETE FROM sheet_rows WHERE sheet = ?1", params![table])
            .map_err(|err| sqlite_error(table, err))?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO sheet_rows (sheet, row_idx, cells_json) VALUES (?1, ?2, ?3)",
                )
                .map_err(|err| sqlite_error(table, err))?;
            insert
                .execute(params![table, 0i64, encode_line(table, header)?])
                .map_err(|err| sqlite_error(table, err))?;
            for (idx, row) in rows.iter().enumerate() {
                let line = encode_line(table, &row_values(header, row))?;
                insert
                    .execute(params![table, (idx + 1) as i64, line])
                    .map_err(|err| sqlite_error(table, err))?;
            }
        }
        tx.commit().map_err(|err| sqlite_error(table, err))?;
        debug!(table, rows = rows.len(), "sqlite replace");
        Ok(())
    }

    fn append(&self, table: &str, values: &[String]) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite store lock poisoned");
        if !sheet_exists(&conn, table)? {
            return Err(PortalError::unavailable(table, "no such table"));
        }
        let next: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(row_idx) + 1, 0) FROM sheet_rows WHERE sheet = ?1",
                params![table],
                |row| row.get(0),
            )
            .map_err(|err| sqlite_error(table, err))?;
        conn.execute(
            "INSERT INTO sheet_rows (sheet, row_idx, cells_json) VALUES (?1, ?2, ?3)",
            params![table, next, encode_line(table, values)?],
        )
        .map_err(|err| sqlite_error(table, err))?;
        debug!(table, row_idx = next, "sqlite append");
        Ok(())
    }
}
