use anyhow::Context;
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{PortalError, Result};
use crate::store::RecordStore;
use crate::table::{Row, Table, row_values};

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Google Sheets v4 values API, one worksheet per table.
#[derive(Debug, Clone)]
pub struct SheetsStore {
    client: Client,
    api_base: String,
    spreadsheet_id: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsStore {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            spreadsheet_id: spreadsheet_id.into(),
            access_token: access_token.into(),
        }
    }

    fn values_url(&self, table: &str, range: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|err| PortalError::unavailable(table, format!("bad api base: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| PortalError::unavailable(table, "api base cannot hold a path"))?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .push("values")
            .push(range);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn send(&self, table: &str, req: RequestBuilder) -> Result<String> {
        let resp = req.bearer_auth(&self.access_token).send().map_err(|err| {
            if err.is_builder() {
                PortalError::unavailable(table, format!("request failed: {err}"))
            } else {
                PortalError::transient(table, format!("request failed: {err}"))
            }
        })?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|err| PortalError::transient(table, format!("failed reading body: {err}")))?;
        if status.is_success() {
            return Ok(body);
        }
        Err(classify_status(table, status, &body))
    }

    fn clear_url(&self, table: &str) -> Result<Url> {
        self.values_url(table, &format!("{}:clear", sheet_range(table)), &[])
    }

    /// Values are written as given (`RAW`) so a reload returns the same
    /// strings and text starting with `=` is never run as a formula.
    fn update_url(&self, table: &str) -> Result<Url> {
        self.values_url(
            table,
            &format!("{}!A1", sheet_range(table)),
            &[("valueInputOption", "RAW")],
        )
    }

    fn append_url(&self, table: &str) -> Result<Url> {
        self.values_url(
            table,
            &format!("{}!A1:append", sheet_range(table)),
            &[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ],
        )
    }
}

impl RecordStore for SheetsStore {
    fn load(&self, table: &str) -> Result<Table> {
        let url = self.values_url(
            table,
            &sheet_range(table),
            &[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "FORMATTED_VALUE"),
            ],
        )?;
        debug!(table, "sheets load");
        let body = self.send(table, self.client.get(url))?;
        parse_value_range_json(table, &body)
            .map_err(|err| PortalError::unavailable(table, format!("{err:#}")))
    }

    fn replace_all(&self, table: &str, header: &[String], rows: &[Row]) -> Result<()> {
        let clear_url = self.clear_url(table)?;
        debug!(table, "sheets clear");
        self.send(table, self.client.post(clear_url).json(&json!({})))?;

        let mut grid = Vec::with_capacity(rows.len() + 1);
        grid.push(header.to_vec());
        grid.extend(rows.iter().map(|row| row_values(header, row)));

        let start = format!("{}!A1", sheet_range(table));
        let update_url = self.update_url(table)?;
        debug!(table, rows = rows.len(), "sheets rewrite");
        self.send(
            table,
            self.client.put(update_url).json(&json!({
                "range": start,
                "majorDimension": "ROWS",
                "values": grid,
            })),
        )?;
        Ok(())
    }

    fn append(&self, table: &str, values: &[String]) -> Result<()> {
        let url = self.append_url(table)?;
        debug!(table, "sheets append");
        self.send(
            table,
            self.client.post(url).json(&json!({
                "majorDimension": "ROWS",
                "values": [values],
            })),
        )?;
        Ok(())
    }
}

/// A1 range naming a whole worksheet; quotes inside the name are doubled.
pub fn sheet_range(table: &str) -> String {
    format!("'{}'", table.replace('\'', "''"))
}

pub fn parse_value_range_json(table: &str, raw: &str) -> anyhow::Result<Table> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Table::new(table, Vec::new()));
    }
    let parsed: ValueRange = serde_json::from_str(trimmed).context("invalid value range json")?;
    let grid = parsed
        .values
        .into_iter()
        .map(|line| line.into_iter().map(cell_text).collect())
        .collect();
    Ok(Table::from_grid(table, grid))
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Maps a non-success response to a store error. Rate limiting and server
/// errors are transient; every other status (bad range, auth, missing
/// sheet) is permanent.
pub fn classify_status(table: &str, status: StatusCode, body: &str) -> PortalError {
    let reason = format!("http {}: {}", status, api_error_message(body));
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        PortalError::transient(table, reason)
    } else {
        PortalError::unavailable(table, reason)
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}
