use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// One record: column name to cell text. A column the row does not carry is
/// absent, which is not the same as an empty cell.
pub type Row = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, header: Vec<String>) -> Self {
        Self {
            name: name.into(),
            header,
            rows: Vec::new(),
        }
    }

    /// Builds a table from a raw value grid whose first line is the header.
    ///
    /// Short lines are padded with empty cells and cells past the header are
    /// dropped. Trailing blank lines are ignored.
    pub fn from_grid(name: impl Into<String>, grid: Vec<Vec<String>>) -> Self {
        let mut lines = grid.into_iter();
        let Some(header) = lines.next() else {
            return Self::new(name, Vec::new());
        };
        let header = trim_trailing_blank(header);

        let mut rows: Vec<Row> = lines
            .map(|line| {
                let mut cells = line.into_iter();
                header
                    .iter()
                    .map(|col| (col.clone(), cells.next().unwrap_or_default()))
                    .collect()
            })
            .collect();
        let kept = without_trailing_blank_rows(&rows).len();
        rows.truncate(kept);

        Self {
            name: name.into(),
            header,
            rows,
        }
    }

    /// The header line followed by every row laid out in header order.
    pub fn to_grid(&self) -> Vec<Vec<String>> {
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        grid.push(self.header.clone());
        grid.extend(self.rows.iter().map(|row| row_values(&self.header, row)));
        grid
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    pub fn fingerprint(&self) -> String {
        content_fingerprint(&self.header, &self.rows)
    }
}

/// Lays a row out in `header` order; absent columns become empty cells.
pub fn row_values(header: &[String], row: &Row) -> Vec<String> {
    header
        .iter()
        .map(|col| row.get(col).cloned().unwrap_or_default())
        .collect()
}

pub fn row_from_values(header: &[String], values: &[String]) -> Row {
    header
        .iter()
        .enumerate()
        .map(|(idx, col)| (col.clone(), values.get(idx).cloned().unwrap_or_default()))
        .collect()
}

/// `rows` minus any run of all-empty rows at the end; a load never returns
/// those.
pub fn without_trailing_blank_rows(rows: &[Row]) -> &[Row] {
    let kept = rows
        .iter()
        .rposition(|row| row.values().any(|v| !v.is_empty()))
        .map_or(0, |idx| idx + 1);
    &rows[..kept]
}

/// Whether some column name occurs more than once.
pub fn has_duplicate_columns(header: &[String]) -> bool {
    let mut seen = std::collections::BTreeSet::new();
    header.iter().any(|col| !seen.insert(col.as_str()))
}

/// SHA-256 over the header and rows as they would be written to the store.
pub fn content_fingerprint(header: &[String], rows: &[Row]) -> String {
    let mut hasher = Sha256::new();
    feed_line(&mut hasher, header);
    for row in rows {
        feed_line(&mut hasher, &row_values(header, row));
    }
    format!("{:x}", hasher.finalize())
}

fn feed_line(hasher: &mut Sha256, cells: &[String]) {
    for cell in cells {
        hasher.update((cell.len() as u64).to_le_bytes());
        hasher.update(cell.as_bytes());
    }
    hasher.update(b"\n");
}

fn trim_trailing_blank(mut header: Vec<String>) -> Vec<String> {
    while header.last().is_some_and(|col| col.trim().is_empty()) {
        header.pop();
    }
    header
}

#[cfg(test)]
mod tests {
    use super::{Table, has_duplicate_columns, row_from_values, without_trailing_blank_rows};

    fn grid(lines: &[&[&str]]) -> Vec<Vec<String>> {
        lines
            .iter()
            .map(|line| line.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn from_grid_pads_short_lines_and_drops_extra_cells() {
        let table = Table::from_grid(
            "Personality",
            grid(&[
                &["Player Name", "Trait", "Definition"],
                &["Ana"],
                &["Ben", "Driven", "Works hard", "stray"],
            ]),
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, "Trait"), Some(""));
        assert_eq!(table.cell(1, "Definition"), Some("Works hard"));
        assert!(!table.rows[1].values().any(|v| v == "stray"));
    }

    #[test]
    fn from_grid_ignores_trailing_blank_lines() {
        let table = Table::from_grid(
            "Players",
            grid(&[&["Player Name", "Team"], &["Ana", "U19"], &["", ""], &[]]),
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn empty_grid_is_empty_table() {
        let table = Table::from_grid("Players", Vec::new());
        assert!(table.header.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn to_grid_orders_cells_by_header() {
        let header = vec!["Player Name".to_string(), "Team".to_string()];
        let mut table = Table::new("Players", header.clone());
        table
            .rows
            .push(row_from_values(&header, &["Ana".to_string()]));
        assert_eq!(table.to_grid()[1], vec!["Ana".to_string(), String::new()]);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let header = vec!["Player Name".to_string()];
        let mut a = Table::new("Players", header.clone());
        let b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        a.rows.push(row_from_values(&header, &["Ana".to_string()]));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn trailing_blank_rows_are_cut_but_inner_ones_kept() {
        let header = vec!["Player Name".to_string(), "Team".to_string()];
        let blank = row_from_values(&header, &[]);
        let ana = row_from_values(&header, &["Ana".to_string()]);
        let rows = vec![blank.clone(), ana, blank.clone(), blank];
        assert_eq!(without_trailing_blank_rows(&rows).len(), 2);
        assert!(without_trailing_blank_rows(&rows[2..]).is_empty());
    }

    #[test]
    fn duplicate_column_names_are_detected() {
        let header: Vec<String> = ["Player Name", "Date", "Date"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(has_duplicate_columns(&header));
        assert!(!has_duplicate_columns(&header[..2]));
    }
}
