use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::schema::PLAYER_NAME;
use crate::table::{Row, Table};

/// Allowed values per column. A column with an empty set places no
/// restriction; that is how "nothing selected" is represented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    allowed: BTreeMap<String, BTreeSet<String>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, values: &[&str]) -> Self {
        let set = self.allowed.entry(column.to_string()).or_default();
        set.extend(values.iter().map(|v| v.to_string()));
        self
    }

    /// Adds `value` to the column's set, or removes it if already present.
    pub fn toggle(&mut self, column: &str, value: &str) {
        let set = self.allowed.entry(column.to_string()).or_default();
        if !set.remove(value) {
            set.insert(value.to_string());
        }
    }

    pub fn clear(&mut self, column: &str) {
        self.allowed.remove(column);
    }

    pub fn clear_all(&mut self) {
        self.allowed.clear();
    }

    pub fn is_selected(&self, column: &str, value: &str) -> bool {
        self.allowed
            .get(column)
            .is_some_and(|set| set.contains(value))
    }

    pub fn is_active(&self) -> bool {
        self.allowed.values().any(|set| !set.is_empty())
    }

    fn accepts(&self, row: &Row) -> bool {
        self.allowed
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .all(|(column, set)| row.get(column).is_some_and(|value| set.contains(value)))
    }
}

/// Keeps the rows every active filter accepts, in input order. A row that
/// lacks a filtered column is rejected.
pub fn apply_filters(rows: &[Row], filters: &Filters) -> Vec<Row> {
    if !filters.is_active() {
        return rows.to_vec();
    }
    rows.iter()
        .filter(|row| filters.accepts(row))
        .cloned()
        .collect()
}

pub fn filter_table(table: &Table, filters: &Filters) -> Table {
    Table {
        name: table.name.clone(),
        header: table.header.clone(),
        rows: apply_filters(&table.rows, filters),
    }
}

/// Left join of `left` with `right` on `key`.
///
/// Every left row survives. An unmatched row gets none of the right-side
/// columns; a row matching several right rows is emitted once per match, in
/// right-table order. Overlapping non-key columns keep the left value, and
/// the right value lands under `"{column} ({right_label})"`.
pub fn left_join(left: &Table, right: &Table, key: &str, right_label: &str) -> Table {
    let mut index: HashMap<&str, Vec<&Row>> = HashMap::new();
    for row in &right.rows {
        if let Some(value) = row.get(key) {
            index.entry(value.as_str()).or_default().push(row);
        }
    }

    let left_columns: BTreeSet<&str> = left.header.iter().map(String::as_str).collect();
    let renamed: Vec<(String, String)> = right
        .header
        .iter()
        .filter(|col| col.as_str() != key)
        .map(|col| {
            let target = if left_columns.contains(col.as_str()) {
                format!("{col} ({right_label})")
            } else {
                col.clone()
            };
            (col.clone(), target)
        })
        .collect();

    let mut header = left.header.clone();
    header.extend(renamed.iter().map(|(_, target)| target.clone()));

    let mut rows = Vec::with_capacity(left.rows.len());
    for row in &left.rows {
        let matches = row
            .get(key)
            .and_then(|value| index.get(value.as_str()))
            .filter(|found| !found.is_empty());
        let Some(matches) = matches else {
            rows.push(row.clone());
            continue;
        };
        for matched in matches {
            let mut merged = row.clone();
            for (source, target) in &renamed {
                if let Some(value) = matched.get(source) {
                    merged.insert(target.clone(), value.clone());
                }
            }
            rows.push(merged);
        }
    }

    Table {
        name: format!("{}+{}", left.name, right.name),
        header,
        rows,
    }
}

/// A dependent section merged with the player attributes of each entry.
pub fn join_with_players(section: &Table, players: &Table) -> Table {
    left_join(section, players, PLAYER_NAME, &players.name)
}

/// Every player with their skills and personality entries attached.
pub fn overview(players: &Table, skills: &Table, personality: &Table) -> Table {
    let with_skills = left_join(players, skills, PLAYER_NAME, &skills.name);
    let mut merged = left_join(&with_skills, personality, PLAYER_NAME, &personality.name);
    merged.name = "Overview".to_string();
    merged
}

/// Sorted distinct non-empty values of `column`.
pub fn distinct_values(rows: &[Row], column: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get(column))
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn rows_for_player(table: &Table, player_name: &str) -> Vec<Row> {
    table
        .rows
        .iter()
        .filter(|row| row.get(PLAYER_NAME).is_some_and(|name| name == player_name))
        .cloned()
        .collect()
}
