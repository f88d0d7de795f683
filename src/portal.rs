use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::commit::{CommitReport, Provenance, SaveCommand, View};
use crate::error::Result;
use crate::join::{self, Filters, distinct_values, filter_table, join_with_players, rows_for_player};
use crate::schema::{ALL_TABLES, DEPENDENT_TABLES, PLAYER_NAME, POSITION_1, TEAM, TableKind};
use crate::store::RecordStore;
use crate::table::{Row, Table};

/// Columns the section filters can narrow on.
pub const FILTER_COLUMNS: [&str; 2] = [TEAM, POSITION_1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Players,
    Skills,
    Personality,
    Idp1,
    Idp2,
    Profile,
}

pub const SECTIONS: [Section; 6] = [
    Section::Players,
    Section::Skills,
    Section::Personality,
    Section::Idp1,
    Section::Idp2,
    Section::Profile,
];

impl Section {
    pub fn label(self) -> &'static str {
        match self {
            Section::Players => "Players",
            Section::Skills => "Skills",
            Section::Personality => "Personality",
            Section::Idp1 => "IDP 1 (Goals)",
            Section::Idp2 => "IDP 2 (Interventions)",
            Section::Profile => "Player Profile",
        }
    }

    pub fn table(self) -> Option<TableKind> {
        match self {
            Section::Players => Some(TableKind::Players),
            Section::Skills => Some(TableKind::Skills),
            Section::Personality => Some(TableKind::Personality),
            Section::Idp1 => Some(TableKind::Idp1),
            Section::Idp2 => Some(TableKind::Idp2),
            Section::Profile => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSection {
    pub kind: TableKind,
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

/// Everything recorded about one player, gathered from all five tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    pub name: String,
    /// Matching rows of the Players table; more than one means the name is
    /// not unique.
    pub attributes: Vec<Row>,
    pub sections: Vec<ProfileSection>,
}

impl PlayerProfile {
    pub fn section(&self, kind: TableKind) -> Option<&ProfileSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn picture_url(&self) -> Option<&str> {
        self.attributes
            .first()
            .and_then(|row| row.get("Profile Picture"))
            .map(String::as_str)
            .filter(|url| !url.trim().is_empty())
    }
}

/// The operations the presentation layer drives, bound to one store.
#[derive(Debug)]
pub struct Portal<S> {
    store: S,
    fetch_parallelism: usize,
}

impl<S: RecordStore> Portal<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            fetch_parallelism: ALL_TABLES.len(),
        }
    }

    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.fetch_parallelism = threads.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Players with their skills and personality entries; display only.
    pub fn players_overview(&self, filters: &Filters) -> Result<View> {
        let players = self.load(TableKind::Players)?;
        let skills = self.load(TableKind::Skills)?;
        let personality = self.load(TableKind::Personality)?;
        let merged = join::overview(&players, &skills, &personality);
        Ok(View::derived(
            TableKind::Players.sheet_name(),
            filter_table(&merged, filters),
            Provenance::Joined,
        ))
    }

    /// The browse view of a section: Players filtered in place, dependent
    /// sections joined with player attributes and then filtered.
    pub fn section_view(&self, kind: TableKind, filters: &Filters) -> Result<View> {
        if kind == TableKind::Players {
            let players = self.load(kind)?;
            if !filters.is_active() {
                return Ok(View::native(players));
            }
            return Ok(View::derived(
                kind.sheet_name(),
                filter_table(&players, filters),
                Provenance::Filtered,
            ));
        }

        let section = self.load(kind)?;
        let players = self.load(TableKind::Players)?;
        let merged = join_with_players(&section, &players);
        Ok(View::derived(
            kind.sheet_name(),
            filter_table(&merged, filters),
            Provenance::Joined,
        ))
    }

    /// The whole table as stored, ready for editing.
    pub fn editable_view(&self, kind: TableKind) -> Result<View> {
        Ok(View::native(self.load(kind)?))
    }

    pub fn save(&self, command: &SaveCommand) -> Result<CommitReport> {
        command.execute(&self.store)
    }

    /// Appends one entry built from form fields in catalog column order;
    /// fields the form did not fill are written empty.
    pub fn add_entry(&self, kind: TableKind, form: &BTreeMap<String, String>) -> Result<Vec<String>> {
        let values: Vec<String> = kind
            .columns()
            .iter()
            .map(|col| form.get(*col).map(|v| v.trim().to_string()).unwrap_or_default())
            .collect();
        self.store.append(kind.sheet_name(), &values)?;
        info!(table = kind.sheet_name(), "entry appended");
        Ok(values)
    }

    pub fn player_names(&self) -> Result<Vec<String>> {
        let players = self.load(TableKind::Players)?;
        Ok(distinct_values(&players.rows, PLAYER_NAME))
    }

    /// Loads all five tables in parallel and keeps what belongs to `name`.
    pub fn profile(&self, name: &str) -> Result<PlayerProfile> {
        let loaded: Vec<(TableKind, Result<Table>)> = with_fetch_pool(self.fetch_parallelism, || {
            ALL_TABLES
                .par_iter()
                .map(|kind| (*kind, self.load(*kind)))
                .collect()
        });

        let mut attributes = Vec::new();
        let mut by_kind = BTreeMap::new();
        for (kind, table) in loaded {
            let table = table?;
            if kind == TableKind::Players {
                attributes = rows_for_player(&table, name);
            } else {
                by_kind.insert(kind, table);
            }
        }

        let sections = DEPENDENT_TABLES
            .iter()
            .filter_map(|kind| by_kind.remove(kind).map(|table| (*kind, table)))
            .map(|(kind, table)| ProfileSection {
                kind,
                rows: rows_for_player(&table, name),
                header: table.header,
            })
            .collect();
        debug!(player = name, "profile assembled");
        Ok(PlayerProfile {
            name: name.to_string(),
            attributes,
            sections,
        })
    }

    fn load(&self, kind: TableKind) -> Result<Table> {
        self.store.load(kind.sheet_name())
    }
}

/// Distinct values of each filter column, for the filter picker.
pub fn filter_options(rows: &[Row]) -> BTreeMap<String, Vec<String>> {
    FILTER_COLUMNS
        .iter()
        .map(|col| (col.to_string(), distinct_values(rows, col)))
        .collect()
}

fn with_fetch_pool<T>(threads: usize, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(action),
        Err(_) => action(),
    }
}
