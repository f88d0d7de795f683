use std::collections::BTreeMap;

use idp_portal::PortalError;
use idp_portal::commit::Provenance;
use idp_portal::join::Filters;
use idp_portal::portal::{Portal, Section};
use idp_portal::schema::TableKind;
use idp_portal::state::{AppState, InputMode};
use idp_portal::store::{MemoryStore, RecordStore};
use idp_portal::table::{Row, Table};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::with_catalog();
    for line in [
        ["Ana", "U19", "CM"],
        ["Ben", "U17", "ST"],
        ["Cara", "U19", "CB"],
    ] {
        store.append("Players", &strings(&line)).expect("seed players");
    }
    store
        .append("Skills", &strings(&["Ana", "2025-01-01", "Scanning"]))
        .expect("seed skills");
    store
        .append("IDP_2", &strings(&["Ben", "2025-01-05", "Finishing"]))
        .expect("seed idp2");
    store
}

/// Loads succeed; every write is refused.
struct ReadOnlyStore(MemoryStore);

impl RecordStore for ReadOnlyStore {
    fn load(&self, table: &str) -> idp_portal::Result<Table> {
        self.0.load(table)
    }

    fn replace_all(&self, table: &str, _: &[String], _: &[Row]) -> idp_portal::Result<()> {
        Err(PortalError::unavailable(table, "quota exceeded"))
    }

    fn append(&self, table: &str, _: &[String]) -> idp_portal::Result<()> {
        Err(PortalError::unavailable(table, "quota exceeded"))
    }
}

#[test]
fn dependent_section_is_joined_and_filterable() {
    let portal = Portal::new(seeded_store());
    let view = portal
        .section_view(TableKind::Skills, &Filters::new().with("Team", &["U19"]))
        .expect("view");
    assert_eq!(view.provenance, Provenance::Joined);
    assert!(!view.committable());
    assert_eq!(view.data.len(), 1);
    assert_eq!(view.data.cell(0, "Team"), Some("U19"));
}

#[test]
fn players_view_is_native_until_filtered() {
    let portal = Portal::new(seeded_store());
    let plain = portal
        .section_view(TableKind::Players, &Filters::new())
        .expect("view");
    assert!(plain.committable());

    let filtered = portal
        .section_view(TableKind::Players, &Filters::new().with("Position 1", &["ST"]))
        .expect("view");
    assert_eq!(filtered.provenance, Provenance::Filtered);
    assert_eq!(filtered.data.len(), 1);
}

#[test]
fn add_entry_writes_catalog_order() {
    let portal = Portal::new(seeded_store());
    let mut form = BTreeMap::new();
    form.insert("Definition".to_string(), "Stays composed".to_string());
    form.insert("Player Name".to_string(), " Cara ".to_string());
    form.insert("Trait".to_string(), "Calm".to_string());

    let written = portal
        .add_entry(TableKind::Personality, &form)
        .expect("append");
    assert_eq!(written, strings(&["Cara", "Calm", "Stays composed"]));
    let table = portal.store().load("Personality").expect("load");
    assert_eq!(table.cell(0, "Trait"), Some("Calm"));
}

#[test]
fn profile_gathers_every_table() {
    let portal = Portal::new(seeded_store());
    let profile = portal.profile("Ben").expect("profile");
    assert_eq!(profile.attributes.len(), 1);
    assert_eq!(profile.sections.len(), 4);
    assert_eq!(profile.section(TableKind::Idp2).expect("idp2").rows.len(), 1);
    assert!(profile.section(TableKind::Skills).expect("skills").rows.is_empty());
    assert_eq!(profile.picture_url(), None);
}

#[test]
fn filter_options_come_from_unfiltered_rows() {
    let portal = Portal::new(seeded_store());
    let mut state = AppState::new();
    state.reload(&portal);
    state.open_filter();
    assert_eq!(state.mode, InputMode::Filter);
    assert_eq!(state.filter_values(), strings(&["U17", "U19"]).as_slice());

    state.toggle_filter_value(&portal);
    assert_eq!(state.row_count(), 1);
    assert_eq!(state.filter_values().len(), 2);
    assert!(!state.can_save());

    state.clear_filter_column(&portal);
    assert_eq!(state.row_count(), 3);
}

#[test]
fn edited_table_saves_and_acknowledges() {
    let portal = Portal::new(seeded_store());
    let mut state = AppState::new();
    state.switch_section(&portal, Section::Personality);
    state.toggle_editing(&portal);
    assert!(state.can_save());

    state.insert_blank_row();
    state.begin_cell_edit();
    state.edit_buffer = "Dee".to_string();
    state.finish_cell_edit();
    assert!(state.dirty);

    state.save(&portal);
    assert!(!state.dirty);
    assert!(state.status.starts_with("[INFO] Saved 1 rows"));
    let stored = portal.store().load("Personality").expect("load");
    assert_eq!(stored.cell(0, "Player Name"), Some("Dee"));
}

#[test]
fn failed_save_keeps_edits_pending() {
    let portal = Portal::new(ReadOnlyStore(seeded_store()));
    let mut state = AppState::new();
    state.toggle_editing(&portal);
    state.delete_selected_row();
    assert!(state.dirty);

    state.save(&portal);
    assert!(state.dirty);
    assert!(state.status.starts_with("[ERROR] Save failed"));
    assert_eq!(portal.store().load("Players").expect("load").len(), 3);
}

#[test]
fn joined_view_save_is_refused_without_writing() {
    let portal = Portal::new(seeded_store());
    let mut state = AppState::new();
    state.switch_section(&portal, Section::Skills);
    assert!(!state.can_save());
    state.save(&portal);
    assert!(state.status.starts_with("[WARN]"));
}

#[test]
fn form_submission_appends_and_reloads() {
    let portal = Portal::new(seeded_store());
    let mut state = AppState::new();
    state.switch_section(&portal, Section::Skills);
    state.open_form();
    let form = state.form.as_mut().expect("form open");
    assert_eq!(form.fields[0].1, "Ana");
    form.cursor = 2;
    for ch in "Pressing".chars() {
        form.push_char(ch);
    }

    state.submit_form(&portal);
    assert_eq!(state.mode, InputMode::Normal);
    assert_eq!(state.row_count(), 2);
    assert!(state.status.starts_with("[INFO] Added entry to Skills"));
}

#[test]
fn empty_player_name_keeps_form_open() {
    let portal = Portal::new(seeded_store());
    let mut state = AppState::new();
    state.open_form();
    state.submit_form(&portal);
    assert_eq!(state.mode, InputMode::Form);
    assert_eq!(portal.store().load("Players").expect("load").len(), 3);
}

#[test]
fn saved_count_matches_rows_that_reload() {
    let portal = Portal::new(seeded_store());
    let mut state = AppState::new();
    state.switch_section(&portal, Section::Personality);
    state.toggle_editing(&portal);
    state.insert_blank_row();
    assert!(state.dirty);

    state.save(&portal);
    assert!(state.status.starts_with("[INFO] Saved 0 rows"));
    assert!(portal.store().load("Personality").expect("load").is_empty());
}
