use idp_portal::PortalError;
use idp_portal::commit::{Provenance, SaveCommand, View, commit};
use idp_portal::join::{Filters, filter_table, join_with_players};
use idp_portal::schema::TableKind;
use idp_portal::store::{MemoryStore, RecordStore};
use idp_portal::table::Table;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::with_catalog();
    store
        .append("Players", &strings(&["Ana", "U19", "CM", "DM", "2007-03-14", "17", ""]))
        .expect("append");
    store
        .append("Players", &strings(&["Ben", "U17", "ST"]))
        .expect("append");
    store
        .append("Personality", &strings(&["Ana", "Driven", "Sets own targets"]))
        .expect("append");
    store
}

#[test]
fn native_view_round_trips() {
    let store = seeded_store();
    let mut view = View::native(store.load("Players").expect("load"));
    view.data.rows[1].insert("Position 2".to_string(), "LW".to_string());

    let report = commit(&store, "Players", &view).expect("commit");
    assert_eq!(report.rows_written, 2);

    let reloaded = store.load("Players").expect("reload");
    assert_eq!(reloaded.rows, view.data.rows);
    assert_eq!(reloaded.header, TableKind::Players.header());
}

#[test]
fn joined_view_into_personality_is_a_schema_mismatch() {
    let store = seeded_store();
    let before = store.load("Personality").expect("load");
    let joined = join_with_players(&before, &store.load("Players").expect("players"));
    let view = View::derived("Personality", joined, Provenance::Joined);

    let err = commit(&store, "Personality", &view).expect_err("must refuse");
    match err {
        PortalError::SchemaMismatch { table, expected, found } => {
            assert_eq!(table, "Personality");
            assert_eq!(expected, TableKind::Personality.header());
            assert!(found.iter().any(|col| col == "Team"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.load("Personality").expect("reload"), before);
}

#[test]
fn filtered_view_is_partial_and_store_untouched() {
    let store = seeded_store();
    let before = store.load("Players").expect("load");
    let filtered = filter_table(&before, &Filters::new().with("Team", &["U19"]));
    let view = View::derived("Players", filtered, Provenance::Filtered);
    assert!(!view.committable());

    let err = commit(&store, "Players", &view).expect_err("must refuse");
    assert!(matches!(err, PortalError::PartialView { .. }));
    assert_eq!(store.load("Players").expect("reload").len(), 2);
}

#[test]
fn save_command_captures_view_at_creation() {
    let store = seeded_store();
    let mut view = View::native(store.load("Players").expect("load"));
    view.data.rows.pop();
    let command = SaveCommand::from_view(&view);
    view.data.rows.clear();

    let report = command.execute(&store).expect("save");
    assert_eq!(report.table, "Players");
    assert_eq!(report.rows_written, 1);
    assert_eq!(store.load("Players").expect("reload").len(), 1);
}

#[test]
fn reordered_header_writes_in_catalog_order() {
    let store = seeded_store();
    let mut view = View::native(store.load("Personality").expect("load"));
    view.data.header.reverse();

    commit(&store, "Personality", &view).expect("commit");
    let reloaded = store.load("Personality").expect("reload");
    assert_eq!(reloaded.header, TableKind::Personality.header());
    assert_eq!(reloaded.cell(0, "Trait"), Some("Driven"));
}

#[test]
fn stray_row_column_is_rejected() {
    let store = seeded_store();
    let mut view = View::native(store.load("Players").expect("load"));
    view.data.rows[0].insert("Nickname".to_string(), "A".to_string());
    let err = commit(&store, "Players", &view).expect_err("must refuse");
    assert!(matches!(err, PortalError::SchemaMismatch { .. }));
}

#[test]
fn unknown_table_uses_live_header() {
    let store = MemoryStore::new();
    store.insert_grid(
        "Notes",
        vec![strings(&["Player Name", "Note"]), strings(&["Ana", "old"])],
    );
    let mut view = View::native(store.load("Notes").expect("load"));
    view.data.rows[0].insert("Note".to_string(), "new".to_string());
    commit(&store, "Notes", &view).expect("commit");
    assert_eq!(store.load("Notes").expect("reload").cell(0, "Note"), Some("new"));

    let wrong = View::native(Table::new("Notes", strings(&["Player Name"])));
    assert!(matches!(
        commit(&store, "Notes", &wrong),
        Err(PortalError::SchemaMismatch { .. })
    ));
}

#[test]
fn appends_load_in_order() {
    let store = MemoryStore::with_catalog();
    for name in ["C", "A", "B"] {
        store
            .append("Skills", &strings(&[name, "2025-01-01"]))
            .expect("append");
    }
    let table = store.load("Skills").expect("load");
    let names: Vec<&str> = (0..table.len())
        .map(|idx| table.cell(idx, "Player Name").unwrap_or_default())
        .collect();
    assert_eq!(names, vec!["C", "A", "B"]);
}

#[test]
fn repeated_commit_is_idempotent() {
    let store = seeded_store();
    let view = View::native(store.load("Players").expect("load"));
    commit(&store, "Players", &view).expect("first");
    let once = store.load("Players").expect("reload");
    commit(&store, "Players", &view).expect("second");
    assert_eq!(store.load("Players").expect("reload"), once);
}

#[test]
fn trailing_blank_rows_are_not_written_or_counted() {
    let store = seeded_store();
    let mut view = View::native(store.load("Players").expect("load"));
    let blank: idp_portal::table::Row = view
        .data
        .header
        .iter()
        .map(|col| (col.clone(), String::new()))
        .collect();
    view.data.rows.insert(1, blank.clone());
    view.data.rows.push(blank.clone());
    view.data.rows.push(blank);

    let report = commit(&store, "Players", &view).expect("commit");
    assert_eq!(report.rows_written, 3, "the inner blank row is kept");
    let reloaded = store.load("Players").expect("reload");
    assert_eq!(reloaded.rows, view.data.rows[..3]);
}

#[test]
fn repeated_live_column_name_is_a_schema_mismatch() {
    let store = MemoryStore::new();
    store.insert_grid(
        "Sessions",
        vec![
            strings(&["Player Name", "Date", "Date"]),
            strings(&["Ana", "2025-01-01", "2025-02-01"]),
        ],
    );
    let before = store.load("Sessions").expect("load");
    let view = View::native(before.clone());
    assert!(!view.committable());

    let err = commit(&store, "Sessions", &view).expect_err("must refuse");
    assert!(matches!(err, PortalError::SchemaMismatch { .. }));
    assert_eq!(store.load("Sessions").expect("reload"), before);
}
