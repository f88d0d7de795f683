use std::collections::{BTreeMap, VecDeque};

use chrono::Utc;

use crate::commit::{Provenance, SaveCommand, View};
use crate::join::{Filters, filter_table};
use crate::portal::{FILTER_COLUMNS, PlayerProfile, Portal, SECTIONS, Section, filter_options};
use crate::schema::{PLAYER_NAME, TableKind};
use crate::store::RecordStore;
use crate::table::Row;

const MAX_LOGS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    CellEdit,
    Filter,
    Form,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryForm {
    pub kind: TableKind,
    pub fields: Vec<(String, String)>,
    pub cursor: usize,
}

impl EntryForm {
    pub fn new(kind: TableKind, player_name: Option<&str>) -> Self {
        let today = kind
            .has_date()
            .then(|| Utc::now().date_naive().format("%Y-%m-%d").to_string());
        let fields = kind
            .columns()
            .iter()
            .map(|col| {
                let value = match *col {
                    PLAYER_NAME => player_name.unwrap_or_default().to_string(),
                    "Date" => today.clone().unwrap_or_default(),
                    _ => String::new(),
                };
                (col.to_string(), value)
            })
            .collect();
        Self {
            kind,
            fields,
            cursor: 0,
        }
    }

    pub fn next_field(&mut self) {
        self.cursor = (self.cursor + 1) % self.fields.len().max(1);
    }

    pub fn prev_field(&mut self) {
        let len = self.fields.len().max(1);
        self.cursor = (self.cursor + len - 1) % len;
    }

    pub fn push_char(&mut self, ch: char) {
        if let Some((_, value)) = self.fields.get_mut(self.cursor) {
            value.push(ch);
        }
    }

    pub fn pop_char(&mut self) {
        if let Some((_, value)) = self.fields.get_mut(self.cursor) {
            value.pop();
        }
    }

    pub fn values(&self) -> BTreeMap<String, String> {
        self.fields.iter().cloned().collect()
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub section: Section,
    pub overview: bool,
    pub view: Option<View>,
    pub editing: bool,
    pub dirty: bool,
    pub selected_row: usize,
    pub selected_col: usize,
    pub mode: InputMode,
    pub edit_buffer: String,
    pub filters: Filters,
    pub filter_options: BTreeMap<String, Vec<String>>,
    pub filter_column: usize,
    pub filter_cursor: usize,
    pub form: Option<EntryForm>,
    pub profile_names: Vec<String>,
    pub profile_cursor: usize,
    pub profile: Option<PlayerProfile>,
    pub logs: VecDeque<String>,
    pub status: String,
    pub help_overlay: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            section: Section::Players,
            overview: false,
            view: None,
            editing: false,
            dirty: false,
            selected_row: 0,
            selected_col: 0,
            mode: InputMode::Normal,
            edit_buffer: String::new(),
            filters: Filters::new(),
            filter_options: BTreeMap::new(),
            filter_column: 0,
            filter_cursor: 0,
            form: None,
            profile_names: Vec::new(),
            profile_cursor: 0,
            profile: None,
            logs: VecDeque::new(),
            status: String::new(),
            help_overlay: false,
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    fn report(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        self.status = msg.clone();
        self.push_log(msg);
    }

    pub fn can_save(&self) -> bool {
        self.editing && self.view.as_ref().is_some_and(View::committable)
    }

    pub fn row_count(&self) -> usize {
        self.view.as_ref().map_or(0, |v| v.data.len())
    }

    pub fn column_count(&self) -> usize {
        self.view.as_ref().map_or(0, |v| v.data.header.len())
    }

    pub fn selected_column_name(&self) -> Option<&str> {
        self.view
            .as_ref()
            .and_then(|v| v.data.header.get(self.selected_col))
            .map(String::as_str)
    }

    pub fn selected_player_name(&self) -> Option<String> {
        if self.section == Section::Profile {
            return self.profile_names.get(self.profile_cursor).cloned();
        }
        self.view
            .as_ref()?
            .data
            .cell(self.selected_row, PLAYER_NAME)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }

    pub fn select_next(&mut self) {
        if self.section == Section::Profile {
            if self.profile_cursor + 1 < self.profile_names.len() {
                self.profile_cursor += 1;
            }
            return;
        }
        if self.selected_row + 1 < self.row_count() {
            self.selected_row += 1;
        }
    }

    pub fn select_prev(&mut self) {
        if self.section == Section::Profile {
            self.profile_cursor = self.profile_cursor.saturating_sub(1);
            return;
        }
        self.selected_row = self.selected_row.saturating_sub(1);
    }

    pub fn select_col_next(&mut self) {
        if self.selected_col + 1 < self.column_count() {
            self.selected_col += 1;
        }
    }

    pub fn select_col_prev(&mut self) {
        self.selected_col = self.selected_col.saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        self.selected_row = self.selected_row.min(self.row_count().saturating_sub(1));
        self.selected_col = self.selected_col.min(self.column_count().saturating_sub(1));
        self.profile_cursor = self
            .profile_cursor
            .min(self.profile_names.len().saturating_sub(1));
    }

    /// Switches section, dropping any unsaved working copy.
    pub fn switch_section<S: RecordStore>(&mut self, portal: &Portal<S>, section: Section) {
        if self.dirty {
            self.push_log(format!(
                "[WARN] Unsaved edits to {} discarded",
                self.section.label()
            ));
        }
        self.section = section;
        self.overview = false;
        self.editing = false;
        self.dirty = false;
        self.filters.clear_all();
        self.selected_row = 0;
        self.selected_col = 0;
        self.mode = InputMode::Normal;
        self.form = None;
        self.reload(portal);
    }

    pub fn switch_section_index<S: RecordStore>(&mut self, portal: &Portal<S>, idx: usize) {
        if let Some(section) = SECTIONS.get(idx) {
            self.switch_section(portal, *section);
        }
    }

    /// Fetches the current section again. Unsaved edits are lost.
    pub fn reload<S: RecordStore>(&mut self, portal: &Portal<S>) {
        if self.section == Section::Profile {
            self.view = None;
            match portal.player_names() {
                Ok(names) => {
                    self.profile_names = names;
                    self.clamp_selection();
                    self.status = format!("{} players", self.profile_names.len());
                }
                Err(err) => self.report(format!("[ERROR] Load failed: {err}")),
            }
            return;
        }
        let Some(kind) = self.section.table() else {
            return;
        };

        let unfiltered = Filters::new();
        let result = if self.editing {
            portal.editable_view(kind)
        } else if self.overview {
            portal.players_overview(&unfiltered)
        } else {
            portal.section_view(kind, &unfiltered)
        };
        match result {
            Ok(mut view) => {
                if !self.editing {
                    // Options come from the unfiltered rows so a selection
                    // never hides the values it could be widened with.
                    self.filter_options = filter_options(&view.data.rows);
                    if self.filters.is_active() {
                        view.data = filter_table(&view.data, &self.filters);
                        if view.provenance == Provenance::Native {
                            view.provenance = Provenance::Filtered;
                        }
                    }
                }
                self.status = format!("{} rows", view.data.len());
                self.view = Some(view);
                self.dirty = false;
                self.clamp_selection();
            }
            Err(err) => {
                self.view = None;
                self.report(format!("[ERROR] Load failed: {err}"));
            }
        }
    }

    pub fn toggle_overview<S: RecordStore>(&mut self, portal: &Portal<S>) {
        if self.section != Section::Players || self.editing {
            return;
        }
        self.overview = !self.overview;
        self.selected_col = 0;
        self.reload(portal);
    }

    /// Enters or leaves edit mode. Editing always works on the whole
    /// stored table, never on a filtered or joined view.
    pub fn toggle_editing<S: RecordStore>(&mut self, portal: &Portal<S>) {
        if self.section.table().is_none() {
            return;
        }
        if self.editing && self.dirty {
            self.push_log("[WARN] Unsaved edits discarded");
        }
        self.editing = !self.editing;
        self.overview = false;
        self.selected_col = 0;
        self.reload(portal);
        if self.editing {
            self.push_log(format!("[INFO] Editing {}", self.section.label()));
        }
    }

    pub fn begin_cell_edit(&mut self) {
        if !self.can_save() || self.row_count() == 0 {
            return;
        }
        let current = self
            .selected_column_name()
            .and_then(|col| {
                self.view
                    .as_ref()
                    .and_then(|v| v.data.cell(self.selected_row, col))
            })
            .unwrap_or_default()
            .to_string();
        self.edit_buffer = current;
        self.mode = InputMode::CellEdit;
    }

    pub fn finish_cell_edit(&mut self) {
        self.mode = InputMode::Normal;
        let Some(col) = self.selected_column_name().map(str::to_string) else {
            return;
        };
        let value = std::mem::take(&mut self.edit_buffer);
        let row_idx = self.selected_row;
        let Some(row) = self
            .view
            .as_mut()
            .and_then(|v| v.data.rows.get_mut(row_idx))
        else {
            return;
        };
        if row.get(&col) != Some(&value) {
            row.insert(col, value);
            self.dirty = true;
        }
    }

    pub fn cancel_cell_edit(&mut self) {
        self.edit_buffer.clear();
        self.mode = InputMode::Normal;
    }

    pub fn insert_blank_row(&mut self) {
        if !self.can_save() {
            return;
        }
        let Some(view) = self.view.as_mut() else {
            return;
        };
        let row: Row = view
            .data
            .header
            .iter()
            .map(|col| (col.clone(), String::new()))
            .collect();
        let at = (self.selected_row + 1).min(view.data.rows.len());
        view.data.rows.insert(at, row);
        self.selected_row = at;
        self.dirty = true;
    }

    pub fn delete_selected_row(&mut self) {
        if !self.can_save() {
            return;
        }
        let Some(view) = self.view.as_mut() else {
            return;
        };
        if self.selected_row < view.data.rows.len() {
            view.data.rows.remove(self.selected_row);
            self.dirty = true;
            self.clamp_selection();
        }
    }

    /// Writes the working copy back as the full table. A save is only
    /// acknowledged after the store accepted it.
    pub fn save<S: RecordStore>(&mut self, portal: &Portal<S>) {
        let Some(view) = self.view.as_ref().filter(|_| self.can_save()) else {
            self.report("[WARN] This view is display-only; press e to edit the table");
            return;
        };
        let command = SaveCommand::from_view(view);
        match portal.save(&command) {
            Ok(report) => {
                self.dirty = false;
                self.report(format!(
                    "[INFO] Saved {} rows to {}",
                    report.rows_written, report.table
                ));
            }
            Err(err) => self.report(format!("[ERROR] Save failed: {err}")),
        }
    }

    pub fn open_filter(&mut self) {
        if self.editing || self.section == Section::Profile {
            return;
        }
        self.filter_cursor = 0;
        self.mode = InputMode::Filter;
    }

    pub fn filter_column_name(&self) -> &'static str {
        FILTER_COLUMNS[self.filter_column % FILTER_COLUMNS.len()]
    }

    pub fn filter_values(&self) -> &[String] {
        self.filter_options
            .get(self.filter_column_name())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn cycle_filter_column(&mut self) {
        self.filter_column = (self.filter_column + 1) % FILTER_COLUMNS.len();
        self.filter_cursor = 0;
    }

    pub fn filter_cursor_next(&mut self) {
        if self.filter_cursor + 1 < self.filter_values().len() {
            self.filter_cursor += 1;
        }
    }

    pub fn filter_cursor_prev(&mut self) {
        self.filter_cursor = self.filter_cursor.saturating_sub(1);
    }

    pub fn toggle_filter_value<S: RecordStore>(&mut self, portal: &Portal<S>) {
        let column = self.filter_column_name();
        let Some(value) = self.filter_values().get(self.filter_cursor).cloned() else {
            return;
        };
        self.filters.toggle(column, &value);
        self.selected_row = 0;
        self.reload(portal);
    }

    pub fn clear_filter_column<S: RecordStore>(&mut self, portal: &Portal<S>) {
        self.filters.clear(self.filter_column_name());
        self.reload(portal);
    }

    pub fn close_filter(&mut self) {
        self.mode = InputMode::Normal;
    }

    pub fn open_form(&mut self) {
        let Some(kind) = self.section.table() else {
            return;
        };
        if self.dirty {
            self.report("[WARN] Save or reload the table before adding entries");
            return;
        }
        let player = if kind == TableKind::Players {
            None
        } else {
            self.selected_player_name()
        };
        self.form = Some(EntryForm::new(kind, player.as_deref()));
        self.mode = InputMode::Form;
    }

    pub fn cancel_form(&mut self) {
        self.form = None;
        self.mode = InputMode::Normal;
    }

    /// Appends the form as a new row. An empty player name keeps the form
    /// open.
    pub fn submit_form<S: RecordStore>(&mut self, portal: &Portal<S>) {
        let Some(form) = self.form.as_ref() else {
            return;
        };
        let values = form.values();
        if values.get(PLAYER_NAME).is_none_or(|name| name.trim().is_empty()) {
            self.report("[WARN] Player Name is required");
            return;
        }
        let kind = form.kind;
        match portal.add_entry(kind, &values) {
            Ok(_) => {
                self.form = None;
                self.mode = InputMode::Normal;
                self.reload(portal);
                self.report(format!("[INFO] Added entry to {}", kind.sheet_name()));
            }
            Err(err) => self.report(format!("[ERROR] Add failed: {err}")),
        }
    }

    /// Jumps to the profile section showing `name`.
    pub fn open_profile<S: RecordStore>(&mut self, portal: &Portal<S>, name: &str) {
        if self.section != Section::Profile {
            self.switch_section(portal, Section::Profile);
        }
        if let Some(idx) = self.profile_names.iter().position(|n| n == name) {
            self.profile_cursor = idx;
        }
        match portal.profile(name) {
            Ok(profile) => {
                self.status = format!("Profile: {name}");
                self.profile = Some(profile);
            }
            Err(err) => {
                self.profile = None;
                self.report(format!("[ERROR] Profile load failed: {err}"));
            }
        }
    }

    pub fn open_selected_profile<S: RecordStore>(&mut self, portal: &Portal<S>) {
        let Some(name) = self.selected_player_name() else {
            self.report("[INFO] No player selected");
            return;
        };
        self.open_profile(portal, &name);
    }
}

#[cfg(test)]
mod tests {
    use super::EntryForm;
    use crate::schema::TableKind;

    #[test]
    fn form_prefills_player_and_date() {
        let form = EntryForm::new(TableKind::Skills, Some("Ana"));
        assert_eq!(form.fields[0], ("Player Name".to_string(), "Ana".to_string()));
        assert_eq!(form.fields[1].0, "Date");
        assert_eq!(form.fields[1].1.len(), 10);
    }

    #[test]
    fn form_cursor_wraps() {
        let mut form = EntryForm::new(TableKind::Personality, None);
        form.prev_field();
        assert_eq!(form.cursor, 2);
        form.next_field();
        assert_eq!(form.cursor, 0);
        form.push_char('J');
        form.pop_char();
        form.push_char('K');
        assert_eq!(form.values()["Player Name"], "K");
    }
}
