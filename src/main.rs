use std::fs::{self, OpenOptions};
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, Wrap};

use idp_portal::commit::Provenance;
use idp_portal::config::PortalConfig;
use idp_portal::portal::{Portal, SECTIONS, Section};
use idp_portal::state::{AppState, InputMode};
use idp_portal::store::RecordStore;

const MIN_COL_WIDTH: usize = 6;
const MAX_COL_WIDTH: usize = 24;

struct App {
    state: AppState,
    portal: Portal<Box<dyn RecordStore>>,
    should_quit: bool,
}

impl App {
    fn new(portal: Portal<Box<dyn RecordStore>>) -> Self {
        let mut state = AppState::new();
        state.reload(&portal);
        Self {
            state,
            portal,
            should_quit: false,
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        match self.state.mode {
            InputMode::Normal => self.on_key_normal(key),
            InputMode::CellEdit => self.on_key_cell_edit(key),
            InputMode::Filter => self.on_key_filter(key),
            InputMode::Form => self.on_key_form(key),
        }
    }

    fn on_key_normal(&mut self, key: KeyEvent) {
        let portal = &self.portal;
        let state = &mut self.state;
        if state.help_overlay {
            state.help_overlay = false;
            return;
        }
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char(ch @ '1'..='6') => {
                let idx = (ch as usize) - ('1' as usize);
                state.switch_section_index(portal, idx);
            }
            KeyCode::Char('j') | KeyCode::Down => state.select_next(),
            KeyCode::Char('k') | KeyCode::Up => state.select_prev(),
            KeyCode::Char('l') | KeyCode::Right => state.select_col_next(),
            KeyCode::Char('h') | KeyCode::Left => state.select_col_prev(),
            KeyCode::Char('o') => state.toggle_overview(portal),
            KeyCode::Char('e') => state.toggle_editing(portal),
            KeyCode::Enter => {
                if state.section == Section::Profile {
                    state.open_selected_profile(portal);
                } else {
                    state.begin_cell_edit();
                }
            }
            KeyCode::Char('n') => state.insert_blank_row(),
            KeyCode::Char('x') => state.delete_selected_row(),
            KeyCode::Char('s') => state.save(portal),
            KeyCode::Char('a') => state.open_form(),
            KeyCode::Char('f') => state.open_filter(),
            KeyCode::Char('p') => state.open_selected_profile(portal),
            KeyCode::Char('r') => state.reload(portal),
            KeyCode::Char('?') => state.help_overlay = true,
            _ => {}
        }
    }

    fn on_key_cell_edit(&mut self, key: KeyEvent) {
        let state = &mut self.state;
        match key.code {
            KeyCode::Enter => state.finish_cell_edit(),
            KeyCode::Esc => state.cancel_cell_edit(),
            KeyCode::Backspace => {
                state.edit_buffer.pop();
            }
            KeyCode::Char(ch) => state.edit_buffer.push(ch),
            _ => {}
        }
    }

    fn on_key_filter(&mut self, key: KeyEvent) {
        let portal = &self.portal;
        let state = &mut self.state;
        match key.code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('f') => state.close_filter(),
            KeyCode::Tab => state.cycle_filter_column(),
            KeyCode::Char('j') | KeyCode::Down => state.filter_cursor_next(),
            KeyCode::Char('k') | KeyCode::Up => state.filter_cursor_prev(),
            KeyCode::Char(' ') => state.toggle_filter_value(portal),
            KeyCode::Char('c') => state.clear_filter_column(portal),
            _ => {}
        }
    }

    fn on_key_form(&mut self, key: KeyEvent) {
        let portal = &self.portal;
        let state = &mut self.state;
        if key.code == KeyCode::Enter {
            state.submit_form(portal);
            return;
        }
        if key.code == KeyCode::Esc {
            state.cancel_form();
            return;
        }
        let Some(form) = state.form.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.prev_field(),
            KeyCode::Backspace => form.pop_char(),
            KeyCode::Char(ch) => form.push_char(ch),
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let config = PortalConfig::from_env();
    init_file_logging(&config);

    let store = config.open_store().context("open record store")?;
    let portal = Portal::new(store).with_parallelism(config.fetch_parallelism);
    tracing::info!(backend = ?config.backend, "portal starting");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let mut app = App::new(portal);
    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

/// The terminal owns stdout, so tracing output goes to a file.
fn init_file_logging(config: &PortalConfig) {
    let Some(path) = config.log_file.as_ref() else {
        return;
    };
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .try_init();
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    loop {
        terminal.draw(|f| ui(f, &app.state))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, state: &AppState) {
    let area = frame.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(1),
            Constraint::Length(4),
            Constraint::Length(1),
        ])
        .split(area);

    let header = Paragraph::new(header_text(state))
        .style(Style::default().add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    match state.section {
        Section::Profile => render_profile(frame, chunks[1], state),
        _ => render_grid(frame, chunks[1], state),
    }

    render_log(frame, chunks[2], state);

    let footer = Paragraph::new(footer_text(state)).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, chunks[3]);

    match state.mode {
        InputMode::Filter => render_filter_overlay(frame, area, state),
        InputMode::Form => render_form_overlay(frame, area, state),
        InputMode::CellEdit => render_cell_edit_overlay(frame, area, state),
        InputMode::Normal => {}
    }
    if state.help_overlay {
        render_help_overlay(frame, area);
    }
}

fn header_text(state: &AppState) -> String {
    let mut tabs = Vec::new();
    for (idx, section) in SECTIONS.iter().enumerate() {
        let label = format!("{} {}", idx + 1, section.label());
        if *section == state.section {
            tabs.push(format!("[{label}]"));
        } else {
            tabs.push(label);
        }
    }
    let mode = if state.section == Section::Profile {
        "Profile"
    } else if state.editing {
        if state.dirty { "Edit*" } else { "Edit" }
    } else if state.overview {
        "Overview"
    } else {
        "Browse"
    };
    format!("IDP PORTAL | {} | {mode}", tabs.join("  "))
}

fn footer_text(state: &AppState) -> String {
    let base = match state.section {
        Section::Profile => "1-6 Section | j/k Move | Enter Open profile | r Reload | ? Help | q Quit",
        Section::Players if !state.editing => {
            "1-6 Section | j/k/h/l Move | f Filter | o Overview | e Edit | a Add | p Profile | ? Help | q Quit"
        }
        _ if state.editing => {
            "Enter Edit cell | n New row | x Delete row | s Save | e Leave edit | a Add | ? Help"
        }
        _ => "1-6 Section | j/k/h/l Move | f Filter | e Edit | a Add | p Profile | ? Help | q Quit",
    };
    if state.status.is_empty() {
        base.to_string()
    } else {
        format!("{} | {base}", state.status)
    }
}

fn render_grid(frame: &mut Frame, area: Rect, state: &AppState) {
    let Some(view) = state.view.as_ref() else {
        let empty =
            Paragraph::new("Nothing loaded (r to retry)").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, area);
        return;
    };

    let title = match view.provenance {
        Provenance::Native if state.can_save() => format!("{} (editable)", view.table),
        Provenance::Native => view.table.clone(),
        Provenance::Filtered => format!("{} (filtered, read-only)", view.table),
        Provenance::Joined => format!("{} (joined, read-only)", view.data.name),
    };
    let block = Block::default().title(title).borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let data = &view.data;
    if data.header.is_empty() {
        frame.render_widget(
            Paragraph::new("Table has no header").style(Style::default().fg(Color::DarkGray)),
            inner,
        );
        return;
    }

    let widths: Vec<usize> = data
        .header
        .iter()
        .map(|col| {
            let longest = data
                .rows
                .iter()
                .filter_map(|row| row.get(col))
                .map(|v| v.chars().count())
                .max()
                .unwrap_or(0);
            longest.max(col.chars().count()).clamp(MIN_COL_WIDTH, MAX_COL_WIDTH)
        })
        .collect();
    let (col_start, col_end) = visible_columns(&widths, state.selected_col, inner.width as usize);

    let visible_rows = inner.height.saturating_sub(1) as usize;
    let (row_start, row_end) = visible_range(state.selected_row, data.rows.len(), visible_rows);

    let header_cells = data.header[col_start..col_end]
        .iter()
        .map(|col| Cell::from(col.clone()).style(Style::default().add_modifier(Modifier::BOLD)));

    let rows = (row_start..row_end).map(|idx| {
        let row = &data.rows[idx];
        let cells = (col_start..col_end).map(|col_idx| {
            let value = row
                .get(&data.header[col_idx])
                .cloned()
                .unwrap_or_default();
            let mut style = Style::default();
            if idx == state.selected_row && col_idx == state.selected_col {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Cell::from(value).style(style)
        });
        let row_style = if idx == state.selected_row {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        };
        Row::new(cells).style(row_style)
    });

    let constraints: Vec<Constraint> = widths[col_start..col_end]
        .iter()
        .map(|w| Constraint::Length(*w as u16))
        .collect();
    let table = Table::new(rows, constraints)
        .header(Row::new(header_cells))
        .column_spacing(1);
    frame.render_widget(table, inner);
}

fn render_profile(frame: &mut Frame, area: Rect, state: &AppState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(28), Constraint::Min(20)])
        .split(area);

    let visible = columns[0].height.saturating_sub(2) as usize;
    let (start, end) = visible_range(state.profile_cursor, state.profile_names.len(), visible);
    let items: Vec<ListItem> = (start..end)
        .map(|idx| {
            let style = if idx == state.profile_cursor {
                Style::default().fg(Color::White).bg(Color::DarkGray)
            } else {
                Style::default()
            };
            ListItem::new(state.profile_names[idx].clone()).style(style)
        })
        .collect();
    let list = List::new(items).block(Block::default().title("Players").borders(Borders::ALL));
    frame.render_widget(list, columns[0]);

    let Some(profile) = state.profile.as_ref() else {
        let hint = Paragraph::new("Select a player and press Enter")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().title("Profile").borders(Borders::ALL));
        frame.render_widget(hint, columns[1]);
        return;
    };

    let mut lines: Vec<Line> = Vec::new();
    match profile.attributes.as_slice() {
        [] => lines.push(Line::from("No Players row for this name")),
        [attrs, rest @ ..] => {
            for (col, value) in attrs.iter().filter(|(col, _)| col.as_str() != "Player Name") {
                lines.push(Line::from(format!("{col}: {value}")));
            }
            if !rest.is_empty() {
                lines.push(Line::styled(
                    format!("{} more Players rows share this name", rest.len()),
                    Style::default().fg(Color::Yellow),
                ));
            }
        }
    }
    if let Some(url) = profile.picture_url() {
        lines.push(Line::styled(
            format!("Picture: {url}"),
            Style::default().fg(Color::Cyan),
        ));
    }

    for section in &profile.sections {
        lines.push(Line::from(""));
        lines.push(Line::styled(
            format!("{} ({})", section.kind.sheet_name(), section.rows.len()),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        if section.rows.is_empty() {
            lines.push(Line::styled("  none", Style::default().fg(Color::DarkGray)));
        }
        for row in &section.rows {
            let parts: Vec<String> = section
                .header
                .iter()
                .filter(|col| col.as_str() != "Player Name")
                .filter_map(|col| {
                    row.get(col)
                        .filter(|v| !v.is_empty())
                        .map(|v| format!("{col}: {v}"))
                })
                .collect();
            lines.push(Line::from(format!("  - {}", parts.join(" | "))));
        }
    }

    let detail = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().title(profile.name.clone()).borders(Borders::ALL));
    frame.render_widget(detail, columns[1]);
}

fn render_log(frame: &mut Frame, area: Rect, state: &AppState) {
    let visible = area.height.saturating_sub(1) as usize;
    let lines: Vec<Line> = state
        .logs
        .iter()
        .rev()
        .take(visible)
        .rev()
        .map(|msg| {
            let style = if msg.starts_with("[ERROR]") {
                Style::default().fg(Color::Red)
            } else if msg.starts_with("[WARN]") {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            Line::styled(msg.clone(), style)
        })
        .collect();
    let log = Paragraph::new(lines).block(Block::default().borders(Borders::TOP).title("Log"));
    frame.render_widget(log, area);
}

fn render_filter_overlay(frame: &mut Frame, area: Rect, state: &AppState) {
    let popup_area = centered_rect(40, 60, area);
    frame.render_widget(Clear, popup_area);

    let column = state.filter_column_name();
    let items: Vec<ListItem> = state
        .filter_values()
        .iter()
        .enumerate()
        .map(|(idx, value)| {
            let mark = if state.filters.is_selected(column, value) {
                "[x]"
            } else {
                "[ ]"
            };
            let style = if idx == state.filter_cursor {
                Style::default().fg(Color::White).bg(Color::DarkGray)
            } else {
                Style::default()
            };
            ListItem::new(format!("{mark} {value}")).style(style)
        })
        .collect();
    let title = format!("Filter: {column} (Tab column, Space toggle, c clear, Esc close)");
    let list = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(list, popup_area);
}

fn render_form_overlay(frame: &mut Frame, area: Rect, state: &AppState) {
    let Some(form) = state.form.as_ref() else {
        return;
    };
    let popup_area = centered_rect(60, 70, area);
    frame.render_widget(Clear, popup_area);

    let lines: Vec<Line> = form
        .fields
        .iter()
        .enumerate()
        .map(|(idx, (col, value))| {
            let text = format!("{col:>20}: {value}");
            if idx == form.cursor {
                Line::styled(
                    format!("{text}_"),
                    Style::default().add_modifier(Modifier::REVERSED),
                )
            } else {
                Line::from(text)
            }
        })
        .collect();
    let title = format!(
        "Add to {} (Tab next, Enter save, Esc cancel)",
        form.kind.sheet_name()
    );
    let paragraph =
        Paragraph::new(lines).block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(paragraph, popup_area);
}

fn render_cell_edit_overlay(frame: &mut Frame, area: Rect, state: &AppState) {
    let popup_area = centered_rect(50, 20, area);
    frame.render_widget(Clear, popup_area);
    let column = state.selected_column_name().unwrap_or_default();
    let editor = Paragraph::new(format!("{}_", state.edit_buffer)).block(
        Block::default()
            .title(format!("{column} (Enter keep, Esc cancel)"))
            .borders(Borders::ALL),
    );
    frame.render_widget(editor, popup_area);
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 70, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "IDP Portal - Help",
        "",
        "Global:",
        "  1-6          Players, Skills, Personality, IDP 1, IDP 2, Profile",
        "  j/k or ↑/↓   Move row",
        "  h/l or ←/→   Move column",
        "  r            Reload from the store",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Browse:",
        "  f            Filter by Team / Position 1",
        "  o            Players overview with Skills and Personality",
        "  a            Add entry",
        "  p            Open profile of selected player",
        "",
        "Edit (e):",
        "  Enter        Edit cell",
        "  n / x        New row / delete row",
        "  s            Save whole table",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

/// Widest run of columns ending at or after `selected` that fits `width`.
fn visible_columns(widths: &[usize], selected: usize, width: usize) -> (usize, usize) {
    if widths.is_empty() {
        return (0, 0);
    }
    let selected = selected.min(widths.len() - 1);
    let mut start = selected;
    let mut used = widths[selected] + 1;
    while start > 0 && used + widths[start - 1] + 1 <= width {
        start -= 1;
        used += widths[start] + 1;
    }
    let mut end = selected + 1;
    while end < widths.len() && used + widths[end] + 1 <= width {
        used += widths[end] + 1;
        end += 1;
    }
    (start, end)
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
