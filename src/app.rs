//! Interactive calendar state and input handling. Every change of start date,
//! note or filter reloads the notes and rebuilds the whole view.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{Days, Local, Months, NaiveDate};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use log::{error, info, warn};
use ratatui::layout::Rect;
use tui_textarea::{CursorMove, Input, Key, TextArea};

use crate::config::{Config, save_config};
use crate::export::{ExportFormat, ExportLayout, default_file_name, export_document};
use crate::notes::{NoteMap, NoteStore};
use crate::schedule::check_start_date;
use crate::view::{DayCell, ViewSummary, build_view};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Grid,
    NoteEditor,
    Filter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PickerTarget {
    StartDate,
    NoteDate,
}

pub struct App {
    store: Box<dyn NoteStore>,
    config: Config,
    config_path: Option<PathBuf>,
    notes: NoteMap,

    pub start_date: NaiveDate,
    pub note_date: NaiveDate,
    pub filter: String,
    pub textarea: TextArea<'static>,
    pub focus: Focus,

    // Current view
    pub cells: Vec<DayCell>,
    pub summary: ViewSummary,
    pub selected: usize,
    pub grid_scroll: u16,

    // Calendar picker state
    pub show_calendar: bool,
    pub picker_target: PickerTarget,
    pub calendar_cursor: NaiveDate,
    pub calendar_day_rects: Vec<(NaiveDate, Rect)>,

    // UI areas for mouse support
    pub cell_rects: Vec<(usize, Rect)>,
    pub start_btn: Rect,
    pub note_date_btn: Rect,
    pub filter_area: Rect,
    pub export_btn: Rect,
    pub note_area: Rect,

    // Popups
    pub show_validation_error: bool,
    pub validation_error_message: String,
    pub show_success_popup: bool,
    pub success_message: String,
    pub show_help_overlay: bool,

    pub export_layout: ExportLayout,
    pub last_export: Option<PathBuf>,
}

impl App {
    pub fn new(
        store: Box<dyn NoteStore>,
        config: Config,
        config_path: Option<PathBuf>,
        start_date: NaiveDate,
    ) -> Self {
        let today = Local::now().date_naive();
        let export_layout = config.export_layout;
        let mut app = Self {
            store,
            config,
            config_path,
            notes: NoteMap::new(),
            start_date,
            note_date: today,
            filter: String::new(),
            textarea: TextArea::default(),
            focus: Focus::Grid,
            cells: Vec::new(),
            summary: ViewSummary::default(),
            selected: 0,
            grid_scroll: 0,
            show_calendar: false,
            picker_target: PickerTarget::StartDate,
            calendar_cursor: start_date,
            calendar_day_rects: Vec::new(),
            cell_rects: Vec::new(),
            start_btn: Rect::default(),
            note_date_btn: Rect::default(),
            filter_area: Rect::default(),
            export_btn: Rect::default(),
            note_area: Rect::default(),
            show_validation_error: false,
            validation_error_message: String::new(),
            show_success_popup: false,
            success_message: String::new(),
            show_help_overlay: false,
            export_layout,
            last_export: None,
        };
        app.refresh();
        app.load_note_into_editor();
        app
    }

    /// Reload notes and rebuild the view from scratch.
    pub fn refresh(&mut self) {
        match self.store.load_all() {
            Ok(notes) => {
                self.cells = build_view(self.start_date, &notes, &self.filter);
                self.summary = ViewSummary::of(&self.cells);
                self.notes = notes;
                self.selected = self.selected.min(self.cells.len().saturating_sub(1));
            }
            Err(err) => {
                error!("event=view_build status=error error={}", err);
                // Never show a note-less calendar as if it were the real one
                self.cells.clear();
                self.summary = ViewSummary::default();
                self.selected = 0;
                self.show_error(&err.to_string(), "Notes");
            }
        }
    }

    pub fn show_error(&mut self, message: &str, context: &str) {
        self.show_validation_error = true;
        self.validation_error_message = format!("{} Error: {}", context, message);
    }

    fn show_success(&mut self, message: String) {
        self.show_success_popup = true;
        self.success_message = message;
    }

    pub fn selected_cell(&self) -> Option<&DayCell> {
        self.cells.get(self.selected)
    }

    pub fn set_start_date(&mut self, date: NaiveDate) {
        if let Err(err) = check_start_date(date) {
            self.show_error(&err.to_string(), "Start date");
            return;
        }
        self.start_date = date;
        self.selected = 0;
        self.grid_scroll = 0;
        self.refresh();
        info!("event=start_date_changed date={}", date);

        self.config.start_date = Some(date);
        if let Some(path) = &self.config_path {
            if let Err(err) = save_config(path, &self.config) {
                warn!("event=config_save status=error error={:#}", err);
            }
        }
    }

    pub fn set_note_date(&mut self, date: NaiveDate) {
        self.note_date = date;
        self.load_note_into_editor();
    }

    /// Put the stored text for the note date into the editor.
    pub fn load_note_into_editor(&mut self) {
        let text = self
            .notes
            .get(&self.note_date)
            .map(|note| note.text.clone())
            .unwrap_or_default();
        let lines: Vec<String> = if text.is_empty() {
            vec![String::new()]
        } else {
            text.lines().map(|s| s.to_string()).collect()
        };
        self.textarea = TextArea::new(lines);
        let end_row = self.textarea.lines().len().saturating_sub(1) as u16;
        let end_col = self.textarea.lines().last().map(|l| l.chars().count()).unwrap_or(0) as u16;
        self.textarea.move_cursor(CursorMove::Jump(end_row, end_col));
    }

    pub fn editor_text(&self) -> String {
        self.textarea.lines().join("\n")
    }

    pub fn save_note(&mut self) {
        let text = self.editor_text();
        match self.store.save(self.note_date, &text) {
            Ok(()) => {
                let verb = if text.trim().is_empty() { "cleared" } else { "saved" };
                self.show_success(format!("Note {} for {}", verb, self.note_date.format("%Y-%m-%d")));
                self.focus = Focus::Grid;
                self.refresh();
            }
            Err(err) => {
                // The editor keeps the unsaved text so it can be retried by hand
                error!("event=note_save status=error date={} error={}", self.note_date, err);
                self.show_error(&err.to_string(), "Save");
            }
        }
    }

    pub fn edit_selected(&mut self) {
        if let Some(date) = self.selected_cell().map(|cell| cell.date) {
            self.set_note_date(date);
            self.focus = Focus::NoteEditor;
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.cells.is_empty() {
            return;
        }
        let last = self.cells.len() as isize - 1;
        self.selected = (self.selected as isize + delta).clamp(0, last) as usize;
    }

    /// Move to the closest day in the nearest occupied grid row above or below.
    /// A filtered view leaves gaps, so empty rows are skipped.
    pub fn move_row(&mut self, down: bool) {
        let Some(current) = self.selected_cell().map(DayCell::grid_position) else {
            return;
        };
        let target_row = self
            .cells
            .iter()
            .map(|cell| cell.grid_position().row)
            .filter(|&row| if down { row > current.row } else { row < current.row })
            .min_by_key(|&row| row.abs_diff(current.row));
        let Some(target_row) = target_row else {
            return;
        };
        if let Some((idx, _)) = self
            .cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.grid_position().row == target_row)
            .min_by_key(|(_, cell)| cell.grid_position().col.abs_diff(current.col))
        {
            self.selected = idx;
        }
    }

    pub fn select_date(&mut self, date: NaiveDate) -> bool {
        match self.cells.iter().position(|cell| cell.date == date) {
            Some(idx) => {
                self.selected = idx;
                true
            }
            None => false,
        }
    }

    pub fn push_filter(&mut self, c: char) {
        self.filter.push(c);
        self.selected = 0;
        self.refresh();
    }

    pub fn pop_filter(&mut self) {
        if self.filter.pop().is_some() {
            self.selected = 0;
            self.refresh();
        }
    }

    pub fn clear_filter(&mut self) {
        if !self.filter.is_empty() {
            self.filter.clear();
            self.selected = 0;
            self.refresh();
        }
    }

    pub fn toggle_layout(&mut self) {
        self.export_layout = match self.export_layout {
            ExportLayout::Grid => ExportLayout::Timeline,
            ExportLayout::Timeline => ExportLayout::Grid,
        };
    }

    pub fn export(&mut self) {
        let path = self
            .config
            .export_dir
            .join(default_file_name(self.start_date, ExportFormat::Svg));
        match export_document(
            &self.cells,
            self.start_date,
            self.export_layout,
            ExportFormat::Svg,
            &path,
        ) {
            Ok(()) => {
                self.show_success(format!(
                    "Calendar exported to {}\n\nPress o to open it",
                    path.display()
                ));
                self.last_export = Some(path);
            }
            Err(err) => {
                error!("event=export status=error error={}", err);
                self.show_error(&err.to_string(), "Export");
            }
        }
    }

    pub fn open_last_export(&mut self) {
        let Some(path) = self.last_export.clone() else {
            self.show_error("nothing has been exported yet (press e)", "Open");
            return;
        };
        if let Err(err) = open::that(&path) {
            self.show_error(&format!("{}: {}", path.display(), err), "Open");
        }
    }

    pub fn open_picker(&mut self, target: PickerTarget) {
        self.picker_target = target;
        self.calendar_cursor = match target {
            PickerTarget::StartDate => self.start_date,
            PickerTarget::NoteDate => self.note_date,
        };
        self.show_calendar = true;
    }

    pub fn picker_choose(&mut self, date: NaiveDate) {
        self.show_calendar = false;
        match self.picker_target {
            PickerTarget::StartDate => self.set_start_date(date),
            PickerTarget::NoteDate => {
                self.set_note_date(date);
                self.select_date(date);
                self.focus = Focus::NoteEditor;
            }
        }
    }
}

pub fn handle_key(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Ok(true);
    }

    if app.show_validation_error || app.show_success_popup {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter) {
            app.show_validation_error = false;
            app.show_success_popup = false;
        } else if app.show_success_popup && key.code == KeyCode::Char('o') {
            app.show_success_popup = false;
            app.open_last_export();
        }
        return Ok(false);
    }

    if app.show_help_overlay {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('?')) {
            app.show_help_overlay = false;
        }
        return Ok(false);
    }

    // Calendar picker navigation
    if app.show_calendar {
        let cursor = app.calendar_cursor;
        match key.code {
            KeyCode::Esc => app.show_calendar = false,
            KeyCode::Enter => app.picker_choose(cursor),
            KeyCode::Left => app.calendar_cursor = cursor.checked_sub_days(Days::new(1)).unwrap_or(cursor),
            KeyCode::Right => app.calendar_cursor = cursor.checked_add_days(Days::new(1)).unwrap_or(cursor),
            KeyCode::Up => app.calendar_cursor = cursor.checked_sub_days(Days::new(7)).unwrap_or(cursor),
            KeyCode::Down => app.calendar_cursor = cursor.checked_add_days(Days::new(7)).unwrap_or(cursor),
            KeyCode::PageUp => app.calendar_cursor = cursor.checked_sub_months(Months::new(1)).unwrap_or(cursor),
            KeyCode::PageDown => app.calendar_cursor = cursor.checked_add_months(Months::new(1)).unwrap_or(cursor),
            KeyCode::Char('t') => app.calendar_cursor = Local::now().date_naive(),
            _ => {}
        }
        return Ok(false);
    }

    match app.focus {
        Focus::NoteEditor => {
            if key.code == KeyCode::Char('s') && key.modifiers.contains(KeyModifiers::CONTROL) {
                app.save_note();
                return Ok(false);
            }
            if key.code == KeyCode::Esc {
                // Unsaved edits are dropped
                app.load_note_into_editor();
                app.focus = Focus::Grid;
                return Ok(false);
            }
            let input = Input {
                key: match key.code {
                    KeyCode::Char(c) => Key::Char(c),
                    KeyCode::Enter => Key::Enter,
                    KeyCode::Backspace => Key::Backspace,
                    KeyCode::Delete => Key::Delete,
                    KeyCode::Left => Key::Left,
                    KeyCode::Right => Key::Right,
                    KeyCode::Up => Key::Up,
                    KeyCode::Down => Key::Down,
                    KeyCode::Tab => Key::Tab,
                    KeyCode::Home => Key::Home,
                    KeyCode::End => Key::End,
                    KeyCode::PageUp => Key::PageUp,
                    KeyCode::PageDown => Key::PageDown,
                    KeyCode::F(n) => Key::F(n),
                    _ => Key::Null,
                },
                ctrl: key.modifiers.contains(KeyModifiers::CONTROL),
                alt: key.modifiers.contains(KeyModifiers::ALT),
            };
            app.textarea.input(input);
            return Ok(false);
        }
        Focus::Filter => {
            match key.code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Tab => app.focus = Focus::Grid,
                KeyCode::Backspace => app.pop_filter(),
                KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    app.clear_filter()
                }
                KeyCode::Char(c) => app.push_filter(c),
                _ => {}
            }
            return Ok(false);
        }
        Focus::Grid => {}
    }

    match key.code {
        KeyCode::Char('q') => return Ok(true),
        KeyCode::Left | KeyCode::Char('h') => app.move_selection(-1),
        KeyCode::Right | KeyCode::Char('l') => app.move_selection(1),
        KeyCode::Up | KeyCode::Char('k') => app.move_row(false),
        KeyCode::Down | KeyCode::Char('j') => app.move_row(true),
        KeyCode::Home => app.selected = 0,
        KeyCode::End => app.selected = app.cells.len().saturating_sub(1),
        KeyCode::Enter | KeyCode::Char('n') => app.edit_selected(),
        KeyCode::Char('s') => app.open_picker(PickerTarget::StartDate),
        KeyCode::Char('d') => app.open_picker(PickerTarget::NoteDate),
        KeyCode::Char('/') | KeyCode::Char('f') => app.focus = Focus::Filter,
        KeyCode::Char('e') => app.export(),
        KeyCode::Char('o') => app.open_last_export(),
        KeyCode::Char('L') => app.toggle_layout(),
        KeyCode::Char('t') => {
            let today = Local::now().date_naive();
            if !app.select_date(today) {
                app.show_error("today is outside the calendar window", "Jump");
            }
        }
        KeyCode::Char('r') => app.refresh(),
        KeyCode::Char('?') => app.show_help_overlay = true,
        KeyCode::Esc => app.clear_filter(),
        _ => {}
    }

    Ok(false)
}

pub fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => handle_mouse_left(app, mouse),
        MouseEventKind::ScrollDown if !app.show_calendar => app.move_row(true),
        MouseEventKind::ScrollUp if !app.show_calendar => app.move_row(false),
        _ => {}
    }
}

fn handle_mouse_left(app: &mut App, mouse: MouseEvent) {
    if app.show_validation_error || app.show_success_popup || app.show_help_overlay {
        app.show_validation_error = false;
        app.show_success_popup = false;
        app.show_help_overlay = false;
        return;
    }

    if app.show_calendar {
        let clicked = app
            .calendar_day_rects
            .iter()
            .find(|(_, rect)| inside_rect(mouse, *rect))
            .map(|(date, _)| *date);
        if let Some(date) = clicked {
            app.picker_choose(date);
        }
        return;
    }

    if inside_rect(mouse, app.start_btn) {
        app.open_picker(PickerTarget::StartDate);
    } else if inside_rect(mouse, app.note_date_btn) {
        app.open_picker(PickerTarget::NoteDate);
    } else if inside_rect(mouse, app.filter_area) {
        app.focus = Focus::Filter;
    } else if inside_rect(mouse, app.export_btn) {
        app.export();
    } else if inside_rect(mouse, app.note_area) {
        app.focus = Focus::NoteEditor;
    } else if let Some(idx) = find_clicked_item(mouse, &app.cell_rects) {
        app.selected = idx;
        app.edit_selected();
    }
}

fn inside_rect(mouse: MouseEvent, rect: Rect) -> bool {
    mouse.column >= rect.x
        && mouse.column < rect.x.saturating_add(rect.width)
        && mouse.row >= rect.y
        && mouse.row < rect.y.saturating_add(rect.height)
}

fn find_clicked_item(mouse: MouseEvent, items: &[(usize, Rect)]) -> Option<usize> {
    items
        .iter()
        .find(|(_, rect)| inside_rect(mouse, *rect))
        .map(|(idx, _)| *idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::CsvNoteStore;
    use crossterm::event::{KeyEventKind, KeyEventState};
    use std::fs;
    use tempfile::TempDir;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 13).unwrap()
    }

    fn app_in(dir: &TempDir) -> App {
        let config = Config {
            notes_file: dir.path().join("notes.csv"),
            start_date: Some(start()),
            export_dir: dir.path().join("exports"),
            export_layout: ExportLayout::Grid,
            log_level: "info".to_string(),
        };
        let store = CsvNoteStore::new(config.notes_file.clone());
        App::new(Box::new(store), config, None, start())
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent {
            code: KeyCode::Char(c),
            modifiers: KeyModifiers::CONTROL,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_key(app, key(KeyCode::Char(c))).unwrap();
        }
    }

    #[test]
    fn starts_with_full_window() {
        let dir = TempDir::new().unwrap();
        let app = app_in(&dir);
        assert_eq!(app.cells.len(), 120);
        assert_eq!(app.summary.treatment_days, 13);
        assert!(!app.show_validation_error);
    }

    #[test]
    fn note_saved_from_editor_shows_up_in_view() {
        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);

        handle_key(&mut app, key(KeyCode::Right)).unwrap();
        handle_key(&mut app, key(KeyCode::Enter)).unwrap();
        assert_eq!(app.focus, Focus::NoteEditor);
        assert_eq!(app.note_date, start() + Days::new(1));

        type_text(&mut app, "Felt tired");
        handle_key(&mut app, ctrl('s')).unwrap();

        assert!(app.show_success_popup);
        assert_eq!(app.focus, Focus::Grid);
        assert_eq!(app.summary.noted_days, 1);
        assert_eq!(
            app.cells[1].note.as_ref().map(|n| n.text.as_str()),
            Some("Felt tired")
        );
    }

    #[test]
    fn filter_input_narrows_view() {
        let dir = TempDir::new().unwrap();
        let store = CsvNoteStore::new(dir.path().join("notes.csv"));
        store.save(start() + Days::new(5), "Felt tired").unwrap();
        let mut app = app_in(&dir);

        handle_key(&mut app, key(KeyCode::Char('/'))).unwrap();
        type_text(&mut app, "TIRED");
        assert_eq!(app.cells.len(), 1);
        assert_eq!(app.cells[0].index, 5);

        handle_key(&mut app, key(KeyCode::Enter)).unwrap();
        handle_key(&mut app, key(KeyCode::Esc)).unwrap();
        assert!(app.filter.is_empty());
        assert_eq!(app.cells.len(), 120);
    }

    #[test]
    fn escape_discards_unsaved_edit() {
        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);

        handle_key(&mut app, key(KeyCode::Enter)).unwrap();
        type_text(&mut app, "draft");
        handle_key(&mut app, key(KeyCode::Esc)).unwrap();

        assert_eq!(app.editor_text(), "");
        assert_eq!(app.summary.noted_days, 0);
    }

    #[test]
    fn corrupt_notes_file_blocks_view() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.csv"), "Date,Note\nyesterday,hello\n").unwrap();
        let app = app_in(&dir);

        assert!(app.cells.is_empty());
        assert!(app.show_validation_error);
        assert!(app.validation_error_message.starts_with("Notes Error"));
    }

    #[test]
    fn picker_changes_start_date() {
        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);

        handle_key(&mut app, key(KeyCode::Char('s'))).unwrap();
        assert!(app.show_calendar);
        handle_key(&mut app, key(KeyCode::Down)).unwrap();
        handle_key(&mut app, key(KeyCode::Enter)).unwrap();

        assert!(!app.show_calendar);
        assert_eq!(app.start_date, start() + Days::new(7));
        assert_eq!(app.cells[0].date, start() + Days::new(7));
        assert!(app.cells[0].is_treatment_day());
    }

    #[test]
    fn export_writes_svg_into_export_dir() {
        let dir = TempDir::new().unwrap();
        let mut app = app_in(&dir);

        handle_key(&mut app, key(KeyCode::Char('e'))).unwrap();
        let path = app.last_export.clone().unwrap();
        assert!(path.starts_with(dir.path().join("exports")));
        assert!(fs::read_to_string(path).unwrap().contains("<circle"));
    }

    #[test]
    fn up_and_down_follow_grid_rows_in_filtered_view() {
        let dir = TempDir::new().unwrap();
        let store = CsvNoteStore::new(dir.path().join("notes.csv"));
        for offset in [1, 3, 12, 18, 25] {
            store.save(start() + Days::new(offset), "headache").unwrap();
        }
        let mut app = app_in(&dir);
        type_text(&mut app, "/ache");
        handle_key(&mut app, key(KeyCode::Enter)).unwrap();
        let selected_index = |app: &App| app.selected_cell().map(|cell| cell.index);
        assert_eq!(app.cells.len(), 5);

        // Index 3 sits in column 3; the closest day one row down is index 12
        app.selected = 1;
        handle_key(&mut app, key(KeyCode::Down)).unwrap();
        assert_eq!(selected_index(&app), Some(12));

        handle_key(&mut app, key(KeyCode::Right)).unwrap();
        handle_key(&mut app, key(KeyCode::Up)).unwrap();
        assert_eq!(selected_index(&app), Some(3));

        handle_key(&mut app, key(KeyCode::Down)).unwrap();
        handle_key(&mut app, key(KeyCode::Down)).unwrap();
        assert_eq!(selected_index(&app), Some(25));
        handle_key(&mut app, key(KeyCode::Down)).unwrap();
        assert_eq!(selected_index(&app), Some(25));
    }
}
