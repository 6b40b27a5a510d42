//! Terminal drawing of the calendar grid, side panels and popups.

use chrono::{Datelike, Local, Months, NaiveDate};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap},
};

use crate::app::{App, Focus, PickerTarget};
use crate::schedule::{Phase, generate_schedule};
use crate::view::{GRID_COLUMNS, MarkerColor, WINDOW_DAYS};

const CELL_HEIGHT: u16 = 3;

pub fn draw(frame: &mut ratatui::Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(1),
        ])
        .split(frame.size());

    draw_controls(frame, app, chunks[0]);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(chunks[1]);
    draw_grid(frame, app, main[0]);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(10)])
        .split(main[1]);
    draw_day_details(frame, app, side[0]);
    draw_note_editor(frame, app, side[1]);

    draw_status_bar(frame, app, chunks[2]);

    if app.show_calendar {
        draw_calendar_picker(frame, app);
    }
    if app.show_help_overlay {
        draw_help_overlay(frame);
    }
    if app.show_validation_error {
        draw_message_popup(frame, "[!] Error", Color::Red, &app.validation_error_message);
    }
    if app.show_success_popup {
        draw_message_popup(frame, "[OK] Done", Color::Green, &app.success_message);
    }
}

fn marker_color(color: MarkerColor) -> Color {
    match color {
        MarkerColor::Blue => Color::Rgb(31, 119, 180),
        MarkerColor::Green => Color::Rgb(44, 160, 44),
        MarkerColor::Orange => Color::Rgb(255, 127, 14),
        MarkerColor::Purple => Color::Rgb(148, 103, 189),
        MarkerColor::Gray => Color::Rgb(128, 128, 128),
        MarkerColor::Red => Color::Red,
        MarkerColor::LightGray => Color::Rgb(211, 211, 211),
    }
}

/// Get centered popup area for overlays
fn get_popup_area(frame_width: u16, frame_height: u16, width_percent: u16, height_percent: u16) -> Rect {
    let width = frame_width.saturating_mul(width_percent) / 100;
    let height = frame_height.saturating_mul(height_percent) / 100;
    let x = (frame_width.saturating_sub(width)) / 2;
    let y = (frame_height.saturating_sub(height)) / 2;
    Rect { x, y, width, height }
}

fn draw_controls(frame: &mut ratatui::Frame, app: &mut App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(22),
            Constraint::Percentage(22),
            Constraint::Percentage(38),
            Constraint::Percentage(18),
        ])
        .split(area);

    let start_btn = Paragraph::new(format!("First dose {}", app.start_date.format("%Y-%m-%d")))
        .block(Block::default().borders(Borders::ALL).title("s"))
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    app.start_btn = chunks[0];
    frame.render_widget(start_btn, chunks[0]);

    let note_btn = Paragraph::new(format!("Note day {}", app.note_date.format("%Y-%m-%d")))
        .block(Block::default().borders(Borders::ALL).title("d"))
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Cyan));
    app.note_date_btn = chunks[1];
    frame.render_widget(note_btn, chunks[1]);

    let filter_focused = app.focus == Focus::Filter;
    let filter_text = if filter_focused {
        format!("{}|", app.filter)
    } else if app.filter.is_empty() {
        "(all days)".to_string()
    } else {
        app.filter.clone()
    };
    let filter_style = if filter_focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::Gray)
    };
    let filter = Paragraph::new(filter_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Filter notes by keyword (/)"),
        )
        .style(filter_style);
    app.filter_area = chunks[2];
    frame.render_widget(filter, chunks[2]);

    let export_btn = Paragraph::new(format!("Export {:?}", app.export_layout))
        .block(Block::default().borders(Borders::ALL).title("e"))
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Green));
    app.export_btn = chunks[3];
    frame.render_widget(export_btn, chunks[3]);
}

fn draw_grid(frame: &mut ratatui::Frame, app: &mut App, area: Rect) {
    app.cell_rects.clear();

    let block = Block::default()
        .title(format!(
            "Treatment calendar v{} - {} days from {}",
            env!("CARGO_PKG_VERSION"),
            WINDOW_DAYS,
            app.start_date.format("%a %d %b %Y")
        ))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.cells.is_empty() {
        let message = if app.filter.is_empty() {
            "Calendar unavailable - see the error message"
        } else {
            "No notes match the filter (Esc to clear)"
        };
        let para = Paragraph::new(message)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray).italic());
        frame.render_widget(para, inner);
        return;
    }

    let cell_width = (inner.width / GRID_COLUMNS as u16).clamp(3, 9);
    let visible_rows = (inner.height / CELL_HEIGHT).max(1);

    // Keep the selected row on screen
    let selected_row = app.selected_cell().map(|cell| cell.grid_position().row as u16);
    if let Some(row) = selected_row {
        if row < app.grid_scroll {
            app.grid_scroll = row;
        } else if row >= app.grid_scroll + visible_rows {
            app.grid_scroll = row + 1 - visible_rows;
        }
    }

    let mut rendered = Vec::new();
    for (idx, cell) in app.cells.iter().enumerate() {
        let pos = cell.grid_position();
        let row = pos.row as u16;
        if row < app.grid_scroll || row >= app.grid_scroll + visible_rows {
            continue;
        }
        let rect = Rect {
            x: inner.x + pos.col as u16 * cell_width,
            y: inner.y + (row - app.grid_scroll) * CELL_HEIGHT,
            width: cell_width.saturating_sub(1),
            height: CELL_HEIGHT - 1,
        };
        if rect.x + rect.width > inner.x + inner.width {
            continue;
        }

        let color = marker_color(cell.color());
        let (lines, mut style) = match cell.label() {
            Some(label) => {
                let lines: Vec<Line> = label.lines().map(|l| Line::from(l.to_string())).collect();
                (
                    lines,
                    Style::default().fg(Color::Black).bg(color).add_modifier(Modifier::BOLD),
                )
            }
            None => {
                let dot = if cell.has_note() { "●" } else { "·" };
                (
                    vec![
                        Line::from(Span::styled(dot, Style::default().fg(color))),
                        Line::from(Span::styled(
                            cell.date.format("%d").to_string(),
                            Style::default().fg(Color::DarkGray),
                        )),
                    ],
                    Style::default(),
                )
            }
        };
        if cell.highlighted {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        if idx == app.selected {
            style = style.add_modifier(Modifier::REVERSED);
        }

        rendered.push((idx, rect));
        let para = Paragraph::new(lines).alignment(Alignment::Center).style(style);
        frame.render_widget(para, rect);
    }
    app.cell_rects = rendered;
}

fn draw_day_details(frame: &mut ratatui::Frame, app: &App, area: Rect) {
    let Some(cell) = app.selected_cell() else {
        let para = Paragraph::new("")
            .block(Block::default().title("Day").borders(Borders::ALL));
        frame.render_widget(para, area);
        return;
    };

    let mut lines = Vec::new();
    if let Some(day) = &cell.treatment {
        lines.push(Line::from(Span::styled(
            format!("{} dose", day.phase.name()),
            Style::default()
                .fg(marker_color(cell.color()))
                .add_modifier(Modifier::BOLD),
        )));
    }
    for text in cell.tooltip().lines() {
        lines.push(Line::from(text.to_string()));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Enter: write a note for this day",
        Style::default().fg(Color::DarkGray),
    )));

    let para = Paragraph::new(lines)
        .block(
            Block::default()
                .title(format!("Day {} of {}", cell.index + 1, WINDOW_DAYS))
                .borders(Borders::ALL),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(para, area);
}

fn draw_note_editor(frame: &mut ratatui::Frame, app: &mut App, area: Rect) {
    app.note_area = area;
    if app.focus == Focus::NoteEditor {
        let title = format!(
            "Note for {} (Ctrl+S to save, Esc to cancel)",
            app.note_date.format("%Y-%m-%d")
        );
        render_textarea_editor(frame, app, area, &title);
        return;
    }

    let text = app.editor_text();
    let (content, style) = if text.is_empty() {
        (
            "(Select a day and press Enter to write a note)".to_string(),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        (text, Style::default())
    };
    let para = Paragraph::new(content)
        .block(
            Block::default()
                .title(format!("Note for {}", app.note_date.format("%Y-%m-%d")))
                .borders(Borders::ALL),
        )
        .wrap(Wrap { trim: false })
        .style(style);
    frame.render_widget(para, area);
}

fn textarea_lines_with_cursor(app: &App, height: u16) -> Vec<Line<'static>> {
    let (cursor_row, cursor_col) = app.textarea.cursor();
    let text_lines = app.textarea.lines();

    if text_lines.is_empty() {
        return vec![Line::from("|")];
    }

    let mut lines = Vec::new();
    for (idx, line) in text_lines.iter().enumerate() {
        if idx == cursor_row {
            let char_col = cursor_col.min(line.chars().count());
            let mut new_line = String::new();
            for (i, c) in line.chars().enumerate() {
                if i == char_col {
                    new_line.push('|');
                }
                new_line.push(c);
            }
            if char_col == line.chars().count() {
                new_line.push('|');
            }
            lines.push(Line::from(Span::styled(
                new_line,
                Style::default().fg(Color::Yellow).bg(Color::Rgb(30, 30, 40)),
            )));
        } else {
            lines.push(Line::from(line.clone()));
        }
    }
    let view_height = height.max(1) as usize;
    if lines.len() > view_height {
        let start = cursor_row.saturating_sub(view_height.saturating_sub(1));
        let end = (start + view_height).min(lines.len());
        lines[start..end].to_vec()
    } else {
        lines
    }
}

fn render_textarea_editor(frame: &mut ratatui::Frame, app: &App, area: Rect, title: &str) {
    let inner_height = area.height.saturating_sub(2); // account for borders
    let lines_display = textarea_lines_with_cursor(app, inner_height);
    let panel = Paragraph::new(lines_display)
        .block(Block::default().title(title).borders(Borders::ALL))
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(Color::Yellow));
    frame.render_widget(panel, area);
}

fn draw_status_bar(frame: &mut ratatui::Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(
            format!(" {} days ", app.summary.days),
            Style::default().fg(Color::Black).bg(Color::Gray),
        ),
        Span::raw(format!(
            "  {} dose days  {} notes",
            app.summary.treatment_days, app.summary.noted_days
        )),
    ];
    if !app.filter.is_empty() {
        spans.push(Span::styled(
            format!("  filter: \"{}\"", app.filter),
            Style::default().fg(Color::Yellow),
        ));
    }
    spans.push(Span::styled(
        "   ?: help  q: quit",
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Centered message box with a title, dismissed with Esc.
fn draw_message_popup(frame: &mut ratatui::Frame, title: &str, color: Color, message: &str) {
    let size = frame.size();
    let area = get_popup_area(size.width, size.height, 60, 32);

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .style(Style::default().fg(color).bg(Color::Black));
    let inner = block.inner(area);
    frame.render_widget(Clear, area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(2), Constraint::Length(1)])
        .split(inner);
    frame.render_widget(
        Paragraph::new(message)
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new("Press Esc to dismiss")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray).italic()),
        chunks[1],
    );
}

const HELP_LINES: &[(&str, &str)] = &[
    ("Arrows / hjkl", "move between days"),
    ("Enter / n", "write a note for the selected day"),
    ("Ctrl+S", "save the note (empty text removes it)"),
    ("s", "pick the first dose date"),
    ("d", "pick any date to annotate"),
    ("/ or f", "filter days by note keyword"),
    ("Esc", "clear the filter"),
    ("t", "jump to today"),
    ("e", "export the calendar as SVG"),
    ("L", "switch export layout (grid / timeline)"),
    ("o", "open the last export"),
    ("r", "reload notes from disk"),
    ("q / Ctrl+C", "quit"),
];

fn draw_help_overlay(frame: &mut ratatui::Frame) {
    let size = frame.size();
    let area = get_popup_area(size.width, size.height, 60, 60);

    let block = Block::default()
        .title("Help (Esc to close)")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .style(Style::default().fg(Color::Cyan).bg(Color::Black));
    let inner = block.inner(area);
    frame.render_widget(Clear, area);
    frame.render_widget(block, area);

    let mut lines: Vec<Line> = HELP_LINES
        .iter()
        .map(|(keys, action)| {
            Line::from(vec![
                Span::styled(format!("{:<16}", keys), Style::default().fg(Color::Yellow)),
                Span::styled(*action, Style::default().fg(Color::White)),
            ])
        })
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from("Dose days:"));
    for name in Phase::ALL.map(Phase::name) {
        lines.push(Line::from(vec![
            Span::styled(
                "    ",
                Style::default().bg(marker_color(MarkerColor::for_phase_name(name))),
            ),
            Span::raw(format!(" {}", name)),
        ]));
    }

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
}

fn draw_calendar_picker(frame: &mut ratatui::Frame, app: &mut App) {
    let size = frame.size();
    let width = 50.min(size.width.saturating_sub(4));
    let height = 20.min(size.height.saturating_sub(4));
    let x = size.x + (size.width.saturating_sub(width)) / 2;
    let y = size.y + (size.height.saturating_sub(height)) / 2;
    let area = Rect { x, y, width, height };

    frame.render_widget(Clear, area);

    let title = match app.picker_target {
        PickerTarget::StartDate => "Date of the first dose (Esc to cancel)",
        PickerTarget::NoteDate => "Date to annotate (Esc to cancel)",
    };
    let outer_block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::Cyan).bg(Color::Black));
    frame.render_widget(outer_block, area);

    let inner_area = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    };

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(10)])
        .split(inner_area);

    let header_text = vec![
        Line::from(vec![
            Span::styled("◄ ", Style::default().fg(Color::Cyan)),
            Span::styled(
                app.calendar_cursor.format("%B %Y").to_string(),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            ),
            Span::styled(" ►", Style::default().fg(Color::Cyan)),
        ]),
        Line::from(Span::styled(
            "←/→: day  ↑/↓: week  PgUp/PgDn: month  Enter: select",
            Style::default().fg(Color::Gray),
        )),
    ];
    frame.render_widget(Paragraph::new(header_text).alignment(Alignment::Center), layout[0]);

    draw_calendar_grid(frame, app, layout[1]);
}

fn draw_calendar_grid(frame: &mut ratatui::Frame, app: &mut App, area: Rect) {
    app.calendar_day_rects.clear();

    let cursor = app.calendar_cursor;
    let Some(first_day) = NaiveDate::from_ymd_opt(cursor.year(), cursor.month(), 1) else {
        return;
    };
    let days_in_month = first_day
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(30);
    let weekday_offset = first_day.weekday().num_days_from_monday() as usize;

    let dose_days: Vec<NaiveDate> = generate_schedule(app.start_date)
        .into_iter()
        .map(|day| day.date)
        .collect();
    let today = Local::now().date_naive();

    let mut lines = Vec::new();
    lines.push(Line::from(
        ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let color = if i >= 5 { Color::Yellow } else { Color::Cyan };
                Span::styled(format!(" {} ", name), Style::default().fg(color))
            })
            .collect::<Vec<_>>(),
    ));
    lines.push(Line::from(""));

    let mut day: u32 = 1;
    let total_cells = weekday_offset + days_in_month as usize;
    let rows = total_cells.div_ceil(7);

    for week in 0..rows {
        let mut week_spans = Vec::new();
        for day_of_week in 0..7 {
            let cell_idx = week * 7 + day_of_week;
            if cell_idx < weekday_offset || day > days_in_month {
                week_spans.push(Span::raw("    "));
                continue;
            }
            let Some(date) = NaiveDate::from_ymd_opt(cursor.year(), cursor.month(), day) else {
                break;
            };

            let mut style = if date == today {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else if dose_days.contains(&date) {
                Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)
            } else if day_of_week >= 5 {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };
            if date == cursor {
                style = style.add_modifier(Modifier::REVERSED);
            }

            // Track clickable area for this day
            let day_rect = Rect {
                x: area.x + (day_of_week * 4) as u16,
                y: area.y + 2 + week as u16,
                width: 4,
                height: 1,
            };
            app.calendar_day_rects.push((date, day_rect));

            week_spans.push(Span::styled(format!(" {:2} ", day), style));
            day += 1;
        }
        lines.push(Line::from(week_spans));
    }

    let calendar_widget = Paragraph::new(lines).alignment(Alignment::Left);
    frame.render_widget(calendar_widget, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::config::Config;
    use crate::notes::{CsvNoteStore, NoteStore};
    use chrono::Days;
    use ratatui::{Terminal, backend::TestBackend};
    use tempfile::TempDir;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 13).unwrap()
    }

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer.get(x, y).symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn grid_cells_are_clickable_and_positioned_by_index() {
        let dir = TempDir::new().unwrap();
        let store = CsvNoteStore::new(dir.path().join("notes.csv"));
        store.save(start() + Days::new(23), "dizzy").unwrap();
        let mut app = App::new(Box::new(store), Config::default(), None, start());

        let mut terminal = Terminal::new(TestBackend::new(140, 50)).unwrap();
        terminal.draw(|frame| draw(frame, &mut app)).unwrap();

        assert!(!app.cell_rects.is_empty());
        let first = app.cell_rects[0].1;
        let (_, day23) = app.cell_rects.iter().find(|(idx, _)| *idx == 23).unwrap();
        assert_eq!(day23.y - first.y, 2 * CELL_HEIGHT);
        assert_eq!(day23.x - first.x, 3 * (first.width + 1));

        let text = buffer_text(&terminal);
        assert!(text.contains("First dose 2025-07-13"));
        assert!(text.contains("Jul"));
    }

    #[test]
    fn picker_lists_days_of_cursor_month() {
        let dir = TempDir::new().unwrap();
        let store = CsvNoteStore::new(dir.path().join("notes.csv"));
        let mut app = App::new(Box::new(store), Config::default(), None, start());
        app.open_picker(PickerTarget::StartDate);

        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal.draw(|frame| draw(frame, &mut app)).unwrap();

        assert_eq!(app.calendar_day_rects.len(), 31);
        assert_eq!(app.calendar_day_rects[12].0, start());
        assert!(buffer_text(&terminal).contains("July 2025"));
    }

    #[test]
    fn message_popups_share_one_frame() {
        let dir = TempDir::new().unwrap();
        let store = CsvNoteStore::new(dir.path().join("notes.csv"));
        let mut app = App::new(Box::new(store), Config::default(), None, start());
        let mut terminal = Terminal::new(TestBackend::new(120, 40)).unwrap();

        app.show_error("bad date", "Input");
        terminal.draw(|frame| draw(frame, &mut app)).unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("[!] Error"));
        assert!(text.contains("Input Error: bad date"));
        assert!(text.contains("Press Esc to dismiss"));

        app.show_validation_error = false;
        app.show_success_popup = true;
        app.success_message = "Exported".to_string();
        terminal.draw(|frame| draw(frame, &mut app)).unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("[OK] Done"));
        assert!(text.contains("Exported"));
    }

    #[test]
    fn whitespace_filter_is_shown_as_typed() {
        let dir = TempDir::new().unwrap();
        let store = CsvNoteStore::new(dir.path().join("notes.csv"));
        store.save(start() + Days::new(4), "slept well").unwrap();
        let mut app = App::new(Box::new(store), Config::default(), None, start());
        app.push_filter(' ');

        let mut terminal = Terminal::new(TestBackend::new(140, 50)).unwrap();
        terminal.draw(|frame| draw(frame, &mut app)).unwrap();

        assert_eq!(app.cells.len(), 1);
        assert!(buffer_text(&terminal).contains("filter: \" \""));
    }
}
