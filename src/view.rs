//! Calendar view builder.
//!
//! Merges the 120-day display window with the treatment schedule and the
//! stored notes, applies the keyword filter and derives everything a renderer
//! needs per day: marker size and colour, label, tooltip and grid position.
//! Both the terminal view and the document exporter draw from this output.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::notes::{Note, NoteMap};
use crate::schedule::{Phase, TreatmentDay, generate_schedule, schedule_for_date};

pub const WINDOW_DAYS: usize = 120;
pub const GRID_COLUMNS: usize = 10;
pub const COLUMN_SPACING: f64 = 1.5;
pub const ROW_SPACING: f64 = 7.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerColor {
    Blue,
    Green,
    Orange,
    Purple,
    Gray,
    Red,
    LightGray,
}

impl MarkerColor {
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::StepUp => MarkerColor::Blue,
            Phase::FirstFull => MarkerColor::Green,
            Phase::Weekly => MarkerColor::Orange,
            Phase::Biweekly => MarkerColor::Purple,
        }
    }

    /// Colour for a phase given by display name; unknown names are gray.
    pub fn for_phase_name(name: &str) -> Self {
        Phase::from_name(name)
            .map(MarkerColor::for_phase)
            .unwrap_or(MarkerColor::Gray)
    }

    pub fn hex(self) -> &'static str {
        match self {
            MarkerColor::Blue => "#1f77b4",
            MarkerColor::Green => "#2ca02c",
            MarkerColor::Orange => "#ff7f0e",
            MarkerColor::Purple => "#9467bd",
            MarkerColor::Gray => "#808080",
            MarkerColor::Red => "#ff0000",
            MarkerColor::LightGray => "#d3d3d3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    Large,
    Small,
}

impl Marker {
    /// Marker diameter in scene units for the grid layout.
    pub fn size(self) -> u32 {
        match self {
            Marker::Large => 90,
            Marker::Small => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridPosition {
    pub col: usize,
    pub row: usize,
}

impl GridPosition {
    pub fn for_index(index: usize) -> Self {
        Self {
            col: index % GRID_COLUMNS,
            row: index / GRID_COLUMNS,
        }
    }

    /// Scene coordinates; `y` grows downward.
    pub fn scene(self) -> (f64, f64) {
        (self.col as f64 * COLUMN_SPACING, self.row as f64 * ROW_SPACING)
    }
}

/// One day of the display window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCell {
    /// Position of the day in the full window, kept when filtering drops others.
    pub index: usize,
    pub date: NaiveDate,
    pub treatment: Option<TreatmentDay>,
    pub note: Option<Note>,
    /// The day matched a non-empty filter keyword.
    pub highlighted: bool,
}

impl DayCell {
    pub fn is_treatment_day(&self) -> bool {
        self.treatment.is_some()
    }

    pub fn has_note(&self) -> bool {
        self.note.is_some()
    }

    pub fn grid_position(&self) -> GridPosition {
        GridPosition::for_index(self.index)
    }

    pub fn marker(&self) -> Marker {
        if self.is_treatment_day() {
            Marker::Large
        } else {
            Marker::Small
        }
    }

    pub fn color(&self) -> MarkerColor {
        match (&self.treatment, &self.note) {
            (Some(day), _) => MarkerColor::for_phase(day.phase),
            (None, Some(_)) => MarkerColor::Red,
            (None, None) => MarkerColor::LightGray,
        }
    }

    /// Text drawn inside a treatment marker, e.g. `"13\nJul"`.
    pub fn label(&self) -> Option<String> {
        self.treatment
            .as_ref()
            .map(|day| day.date.format("%d\n%b").to_string())
    }

    /// Hover text: dose and checklist on dose days, the full date otherwise,
    /// followed by the note when there is one.
    pub fn tooltip(&self) -> String {
        let mut text = match &self.treatment {
            Some(day) => {
                let checklist: Vec<String> =
                    day.checklist.iter().map(|item| format!("✔ {}", item)).collect();
                format!(
                    "{}\nDose: {}\n\nChecklist:\n{}",
                    day.label,
                    day.dose,
                    checklist.join("\n")
                )
            }
            None => self.date.format("%A %d %B").to_string(),
        };
        if let Some(note) = &self.note {
            text.push_str("\nNote: ");
            text.push_str(&note.text);
        }
        text
    }
}

/// Build the render cells for the window starting at `start`.
///
/// An empty `filter_keyword` keeps all 120 days. Otherwise only days whose
/// note contains the keyword, ignoring case, are kept. Whitespace in the
/// keyword is part of the match.
pub fn build_view(start: NaiveDate, notes: &NoteMap, filter_keyword: &str) -> Vec<DayCell> {
    let schedule = generate_schedule(start);
    let keyword = filter_keyword.to_lowercase();

    (0..WINDOW_DAYS)
        .filter_map(|index| {
            let date = start + Days::new(index as u64);
            let note = notes.get(&date).cloned();

            let highlighted = if keyword.is_empty() {
                false
            } else {
                let matched = note
                    .as_ref()
                    .is_some_and(|n| n.text.to_lowercase().contains(&keyword));
                if !matched {
                    return None;
                }
                true
            };

            Some(DayCell {
                index,
                date,
                treatment: schedule_for_date(&schedule, date).cloned(),
                note,
                highlighted,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewSummary {
    pub days: usize,
    pub treatment_days: usize,
    pub noted_days: usize,
}

impl ViewSummary {
    pub fn of(cells: &[DayCell]) -> Self {
        Self {
            days: cells.len(),
            treatment_days: cells.iter().filter(|c| c.is_treatment_day()).count(),
            noted_days: cells.iter().filter(|c| c.has_note()).count(),
        }
    }
}
