//! Static document export of a calendar view: a single-page SVG in grid or
//! timeline layout, or the raw day cells as JSON.

use std::fs;
use std::io;
use std::path::Path;

use chrono::NaiveDate;
use log::info;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;
use crate::view::{DayCell, GRID_COLUMNS, Marker, WINDOW_DAYS};

const SVG_NS: &str = "http://www.w3.org/2000/svg";
const MARGIN: f64 = 60.0;
const TITLE_HEIGHT: f64 = 40.0;
// Pixels per scene unit in the grid layout (column spacing 1.5, row spacing 7.5)
const GRID_SCALE_X: f64 = 80.0;
const GRID_SCALE_Y: f64 = 16.0;
const TIMELINE_STEP: f64 = 30.0;
const TIMELINE_LARGE_MARKER: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExportLayout {
    /// Ten days per row
    #[default]
    Grid,
    /// All days on one horizontal line
    Timeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    #[default]
    Svg,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Svg => "svg",
            ExportFormat::Json => "json",
        }
    }
}

/// Flattened cell with every derived field, as written to JSON.
#[derive(Debug, Serialize)]
struct CellRecord<'a> {
    index: usize,
    date: NaiveDate,
    col: usize,
    row: usize,
    treatment: bool,
    phase: Option<&'static str>,
    dose: Option<&'a str>,
    note: Option<&'a str>,
    marker: Marker,
    color: &'static str,
    label: Option<String>,
    tooltip: String,
    highlighted: bool,
}

impl<'a> From<&'a DayCell> for CellRecord<'a> {
    fn from(cell: &'a DayCell) -> Self {
        let pos = cell.grid_position();
        Self {
            index: cell.index,
            date: cell.date,
            col: pos.col,
            row: pos.row,
            treatment: cell.is_treatment_day(),
            phase: cell.treatment.as_ref().map(|t| t.phase.name()),
            dose: cell.treatment.as_ref().map(|t| t.dose.as_str()),
            note: cell.note.as_ref().map(|n| n.text.as_str()),
            marker: cell.marker(),
            color: cell.color().hex(),
            label: cell.label(),
            tooltip: cell.tooltip(),
            highlighted: cell.highlighted,
        }
    }
}

pub fn render_json(cells: &[DayCell]) -> Result<String, serde_json::Error> {
    let records: Vec<CellRecord> = cells.iter().map(CellRecord::from).collect();
    serde_json::to_string_pretty(&records)
}

/// Render the cells as a standalone SVG page.
///
/// Cells keep their window position, so a filtered view leaves gaps where
/// the dropped days would be.
pub fn render_svg(cells: &[DayCell], layout: ExportLayout, start: NaiveDate) -> io::Result<String> {
    let (width, height) = match layout {
        ExportLayout::Grid => {
            let rows = WINDOW_DAYS.div_ceil(GRID_COLUMNS);
            (
                MARGIN * 2.0 + (GRID_COLUMNS - 1) as f64 * 1.5 * GRID_SCALE_X,
                MARGIN * 2.0 + TITLE_HEIGHT + (rows - 1) as f64 * 7.5 * GRID_SCALE_Y,
            )
        }
        ExportLayout::Timeline => (
            MARGIN * 2.0 + (WINDOW_DAYS - 1) as f64 * TIMELINE_STEP,
            MARGIN * 2.0 + TITLE_HEIGHT + TIMELINE_LARGE_MARKER,
        ),
    };

    let mut writer = Writer::new(Vec::new());
    let view_box = format!("0 0 {width} {height}");
    writer.write_event(Event::Start(element(
        "svg",
        &[
            ("xmlns", SVG_NS.to_string()),
            ("width", width.to_string()),
            ("height", height.to_string()),
            ("viewBox", view_box),
        ],
    )))?;
    writer.write_event(Event::Empty(element(
        "rect",
        &[
            ("width", "100%".to_string()),
            ("height", "100%".to_string()),
            ("fill", "white".to_string()),
        ],
    )))?;
    let title = format!("Treatment calendar from {}", start.format("%d %b %Y"));
    write_text_element(
        &mut writer,
        element(
            "text",
            &[
                ("x", MARGIN.to_string()),
                ("y", (MARGIN / 2.0 + 10.0).to_string()),
                ("font-family", "sans-serif".to_string()),
                ("font-size", "22".to_string()),
                ("font-weight", "bold".to_string()),
            ],
        ),
        &title,
    )?;

    for cell in cells {
        let (x, y, radius, font_size) = match layout {
            ExportLayout::Grid => {
                let (sx, sy) = cell.grid_position().scene();
                let radius = cell.marker().size() as f64 / 2.0;
                (
                    MARGIN + sx * GRID_SCALE_X,
                    MARGIN + TITLE_HEIGHT + sy * GRID_SCALE_Y,
                    radius,
                    22.0,
                )
            }
            ExportLayout::Timeline => {
                let radius = match cell.marker() {
                    Marker::Large => TIMELINE_LARGE_MARKER / 2.0,
                    Marker::Small => cell.marker().size() as f64 / 2.0,
                };
                (
                    MARGIN + cell.index as f64 * TIMELINE_STEP,
                    MARGIN + TITLE_HEIGHT + TIMELINE_LARGE_MARKER / 2.0,
                    radius,
                    10.0,
                )
            }
        };

        writer.write_event(Event::Start(BytesStart::new("g")))?;
        write_text_element(&mut writer, BytesStart::new("title"), &cell.tooltip())?;

        let mut circle = vec![
            ("cx", x.to_string()),
            ("cy", y.to_string()),
            ("r", radius.to_string()),
            ("fill", cell.color().hex().to_string()),
        ];
        if cell.highlighted {
            circle.push(("stroke", "black".to_string()));
            circle.push(("stroke-width", "2".to_string()));
        }
        writer.write_event(Event::Empty(element("circle", &circle)))?;

        if let Some(label) = cell.label() {
            let mut lines = label.lines();
            let day = lines.next().unwrap_or_default();
            let month = lines.next().unwrap_or_default();
            writer.write_event(Event::Start(element(
                "text",
                &[
                    ("x", x.to_string()),
                    ("y", y.to_string()),
                    ("font-family", "sans-serif".to_string()),
                    ("font-size", font_size.to_string()),
                    ("text-anchor", "middle".to_string()),
                    ("fill", "black".to_string()),
                ],
            )))?;
            for (text, dy) in [(day, "-0.1em"), (month, "1.1em")] {
                write_text_element(
                    &mut writer,
                    element("tspan", &[("x", x.to_string()), ("dy", dy.to_string())]),
                    text,
                )?;
            }
            writer.write_event(Event::End(BytesEnd::new("text")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("g")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("svg")))?;

    let mut svg = String::from_utf8(writer.into_inner())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    svg.push('\n');
    Ok(svg)
}

fn element<'a>(name: &'a str, attributes: &[(&str, String)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for (key, value) in attributes {
        start.push_attribute((*key, value.as_str()));
    }
    start
}

/// `<name ...>text</name>`, with the text escaped by the writer.
fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    text: &str,
) -> io::Result<()> {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(end))
}

/// Write the view to `path` in the requested format.
pub fn export_document(
    cells: &[DayCell],
    start: NaiveDate,
    layout: ExportLayout,
    format: ExportFormat,
    path: &Path,
) -> Result<(), CalendarError> {
    let export_err = |reason: String| CalendarError::Export {
        path: path.to_path_buf(),
        reason,
    };

    let body = match format {
        ExportFormat::Svg => {
            render_svg(cells, layout, start).map_err(|e| export_err(e.to_string()))?
        }
        ExportFormat::Json => render_json(cells).map_err(|e| export_err(e.to_string()))?,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| export_err(e.to_string()))?;
        }
    }
    fs::write(path, body).map_err(|e| export_err(e.to_string()))?;

    info!(
        "event=calendar_exported format={} layout={:?} cells={} path={}",
        format.extension(),
        layout,
        cells.len(),
        path.display()
    );
    Ok(())
}

/// Default file name for an export, e.g. `treatment_calendar_2025-07-13.svg`.
pub fn default_file_name(start: NaiveDate, format: ExportFormat) -> String {
    format!("treatment_calendar_{}.{}", start.format("%Y-%m-%d"), format.extension())
}
