//! Dose calendar: treatment schedule calendar with day notes.
//!
//! Module structure:
//! 1. schedule   - Dose dates, phases and checklists from the first dose date
//! 2. notes      - Day notes persisted in a Date,Note CSV file
//! 3. view       - 120-day window merged with schedule and notes, filtering
//! 4. export     - Single-page SVG (grid or timeline) and JSON export
//! 5. app / ui   - Terminal calendar: state, input handling, drawing
//! 6. config     - JSON settings in the user config directory
//! 7. logging    - Rotated log files in the data directory
//!
//! This file holds the command line and the terminal main loop.

mod app;
mod config;
mod error;
mod export;
mod logging;
mod notes;
mod schedule;
mod ui;
mod view;

use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::app::App;
use crate::config::{Config, get_config_path, get_log_dir, load_config};
use crate::error::CalendarError;
use crate::export::{ExportFormat, ExportLayout, default_file_name, export_document};
use crate::notes::{CsvNoteStore, NoteStore};
use crate::schedule::{Phase, check_start_date, generate_schedule, parse_day, parse_start_date};
use crate::view::build_view;

#[derive(Parser)]
#[command(author, version, about = "Treatment schedule calendar with day notes")]
struct Args {
    /// Date of the first dose (YYYY-MM-DD). Overrides config if provided.
    #[arg(short, long, global = true)]
    start: Option<String>,

    /// Notes CSV file. Overrides config if provided.
    #[arg(long, global = true)]
    notes: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace). Overrides config if provided.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the dose days
    Schedule {
        /// Only list one phase (step-up, first full, weekly, biweekly)
        #[arg(short, long)]
        phase: Option<String>,
    },
    /// Save a note for a day (empty text removes it)
    Note {
        #[arg(short, long)]
        date: String,
        #[arg(short, long)]
        text: String,
    },
    /// Write the calendar to a file
    Export {
        /// Only keep days whose note contains this keyword
        #[arg(short, long, default_value = "")]
        filter: String,
        #[arg(short, long, value_enum)]
        layout: Option<ExportLayout>,
        #[arg(long, value_enum, default_value_t = ExportFormat::Svg)]
        format: ExportFormat,
        /// Output file; defaults to the export directory from the config
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Open the exported file with the system viewer
        #[arg(long)]
        open: bool,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let config_path = get_config_path().ok();
    let mut config_warning = None;
    let mut config = match &config_path {
        Some(path) => load_config(path).unwrap_or_else(|err| {
            config_warning = Some(format!("{err:#}"));
            Config::default()
        }),
        None => Config::default(),
    };
    if let Some(notes) = args.notes {
        config.notes_file = notes;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    // Keep the handle alive so buffered log lines get flushed on exit
    let logger = get_log_dir().and_then(|dir| logging::init_logging(&config.log_level, &dir));
    let _logger = match logger {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    };
    if let Some(warning) = config_warning {
        warn!("event=config_load status=error fallback=defaults error={}", warning);
    }

    let start = resolve_start_date(args.start.as_deref(), &config)?;
    let store = CsvNoteStore::new(config.notes_file.clone());

    match args.command {
        None => run_tui(store, config, config_path, start),
        Some(Command::Schedule { phase }) => {
            let wanted = match phase.as_deref() {
                Some(name) => Some(Phase::from_name(name).ok_or_else(|| {
                    CalendarError::InvalidInput(format!("unknown phase '{}'", name))
                })?),
                None => None,
            };
            for day in generate_schedule(start)
                .into_iter()
                .filter(|day| wanted.is_none_or(|phase| day.phase == phase))
            {
                println!(
                    "{}  {:<10}  {:<8}  {}",
                    day.label,
                    day.phase.name(),
                    day.dose,
                    day.checklist.join(", ")
                );
            }
            Ok(())
        }
        Some(Command::Note { date, text }) => {
            let date = parse_day(&date)?;
            store.save(date, &text)?;
            println!("Note saved for {}", date.format("%Y-%m-%d"));
            Ok(())
        }
        Some(Command::Export {
            filter,
            layout,
            format,
            output,
            open,
        }) => {
            let notes = store.load_all()?;
            let cells = build_view(start, &notes, &filter);
            let layout = layout.unwrap_or(config.export_layout);
            let path = output
                .unwrap_or_else(|| config.export_dir.join(default_file_name(start, format)));
            export_document(&cells, start, layout, format, &path)?;
            println!("Exported {} days to {}", cells.len(), path.display());
            if open {
                open::that(&path)?;
            }
            Ok(())
        }
    }
}

/// Command line first, then the saved config, then today.
fn resolve_start_date(arg: Option<&str>, config: &Config) -> Result<NaiveDate> {
    let date = match (arg, config.start_date) {
        (Some(raw), _) => parse_start_date(raw)?,
        (None, Some(saved)) => check_start_date(saved)?,
        (None, None) => Local::now().date_naive(),
    };
    Ok(date)
}

fn run_tui(
    store: CsvNoteStore,
    config: Config,
    config_path: Option<PathBuf>,
    start: NaiveDate,
) -> Result<()> {
    info!(
        "event=tui_start start={} notes_file={}",
        start,
        store.path().display()
    );
    let mut app = App::new(Box::new(store), config, config_path, start);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, event::EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode().ok();
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        event::DisableMouseCapture
    )
    .ok();
    terminal.show_cursor().ok();

    res
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|frame| ui::draw(frame, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::from_secs(0));

        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if app::handle_key(app, key)? {
                        break;
                    }
                }
                Event::Mouse(mouse) => app::handle_mouse(app, mouse),
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }

    info!("event=tui_exit");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_date_prefers_command_line() {
        let config = Config {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            ..Config::default()
        };
        assert_eq!(
            resolve_start_date(Some("2025-07-13"), &config).unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 13).unwrap()
        );
        assert_eq!(
            resolve_start_date(None, &config).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
        assert!(resolve_start_date(Some("July 13"), &config).is_err());
    }

    #[test]
    fn cli_parses_export_flags() {
        let args = Args::try_parse_from([
            "dose-calendar",
            "export",
            "--start",
            "2025-07-13",
            "--layout",
            "timeline",
            "--format",
            "json",
            "--filter",
            "tired",
        ])
        .unwrap();
        assert_eq!(args.start.as_deref(), Some("2025-07-13"));
        match args.command {
            Some(Command::Export {
                filter,
                layout,
                format,
                ..
            }) => {
                assert_eq!(filter, "tired");
                assert_eq!(layout, Some(ExportLayout::Timeline));
                assert_eq!(format, ExportFormat::Json);
            }
            _ => panic!("expected export command"),
        }
    }
}
