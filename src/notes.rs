//! Day notes, keyed by calendar date and persisted as a small CSV file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024; // 50 MB max for the notes file
const HEADER: [&str; 2] = ["Date", "Note"];
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub date: NaiveDate,
    pub text: String,
}

pub type NoteMap = BTreeMap<NaiveDate, Note>;

/// Storage for day notes. At most one note exists per date.
pub trait NoteStore {
    /// All stored notes. A store with nothing persisted yet returns an empty map.
    fn load_all(&self) -> Result<NoteMap, CalendarError>;

    /// Insert or replace the note for `date`. Blank text removes the note.
    fn save(&self, date: NaiveDate, text: &str) -> Result<(), CalendarError>;
}

#[derive(Deserialize)]
struct NoteRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Note")]
    note: String,
}

/// Notes kept in a `Date,Note` CSV file.
///
/// Every save reads the file, replaces the row for the date and rewrites the
/// whole file. There is no locking: two processes saving at the same time
/// race and the last writer wins.
#[derive(Debug, Clone)]
pub struct CsvNoteStore {
    path: PathBuf,
}

impl CsvNoteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_all(&self, notes: &NoteMap) -> Result<(), CalendarError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| CalendarError::write(&self.path, e))?;
            }
        }

        let mut tmp_name = self
            .path
            .file_name()
            .ok_or_else(|| CalendarError::write(&self.path, "path has no file name"))?
            .to_os_string();
        tmp_name.push(".tmp");
        let temp_path = self.path.with_file_name(tmp_name);

        let mut writer = csv::Writer::from_path(&temp_path)
            .map_err(|e| CalendarError::write(&self.path, e))?;
        writer
            .write_record(HEADER)
            .map_err(|e| CalendarError::write(&self.path, e))?;
        for note in notes.values() {
            let date = note.date.format(DATE_FORMAT).to_string();
            writer
                .write_record([date.as_str(), note.text.as_str()])
                .map_err(|e| CalendarError::write(&self.path, e))?;
        }
        writer.flush().map_err(|e| CalendarError::write(&self.path, e))?;
        drop(writer);

        // Write to temporary file first, then rename over the real one
        fs::rename(&temp_path, &self.path).map_err(|e| CalendarError::write(&self.path, e))?;
        Ok(())
    }
}

impl NoteStore for CsvNoteStore {
    fn load_all(&self) -> Result<NoteMap, CalendarError> {
        if !self.path.exists() {
            debug!("event=notes_load status=missing path={}", self.path.display());
            return Ok(NoteMap::new());
        }

        let metadata = fs::metadata(&self.path).map_err(|e| CalendarError::read(&self.path, e))?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(CalendarError::read(
                &self.path,
                "file exceeds maximum size limit",
            ));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| CalendarError::read(&self.path, e))?;

        let mut notes = NoteMap::new();
        for (line, result) in reader.deserialize::<NoteRow>().enumerate() {
            let row = result.map_err(|e| CalendarError::read(&self.path, e))?;
            let date = parse_note_date(&row.date).ok_or_else(|| {
                CalendarError::read(
                    &self.path,
                    format!("row {}: '{}' is not a date", line + 1, row.date),
                )
            })?;
            if row.note.trim().is_empty() {
                continue;
            }
            if notes.contains_key(&date) {
                warn!("event=notes_load duplicate_date={} keep=last", date);
            }
            notes.insert(date, Note { date, text: row.note });
        }

        debug!(
            "event=notes_load status=ok count={} path={}",
            notes.len(),
            self.path.display()
        );
        Ok(notes)
    }

    fn save(&self, date: NaiveDate, text: &str) -> Result<(), CalendarError> {
        let mut notes = self.load_all()?;
        notes.remove(&date);
        if text.trim().is_empty() {
            info!("event=note_cleared date={}", date);
        } else {
            notes.insert(
                date,
                Note {
                    date,
                    text: text.to_string(),
                },
            );
            info!("event=note_saved date={} chars={}", date, text.chars().count());
        }
        self.write_all(&notes)
    }
}

/// Dates are written as `YYYY-MM-DD`; older files may carry a midnight time.
fn parse_note_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store_in(dir: &TempDir) -> CsvNoteStore {
        CsvNoteStore::new(dir.path().join("daily_notes.csv"))
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn saving_twice_keeps_last_text() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let day = date(2025, 7, 20);

        store.save(day, "a").unwrap();
        store.save(day, "b").unwrap();

        let notes = store.load_all().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[&day].text, "b");

        let raw = fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.lines().filter(|l| l.starts_with("2025-07-20")).count(), 1);
    }

    #[test]
    fn file_has_header_and_sorted_rows() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(date(2025, 8, 2), "later").unwrap();
        store.save(date(2025, 7, 14), "earlier").unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "Date,Note\n2025-07-14,earlier\n2025-08-02,later\n");
    }

    #[test]
    fn delimiters_and_newlines_survive() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let day = date(2025, 7, 15);
        let text = "nausea, mild\nsaid \"ok\" to fluids";

        store.save(day, text).unwrap();
        assert_eq!(store.load_all().unwrap()[&day].text, text);
    }

    #[test]
    fn blank_text_clears_note() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let day = date(2025, 7, 15);

        store.save(day, "headache").unwrap();
        store.save(day, "   ").unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn reads_legacy_timestamps_and_skips_empty_notes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            "Date,Note\n2025-07-13 00:00:00,first dose went fine\n2025-07-14,\n2025-07-15,ok\n2025-07-15,tired\n",
        )
        .unwrap();

        let notes = store.load_all().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[&date(2025, 7, 13)].text, "first dose went fine");
        assert_eq!(notes[&date(2025, 7, 15)].text, "tired");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        fs::write(store.path(), "Date,Note\nnot-a-date,hello\n").unwrap();
        assert!(matches!(store.load_all(), Err(CalendarError::StorageRead { .. })));

        fs::write(store.path(), "Day,Text\n2025-07-13,hello\n").unwrap();
        assert!(matches!(store.load_all(), Err(CalendarError::StorageRead { .. })));

        fs::write(store.path(), "Date,Note\n2025-07-13,a,b\n").unwrap();
        assert!(matches!(store.load_all(), Err(CalendarError::StorageRead { .. })));
    }

    #[test]
    fn save_over_corrupt_file_does_not_clobber_it() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "Date,Note\nnot-a-date,hello\n").unwrap();

        assert!(store.save(date(2025, 7, 13), "x").is_err());
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("not-a-date"));
    }

    #[test]
    fn unwritable_location_is_a_write_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "a file, not a directory").unwrap();
        let store = CsvNoteStore::new(blocker.join("notes.csv"));

        let err = store.save(date(2025, 7, 13), "x").unwrap_err();
        assert!(matches!(err, CalendarError::StorageWrite { .. }));
    }

    #[test]
    fn creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = CsvNoteStore::new(dir.path().join("nested").join("notes.csv"));
        store.save(date(2025, 7, 13), "x").unwrap();
        assert_eq!(store.load_all().unwrap().len(), 1);
    }
}
