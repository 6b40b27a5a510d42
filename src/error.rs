use std::path::PathBuf;

/// Errors surfaced by the schedule, note store and exporter.
///
/// Nothing here is retried; every variant is reported to whoever triggered the
/// operation.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Could not read notes from {}: {reason}", path.display())]
    StorageRead { path: PathBuf, reason: String },

    #[error("Could not save notes to {}: {reason}", path.display())]
    StorageWrite { path: PathBuf, reason: String },

    #[error("Could not export calendar to {}: {reason}", path.display())]
    Export { path: PathBuf, reason: String },
}

impl CalendarError {
    pub fn read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::StorageRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::StorageWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
