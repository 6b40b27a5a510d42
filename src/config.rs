//! User settings, stored as pretty JSON next to the other per-user config.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::export::ExportLayout;

const APP_DIR: &str = "dose-calendar";
const NOTES_FILE: &str = "daily_notes.csv";

pub fn get_data_dir() -> Result<PathBuf> {
    if let Some(data_home) = dirs::data_dir() {
        Ok(data_home.join(APP_DIR))
    } else {
        Err(anyhow::anyhow!("Could not determine data directory"))
    }
}

/// Rotated log files live under the data directory, whatever notes file is in use.
pub fn get_log_dir() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("logs"))
}

pub fn get_config_path() -> Result<PathBuf> {
    if let Some(config_home) = dirs::config_dir() {
        Ok(config_home.join(APP_DIR).join("config.json"))
    } else {
        Err(anyhow::anyhow!("Could not determine config directory"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub notes_file: PathBuf,
    /// Date of the first dose; today when unset.
    pub start_date: Option<NaiveDate>,
    pub export_dir: PathBuf,
    pub export_layout: ExportLayout,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = get_data_dir().unwrap_or_else(|_| PathBuf::from("."));
        let export_dir = dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            notes_file: data_dir.join(NOTES_FILE),
            start_date: None,
            export_dir,
            export_layout: ExportLayout::Grid,
            log_level: "info".to_string(),
        }
    }
}

/// Read the config at `path`, writing the defaults out when none exists yet.
/// Failing to write them is an error, so the caller can log it and carry on
/// with `Config::default()`.
pub fn load_config(path: &Path) -> Result<Config> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .with_context(|| format!("config file {} is not valid", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let config = Config::default();
            save_config(path, &config)
                .with_context(|| format!("could not write default config to {}", path.display()))?;
            Ok(config)
        }
        Err(err) => Err(err).with_context(|| format!("could not read {}", path.display())),
    }
}

pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    Ok(())
}
