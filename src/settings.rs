//! Persistent user settings stored as YAML.
//!
//! A missing file yields defaults. The file is rewritten whenever the
//! recent-file list changes.

use std::{
    fmt,
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::ValueEnum;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::io_utils::{DEFAULT_CSV_DELIMITER, DEFAULT_TSV_DELIMITER};

pub const DEFAULT_SETTINGS_FILE: &str = "multi-lookup.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum SaveFormat {
    #[default]
    Csv,
    Tsv,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Csv => "csv",
            SaveFormat::Tsv => "tsv",
        }
    }

    pub fn delimiter(&self) -> u8 {
        match self {
            SaveFormat::Csv => DEFAULT_CSV_DELIMITER,
            SaveFormat::Tsv => DEFAULT_TSV_DELIMITER,
        }
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentFile {
    pub path: PathBuf,
    pub opened_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub default_save_format: SaveFormat,
    pub max_recent_files: usize,
    pub preview_rows: usize,
    pub recent_files: Vec<RecentFile>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_save_format: SaveFormat::Csv,
            max_recent_files: 5,
            preview_rows: 10,
            recent_files: Vec::new(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path).with_context(|| format!("Opening settings file {path:?}"))?;
        let reader = BufReader::new(file);
        let settings: Settings =
            serde_yaml::from_reader(reader).context("Parsing settings YAML")?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Creating settings file {path:?}"))?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self).context("Writing settings YAML")
    }

    /// Parsed `log_level`, or `None` when the value is not a known level.
    pub fn level_filter(&self) -> Option<LevelFilter> {
        self.log_level.trim().parse().ok()
    }

    /// Moves `path` to the front of the recent list, dropping duplicates and
    /// entries past `max_recent_files`.
    pub fn record_recent(&mut self, path: &Path) {
        self.recent_files.retain(|entry| entry.path != path);
        self.recent_files.insert(
            0,
            RecentFile {
                path: path.to_path_buf(),
                opened_at: Local::now(),
            },
        );
        self.recent_files.truncate(self.max_recent_files);
    }

    /// Drops entries whose files no longer exist. Returns how many were dropped.
    pub fn prune_missing(&mut self) -> usize {
        let before = self.recent_files.len();
        self.recent_files.retain(|entry| entry.path.exists());
        before - self.recent_files.len()
    }

    pub fn clear_recent(&mut self) {
        self.recent_files.clear();
    }

    /// Appends the default extension when `path` has none.
    pub fn output_path(&self, path: &Path) -> PathBuf {
        if path.extension().is_some() {
            path.to_path_buf()
        } else {
            path.with_extension(self.default_save_format.extension())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_fills_defaults() {
        let settings: Settings = serde_yaml::from_str("default_save_format: tsv\n").unwrap();
        assert_eq!(settings.default_save_format, SaveFormat::Tsv);
        assert_eq!(settings.max_recent_files, 5);
        assert_eq!(settings.preview_rows, 10);
    }

    #[test]
    fn record_recent_moves_to_front_and_truncates() {
        let mut settings = Settings {
            max_recent_files: 2,
            ..Settings::default()
        };
        settings.record_recent(Path::new("a.csv"));
        settings.record_recent(Path::new("b.csv"));
        settings.record_recent(Path::new("a.csv"));
        settings.record_recent(Path::new("c.csv"));
        let paths = settings
            .recent_files
            .iter()
            .map(|r| r.path.clone())
            .collect::<Vec<_>>();
        assert_eq!(paths, vec![PathBuf::from("c.csv"), PathBuf::from("a.csv")]);
    }

    #[test]
    fn output_path_appends_default_extension() {
        let settings = Settings {
            default_save_format: SaveFormat::Tsv,
            ..Settings::default()
        };
        assert_eq!(settings.output_path(Path::new("out")), PathBuf::from("out.tsv"));
        assert_eq!(
            settings.output_path(Path::new("out.csv")),
            PathBuf::from("out.csv")
        );
    }

    #[test]
    fn level_filter_parses_case_insensitively() {
        let settings = Settings {
            log_level: "DEBUG".into(),
            ..Settings::default()
        };
        assert_eq!(settings.level_filter(), Some(LevelFilter::Debug));
        let bogus = Settings {
            log_level: "loud".into(),
            ..Settings::default()
        };
        assert_eq!(bogus.level_filter(), None);
    }
}
