use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{settings::SaveFormat, sheet::HeaderChoice};

#[derive(Debug, Parser)]
#[command(author, version, about = "Multi-table VLOOKUP over spreadsheet exports", long_about = None)]
pub struct Cli {
    /// Settings file (YAML); created on first write
    #[arg(long, global = true, default_value = crate::settings::DEFAULT_SETTINGS_FILE)]
    pub settings: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Score candidate header rows and report the detected one
    Detect(DetectArgs),
    /// Preview a sheet using its detected or chosen header row
    Preview(PreviewArgs),
    /// Left-join lookup tables into a main table on key columns
    Join(JoinArgs),
    /// Drop incomplete and duplicate rows from a sheet
    Clean(CleanArgs),
    /// Show or clear the recent-file list
    Recent(RecentArgs),
}

#[derive(Debug, Args)]
pub struct InputOptions {
    /// Field delimiter (supports ',', 'tab', ';', '|'); defaults by extension
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Input file to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of leading rows to score
    #[arg(long, default_value_t = crate::header::MAX_CANDIDATE_ROWS)]
    pub rows: usize,
    /// Emit the score report as JSON
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub input_options: InputOptions,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Input file to preview
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Header row (1-based), or 'auto' for detection
    #[arg(long = "header-row", value_parser = HeaderChoice::parse, default_value = "auto")]
    pub header_row: HeaderChoice,
    /// Number of rows to display (defaults to the settings value)
    #[arg(long)]
    pub rows: Option<usize>,
    #[command(flatten)]
    pub input_options: InputOptions,
}

#[derive(Debug, Args)]
pub struct JoinArgs {
    /// Main table file
    #[arg(long = "main")]
    pub main: PathBuf,
    /// Key column in the main table
    #[arg(short = 'k', long = "key")]
    pub key: String,
    /// Lookup table as `FILE` or `FILE=KEY`; repeat in join order
    #[arg(short = 'l', long = "lookup", required = true, action = clap::ArgAction::Append, value_parser = parse_lookup)]
    pub lookups: Vec<LookupArg>,
    /// Columns to return, comma-separated or repeated
    #[arg(short = 'r', long = "return", required = true, value_delimiter = ',', action = clap::ArgAction::Append)]
    pub returns: Vec<String>,
    /// Header override as `FILE=ROW` (1-based row or 'auto')
    #[arg(long = "header", action = clap::ArgAction::Append, value_parser = parse_header_override)]
    pub headers: Vec<HeaderOverride>,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Output format when the output path has no extension
    #[arg(long, value_enum)]
    pub format: Option<SaveFormat>,
    /// Character encoding for the output (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Render the result as a text table instead of delimited output
    #[arg(long)]
    pub table: bool,
    #[command(flatten)]
    pub input_options: InputOptions,
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Input file to clean
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Header row (1-based), or 'auto' for detection
    #[arg(long = "header-row", value_parser = HeaderChoice::parse, default_value = "auto")]
    pub header_row: HeaderChoice,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Character encoding for the output (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    #[command(flatten)]
    pub input_options: InputOptions,
}

#[derive(Debug, Args)]
pub struct RecentArgs {
    /// Clear the recent-file list
    #[arg(long)]
    pub clear: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupArg {
    pub path: PathBuf,
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderOverride {
    pub path: PathBuf,
    pub choice: HeaderChoice,
}

pub fn parse_lookup(value: &str) -> Result<LookupArg, String> {
    let (path, key) = match value.rsplit_once('=') {
        Some((path, key)) => (path.trim(), Some(key.trim())),
        None => (value.trim(), None),
    };
    if path.is_empty() {
        return Err("Lookup path cannot be empty".to_string());
    }
    Ok(LookupArg {
        path: PathBuf::from(path),
        key: key.filter(|k| !k.is_empty()).map(str::to_string),
    })
}

pub fn parse_header_override(value: &str) -> Result<HeaderOverride, String> {
    let (path, row) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("Header override must look like FILE=ROW, got '{value}'"))?;
    if path.trim().is_empty() {
        return Err("Header override path cannot be empty".to_string());
    }
    Ok(HeaderOverride {
        path: PathBuf::from(path.trim()),
        choice: HeaderChoice::parse(row)?,
    })
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
