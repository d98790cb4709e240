//! Header-row detection for raw spreadsheet grids.
//!
//! Each of the first [`MAX_CANDIDATE_ROWS`] rows is scored by how much it
//! looks like a row of column labels: short, textual, complete, distinct,
//! and free of symbols. The first row with the highest score wins.
//!
//! Scoring never fails. Cells that contribute nothing useful (missing values,
//! empty strings, zero-width rows) fall back to neutral contributions.

use std::collections::HashSet;

use serde::Serialize;

use crate::data::{Value, ValueKind};

pub const MAX_CANDIDATE_ROWS: usize = 10;

/// Row returned for a grid with no rows.
pub const EMPTY_GRID_HEADER_ROW: usize = 0;

const HEADER_KEYWORDS: &[&str] = &[
    "id",
    "name",
    "date",
    "time",
    "value",
    "code",
    "type",
    "category",
    "description",
];

const FIRST_ROW_BONUS: f64 = 2.0;
const SECOND_ROW_BONUS: f64 = 1.5;
const TEXT_WEIGHT: f64 = 2.0;
const KEYWORD_BONUS: f64 = 2.0;
const NUMERIC_ROW_PENALTY: f64 = 1.0;
const COMPLETE_ROW_BONUS: f64 = 0.5;
const DISTINCT_ROW_BONUS: f64 = 0.5;

/// Individual contributions to one row's score. Penalties are stored as
/// positive magnitudes and subtracted in [`HeaderSignals::total`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeaderSignals {
    pub position: f64,
    pub text_ratio: f64,
    pub non_missing_ratio: f64,
    pub type_consistency: f64,
    pub length_consistency: f64,
    pub brevity: f64,
    pub special_chars: f64,
    pub keyword: f64,
    pub numeric_row: f64,
    pub complete: f64,
    pub distinct: f64,
}

impl HeaderSignals {
    pub fn total(&self) -> f64 {
        self.position
            + self.text_ratio
            + self.non_missing_ratio
            + self.type_consistency
            + self.length_consistency
            + self.brevity
            - self.special_chars
            + self.keyword
            - self.numeric_row
            + self.complete
            + self.distinct
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowScore {
    pub row: usize,
    pub score: f64,
    pub signals: HeaderSignals,
}

/// Index of the row most likely to hold column headers.
///
/// Returns [`EMPTY_GRID_HEADER_ROW`] when the grid has no rows.
pub fn detect_header(grid: &[Vec<Value>]) -> usize {
    detect_header_within(grid, MAX_CANDIDATE_ROWS)
}

pub fn detect_header_within(grid: &[Vec<Value>], max_rows: usize) -> usize {
    best_row(&score_rows(grid, max_rows)).unwrap_or(EMPTY_GRID_HEADER_ROW)
}

/// First row holding the maximum score. Later rows only win on a strictly
/// greater score.
pub fn best_row(scores: &[RowScore]) -> Option<usize> {
    let mut best: Option<&RowScore> = None;
    for candidate in scores {
        match best {
            Some(current) if candidate.score <= current.score => {}
            _ => best = Some(candidate),
        }
    }
    best.map(|score| score.row)
}

pub fn score_rows(grid: &[Vec<Value>], max_rows: usize) -> Vec<RowScore> {
    grid.iter()
        .take(max_rows)
        .enumerate()
        .map(|(row, cells)| {
            let signals = row_signals(row, cells);
            RowScore {
                row,
                score: signals.total(),
                signals,
            }
        })
        .collect()
}

pub fn row_signals(index: usize, row: &[Value]) -> HeaderSignals {
    let position = match index {
        0 => FIRST_ROW_BONUS,
        1 => SECOND_ROW_BONUS,
        _ => 0.0,
    };
    if row.is_empty() {
        return HeaderSignals {
            position,
            ..HeaderSignals::default()
        };
    }

    let width = row.len() as f64;
    let text_cells = row.iter().filter(|v| v.is_text()).count() as f64;
    let missing_cells = row.iter().filter(|v| v.is_missing()).count();
    let kinds = row.iter().map(Value::kind).collect::<HashSet<ValueKind>>();

    let lengths = row
        .iter()
        .map(|v| v.as_display().chars().count() as f64)
        .collect::<Vec<_>>();
    let mean = lengths.iter().sum::<f64>() / width;
    let spread = if mean > 0.0 {
        sample_std_dev(&lengths, mean) / mean
    } else {
        0.0
    };

    let special_chars = row.iter().map(special_char_ratio).sum::<f64>() / width;

    HeaderSignals {
        position,
        text_ratio: text_cells / width * TEXT_WEIGHT,
        non_missing_ratio: 1.0 - missing_cells as f64 / width,
        type_consistency: 1.0 - kinds.len() as f64 / width,
        length_consistency: 1.0 - spread,
        brevity: 1.0 / (mean + 1.0),
        special_chars,
        keyword: if has_keyword(row) { KEYWORD_BONUS } else { 0.0 },
        numeric_row: if is_numeric_row(row) {
            NUMERIC_ROW_PENALTY
        } else {
            0.0
        },
        complete: if missing_cells == 0 {
            COMPLETE_ROW_BONUS
        } else {
            0.0
        },
        distinct: if distinct_count(row) == row.len() {
            DISTINCT_ROW_BONUS
        } else {
            0.0
        },
    }
}

// Sample (n - 1) deviation; a single cell has no spread.
fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

fn special_char_ratio(value: &Value) -> f64 {
    if value.is_missing() {
        return 0.0;
    }
    let text = value.as_display();
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let special = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    special as f64 / total as f64
}

fn has_keyword(row: &[Value]) -> bool {
    row.iter().any(|value| {
        let lowered = value.as_display().to_lowercase();
        HEADER_KEYWORDS.iter().any(|word| lowered.contains(word))
    })
}

/// A row reads as numeric when every present cell is an integer or real.
fn is_numeric_row(row: &[Value]) -> bool {
    row.iter().any(Value::is_numeric)
        && row.iter().all(|v| v.is_numeric() || v.is_missing())
}

// Missing cells never count as distinct values.
fn distinct_count(row: &[Value]) -> usize {
    row.iter()
        .filter(|v| !v.is_missing())
        .map(Value::as_display)
        .collect::<HashSet<_>>()
        .len()
}
