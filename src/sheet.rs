//! Raw sheets and header assignment.
//!
//! A [`Sheet`] retains the grid exactly as read so its header row can be
//! reassigned any number of times without reloading the source file.

use anyhow::{Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    header::{self, MAX_CANDIDATE_ROWS},
    table::Table,
};

/// Rectangular rows of raw cells.
pub type Grid = Vec<Vec<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderChoice {
    /// Use the row found by header detection at load time.
    Detected,
    /// Use an explicit 0-based grid row.
    Row(usize),
}

impl HeaderChoice {
    /// Parses a 1-based row number; `0` or `auto` selects detection.
    pub fn parse(value: &str) -> Result<Self, String> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return Ok(HeaderChoice::Detected);
        }
        let number: usize = trimmed
            .parse()
            .map_err(|_| format!("Header row must be a row number or 'auto', got '{value}'"))?;
        Ok(match number {
            0 => HeaderChoice::Detected,
            n => HeaderChoice::Row(n - 1),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    grid: Grid,
    detected_header_row: usize,
    header_choice: HeaderChoice,
    data: Table,
}

impl Sheet {
    /// Pads the grid to a rectangle, runs detection, and derives the table
    /// from the detected row.
    pub fn new(name: impl Into<String>, grid: Grid) -> Self {
        let name = name.into();
        let grid = rectangular(grid);
        let detected_header_row = header::detect_header(&grid);
        debug!(
            "Sheet '{}': detected header row {} of {}",
            name,
            detected_header_row + 1,
            grid.len()
        );
        let data = assign_header(&grid, detected_header_row);
        Self {
            name,
            grid,
            detected_header_row,
            header_choice: HeaderChoice::Detected,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn detected_header_row(&self) -> usize {
        self.detected_header_row
    }

    pub fn header_choice(&self) -> HeaderChoice {
        self.header_choice
    }

    /// Grid row currently used as the header.
    pub fn header_row(&self) -> usize {
        match self.header_choice {
            HeaderChoice::Detected => self.detected_header_row,
            HeaderChoice::Row(row) => row,
        }
    }

    pub fn data(&self) -> &Table {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Table {
        &mut self.data
    }

    /// Rows a user may pick as an explicit header.
    pub fn header_candidates(&self) -> std::ops::Range<usize> {
        0..self.grid.len().min(MAX_CANDIDATE_ROWS)
    }

    /// Re-derives `data` from the retained grid. The detected row is never
    /// overwritten, so [`HeaderChoice::Detected`] always restores it.
    ///
    /// An explicit row must exist in the grid, so an empty sheet only
    /// accepts [`HeaderChoice::Detected`].
    pub fn set_header(&mut self, choice: HeaderChoice) -> Result<()> {
        let row = match choice {
            HeaderChoice::Detected => self.detected_header_row,
            HeaderChoice::Row(row) if row >= self.grid.len() => bail!(
                "Header row {} is outside sheet '{}' ({} row(s))",
                row + 1,
                self.name,
                self.grid.len()
            ),
            HeaderChoice::Row(row) => row,
        };
        self.data = assign_header(&self.grid, row);
        self.header_choice = choice;
        debug!("Sheet '{}': header set to row {}", self.name, row + 1);
        Ok(())
    }
}

/// Promotes `row` to column names and keeps only the rows after it.
///
/// Missing header cells become `Unnamed: {column}`. A row index past the end
/// of the grid yields an empty table.
pub fn assign_header(grid: &[Vec<Value>], row: usize) -> Table {
    let Some(header) = grid.get(row) else {
        return Table::default();
    };
    let columns = header
        .iter()
        .enumerate()
        .map(|(idx, value)| header_name(idx, value))
        .collect();
    let rows = grid[row + 1..].to_vec();
    Table::new(columns, rows)
}

pub fn header_name(idx: usize, value: &Value) -> String {
    match value {
        Value::Missing => format!("Unnamed: {idx}"),
        other => other.as_display(),
    }
}

fn rectangular(mut grid: Grid) -> Grid {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut grid {
        row.resize(width, Value::Missing);
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        vec![
            vec![Value::text("Inventory export"), Value::Missing],
            vec![Value::text("Code"), Value::text("Description")],
            vec![Value::Integer(10), Value::text("bolt")],
            vec![Value::Integer(11), Value::text("nut")],
        ]
    }

    #[test]
    fn assign_header_drops_rows_up_to_header() {
        let table = assign_header(&grid(), 1);
        assert_eq!(table.columns(), ["Code", "Description"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows()[0][0], Value::Integer(10));
    }

    #[test]
    fn assign_header_coerces_missing_and_numeric_names() {
        let table = assign_header(&grid(), 0);
        assert_eq!(table.columns(), ["Inventory export", "Unnamed: 1"]);
        let numeric = assign_header(&grid(), 2);
        assert_eq!(numeric.columns(), ["10", "bolt"]);
    }

    #[test]
    fn assign_header_is_idempotent() {
        assert_eq!(assign_header(&grid(), 1), assign_header(&grid(), 1));
    }

    #[test]
    fn set_header_can_return_to_detection() {
        let mut sheet = Sheet::new("parts", grid());
        let detected = sheet.data().clone();
        sheet.set_header(HeaderChoice::Row(0)).unwrap();
        assert_eq!(sheet.header_row(), 0);
        assert_ne!(sheet.data(), &detected);
        sheet.set_header(HeaderChoice::Detected).unwrap();
        assert_eq!(sheet.data(), &detected);
    }

    #[test]
    fn set_header_rejects_rows_past_the_end() {
        let mut sheet = Sheet::new("parts", grid());
        assert!(sheet.set_header(HeaderChoice::Row(9)).is_err());
        assert_eq!(sheet.header_choice(), HeaderChoice::Detected);
    }

    #[test]
    fn empty_sheet_rejects_explicit_rows() {
        let mut sheet = Sheet::new("empty", Vec::new());
        let err = sheet.set_header(HeaderChoice::Row(0)).unwrap_err();
        assert!(err.to_string().contains("outside sheet 'empty'"));
        assert_eq!(sheet.header_choice(), HeaderChoice::Detected);
        assert!(sheet.set_header(HeaderChoice::Detected).is_ok());
        assert_eq!(sheet.header_row(), 0);
    }

    #[test]
    fn ragged_grids_are_padded() {
        let sheet = Sheet::new(
            "ragged",
            vec![vec![Value::text("a")], vec![Value::text("id"), Value::text("name")]],
        );
        assert!(sheet.grid().iter().all(|row| row.len() == 2));
    }

    #[test]
    fn empty_sheet_has_no_columns() {
        let sheet = Sheet::new("empty", Vec::new());
        assert_eq!(sheet.detected_header_row(), 0);
        assert_eq!(sheet.data().column_count(), 0);
        assert!(sheet.header_candidates().is_empty());
    }

    #[test]
    fn header_choice_parses_one_based_rows() {
        assert_eq!(HeaderChoice::parse("auto"), Ok(HeaderChoice::Detected));
        assert_eq!(HeaderChoice::parse("0"), Ok(HeaderChoice::Detected));
        assert_eq!(HeaderChoice::parse("3"), Ok(HeaderChoice::Row(2)));
        assert!(HeaderChoice::parse("x").is_err());
    }
}
