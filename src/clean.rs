//! Row cleaning for loaded tables: drop incomplete rows, then duplicates.

use std::collections::HashSet;

use itertools::Itertools;
use log::info;

use crate::{data::Value, table::Table};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub incomplete_rows: usize,
    pub duplicate_rows: usize,
}

impl CleanReport {
    pub fn removed(&self) -> usize {
        self.incomplete_rows + self.duplicate_rows
    }
}

/// Removes rows holding any missing cell, then exact duplicate rows,
/// keeping the first occurrence of each.
pub fn clean_table(table: &mut Table) -> CleanReport {
    let before = table.row_count();
    table.retain_rows(|row| !row.iter().any(|cell| cell.is_missing()));
    let complete = table.row_count();

    let mut seen = HashSet::new();
    table.retain_rows(|row| seen.insert(row_key(row)));

    let report = CleanReport {
        incomplete_rows: before - complete,
        duplicate_rows: complete - table.row_count(),
    };
    info!(
        "Cleaned table: removed {} incomplete and {} duplicate row(s), {} remain",
        report.incomplete_rows,
        report.duplicate_rows,
        table.row_count()
    );
    report
}

// Kind-qualified so that text "1" and integer 1 stay distinct rows.
fn row_key(row: &[Value]) -> String {
    row.iter()
        .map(|cell| format!("{:?}:{}", cell.kind(), cell.as_display()))
        .join("\u{1f}")
}
