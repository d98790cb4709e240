//! Sequential multi-table left join (a generalised VLOOKUP).
//!
//! A main table is left-joined against each lookup table in list order. Keys
//! are compared by their string form on both sides. Lookup columns whose names
//! collide with columns already in the result get a `_table{i}` suffix, where
//! `i` is the lookup's position. After every step all remaining gaps in the
//! accumulated result are filled with [`NO_MATCH`].
//!
//! Progress is reported as a whole percentage after each step, followed by a
//! final 100 whether the run succeeds or fails.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    io,
    sync::mpsc::{self, Receiver, Sender},
    thread::{self, JoinHandle},
};

use log::{debug, info};
use thiserror::Error;

use crate::{data::Value, table::Table};

/// Fill value for cells left empty by an unmatched lookup.
pub const NO_MATCH: &str = "N/A";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("Select at least one lookup table")]
    NoLookups,
    #[error("Select at least one return column")]
    NoOutputColumns,
    #[error("Column '{column}' not found in {table}")]
    MissingColumn { column: String, table: String },
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Lookup {
    pub table: Table,
    pub key: String,
}

impl Lookup {
    pub fn new(table: Table, key: impl Into<String>) -> Self {
        Self {
            table,
            key: key.into(),
        }
    }
}

/// Input to one join run. Tables are owned snapshots, so later header
/// changes on the source sheets cannot affect a run in flight.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub main: Table,
    pub main_key: String,
    pub lookups: Vec<Lookup>,
    pub outputs: BTreeSet<String>,
}

impl JoinSpec {
    pub fn new<I, S>(
        main: Table,
        main_key: impl Into<String>,
        lookups: Vec<Lookup>,
        outputs: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            main,
            main_key: main_key.into(),
            lookups,
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }

    /// Checks the preconditions a caller is expected to guarantee.
    pub fn validate(&self) -> Result<(), JoinError> {
        if self.lookups.is_empty() {
            return Err(JoinError::NoLookups);
        }
        if self.outputs.is_empty() {
            return Err(JoinError::NoOutputColumns);
        }
        if !self.main.has_column(&self.main_key) {
            return Err(missing_in_main(&self.main_key));
        }
        for (idx, lookup) in self.lookups.iter().enumerate() {
            if !lookup.table.has_column(&lookup.key) {
                return Err(missing_in_lookup(&lookup.key, idx));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinEvent {
    Progress(u8),
    Finished(Table),
    Failed(String),
}

/// Runs a join on the calling thread. `progress` sees one value per lookup
/// step and always a trailing 100.
pub fn run_join<F>(spec: &JoinSpec, mut progress: F) -> Result<Table, JoinError>
where
    F: FnMut(u8),
{
    let outcome = join_tables(spec, &mut progress);
    progress(100);
    outcome
}

pub fn step_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

fn join_tables<F>(spec: &JoinSpec, progress: &mut F) -> Result<Table, JoinError>
where
    F: FnMut(u8),
{
    if spec.lookups.is_empty() {
        return Err(JoinError::NoLookups);
    }
    if spec.outputs.is_empty() {
        return Err(JoinError::NoOutputColumns);
    }
    info!(
        "Joining {} lookup table(s) into {} row(s) keyed on '{}'",
        spec.lookups.len(),
        spec.main.row_count(),
        spec.main_key
    );

    let total = spec.lookups.len();
    let mut result = spec.main.clone();
    let fill = Value::text(NO_MATCH);
    for (step, lookup) in spec.lookups.iter().enumerate() {
        let main_idx = result
            .column_index(&spec.main_key)
            .ok_or_else(|| missing_in_main(&spec.main_key))?;
        let lookup_idx = lookup
            .table
            .column_index(&lookup.key)
            .ok_or_else(|| missing_in_lookup(&lookup.key, step))?;

        result.stringify_column(main_idx);
        result = left_join(&result, main_idx, &lookup.table, lookup_idx, step);
        let filled = result.fill_missing(&fill);
        debug!(
            "Lookup {} on '{}': {} row(s), {} cell(s) filled with '{}'",
            step,
            lookup.key,
            result.row_count(),
            filled,
            NO_MATCH
        );
        progress(step_percent(step + 1, total));
    }

    let projected = project(&result, &spec.main_key, &spec.outputs)?;
    info!(
        "Join complete: {} row(s), {} column(s)",
        projected.row_count(),
        projected.column_count()
    );
    Ok(projected)
}

/// One left-join step. Every left row is kept; a left row matching several
/// lookup rows is repeated once per match, in lookup order.
fn left_join(left: &Table, left_key: usize, right: &Table, right_key: usize, step: usize) -> Table {
    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in right.rows().iter().enumerate() {
        buckets
            .entry(row[right_key].as_display())
            .or_default()
            .push(idx);
    }

    let mut columns = left.columns().to_vec();
    columns.extend(suffixed_names(left.columns(), right.columns(), step));

    let mut rows = Vec::with_capacity(left.row_count());
    for row in left.rows() {
        let key = row[left_key].as_display();
        match buckets.get(&key) {
            Some(matches) => {
                for &matched in matches {
                    let source = &right.rows()[matched];
                    let contributed = source.iter().enumerate().map(|(idx, value)| {
                        if idx == right_key {
                            Value::Text(value.as_display())
                        } else {
                            value.clone()
                        }
                    });
                    rows.push(row.iter().cloned().chain(contributed).collect());
                }
            }
            None => {
                let mut combined = row.clone();
                combined.resize(columns.len(), Value::Missing);
                rows.push(combined);
            }
        }
    }
    Table::new(columns, rows)
}

// Incoming names that collide with an existing column get `_table{step}`.
fn suffixed_names(existing: &[String], incoming: &[String], step: usize) -> Vec<String> {
    let taken: HashSet<&str> = existing.iter().map(String::as_str).collect();
    incoming
        .iter()
        .map(|name| {
            if taken.contains(name.as_str()) {
                format!("{name}_table{step}")
            } else {
                name.clone()
            }
        })
        .collect()
}

/// Column names of the accumulated result before projection.
pub fn joined_columns(spec: &JoinSpec) -> Vec<String> {
    let mut columns = spec.main.columns().to_vec();
    for (step, lookup) in spec.lookups.iter().enumerate() {
        let added = suffixed_names(&columns, lookup.table.columns(), step);
        columns.extend(added);
    }
    columns
}

/// Keeps the main key followed by every desired column, in result order.
/// The main key is never repeated even when it is also a desired column.
fn project(result: &Table, main_key: &str, outputs: &BTreeSet<String>) -> Result<Table, JoinError> {
    let main_idx = result
        .column_index(main_key)
        .ok_or_else(|| missing_in_main(main_key))?;
    let mut keep = vec![main_idx];
    keep.extend(
        result
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| name.as_str() != main_key && outputs.contains(name.as_str()))
            .map(|(idx, _)| idx),
    );
    Ok(result.select(&keep))
}

fn missing_in_main(column: &str) -> JoinError {
    JoinError::MissingColumn {
        column: column.to_string(),
        table: "main table".to_string(),
    }
}

fn missing_in_lookup(column: &str, step: usize) -> JoinError {
    JoinError::MissingColumn {
        column: column.to_string(),
        table: format!("lookup table {}", step + 1),
    }
}

/// Handle to a join running on its own worker thread.
///
/// The worker is the only sender. Each run delivers zero or more progress
/// values, exactly one `Finished` or `Failed`, and then a final
/// `Progress(100)`.
pub struct JoinWorker {
    events: Receiver<JoinEvent>,
    handle: JoinHandle<()>,
}

pub fn spawn_join(spec: JoinSpec) -> io::Result<JoinWorker> {
    let (sender, events) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("join-worker".to_string())
        .spawn(move || worker_main(&spec, &sender))?;
    Ok(JoinWorker { events, handle })
}

fn worker_main(spec: &JoinSpec, sender: &Sender<JoinEvent>) {
    // A dropped receiver only means nobody is listening any more.
    let outcome = join_tables(spec, &mut |percent| {
        let _ = sender.send(JoinEvent::Progress(percent));
    });
    let terminal = match outcome {
        Ok(table) => JoinEvent::Finished(table),
        Err(err) => JoinEvent::Failed(err.to_string()),
    };
    let _ = sender.send(terminal);
    let _ = sender.send(JoinEvent::Progress(100));
}

impl JoinWorker {
    pub fn events(&self) -> &Receiver<JoinEvent> {
        &self.events
    }

    /// Drains every event, forwarding progress, and returns the outcome.
    pub fn wait<F>(self, mut on_progress: F) -> Result<Table, JoinError>
    where
        F: FnMut(u8),
    {
        let mut outcome = None;
        for event in self.events.iter() {
            match event {
                JoinEvent::Progress(percent) => on_progress(percent),
                JoinEvent::Finished(table) => outcome = Some(Ok(table)),
                JoinEvent::Failed(message) => outcome = Some(Err(JoinError::Failed(message))),
            }
        }
        if self.handle.join().is_err() {
            on_progress(100);
            return Err(JoinError::Failed("Join worker panicked".to_string()));
        }
        outcome.unwrap_or_else(|| {
            Err(JoinError::Failed(
                "Join worker stopped without a result".to_string(),
            ))
        })
    }
}

/// Every column of every selected lookup table, in selection order.
pub fn return_column_candidates(lookups: &[Lookup]) -> Vec<String> {
    lookups
        .iter()
        .flat_map(|lookup| lookup.table.columns().iter().cloned())
        .collect()
}

/// Case-insensitive substring filter over column names.
pub fn filter_columns<'a>(candidates: &'a [String], text: &str) -> Vec<&'a str> {
    let needle = text.to_lowercase();
    candidates
        .iter()
        .filter(|name| name.to_lowercase().contains(&needle))
        .map(String::as_str)
        .collect()
}
