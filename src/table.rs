//! Header-assigned tables: named columns over rows of [`Value`] cells.
//!
//! Column names may repeat. Name lookups always resolve to the first
//! matching column.

use crate::data::Value;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Builds a table, padding short rows with [`Value::Missing`] and
    /// truncating long ones to the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Missing);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Keeps the given column positions, in the given order.
    pub fn select(&self, indices: &[usize]) -> Table {
        let columns = indices
            .iter()
            .map(|&idx| self.columns[idx].clone())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&idx| row[idx].clone()).collect())
            .collect();
        Table { columns, rows }
    }

    /// Replaces every missing cell with `fill`.
    pub fn fill_missing(&mut self, fill: &Value) -> usize {
        let mut filled = 0usize;
        for cell in self.rows.iter_mut().flatten() {
            if cell.is_missing() {
                *cell = fill.clone();
                filled += 1;
            }
        }
        filled
    }

    /// Rewrites one column to the string form of its values.
    pub fn stringify_column(&mut self, idx: usize) {
        for row in &mut self.rows {
            let text = row[idx].as_display();
            row[idx] = Value::Text(text);
        }
    }

    pub fn retain_rows<F>(&mut self, keep: F)
    where
        F: FnMut(&Vec<Value>) -> bool,
    {
        self.rows.retain(keep);
    }

    pub fn display_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(Value::as_display).collect())
            .collect()
    }

    pub fn head(&self, rows: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(rows).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec!["id".into(), "name".into(), "id".into()],
            vec![
                vec![Value::Integer(1), Value::text("A")],
                vec![Value::Integer(2), Value::text("B"), Value::text("x")],
            ],
        )
    }

    #[test]
    fn new_pads_short_rows() {
        let table = sample();
        assert_eq!(table.rows()[0].len(), 3);
        assert_eq!(table.rows()[0][2], Value::Missing);
    }

    #[test]
    fn duplicate_names_resolve_to_first_column() {
        let table = sample();
        assert_eq!(table.column_index("id"), Some(0));
        assert_eq!(table.value(1, "id"), Some(&Value::Integer(2)));
    }

    #[test]
    fn fill_missing_counts_replacements() {
        let mut table = sample();
        assert_eq!(table.fill_missing(&Value::text("N/A")), 1);
        assert_eq!(table.rows()[0][2], Value::text("N/A"));
    }

    #[test]
    fn select_reorders_columns() {
        let table = sample().select(&[1, 0]);
        assert_eq!(table.columns(), ["name", "id"]);
        assert_eq!(table.rows()[1], vec![Value::text("B"), Value::Integer(2)]);
    }

    #[test]
    fn stringify_column_coerces_numbers() {
        let mut table = sample();
        table.stringify_column(0);
        assert_eq!(table.rows()[0][0], Value::text("1"));
    }
}
