//! Loaded files, their sheets, and join assembly.
//!
//! A [`Workspace`] keeps loaded workbooks in load order. Sheets are addressed
//! by the workbook's path plus sheet name, so two files that share a name in
//! different directories stay distinct. Table labels read `"{file} - {sheet}"`
//! and are for display only. Delimited files hold exactly one sheet, named
//! after the file stem.
//!
//! Sheets are mutated only through header changes. A join takes snapshots of
//! its tables when the [`JoinSpec`] is built, so a header change during a
//! running join never races with it.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use encoding_rs::Encoding;
use log::{info, warn};

use crate::{
    io_utils,
    join::{JoinSpec, Lookup},
    sheet::{Grid, HeaderChoice, Sheet},
    table::Table,
};

#[derive(Debug, Clone)]
pub struct Workbook {
    path: PathBuf,
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(path: impl Into<PathBuf>, sheets: Vec<Sheet>) -> Self {
        Self {
            path: path.into(),
            sheets,
        }
    }

    /// Reads a delimited file as a single-sheet workbook.
    pub fn open(path: &Path, delimiter: Option<u8>, encoding: &'static Encoding) -> Result<Self> {
        let delimiter = io_utils::resolve_input_delimiter(path, delimiter);
        let grid = io_utils::read_grid_from_path(path, delimiter, encoding)?;
        Ok(Self::from_grid(path, grid))
    }

    pub fn from_grid(path: &Path, grid: Grid) -> Self {
        let sheet = Sheet::new(sheet_name_for(path), grid);
        Self::new(path, vec![sheet])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name() == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name() == name)
    }
}

/// A sheet of a loaded workbook.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SheetAddress {
    pub path: PathBuf,
    pub sheet: String,
}

impl SheetAddress {
    pub fn new(path: impl Into<PathBuf>, sheet: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sheet: sheet.into(),
        }
    }

    /// Address of the single sheet a delimited file is loaded as.
    pub fn of_file(path: &Path) -> Self {
        Self::new(path, sheet_name_for(path))
    }
}

impl fmt::Display for SheetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", file_name_of(&self.path), self.sheet)
    }
}

/// One lookup table chosen for a join. A `None` key falls back to the main
/// key when the lookup table has a column of that name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSelection {
    pub sheet: SheetAddress,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct JoinRequest {
    pub main: Option<SheetAddress>,
    pub main_key: String,
    pub lookups: Vec<LookupSelection>,
    pub outputs: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Workspace {
    workbooks: Vec<Workbook>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a file, replacing any workbook already loaded from that path.
    pub fn load(
        &mut self,
        path: &Path,
        delimiter: Option<u8>,
        encoding: &'static Encoding,
    ) -> Result<&Workbook> {
        let workbook = Workbook::open(path, delimiter, encoding)
            .with_context(|| format!("Loading {path:?}"))?;
        Ok(self.insert(workbook))
    }

    pub fn insert(&mut self, workbook: Workbook) -> &Workbook {
        for sheet in workbook.sheets() {
            info!(
                "Loaded {} - {}: {} row(s), header row {}",
                workbook.file_name(),
                sheet.name(),
                sheet.grid().len(),
                sheet.detected_header_row() + 1
            );
        }
        let idx = match self.workbooks.iter().position(|w| w.path == workbook.path) {
            Some(existing) => {
                warn!("Reloading {:?}", workbook.path);
                self.workbooks[existing] = workbook;
                existing
            }
            None => {
                self.workbooks.push(workbook);
                self.workbooks.len() - 1
            }
        };
        &self.workbooks[idx]
    }

    pub fn remove(&mut self, path: &Path) -> Option<Workbook> {
        let idx = self.workbooks.iter().position(|w| w.path == path)?;
        info!("Removed {path:?}");
        Some(self.workbooks.remove(idx))
    }

    pub fn clear(&mut self) {
        self.workbooks.clear();
        info!("Cleared all loaded files");
    }

    pub fn workbooks(&self) -> &[Workbook] {
        &self.workbooks
    }

    pub fn is_empty(&self) -> bool {
        self.workbooks.is_empty()
    }

    pub fn workbook(&self, path: &Path) -> Option<&Workbook> {
        self.workbooks.iter().find(|w| w.path == path)
    }

    pub fn sheet(&self, address: &SheetAddress) -> Option<&Sheet> {
        self.workbook(&address.path)?.sheet(&address.sheet)
    }

    pub fn sheet_mut(&mut self, address: &SheetAddress) -> Option<&mut Sheet> {
        self.workbooks
            .iter_mut()
            .find(|w| w.path == address.path)?
            .sheet_mut(&address.sheet)
    }

    pub fn table(&self, address: &SheetAddress) -> Option<&Table> {
        self.sheet(address).map(Sheet::data)
    }

    /// `"{file} - {sheet}"` for every loaded sheet, in load order.
    pub fn table_labels(&self) -> Vec<String> {
        self.workbooks
            .iter()
            .flat_map(|w| {
                let file = w.file_name();
                w.sheets()
                    .iter()
                    .map(move |s| format!("{file} - {}", s.name()))
            })
            .collect()
    }

    pub fn set_header(&mut self, address: &SheetAddress, choice: HeaderChoice) -> Result<()> {
        let target = self
            .sheet_mut(address)
            .ok_or_else(|| anyhow!("Sheet '{address}' is not loaded"))?;
        target.set_header(choice)
    }

    /// Validates a request and snapshots its tables into a [`JoinSpec`].
    pub fn build_join_spec(&self, request: &JoinRequest) -> Result<JoinSpec> {
        let Some(main_address) = &request.main else {
            bail!("Select a main table");
        };
        if request.lookups.is_empty() {
            bail!("Select at least one lookup table");
        }
        if request.outputs.is_empty() {
            bail!("Select at least one return column");
        }
        let main = self
            .table(main_address)
            .ok_or_else(|| anyhow!("Main table '{main_address}' is not loaded"))?;

        let lookups = request
            .lookups
            .iter()
            .map(|selection| {
                let table = self
                    .table(&selection.sheet)
                    .ok_or_else(|| anyhow!("Lookup table '{}' is not loaded", selection.sheet))?;
                let key = resolve_lookup_key(table, selection, &request.main_key)?;
                Ok(Lookup::new(table.clone(), key))
            })
            .collect::<Result<Vec<_>>>()?;

        let spec = JoinSpec::new(
            main.clone(),
            request.main_key.clone(),
            lookups,
            request.outputs.iter().cloned(),
        );
        spec.validate()?;
        Ok(spec)
    }
}

fn resolve_lookup_key(table: &Table, selection: &LookupSelection, main_key: &str) -> Result<String> {
    match &selection.key {
        Some(key) => Ok(key.clone()),
        None if table.has_column(main_key) => Ok(main_key.to_string()),
        None => Err(anyhow!(
            "Lookup table '{}' has no column '{}'; choose its lookup column",
            selection.sheet,
            main_key
        )),
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn sheet_name_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Sheet1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|row| row.iter().map(|c| crate::data::infer_value(c)).collect())
            .collect()
    }

    fn orders() -> SheetAddress {
        SheetAddress::of_file(Path::new("/data/orders.csv"))
    }

    fn cities() -> SheetAddress {
        SheetAddress::of_file(Path::new("/data/cities.csv"))
    }

    fn workspace() -> Workspace {
        let mut ws = Workspace::new();
        ws.insert(Workbook::from_grid(
            Path::new("/data/orders.csv"),
            grid(&[&["id", "name"], &["1", "A"], &["2", "B"]]),
        ));
        ws.insert(Workbook::from_grid(
            Path::new("/data/cities.csv"),
            grid(&[&["id", "city"], &["1", "X"]]),
        ));
        ws
    }

    fn request(main_key: &str, key: Option<&str>) -> JoinRequest {
        JoinRequest {
            main: Some(orders()),
            main_key: main_key.into(),
            lookups: vec![LookupSelection {
                sheet: cities(),
                key: key.map(str::to_string),
            }],
            outputs: vec!["city".into()],
        }
    }

    #[test]
    fn labels_follow_load_order() {
        assert_eq!(
            workspace().table_labels(),
            vec!["orders.csv - orders", "cities.csv - cities"]
        );
        assert_eq!(orders().to_string(), "orders.csv - orders");
    }

    #[test]
    fn reloading_a_path_replaces_it() {
        let mut ws = workspace();
        ws.insert(Workbook::from_grid(
            Path::new("/data/orders.csv"),
            grid(&[&["code"], &["7"]]),
        ));
        assert_eq!(ws.workbooks().len(), 2);
        assert_eq!(ws.table(&orders()).unwrap().columns(), ["code"]);
    }

    #[test]
    fn same_file_name_in_other_directory_is_a_separate_workbook() {
        let mut ws = workspace();
        ws.insert(Workbook::from_grid(
            Path::new("/archive/orders.csv"),
            grid(&[&["id", "total"], &["1", "9.5"]]),
        ));
        assert_eq!(ws.workbooks().len(), 3);
        assert_eq!(ws.table(&orders()).unwrap().columns(), ["id", "name"]);
        let archived = SheetAddress::of_file(Path::new("/archive/orders.csv"));
        assert_eq!(ws.table(&archived).unwrap().columns(), ["id", "total"]);
    }

    #[test]
    fn remove_and_clear() {
        let mut ws = workspace();
        assert!(ws.remove(Path::new("/data/orders.csv")).is_some());
        assert!(ws.remove(Path::new("/data/orders.csv")).is_none());
        ws.clear();
        assert!(ws.is_empty());
    }

    #[test]
    fn lookup_key_defaults_to_main_key() {
        let spec = workspace().build_join_spec(&request("id", None)).unwrap();
        assert_eq!(spec.lookups[0].key, "id");
    }

    #[test]
    fn validation_reports_first_missing_selection() {
        let ws = workspace();
        let err = ws.build_join_spec(&JoinRequest::default()).unwrap_err();
        assert_eq!(err.to_string(), "Select a main table");

        let err = ws.build_join_spec(&request("name", None)).unwrap_err();
        assert!(err.to_string().contains("has no column 'name'"));
    }

    #[test]
    fn spec_is_a_snapshot_of_current_headers() {
        let mut ws = workspace();
        let spec = ws.build_join_spec(&request("id", Some("id"))).unwrap();
        ws.set_header(&cities(), HeaderChoice::Row(1)).unwrap();
        assert_eq!(spec.lookups[0].table.columns(), ["id", "city"]);
        assert_eq!(
            ws.table(&cities()).unwrap().columns(),
            [Value::Integer(1).as_display(), "X".to_string()]
        );
    }
}
