//! Workbook loading
//!
//! Wraps calamine so the rest of the crate only ever sees [`Sheet`] values:
//! a header row plus rows of normalized [`Cell`]s.

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use rust_xlsxwriter::{Format, Worksheet, XlsxError};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::cell::Cell;

static ABSENT: Cell = Cell::Absent;

/// Errors raised while opening workbooks or reading sheets
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("Excel file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to open workbook {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("Sheet '{sheet}' not found in {path}")]
    SheetNotFound { path: PathBuf, sheet: String },

    #[error("Failed to read sheet '{sheet}': {message}")]
    Read { sheet: String, message: String },

    #[error("Sheet '{sheet}' is missing required columns: {}", columns.join(", "))]
    MissingColumns { sheet: String, columns: Vec<String> },

    #[error("Failed to write workbook {path}: {message}")]
    Write { path: PathBuf, message: String },
}

impl WorkbookError {
    pub fn write(path: &Path, err: XlsxError) -> Self {
        WorkbookError::Write {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// An opened workbook
pub struct Workbook {
    path: PathBuf,
    inner: Sheets<BufReader<File>>,
}

impl Workbook {
    /// Open an .xlsx/.xls/.ods workbook
    pub fn open(path: &Path) -> Result<Self, WorkbookError> {
        if !path.exists() {
            return Err(WorkbookError::NotFound(path.to_path_buf()));
        }
        let inner = open_workbook_auto(path).map_err(|e| WorkbookError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.inner.sheet_names()
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheet_names().iter().any(|s| s == name)
    }

    /// Read a sheet by exact name
    pub fn sheet(&mut self, name: &str) -> Result<Sheet, WorkbookError> {
        if !self.has_sheet(name) {
            return Err(WorkbookError::SheetNotFound {
                path: self.path.clone(),
                sheet: name.to_string(),
            });
        }
        let range = self
            .inner
            .worksheet_range(name)
            .map_err(|e| WorkbookError::Read {
                sheet: name.to_string(),
                message: e.to_string(),
            })?;

        // The used range may not start at A1; pad columns so positions match
        // the worksheet and remember which row holds the header.
        let (first_row, first_col) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut rows = range.rows();
        let mut headers: Vec<String> = vec![String::new(); first_col];
        if let Some(header_row) = rows.next() {
            headers.extend(header_row.iter().map(header_text));
        }
        let mut data: Vec<Vec<Cell>> = rows
            .map(|row| {
                let mut cells = vec![Cell::Absent; first_col];
                cells.extend(row.iter().map(cell_from_data));
                cells
            })
            .collect();
        while data
            .last()
            .map_or(false, |cells| cells.iter().all(Cell::is_absent))
        {
            data.pop();
        }

        Ok(Sheet::new(name, headers, data).with_header_row(first_row))
    }

    /// Read the first sheet that exists out of several accepted names
    pub fn first_sheet_of(&mut self, names: &[&str]) -> Result<Sheet, WorkbookError> {
        for name in names {
            if self.has_sheet(name) {
                return self.sheet(name);
            }
        }
        Err(WorkbookError::SheetNotFound {
            path: self.path.clone(),
            sheet: names.join(" | "),
        })
    }

    /// Read every sheet, in workbook order
    pub fn all_sheets(&mut self) -> Result<Vec<Sheet>, WorkbookError> {
        let names = self.sheet_names();
        names.iter().map(|n| self.sheet(n)).collect()
    }
}

fn header_text(data: &Data) -> String {
    match data {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => cell_from_data(other).as_text().unwrap_or_default(),
    }
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Absent,
        Data::String(s) => Cell::from_text(s),
        Data::Float(f) => Cell::from_number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => Cell::DateTime(ndt),
            None => Cell::from_number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::from_text(s),
        Data::Error(_) => Cell::Absent,
    }
}

/// Write one normalized cell; absent cells are left empty
pub fn write_cell(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    format: Option<&Format>,
) -> Result<(), XlsxError> {
    match (cell, format) {
        (Cell::Absent, Some(f)) => {
            ws.write_blank(row, col, f)?;
        }
        (Cell::Absent, None) => {}
        (Cell::Number(n), Some(f)) => {
            ws.write_number_with_format(row, col, *n, f)?;
        }
        (Cell::Number(n), None) => {
            ws.write_number(row, col, *n)?;
        }
        (Cell::Bool(b), Some(f)) => {
            ws.write_boolean_with_format(row, col, *b, f)?;
        }
        (Cell::Bool(b), None) => {
            ws.write_boolean(row, col, *b)?;
        }
        (other, Some(f)) => {
            ws.write_string_with_format(row, col, other.to_string(), f)?;
        }
        (other, None) => {
            ws.write_string(row, col, other.to_string())?;
        }
    }
    Ok(())
}

/// Copy a sheet's header and data back to the positions it was read from
pub fn write_sheet(ws: &mut Worksheet, sheet: &Sheet) -> Result<(), XlsxError> {
    ws.set_name(sheet.name())?;
    let header_row = sheet.header_row() as u32;
    for (col, header) in sheet.headers().iter().enumerate() {
        if !header.is_empty() {
            ws.write_string(header_row, col as u16, header)?;
        }
    }
    for (r, cells) in sheet.raw_rows().iter().enumerate() {
        for (col, cell) in cells.iter().enumerate() {
            write_cell(ws, header_row + 1 + r as u32, col as u16, cell, None)?;
        }
    }
    Ok(())
}

/// A header row plus normalized data rows
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
    index: HashMap<String, usize>,
    header_row: usize,
}

impl Sheet {
    pub fn new(name: &str, headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut index = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            index.entry(h.clone()).or_insert(i);
        }
        Self {
            name: name.to_string(),
            headers,
            rows,
            index,
            header_row: 0,
        }
    }

    /// Record the zero-based worksheet row holding the header
    pub fn with_header_row(mut self, header_row: usize) -> Self {
        self.header_row = header_row;
        self
    }

    /// Zero-based worksheet row holding the header
    pub fn header_row(&self) -> usize {
        self.header_row
    }

    /// Build a sheet from plain strings (blank markers still normalize)
    pub fn from_strings(name: &str, headers: &[&str], rows: &[Vec<&str>]) -> Self {
        Self::new(
            name,
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| Cell::from_text(v)).collect())
                .collect(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column position for an exact header label
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.index.get(header).copied()
    }

    pub fn has_column(&self, header: &str) -> bool {
        self.index.contains_key(header)
    }

    /// Headers from `required` that this sheet lacks
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|c| !self.has_column(c))
            .map(|c| c.to_string())
            .collect()
    }

    /// Fail unless every required header is present
    pub fn require_columns(&self, required: &[&str]) -> Result<(), WorkbookError> {
        let missing = self.missing_columns(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(WorkbookError::MissingColumns {
                sheet: self.name.clone(),
                columns: missing,
            })
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().enumerate().map(move |(index, cells)| Row {
            sheet: self,
            index,
            cells,
        })
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|cells| Row {
            sheet: self,
            index,
            cells,
        })
    }

    /// Position of `header`, appending an empty column when it is missing
    pub fn ensure_column(&mut self, header: &str) -> usize {
        if let Some(i) = self.column_index(header) {
            return i;
        }
        let i = self.headers.len();
        self.headers.push(header.to_string());
        self.index.insert(header.to_string(), i);
        i
    }

    /// Overwrite one data cell, growing the row if needed
    pub fn set_cell(&mut self, row: usize, col: usize, cell: Cell) {
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() <= col {
                cells.resize(col + 1, Cell::Absent);
            }
            cells[col] = cell;
        }
    }

    /// Raw cell grid, used when a sheet is rewritten
    pub fn raw_rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }
}

/// A borrowed data row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    sheet: &'a Sheet,
    index: usize,
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    /// Zero-based data row index (header excluded)
    pub fn index(&self) -> usize {
        self.index
    }

    /// Row number as shown in a spreadsheet application
    pub fn excel_row(&self) -> usize {
        self.sheet.header_row + self.index + 2
    }

    pub fn cell(&self, header: &str) -> &'a Cell {
        self.sheet
            .column_index(header)
            .and_then(|i| self.cells.get(i))
            .unwrap_or(&ABSENT)
    }

    pub fn text(&self, header: &str) -> Option<String> {
        self.cell(header).as_text()
    }

    pub fn f64(&self, header: &str) -> Option<f64> {
        self.cell(header).as_f64()
    }

    pub fn i64(&self, header: &str) -> Option<i64> {
        self.cell(header).as_i64()
    }

    pub fn is_true(&self, header: &str) -> bool {
        self.cell(header).is_true()
    }

    pub fn is_blank(&self, header: &str) -> bool {
        self.cell(header).is_absent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook as XlsxWorkbook;
    use tempfile::tempdir;

    #[test]
    fn test_row_lookup_by_exact_header() {
        let sheet = Sheet::from_strings(
            "Tenant Info",
            &["Tenant Code*\n(To be filled by ADMIN)", "Tenant Display Name*"],
            &[vec!["pg.citya", "City A"]],
        );
        let row = sheet.row(0).unwrap();
        assert_eq!(
            row.text("Tenant Code*\n(To be filled by ADMIN)").as_deref(),
            Some("pg.citya")
        );
        // Header text is the contract, a near match is a different column
        assert_eq!(row.text("Tenant Code*"), None);
        assert_eq!(row.excel_row(), 2);
    }

    #[test]
    fn test_missing_columns() {
        let sheet = Sheet::from_strings("S", &["a", "b"], &[]);
        assert_eq!(sheet.missing_columns(&["a", "c"]), vec!["c".to_string()]);
        assert!(sheet.require_columns(&["a", "b"]).is_ok());
        assert!(sheet.require_columns(&["z"]).is_err());
    }

    #[test]
    fn test_ensure_column_reuses_existing() {
        let mut sheet = Sheet::from_strings("S", &["Code", "_STATUS"], &[vec!["A", ""]]);
        assert_eq!(sheet.ensure_column("_STATUS"), 1);
        assert_eq!(sheet.ensure_column("_ERROR_MESSAGE"), 2);
        assert_eq!(sheet.headers().len(), 3);
        sheet.set_cell(0, 2, Cell::from_text("boom"));
        assert_eq!(sheet.row(0).unwrap().text("_ERROR_MESSAGE").as_deref(), Some("boom"));
    }

    #[test]
    fn test_open_missing_file() {
        let err = Workbook::open(Path::new("/nonexistent/book.xlsx")).err().unwrap();
        assert!(matches!(err, WorkbookError::NotFound(_)));
    }

    #[test]
    fn test_read_written_workbook() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.xlsx");

        let mut book = XlsxWorkbook::new();
        let ws = book.add_worksheet();
        ws.set_name("Data").unwrap();
        ws.write_string(0, 0, "Code").unwrap();
        ws.write_string(0, 1, "Count").unwrap();
        ws.write_string(1, 0, "A").unwrap();
        ws.write_number(1, 1, 3.0).unwrap();
        ws.write_string(2, 0, "nan").unwrap();
        ws.write_string(3, 0, "B").unwrap();
        book.save(&path).unwrap();

        let mut wb = Workbook::open(&path).unwrap();
        assert!(wb.has_sheet("Data"));
        let sheet = wb.sheet("Data").unwrap();
        assert_eq!(sheet.headers(), &["Code".to_string(), "Count".to_string()]);
        // Blank rows inside the data keep their position
        assert_eq!(sheet.len(), 3);
        assert!(sheet.row(1).unwrap().is_blank("Code"));
        let first = sheet.row(0).unwrap();
        assert_eq!(first.i64("Count"), Some(3));

        assert!(matches!(
            wb.sheet("Missing"),
            Err(WorkbookError::SheetNotFound { .. })
        ));
    }
}
