//! Write per-row upload status back into the source workbook
//!
//! The workbook is re-read with calamine and rewritten in full, so cell
//! formatting in the original file does not survive.

use rust_xlsxwriter::{Color, Format, Workbook as XlsxWorkbook, Worksheet, XlsxError};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::core::cell::Cell;
use crate::core::workbook::{write_cell, write_sheet, Sheet, Workbook, WorkbookError};
use crate::upload::classify::Outcome;
use crate::upload::uploader::RecordStatus;

pub const STATUS_COLUMN: &str = "_STATUS";
pub const STATUS_CODE_COLUMN: &str = "_STATUS_CODE";
pub const ERROR_MESSAGE_COLUMN: &str = "_ERROR_MESSAGE";

const CREATED_FILL: u32 = 0xC6EFCE;
const EXISTS_FILL: u32 = 0xFFEB9C;
const FAILED_FILL: u32 = 0xFFC7CE;
pub(crate) const HEADER_FILL: u32 = 0xD3D3D3;

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error(transparent)]
    Workbook(#[from] WorkbookError),

    #[error("Sheet '{0}' has no rows to annotate")]
    EmptySheet(String),
}

/// Annotate `sheet_name` in place; returns the number of rows written
///
/// Several statuses for the same row collapse to the worst one, so a
/// sheet feeding two record kinds shows a failure if either failed.
pub fn annotate_workbook(
    path: &Path,
    sheet_name: &str,
    statuses: &[RecordStatus],
) -> Result<usize, AnnotateError> {
    let sheets = {
        let mut book = Workbook::open(path)?;
        if !book.has_sheet(sheet_name) {
            return Err(WorkbookError::SheetNotFound {
                path: path.to_path_buf(),
                sheet: sheet_name.to_string(),
            }
            .into());
        }
        book.all_sheets()?
    };

    let mut out = XlsxWorkbook::new();
    let mut annotated = 0;
    for mut sheet in sheets {
        let ws = out.add_worksheet();
        if sheet.name() == sheet_name {
            if sheet.is_empty() {
                return Err(AnnotateError::EmptySheet(sheet_name.to_string()));
            }
            annotated = apply_statuses(&mut sheet, statuses);
            write_annotated(ws, &sheet).map_err(|e| WorkbookError::write(path, e))?;
        } else {
            write_sheet(ws, &sheet).map_err(|e| WorkbookError::write(path, e))?;
        }
    }
    out.save(path).map_err(|e| WorkbookError::write(path, e))?;

    tracing::debug!(path = %path.display(), sheet = sheet_name, rows = annotated, "annotated workbook");
    Ok(annotated)
}

/// Fill the three status columns, reusing them when already present
pub fn apply_statuses(sheet: &mut Sheet, statuses: &[RecordStatus]) -> usize {
    let status_col = sheet.ensure_column(STATUS_COLUMN);
    let code_col = sheet.ensure_column(STATUS_CODE_COLUMN);
    let message_col = sheet.ensure_column(ERROR_MESSAGE_COLUMN);

    let mut by_row: HashMap<usize, &Outcome> = HashMap::new();
    for status in statuses {
        let Some(row) = status.source_row else { continue };
        if row >= sheet.len() {
            continue;
        }
        by_row
            .entry(row)
            .and_modify(|current| {
                if severity(&status.outcome) > severity(*current) {
                    *current = &status.outcome;
                }
            })
            .or_insert(&status.outcome);
    }

    for (&row, outcome) in &by_row {
        let (code, message) = match outcome {
            Outcome::Failed(f) => (
                f.status_code.map(|c| Cell::Number(c as f64)).unwrap_or(Cell::Absent),
                Cell::from_text(&f.message),
            ),
            _ => (Cell::Absent, Cell::Absent),
        };
        sheet.set_cell(row, status_col, Cell::Text(outcome.status_label().to_string()));
        sheet.set_cell(row, code_col, code);
        sheet.set_cell(row, message_col, message);
    }
    by_row.len()
}

fn severity(outcome: &Outcome) -> u8 {
    match outcome {
        Outcome::Created => 0,
        Outcome::AlreadyExists => 1,
        Outcome::Failed(_) => 2,
    }
}

fn is_status_column(header: &str) -> bool {
    matches!(header, STATUS_COLUMN | STATUS_CODE_COLUMN | ERROR_MESSAGE_COLUMN)
}

fn status_fill(label: Option<String>) -> Option<Color> {
    match label.as_deref() {
        Some("CREATED") => Some(Color::RGB(CREATED_FILL)),
        Some("EXISTS") => Some(Color::RGB(EXISTS_FILL)),
        Some("FAILED") => Some(Color::RGB(FAILED_FILL)),
        _ => None,
    }
}

/// Data cells unlocked, status cells locked and colored, sheet protected
pub(crate) fn write_annotated(ws: &mut Worksheet, sheet: &Sheet) -> Result<(), XlsxError> {
    ws.set_name(sheet.name())?;
    let header_row = sheet.header_row() as u32;
    let header_locked = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(HEADER_FILL));
    let unlocked = Format::new().set_unlocked();

    for (col, header) in sheet.headers().iter().enumerate() {
        if is_status_column(header) {
            ws.write_string_with_format(header_row, col as u16, header, &header_locked)?;
        } else if !header.is_empty() {
            ws.write_string(header_row, col as u16, header)?;
        }
    }

    let status_col = sheet.column_index(STATUS_COLUMN);
    let width = sheet.headers().len();
    let absent = Cell::Absent;
    for (r, cells) in sheet.raw_rows().iter().enumerate() {
        let row = header_row + 1 + r as u32;
        let label = status_col.and_then(|c| cells.get(c)).and_then(Cell::as_text);
        let status_format = match status_fill(label) {
            Some(color) => Format::new().set_background_color(color),
            None => Format::new(),
        };

        for col in 0..width.max(cells.len()) {
            let cell = cells.get(col).unwrap_or(&absent);
            let header = sheet.headers().get(col).map(String::as_str).unwrap_or("");
            let format = if is_status_column(header) {
                &status_format
            } else {
                &unlocked
            };
            write_cell(ws, row, col as u16, cell, Some(format))?;
        }
    }

    ws.protect();
    Ok(())
}
