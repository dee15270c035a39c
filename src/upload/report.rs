//! Consolidated failed-records workbook
//!
//! Every phase adds its failures to one workbook, one sheet per domain. A
//! sheet written again replaces the earlier one; other sheets are kept.

use rust_xlsxwriter::Workbook as XlsxWorkbook;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::cell::Cell;
use crate::core::record::RecordKind;
use crate::core::workbook::{Sheet, Workbook, WorkbookError};
use crate::reader::masters::{
    COL_COMPLAINT_TYPE, COL_DEPARTMENT, COL_DESIGNATION, COL_PRIORITY, COL_RESOLUTION_HOURS,
    COL_SEARCH_WORDS, COL_SUB_TYPE,
};
use crate::upload::annotate::{
    write_annotated, ERROR_MESSAGE_COLUMN, STATUS_CODE_COLUMN, STATUS_COLUMN,
};
use crate::upload::uploader::FailedRecord;

pub const FAILED_RECORDS_FILE: &str = "FAILED_RECORDS.xlsx";

/// Keys the server fills in and a user never edits
pub const INTERNAL_KEYS: [&str; 4] = ["active", "isActive", "tenantId", "uniqueIdentifier"];

/// Longest sheet name Excel accepts
const SHEET_NAME_LIMIT: usize = 31;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Workbook(#[from] WorkbookError),

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The failed-records workbook inside an error directory
pub struct FailureReport {
    path: PathBuf,
}

impl FailureReport {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(FAILED_RECORDS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `failures` as sheet `name`; returns the number of rows written
    ///
    /// `department_names` maps department codes back to the names a user
    /// typed into the template.
    pub fn write(
        &self,
        name: &str,
        failures: &[FailedRecord],
        department_names: &HashMap<String, String>,
    ) -> Result<usize, ReportError> {
        if failures.is_empty() {
            return Ok(0);
        }
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|source| ReportError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }

        let title = sheet_title(name);
        let mut sheets: Vec<Sheet> = if self.path.exists() {
            Workbook::open(&self.path)?
                .all_sheets()?
                .into_iter()
                .filter(|s| s.name() != title)
                .collect()
        } else {
            Vec::new()
        };
        sheets.push(failure_sheet(&title, failures, department_names));

        let mut out = XlsxWorkbook::new();
        for sheet in &sheets {
            let ws = out.add_worksheet();
            write_annotated(ws, sheet).map_err(|e| WorkbookError::write(&self.path, e))?;
        }
        out.save(&self.path)
            .map_err(|e| WorkbookError::write(&self.path, e))?;

        tracing::info!(path = %self.path.display(), sheet = %title, rows = failures.len(), "error report updated");
        Ok(failures.len())
    }
}

/// Excel sheet names are at most 31 characters and exclude a few symbols
pub fn sheet_title(name: &str) -> String {
    name.chars()
        .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
        .take(SHEET_NAME_LIMIT)
        .collect()
}

/// Build the report sheet: data columns in first-seen order, status last
pub fn failure_sheet(
    name: &str,
    failures: &[FailedRecord],
    department_names: &HashMap<String, String>,
) -> Sheet {
    let mut headers: Vec<String> = Vec::new();
    let mut records: Vec<Vec<(String, Cell)>> = Vec::new();

    for failure in failures {
        let fields = match (failure.kind, failure.data.as_object()) {
            (Some(kind), Some(data)) => template_fields(kind, data, department_names),
            (None, Some(data)) => flatten_record(data),
            (_, None) => Vec::new(),
        };
        for (key, _) in &fields {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        records.push(fields);
    }

    let data_width = headers.len();
    headers.extend(
        [STATUS_COLUMN, STATUS_CODE_COLUMN, ERROR_MESSAGE_COLUMN]
            .iter()
            .map(|h| h.to_string()),
    );

    let rows = records
        .into_iter()
        .zip(failures)
        .map(|(fields, failure)| {
            let mut row = vec![Cell::Absent; data_width];
            for (key, cell) in fields {
                if let Some(i) = headers.iter().position(|h| *h == key) {
                    row[i] = cell;
                }
            }
            row.push(Cell::Text("FAILED".to_string()));
            row.push(
                failure
                    .failure
                    .status_code
                    .map(|c| Cell::Number(c as f64))
                    .unwrap_or(Cell::Absent),
            );
            row.push(Cell::from_text(&failure.failure.message));
            row
        })
        .collect();

    Sheet::new(name, headers, rows)
}

/// Map a payload back to the template's own columns where one exists
fn template_fields(
    kind: RecordKind,
    data: &Map<String, Value>,
    department_names: &HashMap<String, String>,
) -> Vec<(String, Cell)> {
    let text = |key: &str| data.get(key).map(value_cell).unwrap_or(Cell::Absent);
    let department = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .map(|code| {
                let name = department_names.get(code).map(String::as_str).unwrap_or(code);
                Cell::from_text(name)
            })
            .unwrap_or(Cell::Absent)
    };

    match kind {
        RecordKind::Department => vec![(COL_DEPARTMENT.to_string(), text("name"))],
        RecordKind::Designation => vec![
            (COL_DEPARTMENT.to_string(), department("departmentCode")),
            (COL_DESIGNATION.to_string(), text("name")),
        ],
        RecordKind::ServiceDefinition => vec![
            (COL_COMPLAINT_TYPE.to_string(), text("menuPath")),
            (COL_SUB_TYPE.to_string(), text("name")),
            (COL_DEPARTMENT.to_string(), department("department")),
            (COL_RESOLUTION_HOURS.to_string(), text("slaHours")),
            (COL_SEARCH_WORDS.to_string(), text("keywords")),
            (COL_PRIORITY.to_string(), text("priority")),
        ],
        _ => flatten_record(data),
    }
}

/// Nested objects become `a.b` columns; internal keys are dropped
pub fn flatten_record(data: &Map<String, Value>) -> Vec<(String, Cell)> {
    let mut out = Vec::new();
    flatten_into("", data, &mut out);
    out
}

fn flatten_into(prefix: &str, data: &Map<String, Value>, out: &mut Vec<(String, Cell)>) {
    for (key, value) in data {
        if INTERNAL_KEYS.contains(&key.as_str()) {
            continue;
        }
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) => flatten_into(&name, inner, out),
            other => out.push((name, value_cell(other))),
        }
    }
}

/// Scalars as-is; lists joined, objects in a list by their `code` or `name`
fn value_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Absent,
        Value::Bool(b) => Cell::Bool(*b),
        Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Absent),
        Value::String(s) => Cell::from_text(s),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::Object(o) => o
                        .get("code")
                        .or_else(|| o.get("name"))
                        .map(scalar_text)
                        .unwrap_or_else(|| item.to_string()),
                    other => scalar_text(other),
                })
                .collect();
            Cell::from_text(&parts.join(", "))
        }
        Value::Object(_) => Cell::from_text(&value.to_string()),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::classify::Failure;
    use serde_json::json;
    use tempfile::tempdir;

    fn failed(kind: Option<RecordKind>, data: Value, code: Option<u16>) -> FailedRecord {
        FailedRecord {
            kind,
            data,
            failure: Failure {
                status_code: code,
                message: "rejected".to_string(),
            },
        }
    }

    fn depts() -> HashMap<String, String> {
        HashMap::from([("DEPT_1".to_string(), "Health".to_string())])
    }

    #[test]
    fn test_flatten_nested_and_lists() {
        let data = json!({
            "code": "pg.citya",
            "tenantId": "pg",
            "isActive": true,
            "city": {"name": "City A", "districtCode": "D1"},
            "tenants": [{"code": "pg"}, {"code": "pg.citya"}],
            "pincode": [143001, 143002]
        });
        let fields = flatten_record(data.as_object().unwrap());
        let map: HashMap<String, Cell> = fields.into_iter().collect();
        assert_eq!(map["city.name"], Cell::Text("City A".into()));
        assert_eq!(map["tenants"], Cell::Text("pg, pg.citya".into()));
        assert_eq!(map["pincode"], Cell::Text("143001, 143002".into()));
        assert!(!map.contains_key("tenantId"));
        assert!(!map.contains_key("isActive"));
    }

    #[test]
    fn test_designation_maps_back_to_template_columns() {
        let sheet = failure_sheet(
            "Designation",
            &[failed(
                Some(RecordKind::Designation),
                json!({"code": "DESIG_01", "name": "Doctor", "departmentCode": "DEPT_1", "active": true}),
                Some(400),
            )],
            &depts(),
        );
        assert_eq!(
            sheet.headers(),
            &[
                COL_DEPARTMENT.to_string(),
                COL_DESIGNATION.to_string(),
                STATUS_COLUMN.to_string(),
                STATUS_CODE_COLUMN.to_string(),
                ERROR_MESSAGE_COLUMN.to_string(),
            ]
        );
        let row = sheet.row(0).unwrap();
        assert_eq!(row.text(COL_DEPARTMENT).as_deref(), Some("Health"));
        assert_eq!(row.i64(STATUS_CODE_COLUMN), Some(400));
    }

    #[test]
    fn test_unknown_department_code_kept() {
        let sheet = failure_sheet(
            "Complaint Type",
            &[failed(
                Some(RecordKind::ServiceDefinition),
                json!({"serviceCode": "StreetLight", "name": "Street light", "department": "DEPT_9", "slaHours": 48}),
                None,
            )],
            &depts(),
        );
        let row = sheet.row(0).unwrap();
        assert_eq!(row.text(COL_DEPARTMENT).as_deref(), Some("DEPT_9"));
        assert_eq!(row.text(COL_RESOLUTION_HOURS).as_deref(), Some("48"));
        assert!(row.is_blank(STATUS_CODE_COLUMN));
    }

    #[test]
    fn test_sheet_title_sanitized() {
        assert_eq!(sheet_title("a/b"), "a_b");
        assert_eq!(sheet_title(&"x".repeat(40)).len(), 31);
    }

    #[test]
    fn test_write_replaces_same_sheet_and_keeps_others() {
        let dir = tempdir().unwrap();
        let report = FailureReport::in_dir(&dir.path().join("errors"));
        let none = HashMap::new();

        report
            .write(
                "Employee",
                &[failed(Some(RecordKind::Employee), json!({"code": "E1"}), Some(400))],
                &none,
            )
            .unwrap();
        report
            .write(
                "Localization",
                &[failed(None, json!({"code": "A", "locale": "en_IN"}), Some(500))],
                &none,
            )
            .unwrap();
        report
            .write(
                "Employee",
                &[
                    failed(Some(RecordKind::Employee), json!({"code": "E2"}), Some(400)),
                    failed(Some(RecordKind::Employee), json!({"code": "E3"}), None),
                ],
                &none,
            )
            .unwrap();

        let mut book = Workbook::open(report.path()).unwrap();
        let mut names = book.sheet_names();
        names.sort();
        assert_eq!(names, vec!["Employee", "Localization"]);
        let employees = book.sheet("Employee").unwrap();
        assert_eq!(employees.len(), 2);
        assert_eq!(employees.row(0).unwrap().text("code").as_deref(), Some("E2"));
        assert_eq!(
            employees.row(1).unwrap().text(STATUS_COLUMN).as_deref(),
            Some("FAILED")
        );
    }

    #[test]
    fn test_write_nothing_for_no_failures() {
        let dir = tempdir().unwrap();
        let report = FailureReport::in_dir(dir.path());
        assert_eq!(report.write("Employee", &[], &HashMap::new()).unwrap(), 0);
        assert!(!report.path().exists());
    }
}
