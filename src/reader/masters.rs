//! Common master sheets: departments, designations, complaint types

use serde_json::{json, Map};
use std::collections::HashMap;

use crate::core::codes::{camel_code, CodeAllocator, LocalizationSet};
use crate::core::record::{LocalizationMessage, MasterRecord, RecordKind};
use crate::core::workbook::{Row, Sheet, WorkbookError};
use crate::reader::{ParsedSheet, COMMON_MODULE, DERIVED_LOCALE, PGR_MODULE};

pub const DEPARTMENT_SHEET: &str = "Department And Desgination Mast";
pub const COMPLAINT_SHEET: &str = "Complaint Type Master";

pub const COL_DEPARTMENT: &str = "Department Name*";
pub const COL_DESIGNATION: &str = "Designation Name*";

pub const COL_COMPLAINT_TYPE: &str = "Complaint Type*";
pub const COL_SUB_TYPE: &str = "Complaint sub type*";
pub const COL_RESOLUTION_HOURS: &str = "Resolution Time (Hours)*";
pub const COL_SEARCH_WORDS: &str = "Search Words (comma separated)*";
pub const COL_PRIORITY: &str = "Priority";

/// Departments and designations read from one sheet
#[derive(Debug, Clone, Default)]
pub struct DepartmentMasters {
    pub departments: ParsedSheet,
    pub designations: ParsedSheet,
    /// Department name → generated code, for complaint types
    pub department_codes: HashMap<String, String>,
}

/// Read the combined department/designation sheet
///
/// Departments get `DEPT_n` by first appearance of their name; every
/// designation occurrence gets its own `DESIG_nn`.
pub fn read_departments(sheet: &Sheet, tenant_id: &str) -> Result<DepartmentMasters, WorkbookError> {
    sheet.require_columns(&[COL_DEPARTMENT])?;

    let mut out = DepartmentMasters::default();
    let mut departments = CodeAllocator::new("DEPT");
    let mut designations = CodeAllocator::with_width("DESIG", 2);
    let mut dept_labels = LocalizationSet::new();
    let mut desig_labels = LocalizationSet::new();

    for row in sheet.rows() {
        let Some(dept_name) = row.text(COL_DEPARTMENT) else {
            out.departments.skipped += 1;
            continue;
        };

        let (dept_code, fresh) = departments.code_for(&dept_name);
        if fresh {
            let mut data = Map::new();
            data.insert("code".into(), json!(dept_code));
            data.insert("name".into(), json!(dept_name));
            data.insert("active".into(), json!(true));
            out.departments.records.push(
                MasterRecord::new(RecordKind::Department, tenant_id, data).with_source_row(row.index()),
            );
            dept_labels.push(LocalizationMessage::new(
                &format!("COMMON_MASTERS_DEPARTMENT_{}", dept_code),
                &dept_name,
                COMMON_MODULE,
                DERIVED_LOCALE,
            ));
            out.department_codes.insert(dept_name.clone(), dept_code.clone());
        }

        if let Some(desig_name) = row.text(COL_DESIGNATION) {
            let desig_code = designations.next();
            let mut data = Map::new();
            data.insert("code".into(), json!(desig_code));
            data.insert("name".into(), json!(desig_name));
            data.insert("departmentCode".into(), json!(dept_code));
            data.insert("active".into(), json!(true));
            data.insert(
                "description".into(),
                json!(format!("{} - {}", desig_name, dept_name)),
            );
            out.designations.records.push(
                MasterRecord::new(RecordKind::Designation, tenant_id, data).with_source_row(row.index()),
            );
            desig_labels.push(LocalizationMessage::new(
                &format!("COMMON_MASTERS_{}", desig_code),
                &desig_name,
                COMMON_MODULE,
                DERIVED_LOCALE,
            ));
        }
    }

    out.departments.localizations = dept_labels.into_vec();
    out.designations.localizations = desig_labels.into_vec();
    Ok(out)
}

/// Attributes a complaint type row shares with the sub-types below it
#[derive(Debug, Clone, PartialEq)]
pub struct ParentType {
    pub name: String,
    pub department: Option<String>,
    pub sla_hours: Option<i64>,
    pub keywords: Option<String>,
    pub priority: Option<i64>,
}

impl ParentType {
    fn from_row(row: &Row<'_>, name: String, department_codes: &HashMap<String, String>) -> Self {
        // Unknown department names pass through unchanged
        let department = row
            .text(COL_DEPARTMENT)
            .map(|d| department_codes.get(&d).cloned().unwrap_or(d));
        Self {
            name,
            department,
            sla_hours: row.i64(COL_RESOLUTION_HOURS),
            keywords: row.text(COL_SEARCH_WORDS),
            priority: row.i64(COL_PRIORITY),
        }
    }
}

/// Result of one complaint-type row
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub record: Option<MasterRecord>,
    pub localizations: Vec<LocalizationMessage>,
}

/// State threaded through the complaint-type rows
#[derive(Debug)]
pub struct ComplaintTypeReader<'a> {
    tenant_id: &'a str,
    department_codes: Option<&'a HashMap<String, String>>,
    labels: LocalizationSet,
}

impl<'a> ComplaintTypeReader<'a> {
    pub fn new(tenant_id: &'a str, department_codes: Option<&'a HashMap<String, String>>) -> Self {
        Self {
            tenant_id,
            department_codes,
            labels: LocalizationSet::new(),
        }
    }

    /// Process one row given the current parent, returning the parent for
    /// the next row and whatever the row produced
    ///
    /// A non-blank type cell replaces the parent; blank cells inherit it.
    pub fn step(
        &mut self,
        parent: Option<ParentType>,
        row: &Row<'_>,
    ) -> (Option<ParentType>, StepOutput) {
        let empty = HashMap::new();
        let codes = self.department_codes.unwrap_or(&empty);
        let mut out = StepOutput::default();

        let parent = match row.text(COL_COMPLAINT_TYPE) {
            Some(name) => {
                let label = LocalizationMessage::new(
                    &format!("SERVICEDFS.{}", camel_code(&name).to_uppercase()),
                    &name,
                    PGR_MODULE,
                    DERIVED_LOCALE,
                );
                if self.labels.push(label.clone()) {
                    out.localizations.push(label);
                }
                Some(ParentType::from_row(row, name, codes))
            }
            None => parent,
        };

        if let Some(sub_type) = row.text(COL_SUB_TYPE) {
            let service_code = camel_code(&sub_type);
            let mut data = Map::new();
            data.insert("serviceCode".into(), json!(service_code));
            data.insert("name".into(), json!(sub_type));
            data.insert(
                "menuPath".into(),
                json!(parent.as_ref().map(|p| p.name.as_str()).unwrap_or(sub_type.as_str())),
            );
            data.insert("active".into(), json!(true));
            if let Some(p) = &parent {
                if let Some(d) = &p.department {
                    data.insert("department".into(), json!(d));
                }
                if let Some(h) = p.sla_hours.filter(|h| *h != 0) {
                    data.insert("slaHours".into(), json!(h));
                }
                if let Some(k) = &p.keywords {
                    data.insert("keywords".into(), json!(k));
                }
                if let Some(pr) = p.priority.filter(|p| *p != 0) {
                    data.insert("priority".into(), json!(pr));
                }
            }

            let label = LocalizationMessage::new(
                &format!("SERVICEDFS.{}", service_code.to_uppercase()),
                &sub_type,
                PGR_MODULE,
                DERIVED_LOCALE,
            );
            if self.labels.push(label.clone()) {
                out.localizations.push(label);
            }
            out.record = Some(
                MasterRecord::new(RecordKind::ServiceDefinition, self.tenant_id, data)
                    .with_source_row(row.index()),
            );
        }

        (parent, out)
    }
}

/// Read the complaint type sheet, children inheriting their parent's fields
pub fn read_complaint_types(
    sheet: &Sheet,
    tenant_id: &str,
    department_codes: Option<&HashMap<String, String>>,
) -> Result<ParsedSheet, WorkbookError> {
    sheet.require_columns(&[COL_COMPLAINT_TYPE, COL_SUB_TYPE])?;

    let mut parsed = ParsedSheet::new();
    let mut reader = ComplaintTypeReader::new(tenant_id, department_codes);
    let mut parent = None;

    for row in sheet.rows() {
        if row.is_blank(COL_COMPLAINT_TYPE) && row.is_blank(COL_SUB_TYPE) {
            parsed.skipped += 1;
            continue;
        }
        let (next, out) = reader.step(parent, &row);
        parent = next;
        parsed.records.extend(out.record);
        parsed.localizations.extend(out.localizations);
    }

    Ok(parsed)
}
