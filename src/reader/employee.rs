//! Employee sheet (HRMS)

use serde_json::{json, Map, Value};

use crate::core::record::{MasterRecord, RecordKind};
use crate::core::workbook::{Row, Sheet, WorkbookError};
use crate::reader::{split_list, ParsedSheet};

pub const EMPLOYEE_SHEET: &str = "Employee";

pub const COL_CODE: &str = "Employee Code";
pub const COL_TENANT: &str = "Tenant ID";
pub const COL_MOBILE: &str = "User Mobile Number";
pub const COL_NAME: &str = "User Name";

const REQUIRED: [&str; 4] = [COL_CODE, COL_TENANT, COL_MOBILE, COL_NAME];

/// Read employees with their single assignment and jurisdiction
///
/// Dates become epoch milliseconds, the form HRMS expects.
pub fn read_employees(sheet: &Sheet) -> Result<ParsedSheet, WorkbookError> {
    sheet.require_columns(&REQUIRED)?;

    let mut parsed = ParsedSheet::new();
    for row in sheet.rows() {
        let (Some(code), Some(tenant)) = (row.text(COL_CODE), row.text(COL_TENANT)) else {
            parsed.skipped += 1;
            continue;
        };
        let data = employee_payload(&row, &code, &tenant);
        parsed
            .records
            .push(MasterRecord::new(RecordKind::Employee, &tenant, data).with_source_row(row.index()));
    }
    Ok(parsed)
}

fn employee_payload(row: &Row<'_>, code: &str, tenant: &str) -> Map<String, Value> {
    let text = |col: &str| row.text(col).map(Value::String).unwrap_or(Value::Null);
    let millis = |col: &str| {
        row.cell(col)
            .as_epoch_millis()
            .map(Value::from)
            .unwrap_or(Value::Null)
    };

    let jurisdiction_tenant = row.text("Jurisdiction Tenant ID").unwrap_or_else(|| tenant.to_string());
    let roles = |col: &str, tenant_id: &str| -> Vec<Value> {
        row.text(col)
            .map(|v| split_list(&v))
            .unwrap_or_default()
            .into_iter()
            .map(|code| json!({"code": code, "name": code, "tenantId": tenant_id}))
            .collect()
    };

    let user = json!({
        "mobileNumber": text(COL_MOBILE),
        "name": text(COL_NAME),
        "emailId": row.text("User Email").unwrap_or_default(),
        "gender": text("User Gender"),
        "dob": millis("User Date of Birth"),
        "correspondenceAddress": text("User Correspondence Address"),
        "roles": roles("User Roles (comma separated)", tenant),
    });

    let assignment = json!({
        "fromDate": millis("Assignment From Date"),
        "toDate": millis("Assignment To Date"),
        "isCurrentAssignment": row.is_true("Is Current Assignment"),
        "department": text("Department Code"),
        "designation": text("Designation Code"),
    });

    let jurisdiction = json!({
        "hierarchy": text("Jurisdiction Hierarchy"),
        "boundaryType": text("Jurisdiction Boundary Type"),
        "boundary": text("Jurisdiction Boundary Code"),
        "tenantId": jurisdiction_tenant,
        "roles": roles("Jurisdiction Roles (comma separated)", &jurisdiction_tenant),
    });

    let single = |col: &str| -> Value {
        match row.text(col) {
            Some(v) => json!([v]),
            None => json!([]),
        }
    };

    let mut data = Map::new();
    data.insert("code".into(), json!(code));
    data.insert("tenantId".into(), json!(tenant));
    data.insert("employeeStatus".into(), text("Employee Status"));
    data.insert("employeeType".into(), text("Employee Type"));
    data.insert("dateOfAppointment".into(), millis("Date of Appointment"));
    data.insert("assignments".into(), json!([assignment]));
    data.insert("user".into(), user);
    data.insert("jurisdictions".into(), json!([jurisdiction]));
    data.insert("serviceHistory".into(), single("Service History"));
    data.insert("education".into(), single("Education"));
    data.insert("tests".into(), single("Tests"));
    data
}
