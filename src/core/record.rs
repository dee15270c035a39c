//! Normalized master-data records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The domain a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Tenant,
    Branding,
    Department,
    Designation,
    ServiceDefinition,
    Employee,
    BoundaryEntity,
    BoundaryRelationship,
    WorkflowState,
    WorkflowAction,
}

impl RecordKind {
    /// MDMS schema code for kinds stored in MDMS
    pub fn schema_code(&self) -> Option<&'static str> {
        match self {
            RecordKind::Tenant => Some("tenant.tenants"),
            RecordKind::Branding => Some("tenant.branding"),
            RecordKind::Department => Some("common-masters.Department"),
            RecordKind::Designation => Some("common-masters.Designation"),
            RecordKind::ServiceDefinition => Some("RAINMAKER-PGR.ServiceDefs"),
            _ => None,
        }
    }

    /// Human label used in reports and error workbook sheet names
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Tenant => "Tenant Info",
            RecordKind::Branding => "Tenant Branding",
            RecordKind::Department => "Department",
            RecordKind::Designation => "Designation",
            RecordKind::ServiceDefinition => "Complaint Type",
            RecordKind::Employee => "Employee",
            RecordKind::BoundaryEntity => "Boundary Entities",
            RecordKind::BoundaryRelationship => "Boundary Relationships",
            RecordKind::WorkflowState => "Workflow States",
            RecordKind::WorkflowAction => "Workflow Actions",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One domain object ready for upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterRecord {
    pub kind: RecordKind,
    pub tenant_id: String,
    pub data: Map<String, Value>,
    /// Zero-based data row in the source sheet, when the record came from one
    pub source_row: Option<usize>,
}

impl MasterRecord {
    pub fn new(kind: RecordKind, tenant_id: &str, data: Map<String, Value>) -> Self {
        Self {
            kind,
            tenant_id: tenant_id.to_string(),
            data,
            source_row: None,
        }
    }

    pub fn with_source_row(mut self, row: usize) -> Self {
        self.source_row = Some(row);
        self
    }

    /// Correlation identifier: `code`, `serviceCode`, `userName`, then position
    ///
    /// `position` is the 1-based place of the record in its batch.
    pub fn unique_identifier(&self, position: usize) -> String {
        ["code", "serviceCode", "userName"]
            .iter()
            .find_map(|key| self.str_field(key))
            .unwrap_or_else(|| position.to_string())
    }

    /// A non-empty string field
    pub fn str_field(&self, key: &str) -> Option<String> {
        match self.data.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

/// A localization message, uploaded in per-locale batches
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalizationMessage {
    pub code: String,
    pub message: String,
    pub module: String,
    pub locale: String,
}

impl LocalizationMessage {
    pub fn new(code: &str, message: &str, module: &str, locale: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            module: module.to_string(),
            locale: locale.to_string(),
        }
    }
}
