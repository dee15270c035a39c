//! Schema system - declarative workbook schemas and validation

pub mod definition;
pub mod registry;
pub mod validator;

pub use definition::{ColumnSchema, ColumnType, Reference, Rule, SchemaDefinition, SchemaError, SheetSchema};
pub use registry::{SchemaRegistry, DEFAULT_SCHEMA};
pub use validator::{validate, IssueKind, ValidationIssue, ValidationResult, Validator};
