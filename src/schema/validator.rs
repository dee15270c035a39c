//! Workbook validation against a [`SchemaDefinition`]
//!
//! Every problem becomes a [`ValidationIssue`]; nothing here returns early on
//! bad data. Problems applying a rule (a referenced sheet that cannot be
//! read, a flag column that is missing) are warnings, the rest are errors.

use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::core::cell::Cell;
use crate::core::workbook::{Sheet, Workbook};
use crate::reader::workflow::{COL_END, COL_START, STATES_SHEET};
use crate::schema::definition::{ColumnSchema, ColumnType, Rule, SchemaDefinition, SchemaError, SheetSchema};

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    MissingColumns,
    TooManyRows,
    ValidationError,
    ReferenceError,
    ReferenceLoadError,
    DuplicateError,
    WorkflowError,
    RuleCheckFailed,
    SheetError,
    FileNotFound,
}

impl IssueKind {
    pub fn code(&self) -> &'static str {
        match self {
            IssueKind::MissingColumns => "MISSING_COLUMNS",
            IssueKind::TooManyRows => "TOO_MANY_ROWS",
            IssueKind::ValidationError => "VALIDATION_ERROR",
            IssueKind::ReferenceError => "REFERENCE_ERROR",
            IssueKind::ReferenceLoadError => "REFERENCE_LOAD_ERROR",
            IssueKind::DuplicateError => "DUPLICATE_ERROR",
            IssueKind::WorkflowError => "WORKFLOW_ERROR",
            IssueKind::RuleCheckFailed => "RULE_CHECK_FAILED",
            IssueKind::SheetError => "SHEET_ERROR",
            IssueKind::FileNotFound => "FILE_NOT_FOUND",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Spreadsheet row number (header is row 1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    /// Every row involved, for duplicate findings
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sheet: None,
            row: None,
            rows: Vec::new(),
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn in_sheet(mut self, sheet: &str) -> Self {
        self.sheet = Some(sheet.to_string());
        self
    }

    pub fn at(mut self, row: usize, column: &str, value: Option<String>) -> Self {
        self.row = Some(row);
        self.column = Some(column.to_string());
        self.value = value;
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "[{}] ", sheet)?;
        }
        if let (Some(row), Some(column)) = (self.row, &self.column) {
            write!(f, "Row {}, Column '{}': ", row, column)?;
        }
        write!(f, "{}", self.message)
    }
}

/// Outcome of validating one workbook
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub file: PathBuf,
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn new(file: &Path) -> Self {
        Self {
            file: file.to_path_buf(),
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn has_issues(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }

    /// Errors grouped by kind, kinds in first-seen order
    pub fn errors_by_kind(&self) -> Vec<(IssueKind, Vec<&ValidationIssue>)> {
        let mut groups: Vec<(IssueKind, Vec<&ValidationIssue>)> = Vec::new();
        for issue in &self.errors {
            match groups.iter_mut().find(|(k, _)| *k == issue.kind) {
                Some((_, list)) => list.push(issue),
                None => groups.push((issue.kind, vec![issue])),
            }
        }
        groups
    }

    fn error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    fn warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }
}

/// Sheets loaded during a validation run, keyed by (file, sheet)
#[derive(Default)]
pub struct SheetCache {
    books: HashMap<PathBuf, Result<Workbook, String>>,
    sheets: HashMap<(PathBuf, String), Result<Rc<Sheet>, String>>,
}

impl SheetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a workbook once; later calls reuse the handle or the error
    pub fn open(&mut self, path: &Path) -> Result<(), String> {
        self.books
            .entry(path.to_path_buf())
            .or_insert_with(|| Workbook::open(path).map_err(|e| e.to_string()))
            .as_ref()
            .map(|_| ())
            .map_err(Clone::clone)
    }

    pub fn sheet(&mut self, path: &Path, name: &str) -> Result<Rc<Sheet>, String> {
        let key = (path.to_path_buf(), name.to_string());
        if let Some(hit) = self.sheets.get(&key) {
            return hit.clone();
        }
        let book = self
            .books
            .entry(path.to_path_buf())
            .or_insert_with(|| Workbook::open(path).map_err(|e| e.to_string()));
        let loaded = match book {
            Ok(book) => book.sheet(name).map(Rc::new).map_err(|e| e.to_string()),
            Err(e) => Err(e.clone()),
        };
        self.sheets.insert(key, loaded.clone());
        loaded
    }
}

/// Validates workbooks against one schema
pub struct Validator<'s> {
    schema: &'s SchemaDefinition,
    patterns: HashMap<(String, String), Regex>,
    email: Regex,
    cache: SheetCache,
}

impl<'s> Validator<'s> {
    /// Compile the schema's patterns; a bad pattern is a schema error
    pub fn new(schema: &'s SchemaDefinition) -> Result<Self, SchemaError> {
        let mut patterns = HashMap::new();
        for sheet in &schema.sheets {
            for column in &sheet.columns {
                if let Some(p) = &column.pattern {
                    // Anchored: the whole value must match
                    let re = Regex::new(&format!("^(?:{})$", p)).map_err(|e| {
                        SchemaError::InvalidPattern {
                            column: column.name.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    patterns.insert((sheet.name.clone(), column.name.clone()), re);
                }
            }
        }
        let email = Regex::new(EMAIL_PATTERN).map_err(|e| SchemaError::InvalidPattern {
            column: "email".to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            schema,
            patterns,
            email,
            cache: SheetCache::new(),
        })
    }

    pub fn validate_file(&mut self, path: &Path) -> ValidationResult {
        let mut result = ValidationResult::new(path);

        if !path.exists() {
            result.error(ValidationIssue::new(
                IssueKind::FileNotFound,
                format!("Excel file not found: {}", path.display()),
            ));
            result.valid = false;
            return result;
        }
        if let Err(e) = self.cache.open(path) {
            result.error(ValidationIssue::new(
                IssueKind::ValidationError,
                format!("Validation failed: {}", e),
            ));
            result.valid = false;
            return result;
        }

        let schema = self.schema;
        for sheet_schema in &schema.sheets {
            let sheet = match self.cache.sheet(path, &sheet_schema.name) {
                Ok(sheet) => sheet,
                Err(e) => {
                    result.error(
                        ValidationIssue::new(
                            IssueKind::SheetError,
                            format!("Sheet '{}': Error reading sheet: {}", sheet_schema.name, e),
                        )
                        .in_sheet(&sheet_schema.name),
                    );
                    continue;
                }
            };

            if !self.check_sheet(&sheet, sheet_schema, &mut result) {
                continue;
            }
            self.check_references(path, &sheet, sheet_schema, &mut result);
            self.check_unique_rules(&sheet, &mut result);
        }

        self.apply_workbook_rules(path, &mut result);

        result.valid = result.errors.is_empty();
        tracing::debug!(
            file = %path.display(),
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "validated"
        );
        result
    }

    /// Structure and cell checks; false when columns are missing
    fn check_sheet(&self, sheet: &Sheet, schema: &SheetSchema, result: &mut ValidationResult) -> bool {
        let missing = sheet.missing_columns(&schema.column_names());
        if !missing.is_empty() {
            result.error(
                ValidationIssue::new(
                    IssueKind::MissingColumns,
                    format!(
                        "Sheet '{}': Missing required columns: {}",
                        schema.name,
                        missing.join(", ")
                    ),
                )
                .in_sheet(&schema.name),
            );
            return false;
        }

        if let Some(max) = schema.max_rows {
            if sheet.len() > max {
                result.error(
                    ValidationIssue::new(
                        IssueKind::TooManyRows,
                        format!(
                            "Sheet '{}': Should have maximum {} row(s), found {}",
                            schema.name,
                            max,
                            sheet.len()
                        ),
                    )
                    .in_sheet(&schema.name),
                );
            }
        }

        for row in sheet.rows() {
            for column in &schema.columns {
                let cell = row.cell(&column.name);
                if let Err(message) = self.check_cell(&schema.name, column, cell) {
                    result.error(
                        ValidationIssue::new(IssueKind::ValidationError, message)
                            .in_sheet(&schema.name)
                            .at(row.excel_row(), &column.name, cell.as_text()),
                    );
                }
            }
        }
        true
    }

    fn check_cell(&self, sheet: &str, column: &ColumnSchema, cell: &Cell) -> Result<(), String> {
        let Some(text) = cell.as_text() else {
            return if column.required {
                Err("Required field is empty".to_string())
            } else {
                Ok(())
            };
        };

        match column.column_type {
            ColumnType::String => {
                let len = text.chars().count();
                if let Some(min) = column.min_length {
                    if len < min {
                        return Err(format!("Minimum length is {}", min));
                    }
                }
                if let Some(max) = column.max_length {
                    if len > max {
                        return Err(format!("Maximum length is {}", max));
                    }
                }
            }
            ColumnType::Integer => {
                let n = cell
                    .as_i64()
                    .ok_or_else(|| format!("Expected integer, got '{}'", text))?;
                check_range(n as f64, column)?;
            }
            ColumnType::Float => {
                let n = cell
                    .as_f64()
                    .ok_or_else(|| format!("Expected number, got '{}'", text))?;
                check_range(n, column)?;
            }
            ColumnType::Boolean => {
                if !column.allowed.is_empty()
                    && !column.allowed.iter().any(|a| a.eq_ignore_ascii_case(&text))
                {
                    return Err(format!("Must be one of: {}", column.allowed.join(", ")));
                }
            }
            ColumnType::Email => {
                if !self.email.is_match(&text) {
                    return Err("Invalid email format".to_string());
                }
            }
            ColumnType::Url => {
                if !(text.starts_with("http://") || text.starts_with("https://")) {
                    return Err("URL must start with http:// or https://".to_string());
                }
            }
            ColumnType::JsonArray => match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(v) if v.is_array() => {}
                Ok(_) => return Err("Must be a JSON array".to_string()),
                Err(_) => return Err("Invalid JSON format".to_string()),
            },
        }

        if let Some(re) = self.patterns.get(&(sheet.to_string(), column.name.clone())) {
            if !re.is_match(&text) {
                return Err(format!(
                    "Does not match pattern: {}",
                    column.pattern.as_deref().unwrap_or_default()
                ));
            }
        }

        if column.column_type != ColumnType::Boolean
            && !column.allowed.is_empty()
            && !column.allowed.contains(&text)
        {
            return Err(format!("Must be one of: {}", column.allowed.join(", ")));
        }

        Ok(())
    }

    /// One REFERENCE_ERROR per row whose value is not in the target column(s)
    fn check_references(
        &mut self,
        path: &Path,
        sheet: &Sheet,
        schema: &SheetSchema,
        result: &mut ValidationResult,
    ) {
        for column in &schema.columns {
            let Some(reference) = &column.reference else { continue };

            let source = if reference.is_self() {
                path.to_path_buf()
            } else {
                let template = reference.template.as_deref().unwrap_or_default().trim();
                path.parent()
                    .map(|dir| dir.join(template))
                    .unwrap_or_else(|| PathBuf::from(template))
            };

            let target = match self.cache.sheet(&source, &reference.sheet) {
                Ok(target) => target,
                Err(e) => {
                    result.warning(
                        ValidationIssue::new(
                            IssueKind::ReferenceLoadError,
                            format!("Failed to load reference data for '{}': {}", column.name, e),
                        )
                        .in_sheet(&schema.name),
                    );
                    continue;
                }
            };

            let target_columns: Vec<&str> = reference
                .columns()
                .into_iter()
                .filter(|c| target.has_column(c))
                .collect();
            if target_columns.is_empty() {
                result.warning(
                    ValidationIssue::new(
                        IssueKind::ReferenceLoadError,
                        format!(
                            "Failed to load reference data for '{}': column '{}' not found in sheet '{}'",
                            column.name, reference.column, reference.sheet
                        ),
                    )
                    .in_sheet(&schema.name),
                );
                continue;
            }

            let candidates: HashSet<String> = target
                .rows()
                .flat_map(|row| {
                    target_columns
                        .iter()
                        .filter_map(|c| row.text(c))
                        .collect::<Vec<_>>()
                })
                .collect();

            let origin = if reference.is_self() {
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            } else {
                reference.template.clone().unwrap_or_default()
            };

            for row in sheet.rows() {
                let Some(value) = row.text(&column.name) else { continue };
                if !candidates.contains(&value) {
                    result.error(
                        ValidationIssue::new(
                            IssueKind::ReferenceError,
                            format!(
                                "Value '{}' not found in {}/{}/{}",
                                value, origin, reference.sheet, reference.column
                            ),
                        )
                        .in_sheet(&schema.name)
                        .at(row.excel_row(), &column.name, Some(value.clone())),
                    );
                }
            }
        }
    }

    /// `unique_*` rules that target this sheet (or every sheet)
    fn check_unique_rules(&self, sheet: &Sheet, result: &mut ValidationResult) {
        for rule in self.schema.rules() {
            let Rule::Unique { sheet: target, columns } = rule else { continue };
            if target.as_deref().is_some_and(|t| t != sheet.name()) {
                continue;
            }
            for column in &columns {
                if !sheet.has_column(column) {
                    continue;
                }
                for (value, rows) in duplicate_rows(sheet, column) {
                    let listed: Vec<String> = rows.iter().map(|r| r.to_string()).collect();
                    let mut issue = ValidationIssue::new(
                        IssueKind::DuplicateError,
                        format!("Duplicate value '{}' found in rows: {}", value, listed.join(", ")),
                    )
                    .in_sheet(sheet.name());
                    issue.column = Some(column.clone());
                    issue.value = Some(value);
                    issue.rows = rows;
                    result.error(issue);
                }
            }
        }
    }

    fn apply_workbook_rules(&mut self, path: &Path, result: &mut ValidationResult) {
        let schema = self.schema;
        for rule in schema.rules() {
            match rule {
                Rule::SingleStartState { sheet } => {
                    let name = sheet.unwrap_or_else(|| STATES_SHEET.to_string());
                    match self.flag_count(path, &name, COL_START) {
                        Ok(0) => result.error(
                            ValidationIssue::new(
                                IssueKind::WorkflowError,
                                format!("No start state defined. One state must have \"{}\" = TRUE", COL_START),
                            )
                            .in_sheet(&name),
                        ),
                        Ok(1) => {}
                        Ok(n) => result.error(
                            ValidationIssue::new(
                                IssueKind::WorkflowError,
                                format!(
                                    "Multiple start states found ({}). Only one state can have \"{}\" = TRUE",
                                    n, COL_START
                                ),
                            )
                            .in_sheet(&name),
                        ),
                        Err(e) => result.warning(ValidationIssue::new(
                            IssueKind::RuleCheckFailed,
                            format!("Failed to apply rule 'single_start_state': {}", e),
                        )),
                    }
                }
                Rule::AtLeastOneEndState { sheet } => {
                    let name = sheet.unwrap_or_else(|| STATES_SHEET.to_string());
                    match self.flag_count(path, &name, COL_END) {
                        Ok(0) => result.error(
                            ValidationIssue::new(
                                IssueKind::WorkflowError,
                                format!(
                                    "No end state defined. At least one state must have \"{}\" = TRUE",
                                    COL_END
                                ),
                            )
                            .in_sheet(&name),
                        ),
                        Ok(_) => {}
                        Err(e) => result.warning(ValidationIssue::new(
                            IssueKind::RuleCheckFailed,
                            format!("Failed to apply rule 'at_least_one_end_state': {}", e),
                        )),
                    }
                }
                Rule::Unknown(name) => tracing::debug!(rule = %name, "ignoring unknown rule"),
                Rule::Unique { .. } | Rule::ForeignKey => {}
            }
        }
    }

    /// Rows whose `column` reads TRUE
    fn flag_count(&mut self, path: &Path, sheet: &str, column: &str) -> Result<usize, String> {
        let sheet = self.cache.sheet(path, sheet)?;
        if !sheet.has_column(column) {
            return Err(format!("column '{}' not found in sheet '{}'", column, sheet.name()));
        }
        Ok(sheet.rows().filter(|r| r.is_true(column)).count())
    }
}

fn check_range(n: f64, column: &ColumnSchema) -> Result<(), String> {
    if let Some(min) = column.min_value {
        if n < min {
            return Err(format!("Minimum value is {}", min));
        }
    }
    if let Some(max) = column.max_value {
        if n > max {
            return Err(format!("Maximum value is {}", max));
        }
    }
    Ok(())
}

/// Values appearing more than once, with every spreadsheet row they sit on
///
/// Blank cells never count as duplicates.
fn duplicate_rows(sheet: &Sheet, column: &str) -> Vec<(String, Vec<usize>)> {
    let mut order: Vec<String> = Vec::new();
    let mut rows: HashMap<String, Vec<usize>> = HashMap::new();
    for row in sheet.rows() {
        let Some(value) = row.text(column) else { continue };
        if !rows.contains_key(&value) {
            order.push(value.clone());
        }
        rows.entry(value).or_default().push(row.excel_row());
    }
    order
        .into_iter()
        .filter_map(|v| {
            let r = rows.remove(&v)?;
            (r.len() > 1).then_some((v, r))
        })
        .collect()
}

/// Validate one workbook file against a schema
pub fn validate(path: &Path, schema: &SchemaDefinition) -> Result<ValidationResult, SchemaError> {
    Ok(Validator::new(schema)?.validate_file(path))
}
