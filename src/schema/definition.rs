//! Declarative workbook schemas
//!
//! A schema names the sheets a template must contain, the columns of each
//! sheet with their type and constraints, and workbook-level rules.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to read schema {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse schema '{name}': {message}")]
    Parse { name: String, message: String },

    #[error("Unknown schema '{0}'. Run 'dataloader schema list' to see built-in schemas")]
    NotFound(String),

    #[error("Invalid pattern for column '{column}': {message}")]
    InvalidPattern { column: String, message: String },
}

/// A complete schema file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub sheets: Vec<SheetSchema>,

    #[serde(default)]
    pub validation_rules: Vec<RuleSpec>,
}

impl SchemaDefinition {
    pub fn from_yaml(name: &str, source: &str) -> Result<Self, SchemaError> {
        serde_yml::from_str(source).map_err(|e| SchemaError::Parse {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let source = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&path.display().to_string(), &source)
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetSchema> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn rules(&self) -> impl Iterator<Item = Rule> + '_ {
        self.validation_rules.iter().map(Rule::from_spec)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetSchema {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub max_rows: Option<usize>,

    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

impl SheetSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Email,
    Url,
    JsonArray,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Email => "email",
            ColumnType::Url => "url",
            ColumnType::JsonArray => "json_array",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,

    #[serde(rename = "type", default)]
    pub column_type: ColumnType,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub min_length: Option<usize>,

    #[serde(default)]
    pub max_length: Option<usize>,

    #[serde(default)]
    pub min_value: Option<f64>,

    #[serde(default)]
    pub max_value: Option<f64>,

    #[serde(default)]
    pub pattern: Option<String>,

    /// Allowed values, stringified
    #[serde(rename = "enum", default, deserialize_with = "stringified_list")]
    pub allowed: Vec<String>,

    #[serde(default)]
    pub reference: Option<Reference>,

    #[serde(default)]
    pub description: Option<String>,
}

/// Values of this column must appear in another sheet's column(s)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Workbook holding the sheet; absent or `self` means the file under validation
    #[serde(default)]
    pub template: Option<String>,
    pub sheet: String,
    /// One column, or several joined by commas
    pub column: String,
}

impl Reference {
    /// Sentinels naming the workbook being validated
    const SELF_NAMES: [&'static str; 3] = ["SELF", "CURRENT", "THIS"];

    pub fn is_self(&self) -> bool {
        match &self.template {
            None => true,
            Some(t) => {
                let t = t.trim();
                t.is_empty() || Self::SELF_NAMES.contains(&t.to_uppercase().as_str())
            }
        }
    }

    pub fn columns(&self) -> Vec<&str> {
        self.column
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect()
    }
}

/// A workbook-level rule as written in the schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub rule: String,

    #[serde(default)]
    pub sheet: Option<String>,

    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// A rule the validator knows how to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// `unique_*`: no duplicate values in the named columns
    Unique {
        sheet: Option<String>,
        columns: Vec<String>,
    },
    SingleStartState {
        sheet: Option<String>,
    },
    AtLeastOneEndState {
        sheet: Option<String>,
    },
    /// Declared for documentation; references are checked per column
    ForeignKey,
    Unknown(String),
}

impl Rule {
    pub fn from_spec(spec: &RuleSpec) -> Self {
        match spec.rule.as_str() {
            "single_start_state" => Rule::SingleStartState {
                sheet: spec.sheet.clone(),
            },
            "at_least_one_end_state" => Rule::AtLeastOneEndState {
                sheet: spec.sheet.clone(),
            },
            "foreign_key" => Rule::ForeignKey,
            r if r.starts_with("unique_") => Rule::Unique {
                sheet: spec.sheet.clone(),
                columns: spec.columns.clone(),
            },
            other => Rule::Unknown(other.to_string()),
        }
    }
}

fn stringified_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<serde_yml::Value>> = Option::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match v {
            serde_yml::Value::String(s) => Some(s),
            serde_yml::Value::Bool(b) => Some(if b { "TRUE" } else { "FALSE" }.to_string()),
            serde_yml::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name: sample
sheets:
  - name: Employee
    max_rows: 100
    columns:
      - name: Employee Code
        type: string
        required: true
        pattern: "[A-Z]+-[0-9]+"
      - name: Is Active
        type: boolean
        enum: [TRUE, FALSE]
      - name: Department Code
        reference:
          template: self
          sheet: Departments
          column: Code, Alt Code
validation_rules:
  - rule: unique_codes
    sheet: Employee
    columns: [Employee Code]
  - rule: single_start_state
  - rule: something_else
"#;

    #[test]
    fn test_parse_sample() {
        let schema = SchemaDefinition::from_yaml("sample", SAMPLE).unwrap();
        let sheet = schema.sheet("Employee").unwrap();
        assert_eq!(sheet.max_rows, Some(100));
        assert_eq!(sheet.columns[0].column_type, ColumnType::String);
        assert!(sheet.columns[0].required);
        assert_eq!(sheet.columns[1].allowed, vec!["TRUE", "FALSE"]);
        assert_eq!(sheet.columns[2].column_type, ColumnType::String);

        let reference = sheet.columns[2].reference.as_ref().unwrap();
        assert!(reference.is_self());
        assert_eq!(reference.columns(), vec!["Code", "Alt Code"]);
    }

    #[test]
    fn test_rules() {
        let schema = SchemaDefinition::from_yaml("sample", SAMPLE).unwrap();
        let rules: Vec<Rule> = schema.rules().collect();
        assert_eq!(
            rules[0],
            Rule::Unique {
                sheet: Some("Employee".into()),
                columns: vec!["Employee Code".into()]
            }
        );
        assert_eq!(rules[1], Rule::SingleStartState { sheet: None });
        assert_eq!(rules[2], Rule::Unknown("something_else".into()));
    }

    #[test]
    fn test_reference_template_sentinels() {
        let mut r = Reference {
            template: Some("Current".into()),
            sheet: "S".into(),
            column: "C".into(),
        };
        assert!(r.is_self());
        r.template = Some("other.xlsx".into());
        assert!(!r.is_self());
    }

    #[test]
    fn test_parse_error() {
        let err = SchemaDefinition::from_yaml("bad", "sheets: [").unwrap_err();
        assert!(matches!(err, SchemaError::Parse { .. }));
    }
}
