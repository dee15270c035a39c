//! Built-in schemas compiled into the binary

use rust_embed::Embed;
use std::path::Path;

use crate::schema::definition::{SchemaDefinition, SchemaError};

#[derive(Embed)]
#[folder = "schemas/"]
struct EmbeddedSchemas;

/// Schema used when `validate` is given none
pub const DEFAULT_SCHEMA: &str = "pgr_master_data";

/// Lookup over the embedded `schemas/*.yaml` files
pub struct SchemaRegistry;

impl SchemaRegistry {
    /// Built-in schema names, sorted
    pub fn names() -> Vec<String> {
        let mut names: Vec<String> = EmbeddedSchemas::iter()
            .filter_map(|f| {
                f.strip_suffix(".yaml")
                    .or_else(|| f.strip_suffix(".yml"))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    /// Raw YAML of a built-in schema
    pub fn source(name: &str) -> Option<String> {
        [format!("{}.yaml", name), format!("{}.yml", name)]
            .iter()
            .find_map(|file| EmbeddedSchemas::get(file))
            .map(|f| String::from_utf8_lossy(&f.data).into_owned())
    }

    pub fn get(name: &str) -> Result<SchemaDefinition, SchemaError> {
        let source = Self::source(name).ok_or_else(|| SchemaError::NotFound(name.to_string()))?;
        SchemaDefinition::from_yaml(name, &source)
    }

    /// A path to a YAML file, or else a built-in name
    pub fn resolve(name_or_path: &str) -> Result<SchemaDefinition, SchemaError> {
        let path = Path::new(name_or_path);
        if path.is_file() {
            return SchemaDefinition::load(path);
        }
        Self::get(name_or_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schemas_parse() {
        let names = SchemaRegistry::names();
        assert!(names.contains(&DEFAULT_SCHEMA.to_string()));
        for name in names {
            let schema = SchemaRegistry::get(&name).unwrap();
            assert!(
                !schema.sheets.is_empty() || !schema.validation_rules.is_empty(),
                "{} is empty",
                name
            );
            // Every pattern compiles
            crate::schema::validator::Validator::new(&schema).unwrap();
        }
    }

    #[test]
    fn test_unknown_schema() {
        assert!(matches!(
            SchemaRegistry::get("no_such_schema"),
            Err(SchemaError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "sheets:\n  - name: Custom\n    columns: []\n").unwrap();
        let schema = SchemaRegistry::resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(schema.sheets[0].name, "Custom");
    }
}
