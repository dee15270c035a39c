//! `dataloader schema` command - inspect the built-in template schemas

use clap::Subcommand;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{escape_tsv, truncate_str};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::schema::{ColumnSchema, SchemaDefinition, SchemaRegistry};

#[derive(Subcommand, Debug)]
pub enum SchemaCommands {
    /// List the built-in schemas
    List,

    /// Show the sheets and columns of a schema
    Show(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Built-in schema name, or a path to a schema YAML file
    pub schema: String,

    /// Print the schema YAML as-is
    #[arg(long)]
    pub raw: bool,
}

pub fn run(cmd: SchemaCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        SchemaCommands::List => list_schemas(global),
        SchemaCommands::Show(args) => show_schema(args, global),
    }
}

fn list_schemas(global: &GlobalOpts) -> Result<()> {
    let mut schemas = Vec::new();
    for name in SchemaRegistry::names() {
        let schema = SchemaRegistry::get(&name).into_diagnostic()?;
        schemas.push((name, schema));
    }

    match global.format {
        OutputFormat::Auto => {
            println!("Built-in schemas:\n");
            println!("{:<20} {:<7} {}", "NAME", "SHEETS", "DESCRIPTION");
            println!("{}", "-".repeat(70));
            for (name, schema) in &schemas {
                let desc = schema.description.as_deref().unwrap_or("");
                println!(
                    "{:<20} {:<7} {}",
                    name,
                    schema.sheets.len(),
                    truncate_str(desc.trim(), 42)
                );
            }
            println!("\nUse 'dataloader schema show <name>' for column details");
        }
        OutputFormat::Tsv => {
            for (name, schema) in &schemas {
                println!(
                    "{}\t{}\t{}",
                    name,
                    schema.sheets.len(),
                    escape_tsv(schema.description.as_deref().unwrap_or("").trim())
                );
            }
        }
        OutputFormat::Json => {
            let named: Vec<_> = schemas.iter().map(|(_, s)| s).collect();
            println!("{}", serde_json::to_string_pretty(&named).into_diagnostic()?);
        }
        OutputFormat::Yaml => {
            let named: Vec<_> = schemas.iter().map(|(_, s)| s).collect();
            print!("{}", serde_yml::to_string(&named).into_diagnostic()?);
        }
    }
    Ok(())
}

fn show_schema(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    if args.raw {
        let source = match SchemaRegistry::source(&args.schema) {
            Some(source) => source,
            None => std::fs::read_to_string(&args.schema).map_err(|_| {
                miette::miette!(
                    "Unknown schema '{}'. Available: {}",
                    args.schema,
                    SchemaRegistry::names().join(", ")
                )
            })?,
        };
        print!("{}", source);
        return Ok(());
    }

    let schema = SchemaRegistry::resolve(&args.schema).into_diagnostic()?;
    match global.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&schema).into_diagnostic()?),
        OutputFormat::Yaml => print!("{}", serde_yml::to_string(&schema).into_diagnostic()?),
        OutputFormat::Tsv => {
            for sheet in &schema.sheets {
                for column in &sheet.columns {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        escape_tsv(&sheet.name),
                        escape_tsv(&column.name),
                        column.column_type,
                        if column.required { "yes" } else { "" },
                        escape_tsv(&constraints(column))
                    );
                }
            }
        }
        OutputFormat::Auto => print_schema(&args.schema, &schema),
    }
    Ok(())
}

fn print_schema(name: &str, schema: &SchemaDefinition) {
    let title = schema.name.as_deref().unwrap_or(name);
    println!("{}", title);
    println!("{}", "=".repeat(title.chars().count()));
    if let Some(desc) = &schema.description {
        println!("{}", desc.trim());
    }

    for sheet in &schema.sheets {
        println!();
        match sheet.max_rows {
            Some(max) => println!("Sheet: {} (max {} rows)", sheet.name, max),
            None => println!("Sheet: {}", sheet.name),
        }
        println!("{:<36} {:<11} {:<4} {}", "COLUMN", "TYPE", "REQ", "CONSTRAINTS");
        println!("{}", "-".repeat(90));
        for column in &sheet.columns {
            println!(
                "{:<36} {:<11} {:<4} {}",
                truncate_str(&escape_tsv(&column.name), 36),
                column.column_type.to_string(),
                if column.required { "yes" } else { "" },
                truncate_str(&constraints(column), 40)
            );
        }
    }

    if !schema.validation_rules.is_empty() {
        println!("\nRules:");
        for rule in &schema.validation_rules {
            let scope = match (&rule.sheet, rule.columns.is_empty()) {
                (Some(sheet), false) => format!(" ({}: {})", sheet, rule.columns.join(", ")),
                (Some(sheet), true) => format!(" ({})", sheet),
                (None, _) => String::new(),
            };
            println!("  {}{}", rule.rule, scope);
        }
    }
}

/// One-line summary of a column's checks
fn constraints(column: &ColumnSchema) -> String {
    let mut parts = Vec::new();
    match (column.min_length, column.max_length) {
        (Some(min), Some(max)) => parts.push(format!("len {}..{}", min, max)),
        (Some(min), None) => parts.push(format!("len >= {}", min)),
        (None, Some(max)) => parts.push(format!("len <= {}", max)),
        (None, None) => {}
    }
    match (column.min_value, column.max_value) {
        (Some(min), Some(max)) => parts.push(format!("{}..{}", min, max)),
        (Some(min), None) => parts.push(format!(">= {}", min)),
        (None, Some(max)) => parts.push(format!("<= {}", max)),
        (None, None) => {}
    }
    if let Some(pattern) = &column.pattern {
        parts.push(format!("/{}/", pattern));
    }
    if !column.allowed.is_empty() {
        parts.push(format!("one of {}", column.allowed.join("|")));
    }
    if let Some(reference) = &column.reference {
        parts.push(format!("-> {}.{}", reference.sheet, reference.column));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, Reference};

    fn column() -> ColumnSchema {
        ColumnSchema {
            name: "Resolution Time (Hours)*".into(),
            column_type: ColumnType::Integer,
            required: true,
            min_length: None,
            max_length: None,
            min_value: Some(1.0),
            max_value: Some(720.0),
            pattern: None,
            allowed: Vec::new(),
            reference: None,
            description: None,
        }
    }

    #[test]
    fn test_constraints_range() {
        assert_eq!(constraints(&column()), "1..720");
    }

    #[test]
    fn test_constraints_combined() {
        let mut col = column();
        col.min_value = None;
        col.max_value = None;
        col.max_length = Some(64);
        col.allowed = vec!["HIGH".into(), "LOW".into()];
        col.reference = Some(Reference {
            template: None,
            sheet: "Department And Desgination Mast".into(),
            column: "Department Name*".into(),
        });
        assert_eq!(
            constraints(&col),
            "len <= 64, one of HIGH|LOW, -> Department And Desgination Mast.Department Name*"
        );
    }
}
