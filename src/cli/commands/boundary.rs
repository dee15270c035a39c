//! `dataloader boundary` command - boundary hierarchy tools

use clap::Subcommand;
use console::style;
use miette::{miette, IntoDiagnostic, Result};
use rust_xlsxwriter::Workbook as XlsxWorkbook;
use std::path::{Path, PathBuf};

use crate::cli::helpers::{connect, load_config};
use crate::cli::output::print_records;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{Cell, Sheet, Workbook};
use crate::core::workbook::write_sheet;
use crate::hierarchy::{self, detect_layout, Hierarchy, HierarchyNode, TemplateLayout};
use crate::reader::boundary::{read_hierarchy_definition, HIERARCHY_SHEET};
use crate::upload::BulkUploader;

/// Sheet name for flattened output
const FLAT_SHEET: &str = "Boundaries";

#[derive(Subcommand, Debug)]
pub enum BoundaryCommands {
    /// Convert a standard (code / boundaryType / parentCode) sheet to one column per level
    Flatten(FlattenArgs),

    /// Write boundaries into a copy of a template, keeping its layout
    FillTemplate(FillTemplateArgs),

    /// Count the boundaries the service holds for a hierarchy
    Verify(VerifyArgs),
}

#[derive(clap::Args, Debug)]
pub struct LevelArgs {
    /// Workbook with a standard boundary sheet
    #[arg(long)]
    pub file: PathBuf,

    /// Hierarchy levels, top first (default: the Hierarchy_Definition sheet)
    #[arg(long, value_delimiter = ',')]
    pub levels: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct FlattenArgs {
    #[command(flatten)]
    pub source: LevelArgs,

    /// Output workbook (default: print rows)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct FillTemplateArgs {
    #[command(flatten)]
    pub source: LevelArgs,

    /// Template workbook whose first sheet sets the layout
    #[arg(long)]
    pub template: PathBuf,

    /// Output workbook
    #[arg(long, short = 'o')]
    pub output: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Hierarchy type to search
    #[arg(long, default_value = "ADMIN")]
    pub hierarchy_type: String,

    /// Minimum number of boundaries expected
    #[arg(long)]
    pub expected: usize,
}

pub fn run(cmd: BoundaryCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        BoundaryCommands::Flatten(args) => flatten(args, global),
        BoundaryCommands::FillTemplate(args) => fill_template(args, global),
        BoundaryCommands::Verify(args) => verify(args, global),
    }
}

/// Standard-layout nodes and the level list from a workbook
fn read_source(source: &LevelArgs) -> Result<(Vec<HierarchyNode>, Vec<String>)> {
    let mut book = Workbook::open(&source.file).into_diagnostic()?;

    let levels = if !source.levels.is_empty() {
        source.levels.iter().map(|l| l.trim().to_string()).collect()
    } else if book.has_sheet(HIERARCHY_SHEET) {
        read_hierarchy_definition(&book.sheet(HIERARCHY_SHEET).into_diagnostic()?)
            .into_diagnostic()?
            .map(|d| d.levels())
            .unwrap_or_default()
    } else {
        Vec::new()
    };
    if levels.is_empty() {
        return Err(miette!(
            "No hierarchy levels: pass --levels or add a '{}' sheet",
            HIERARCHY_SHEET
        ));
    }

    for name in book.sheet_names() {
        if name == HIERARCHY_SHEET {
            continue;
        }
        let sheet = book.sheet(&name).into_diagnostic()?;
        if detect_layout(sheet.headers(), &levels) == TemplateLayout::Standard {
            let nodes = hierarchy::read_nodes(&sheet).into_diagnostic()?;
            return Ok((nodes, levels));
        }
    }
    Err(miette!(
        "{} has no sheet with 'code' and 'boundaryType' columns",
        source.file.display()
    ))
}

fn flatten(args: FlattenArgs, global: &GlobalOpts) -> Result<()> {
    let (nodes, levels) = read_source(&args.source)?;
    let tree = Hierarchy::new(nodes);
    if let Err(e) = tree.validate() {
        tracing::warn!(error = %e, "hierarchy is not a single well-formed tree");
    }
    let rows = tree.flatten(&levels);
    let sheet = flat_sheet(&levels, &rows);

    if let Some(output) = &args.output {
        write_flat(output, &sheet)?;
        if global.format.is_human() {
            println!(
                "{} Wrote {} row(s) to {}",
                style("✓").green(),
                rows.len(),
                output.display()
            );
        }
        return Ok(());
    }

    match global.format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let records: Vec<serde_json::Map<String, serde_json::Value>> = rows
                .iter()
                .map(|row| {
                    levels
                        .iter()
                        .zip(row)
                        .map(|(l, c)| {
                            let v = c.clone().map(serde_json::Value::String).unwrap_or(serde_json::Value::Null);
                            (l.clone(), v)
                        })
                        .collect()
                })
                .collect();
            print_records(&records, global.format)?;
        }
        OutputFormat::Auto | OutputFormat::Tsv => {
            println!("{}", levels.join("\t"));
            for row in &rows {
                let cells: Vec<&str> = row.iter().map(|c| c.as_deref().unwrap_or("")).collect();
                println!("{}", cells.join("\t"));
            }
        }
    }
    Ok(())
}

/// One column per level, one row per leaf
fn flat_sheet(levels: &[String], rows: &[hierarchy::LevelRow]) -> Sheet {
    Sheet::new(
        FLAT_SHEET,
        levels.to_vec(),
        rows.iter()
            .map(|row| {
                row.iter()
                    .map(|c| c.as_deref().map(Cell::from_text).unwrap_or(Cell::Absent))
                    .collect()
            })
            .collect(),
    )
}

fn write_flat(output: &Path, sheet: &Sheet) -> Result<()> {
    let mut book = XlsxWorkbook::new();
    write_sheet(book.add_worksheet(), sheet).into_diagnostic()?;
    book.save(output).into_diagnostic()
}

fn fill_template(args: FillTemplateArgs, global: &GlobalOpts) -> Result<()> {
    let (nodes, levels) = read_source(&args.source)?;
    let layout = hierarchy::fill_template(&args.template, &args.output, &nodes, &levels).into_diagnostic()?;

    if global.format.is_human() {
        let note = match layout {
            TemplateLayout::Standard => "standard layout",
            TemplateLayout::ColumnPerLevel => "column-per-level layout",
            TemplateLayout::Unknown => "unrecognized template, wrote standard layout",
        };
        println!(
            "{} Filled {} boundaries into {} ({})",
            style("✓").green(),
            nodes.len(),
            args.output.display(),
            note
        );
    }
    Ok(())
}

fn verify(args: VerifyArgs, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global);
    let tenant = config.target_tenant();
    let client = connect(&config)?;
    let result = BulkUploader::new(&client)
        .verify_boundaries(&tenant, &args.hierarchy_type, args.expected)
        .into_diagnostic()?;

    match global.format {
        OutputFormat::Auto => {
            let glyph = if result.passed {
                style("✓").green()
            } else {
                style("✗").red()
            };
            println!(
                "{} {} boundaries found for {} / {} ({} expected)",
                glyph, result.found, tenant, args.hierarchy_type, result.expected
            );
        }
        format => print_records(std::slice::from_ref(&result), format)?,
    }

    if result.passed {
        Ok(())
    } else {
        Err(miette!(
            "Boundary verification failed: {} found, {} expected",
            result.found,
            result.expected
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_book(dir: &Path, with_definition: bool) -> PathBuf {
        let path = dir.join("boundaries.xlsx");
        let mut book = XlsxWorkbook::new();
        if with_definition {
            let def = Sheet::from_strings(
                HIERARCHY_SHEET,
                &["City Code", "Hierarchy Type", "Level 1", "Level 2"],
                &[vec!["pg.citya", "ADMIN", "City", "Ward"]],
            );
            write_sheet(book.add_worksheet(), &def).unwrap();
        }
        let nodes = Sheet::from_strings(
            "Boundary",
            &["code", "name", "boundaryType", "parentCode"],
            &[
                vec!["TS", "Test City", "City", ""],
                vec!["TS_W1", "", "Ward", "TS"],
                vec!["TS_W2", "", "Ward", "TS"],
            ],
        );
        write_sheet(book.add_worksheet(), &nodes).unwrap();
        book.save(&path).unwrap();
        path
    }

    #[test]
    fn test_read_source_levels_from_definition() {
        let dir = tempfile::tempdir().unwrap();
        let source = LevelArgs {
            file: source_book(dir.path(), true),
            levels: Vec::new(),
        };
        let (nodes, levels) = read_source(&source).unwrap();
        assert_eq!(levels, vec!["City", "Ward"]);
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn test_read_source_needs_levels() {
        let dir = tempfile::tempdir().unwrap();
        let source = LevelArgs {
            file: source_book(dir.path(), false),
            levels: Vec::new(),
        };
        assert!(read_source(&source).is_err());
    }

    #[test]
    fn test_flatten_writes_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("flat.xlsx");
        let args = FlattenArgs {
            source: LevelArgs {
                file: source_book(dir.path(), false),
                levels: vec!["City".into(), "Ward".into()],
            },
            output: Some(output.clone()),
        };
        flatten(args, &GlobalOpts::default()).unwrap();

        let sheet = Workbook::open(&output).unwrap().sheet(FLAT_SHEET).unwrap();
        assert_eq!(sheet.headers(), &["City".to_string(), "Ward".to_string()]);
        assert_eq!(sheet.len(), 2);
        let row = sheet.row(1).unwrap();
        assert_eq!(row.text("City").as_deref(), Some("TS"));
        assert_eq!(row.text("Ward").as_deref(), Some("TS_W2"));
    }
}
