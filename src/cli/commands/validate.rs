//! `dataloader validate` command - Validate workbooks against a template schema

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::cli::helpers::escape_tsv;
use crate::cli::output::print_records;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::schema::{SchemaRegistry, ValidationIssue, ValidationResult, Validator, DEFAULT_SCHEMA};

/// Issues shown per kind before the rest are elided
const DEFAULT_PER_KIND: usize = 10;

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Workbooks or directories to validate (directories are searched for .xlsx)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Built-in schema name or path to a schema YAML file
    #[arg(long, short = 's', default_value = DEFAULT_SCHEMA)]
    pub schema: String,

    /// Strict mode - warnings become errors
    #[arg(long)]
    pub strict: bool,

    /// Show summary only, don't show individual issues
    #[arg(long)]
    pub summary: bool,

    /// Issues listed per error kind
    #[arg(long, default_value_t = DEFAULT_PER_KIND)]
    pub limit: usize,
}

/// Validation statistics
#[derive(Default)]
struct ValidationStats {
    files_checked: usize,
    files_passed: usize,
    files_failed: usize,
    total_errors: usize,
    total_warnings: usize,
}

pub fn run(args: ValidateArgs, global: &GlobalOpts) -> Result<()> {
    let schema = SchemaRegistry::resolve(&args.schema).into_diagnostic()?;
    let mut validator = Validator::new(&schema).into_diagnostic()?;

    let files = expand_paths(&args.paths);
    if files.is_empty() {
        return Err(miette::miette!("No .xlsx files found"));
    }

    let human = global.format.is_human();
    if human && !global.quiet {
        println!(
            "{} Validating {} file(s) against '{}'...\n",
            style("→").blue(),
            files.len(),
            args.schema
        );
    }

    let mut stats = ValidationStats::default();
    let mut results = Vec::with_capacity(files.len());
    for path in &files {
        tracing::debug!(file = %path.display(), "validating");
        let result = validator.validate_file(path);

        stats.files_checked += 1;
        stats.total_errors += result.errors.len();
        stats.total_warnings += result.warnings.len();
        if passes(&result, args.strict) {
            stats.files_passed += 1;
        } else {
            stats.files_failed += 1;
        }

        if human && !args.summary {
            print_result(&result, args.limit);
        }
        results.push(result);
    }

    match global.format {
        OutputFormat::Auto => print_summary(&stats),
        OutputFormat::Tsv => print!("{}", issues_tsv(&results)),
        format => print_records(&results, format)?,
    }

    if stats.files_failed > 0 {
        if stats.files_failed == 1 {
            Err(miette::miette!("Validation failed: 1 file has errors"))
        } else {
            Err(miette::miette!(
                "Validation failed: {} files have errors",
                stats.files_failed
            ))
        }
    } else {
        if human {
            println!("{} All files passed validation!", style("✓").green().bold());
        }
        Ok(())
    }
}

fn passes(result: &ValidationResult, strict: bool) -> bool {
    result.valid && !(strict && !result.warnings.is_empty())
}

fn print_result(result: &ValidationResult, limit: usize) {
    let path = result.file.display();
    if !result.has_issues() {
        println!("{} {}", style("✓").green(), path);
        return;
    }

    if result.valid {
        println!(
            "{} {} - {} warning(s)",
            style("!").yellow(),
            path,
            result.warnings.len()
        );
    } else {
        println!(
            "{} {} - {} error(s), {} warning(s)",
            style("✗").red(),
            path,
            result.errors.len(),
            result.warnings.len()
        );
    }

    for (kind, issues) in result.errors_by_kind() {
        println!("    {} ({})", style(kind.code()).red().bold(), issues.len());
        for issue in issues.iter().take(limit) {
            println!("      {}", issue);
        }
        if issues.len() > limit {
            println!(
                "      {}",
                style(format!("... and {} more", issues.len() - limit)).dim()
            );
        }
    }
    for warning in &result.warnings {
        println!("    {} {}", style(warning.kind.code()).yellow(), warning);
    }
}

fn print_summary(stats: &ValidationStats) {
    println!();
    println!("{}", style("─".repeat(60)).dim());
    println!("{}", style("Validation Summary").bold());
    println!("{}", style("─".repeat(60)).dim());
    println!("  Files checked:  {}", style(stats.files_checked).cyan());
    println!("  Files passed:   {}", style(stats.files_passed).green());
    println!("  Files failed:   {}", style(stats.files_failed).red());
    println!("  Total errors:   {}", style(stats.total_errors).red());
    if stats.total_warnings > 0 {
        println!("  Total warnings: {}", style(stats.total_warnings).yellow());
    }
    println!();
}

/// One line per issue: file, severity, code, sheet, row, column, message
fn issues_tsv(results: &[ValidationResult]) -> String {
    let mut out = String::new();
    let mut line = |file: &Path, severity: &str, issue: &ValidationIssue| {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            file.display(),
            severity,
            issue.kind.code(),
            escape_tsv(issue.sheet.as_deref().unwrap_or("")),
            issue.row.map(|r| r.to_string()).unwrap_or_default(),
            escape_tsv(issue.column.as_deref().unwrap_or("")),
            escape_tsv(&issue.message)
        ));
    };
    for result in results {
        for issue in &result.errors {
            line(&result.file, "error", issue);
        }
        for issue in &result.warnings {
            line(&result.file, "warning", issue);
        }
    }
    out
}

/// Expand paths - directories contribute every .xlsx below them
///
/// Paths that do not exist are kept so they are reported as not found.
fn expand_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_workbook(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    files
}

/// `.xlsx` files, skipping Excel's `~$` lock files
fn is_workbook(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("xlsx")) && !name.starts_with("~$")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IssueKind;

    #[test]
    fn test_expand_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.xlsx"), b"").unwrap();
        std::fs::write(dir.path().join("a.xlsx"), b"").unwrap();
        std::fs::write(dir.path().join("~$a.xlsx"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let files = expand_paths(&[dir.path().to_path_buf(), PathBuf::from("missing.xlsx")]);
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.xlsx", "b.xlsx", "missing.xlsx"]);
    }

    #[test]
    fn test_strict_fails_on_warnings() {
        let result = ValidationResult {
            file: PathBuf::from("t.xlsx"),
            valid: true,
            errors: Vec::new(),
            warnings: vec![ValidationIssue::new(IssueKind::RuleCheckFailed, "no sheet")],
        };
        assert!(passes(&result, false));
        assert!(!passes(&result, true));
    }

    #[test]
    fn test_issues_tsv() {
        let result = ValidationResult {
            file: PathBuf::from("t.xlsx"),
            valid: false,
            errors: vec![ValidationIssue::new(IssueKind::ValidationError, "bad\tvalue")
                .in_sheet("Employee")
                .at(3, "User Name", None)],
            warnings: Vec::new(),
        };
        assert_eq!(
            issues_tsv(&[result]),
            "t.xlsx\terror\tVALIDATION_ERROR\tEmployee\t3\tUser Name\tbad value\n"
        );
    }
}
