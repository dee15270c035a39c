//! Console output: per-record progress lines and phase summaries

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::truncate_str;
use crate::cli::OutputFormat;
use crate::upload::{LanguageUpdate, Outcome, ProgressSink, UploadResult};

/// Prints one glyph line per upload call
pub struct ConsoleProgress {
    quiet: bool,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_result(&self, position: usize, total: usize, id: &str, outcome: &Outcome) {
        if self.quiet {
            return;
        }
        let counter = format!("[{}/{}]", position, total);
        match outcome {
            Outcome::Created => {
                println!("  {} {} {}", style("✓").green(), style(counter).dim(), id)
            }
            Outcome::AlreadyExists => println!(
                "  {} {} {} {}",
                style("○").yellow(),
                style(counter).dim(),
                id,
                style("(exists)").dim()
            ),
            Outcome::Failed(failure) => println!(
                "  {} {} {} - {}",
                style("✗").red(),
                style(counter).dim(),
                id,
                truncate_str(&failure.to_string(), 120)
            ),
        }
    }
}

/// Totals for one upload step of a phase
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub step: String,
    pub created: usize,
    pub exists: usize,
    pub failed: usize,
}

impl StepSummary {
    pub fn new(step: &str, result: &UploadResult) -> Self {
        Self {
            step: step.to_string(),
            created: result.created,
            exists: result.exists,
            failed: result.failed,
        }
    }

    /// Language-picker counts: updated as created, already listed as exists
    pub fn languages(step: &str, update: &LanguageUpdate) -> Self {
        Self {
            step: step.to_string(),
            created: update.updated,
            exists: update.skipped,
            failed: update.failed,
        }
    }

    /// A step made of one call
    pub fn single(step: &str, outcome: &Outcome) -> Self {
        Self {
            step: step.to_string(),
            created: usize::from(matches!(outcome, Outcome::Created)),
            exists: usize::from(matches!(outcome, Outcome::AlreadyExists)),
            failed: usize::from(matches!(outcome, Outcome::Failed(_))),
        }
    }
}

/// Print phase totals in the requested format
pub fn print_summary(title: &str, steps: &[StepSummary], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Auto => {
            println!();
            println!("{}", style(title).bold());
            print!("{}", summary_table(steps));
            println!();
        }
        _ => print_records(steps, format)?,
    }
    Ok(())
}

/// Markdown table of step totals with a closing total row
pub fn summary_table(steps: &[StepSummary]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Step", "Created", "Exists", "Failed"]);
    let (mut created, mut exists, mut failed) = (0, 0, 0);
    for s in steps {
        builder.push_record([
            s.step.clone(),
            s.created.to_string(),
            s.exists.to_string(),
            s.failed.to_string(),
        ]);
        created += s.created;
        exists += s.exists;
        failed += s.failed;
    }
    if steps.len() > 1 {
        builder.push_record([
            "Total".to_string(),
            created.to_string(),
            exists.to_string(),
            failed.to_string(),
        ]);
    }
    format!("{}\n", builder.build().with(Style::markdown()))
}

/// Serialize rows as JSON, YAML or TSV
pub fn print_records<T: Serialize>(rows: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json | OutputFormat::Auto => {
            println!("{}", serde_json::to_string_pretty(rows).into_diagnostic()?)
        }
        OutputFormat::Yaml => print!("{}", serde_yml::to_string(rows).into_diagnostic()?),
        OutputFormat::Tsv => print!("{}", to_tsv(rows)?),
    }
    Ok(())
}

/// Rows of flat structs as tab-separated values with a header line
pub fn to_tsv<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).into_diagnostic()?;
    }
    let bytes = writer.into_inner().into_diagnostic()?;
    String::from_utf8(bytes).into_diagnostic()
}
