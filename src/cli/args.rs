//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::commands::{
    boundary::BoundaryCommands, completions::CompletionsArgs, load::LoadCommands,
    rollback::RollbackCommands, schema::SchemaCommands, validate::ValidateArgs,
};

#[derive(Parser)]
#[command(name = "dataloader")]
#[command(author, version, about = "DIGIT Data Loader")]
#[command(long_about = "Validate Excel master-data templates and bulk-load them into DIGIT services (MDMS, HRMS, boundary, localization, workflow).")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress per-record output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// DIGIT gateway URL (overrides DIGIT_URL and config files)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Login username (overrides DIGIT_USERNAME)
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Tenant to load into (overrides TARGET_TENANT)
    #[arg(long, global = true)]
    pub tenant: Option<String>,

    /// Tenant used for login (overrides ROOT_TENANT)
    #[arg(long, global = true)]
    pub root_tenant: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate workbooks against a template schema
    Validate(ValidateArgs),

    /// Read a template and upload it to DIGIT
    #[command(subcommand)]
    Load(LoadCommands),

    /// Boundary hierarchy tools (flatten, fill a template, verify)
    #[command(subcommand)]
    Boundary(BoundaryCommands),

    /// Deactivate previously loaded MDMS records
    #[command(subcommand)]
    Rollback(RollbackCommands),

    /// Inspect the built-in validation schemas
    #[command(subcommand)]
    Schema(SchemaCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Output format for results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text and tables
    #[default]
    Auto,
    /// JSON (for programming)
    Json,
    /// YAML
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
}

impl OutputFormat {
    /// Whether results should be printed as text for a person
    pub fn is_human(&self) -> bool {
        matches!(self, OutputFormat::Auto)
    }
}
