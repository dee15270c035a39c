//! `dataloader rollback` command - deactivate loaded MDMS records
//!
//! MDMS has no delete; rollback searches each schema and resubmits every
//! active record with `isActive: false`.

use clap::Subcommand;
use console::style;
use miette::{miette, IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{connect, load_config};
use crate::cli::output::print_records;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::RecordKind;
use crate::upload::{BulkUploader, RollbackResult, UploadOptions};

/// City-module enablement, written when a city is onboarded
const CITY_MODULE_SCHEMA: &str = "tenant.citymodule";

#[derive(Subcommand, Debug)]
pub enum RollbackCommands {
    /// Departments, designations and complaint types
    Masters(RollbackArgs),

    /// Tenants and their city-module entries
    Tenant(RollbackArgs),
}

#[derive(clap::Args, Debug)]
pub struct RollbackArgs {
    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl RollbackCommands {
    /// MDMS schemas the command deactivates, dependents first
    pub fn schema_codes(&self) -> Vec<&'static str> {
        match self {
            RollbackCommands::Masters(_) => [
                RecordKind::ServiceDefinition,
                RecordKind::Designation,
                RecordKind::Department,
            ]
            .iter()
            .filter_map(|k| k.schema_code())
            .collect(),
            RollbackCommands::Tenant(_) => RecordKind::Tenant
                .schema_code()
                .into_iter()
                .chain([CITY_MODULE_SCHEMA])
                .collect(),
        }
    }

    fn args(&self) -> &RollbackArgs {
        match self {
            RollbackCommands::Masters(args) | RollbackCommands::Tenant(args) => args,
        }
    }
}

pub fn run(cmd: RollbackCommands, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global);
    let tenant = config.target_tenant();
    let schemas = cmd.schema_codes();

    if !cmd.args().yes && !confirm(&tenant, &schemas)? {
        println!("{} Rollback cancelled", style("○").yellow());
        return Ok(());
    }

    let client = connect(&config)?;
    let results = BulkUploader::new(&client)
        .with_options(UploadOptions::from_config(&config))
        .with_duplicate_markers(&config.duplicate_markers)
        .rollback(&schemas, &tenant)
        .into_diagnostic()?;

    match global.format {
        OutputFormat::Auto => print!("{}", rollback_table(&results)),
        format => print_records(&results, format)?,
    }

    let failed: usize = results.iter().map(|r| r.failed).sum();
    if failed > 0 {
        return Err(miette!("{} record(s) could not be deactivated", failed));
    }
    Ok(())
}

fn confirm(tenant: &str, schemas: &[&str]) -> Result<bool> {
    if !console::user_attended_stderr() {
        return Err(miette!("Refusing to roll back without a terminal; pass --yes"));
    }
    dialoguer::Confirm::new()
        .with_prompt(format!(
            "Deactivate every active record of {} in {}?",
            schemas.join(", "),
            tenant
        ))
        .default(false)
        .interact()
        .into_diagnostic()
}

fn rollback_table(results: &[RollbackResult]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Schema", "Deactivated", "Failed"]);
    for r in results {
        builder.push_record([
            r.schema_code.clone(),
            r.deactivated.to_string(),
            r.failed.to_string(),
        ]);
    }
    format!("{}\n", builder.build().with(Style::markdown()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masters_schemas_dependents_first() {
        let cmd = RollbackCommands::Masters(RollbackArgs { yes: true });
        assert_eq!(
            cmd.schema_codes(),
            vec![
                "RAINMAKER-PGR.ServiceDefs",
                "common-masters.Designation",
                "common-masters.Department",
            ]
        );
    }

    #[test]
    fn test_tenant_schemas() {
        let cmd = RollbackCommands::Tenant(RollbackArgs { yes: true });
        assert_eq!(cmd.schema_codes(), vec!["tenant.tenants", "tenant.citymodule"]);
    }

    #[test]
    fn test_rollback_table() {
        let results = vec![RollbackResult {
            schema_code: "tenant.tenants".into(),
            deactivated: 4,
            failed: 1,
        }];
        let table = rollback_table(&results);
        assert!(table.contains("tenant.tenants"));
        assert!(table.contains("Deactivated"));
    }
}
