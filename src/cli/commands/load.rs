//! `dataloader load` command - read a template and upload it to DIGIT
//!
//! Each phase first reads its workbook into a [`Plan`], an ordered list of
//! upload steps. `--dry-run` prints the plan; otherwise the steps run in
//! order against the gateway, one call at a time.

use clap::Subcommand;
use console::style;
use miette::{miette, IntoDiagnostic, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::cli::helpers::{connect, load_config};
use crate::cli::output::{print_records, print_summary, ConsoleProgress, StepSummary};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{LocalizationMessage, MasterRecord, RecordKind, Workbook};
use crate::hierarchy::{detect_layout, TemplateLayout};
use crate::reader::boundary::{
    read_entities, read_hierarchy_definition, read_level_sheet, read_relationships,
    HierarchyDefinition, ENTITY_SHEET, HIERARCHY_SHEET, RELATIONSHIP_SHEET,
};
use crate::reader::employee::{read_employees, EMPLOYEE_SHEET};
use crate::reader::localization::{read_localizations, LOCALIZATION_SHEETS};
use crate::reader::masters::{read_complaint_types, read_departments, COMPLAINT_SHEET, DEPARTMENT_SHEET};
use crate::reader::tenant::{read_branding, read_tenants, BRANDING_SHEETS, TENANT_SHEET};
use crate::reader::workflow::{build_business_service, read_actions, read_states, ACTIONS_SHEET, DEFAULT_BUSINESS, STATES_SHEET};
use crate::reader::ParsedSheet;
use crate::upload::{
    annotate_workbook, BoundaryVerification, BulkUploader, Endpoint, Event, FailureReport,
    Language, RecordStatus, Telemetry, Transport, UploadOptions,
};

/// Hierarchy type used when the workbook has no definition sheet
const DEFAULT_HIERARCHY_TYPE: &str = "ADMIN";

#[derive(Subcommand, Debug)]
pub enum LoadCommands {
    /// Tenant info, branding and tenant labels
    Tenant(LoadArgs),

    /// Boundary hierarchy definition, entities and relationships
    Boundaries(BoundaryLoadArgs),

    /// Departments, designations and complaint types, each with its labels
    Masters(LoadArgs),

    /// HRMS employees
    Employees(LoadArgs),

    /// A localization sheet (Code / Message / Module / Locale)
    Localization(LocalizationLoadArgs),

    /// Workflow states and actions as one business service
    Workflow(WorkflowLoadArgs),
}

#[derive(clap::Args, Debug)]
pub struct LoadArgs {
    /// Template workbook
    #[arg(long)]
    pub file: PathBuf,

    /// Read and report what would be sent, without connecting
    #[arg(long)]
    pub dry_run: bool,

    /// Write _STATUS / _STATUS_CODE / _ERROR_MESSAGE columns back into the workbook
    #[arg(long)]
    pub annotate: bool,
}

#[derive(clap::Args, Debug)]
pub struct BoundaryLoadArgs {
    #[command(flatten)]
    pub common: LoadArgs,

    /// Hierarchy type when the workbook has no Hierarchy_Definition sheet
    #[arg(long, default_value = DEFAULT_HIERARCHY_TYPE)]
    pub hierarchy_type: String,

    /// Count persisted boundaries after loading
    #[arg(long)]
    pub verify: bool,
}

#[derive(clap::Args, Debug)]
pub struct LocalizationLoadArgs {
    #[command(flatten)]
    pub common: LoadArgs,

    /// Add this label to the language picker (e.g. "हिंदी")
    #[arg(long, requires = "locale")]
    pub language_label: Option<String>,

    /// Locale code the picker entry selects (e.g. hi_IN)
    #[arg(long, requires = "language_label")]
    pub locale: Option<String>,

    /// Tenants whose own picker also gets the language
    #[arg(long, value_delimiter = ',', requires = "language_label")]
    pub language_tenants: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct WorkflowLoadArgs {
    #[command(flatten)]
    pub common: LoadArgs,

    /// Business service code
    #[arg(long, default_value = DEFAULT_BUSINESS)]
    pub business_service: String,
}

/// One unit of upload work
#[derive(Debug, Clone)]
pub enum Step {
    /// One call per record
    Records {
        label: String,
        /// Sheet the records were read from, for annotation
        sheet: Option<String>,
        /// Tenant to load into when it differs from the phase tenant
        tenant: Option<String>,
        endpoint: Endpoint,
        records: Vec<MasterRecord>,
    },
    /// One call per locale
    Localizations {
        label: String,
        messages: Vec<LocalizationMessage>,
    },
    Hierarchy(HierarchyDefinition),
    BusinessService(Value),
    /// StateInfo picker, then each listed tenant's picker
    Languages {
        language: Language,
        tenants: Vec<String>,
        /// Tenant holding StateInfo and the tenant records
        state_tenant: String,
    },
}

impl Step {
    pub fn label(&self) -> &str {
        match self {
            Step::Records { label, .. } | Step::Localizations { label, .. } => label,
            Step::Hierarchy(_) => "Hierarchy definition",
            Step::BusinessService(_) => "Business service",
            Step::Languages { .. } => "Language picker",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Step::Records { records, .. } => records.len(),
            Step::Localizations { messages, .. } => messages.len(),
            Step::Hierarchy(_) | Step::BusinessService(_) => 1,
            Step::Languages { tenants, .. } => 1 + tenants.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tenant override, if the step does not load into the phase tenant
    pub fn tenant(&self) -> Option<&str> {
        match self {
            Step::Records { tenant, .. } => tenant.as_deref(),
            Step::Languages { state_tenant, .. } => Some(state_tenant.as_str()),
            _ => None,
        }
    }

    /// Payloads as they will be sent, without the request envelope
    pub fn payload(&self) -> Vec<Value> {
        match self {
            Step::Records { records, .. } => records.iter().map(|r| Value::Object(r.data.clone())).collect(),
            Step::Localizations { messages, .. } => messages
                .iter()
                .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
                .collect(),
            Step::Hierarchy(definition) => vec![serde_json::to_value(definition).unwrap_or(Value::Null)],
            Step::BusinessService(service) => vec![service.clone()],
            Step::Languages { language, tenants, .. } => vec![json!({
                "label": language.label,
                "value": language.value,
                "tenants": tenants,
            })],
        }
    }
}

/// Everything a phase will upload, in order
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub steps: Vec<Step>,
    /// Rows dropped by the readers for blank identifying cells
    pub skipped: usize,
    /// Department code → name, to make failure reports readable
    pub department_names: HashMap<String, String>,
    /// Hierarchy type and node count to check after loading
    pub verify: Option<(String, usize)>,
}

impl Plan {
    /// Add a step unless it has nothing to send
    fn push(&mut self, step: Step) {
        if !step.is_empty() {
            self.steps.push(step);
        }
    }

    fn records(&mut self, label: &str, sheet: Option<&str>, kind: RecordKind, parsed: &ParsedSheet) -> Result<()> {
        self.skipped += parsed.skipped;
        let endpoint = Endpoint::for_kind(kind).ok_or_else(|| miette!("{} cannot be uploaded record by record", kind))?;
        self.push(Step::Records {
            label: label.to_string(),
            sheet: sheet.map(str::to_string),
            tenant: None,
            endpoint,
            records: parsed.records.clone(),
        });
        Ok(())
    }

    /// Route the most recently added records step to another tenant
    fn retarget_last(&mut self, tenant: &str) {
        if let Some(Step::Records { tenant: target, .. }) = self.steps.last_mut() {
            *target = Some(tenant.to_string());
        }
    }

    /// Add a language-picker update after everything else
    pub fn languages(&mut self, language: Language, tenants: Vec<String>, state_tenant: &str) {
        self.push(Step::Languages {
            language,
            tenants,
            state_tenant: state_tenant.to_string(),
        });
    }

    fn localizations(&mut self, label: &str, messages: Vec<LocalizationMessage>) {
        self.push(Step::Localizations {
            label: label.to_string(),
            messages,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// What running a plan produced
#[derive(Debug, Default)]
pub struct PhaseReport {
    pub steps: Vec<StepSummary>,
    /// Record statuses per source sheet, sheets in first-seen order
    pub statuses: Vec<(String, Vec<RecordStatus>)>,
    pub failed: usize,
    pub verification: Option<BoundaryVerification>,
}

impl PhaseReport {
    fn add_statuses(&mut self, sheet: &str, statuses: Vec<RecordStatus>) {
        match self.statuses.iter_mut().find(|(s, _)| s == sheet) {
            Some((_, list)) => list.extend(statuses),
            None => self.statuses.push((sheet.to_string(), statuses)),
        }
    }

    pub fn totals(&self) -> (usize, usize, usize) {
        self.steps.iter().fold((0, 0, 0), |(c, e, f), s| {
            (c + s.created, e + s.exists, f + s.failed)
        })
    }
}

pub fn run(cmd: LoadCommands, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global);
    let tenant = config.target_tenant();

    let (phase, args, plan) = match &cmd {
        LoadCommands::Tenant(args) => (
            "tenant",
            args,
            plan_tenant(&args.file, &config.root_tenant(), &tenant)?,
        ),
        LoadCommands::Boundaries(args) => (
            "boundaries",
            &args.common,
            plan_boundaries(&args.common.file, &tenant, &args.hierarchy_type, args.verify)?,
        ),
        LoadCommands::Masters(args) => ("masters", args, plan_masters(&args.file, &tenant)?),
        LoadCommands::Employees(args) => ("employees", args, plan_employees(&args.file)?),
        LoadCommands::Localization(args) => {
            let mut plan = plan_localization(&args.common.file, &config.default_locale())?;
            if let (Some(label), Some(locale)) = (&args.language_label, &args.locale) {
                plan.languages(
                    Language::new(label, locale),
                    args.language_tenants.clone(),
                    &config.root_tenant(),
                );
            }
            ("localization", &args.common, plan)
        }
        LoadCommands::Workflow(args) => (
            "workflow",
            &args.common,
            plan_workflow(&args.common.file, &tenant, &args.business_service)?,
        ),
    };

    if plan.is_empty() {
        return Err(miette!("Nothing to load from {}", args.file.display()));
    }
    if args.dry_run {
        return print_dry_run(phase, &plan, global);
    }

    let human = global.format.is_human();
    if human {
        println!(
            "{} Loading {} from {} into {} at {}",
            style("→").blue(),
            phase,
            args.file.display(),
            style(&tenant).cyan(),
            config.base_url()
        );
    }

    let client = connect(&config)?;
    let progress = ConsoleProgress::new(global.quiet || !human);
    let uploader = BulkUploader::new(&client)
        .with_options(UploadOptions::from_config(&config))
        .with_duplicate_markers(&config.duplicate_markers)
        .with_progress(&progress);
    let failures = FailureReport::in_dir(&config.error_dir());

    let report = execute(&plan, &uploader, &tenant, Some(&failures), human && !global.quiet)?;

    if args.annotate {
        annotate(&args.file, &report, human)?;
    }

    let (created, exists, failed) = report.totals();
    Telemetry::from_config(&config).send(Event::new(
        "dataloader",
        phase,
        &format!("created={} exists={} failed={}", created, exists, failed),
    ));

    print_summary(&format!("Load {} summary", phase), &report.steps, global.format)?;
    if let Some(v) = &report.verification {
        print_verification(v, human);
    }

    if report.failed > 0 {
        return Err(miette!(
            "{} record(s) failed; see {}",
            report.failed,
            failures.path().display()
        ));
    }
    if report.verification.as_ref().is_some_and(|v| !v.passed) {
        return Err(miette!("Boundary verification failed"));
    }
    Ok(())
}

/// Run every step in order; a failed record never stops the phase
pub fn execute<T: Transport>(
    plan: &Plan,
    uploader: &BulkUploader<'_, T>,
    tenant: &str,
    failures: Option<&FailureReport>,
    show_steps: bool,
) -> Result<PhaseReport> {
    let mut report = PhaseReport::default();

    for step in &plan.steps {
        if show_steps {
            println!("\n{} {} ({})", style("→").blue(), step.label(), step.len());
        }
        tracing::debug!(step = step.label(), count = step.len(), "running step");

        let summary = match step {
            Step::Records {
                label,
                sheet,
                tenant: target,
                endpoint,
                records,
            } => {
                let target = target.as_deref().unwrap_or(tenant);
                let result = uploader.upload(records, endpoint, target).into_diagnostic()?;
                let domain = records.first().map(|r| r.kind.label()).unwrap_or(label.as_str());
                write_failures(failures, domain, &result.failed_records, plan);
                if let Some(sheet) = sheet {
                    report.add_statuses(sheet, result.statuses.clone());
                }
                StepSummary::new(label, &result)
            }
            Step::Localizations { label, messages } => {
                let result = uploader
                    .upload_localizations(messages, tenant)
                    .into_diagnostic()?;
                write_failures(failures, "Localization", &result.failed_records, plan);
                StepSummary::new(label, &result)
            }
            Step::Hierarchy(definition) => {
                let outcome = uploader.create_hierarchy(definition).into_diagnostic()?;
                StepSummary::single(step.label(), &outcome)
            }
            Step::BusinessService(service) => {
                let outcome = uploader.create_business_service(service).into_diagnostic()?;
                StepSummary::single(step.label(), &outcome)
            }
            Step::Languages {
                language,
                tenants,
                state_tenant,
            } => {
                let mut update = uploader
                    .add_stateinfo_language(state_tenant, language)
                    .into_diagnostic()?;
                if !tenants.is_empty() {
                    update.merge(
                        uploader
                            .add_tenant_language(tenants, state_tenant, language)
                            .into_diagnostic()?,
                    );
                }
                for e in &update.errors {
                    tracing::warn!(id = %e.id, error = %e.message, "language picker not updated");
                }
                StepSummary::languages(step.label(), &update)
            }
        };
        report.failed += summary.failed;
        report.steps.push(summary);
    }

    if let Some((hierarchy_type, expected)) = &plan.verify {
        report.verification = Some(
            uploader
                .verify_boundaries(tenant, hierarchy_type, *expected)
                .into_diagnostic()?,
        );
    }

    Ok(report)
}

fn write_failures(
    report: Option<&FailureReport>,
    domain: &str,
    failed: &[crate::upload::FailedRecord],
    plan: &Plan,
) {
    let Some(report) = report else { return };
    if let Err(e) = report.write(domain, failed, &plan.department_names) {
        tracing::warn!(error = %e, domain, "could not write failure report");
    }
}

fn annotate(file: &Path, report: &PhaseReport, human: bool) -> Result<()> {
    for (sheet, statuses) in &report.statuses {
        let rows = annotate_workbook(file, sheet, statuses).into_diagnostic()?;
        if human {
            println!(
                "{} Annotated {} row(s) in '{}'",
                style("✓").green(),
                rows,
                sheet
            );
        }
    }
    Ok(())
}

fn print_verification(v: &BoundaryVerification, human: bool) {
    if !human {
        return;
    }
    if v.passed {
        println!(
            "{} Boundary verification passed: {} found, {} expected",
            style("✓").green(),
            v.found,
            v.expected
        );
    } else {
        println!(
            "{} Boundary verification failed: {} found, {} expected",
            style("✗").red(),
            v.found,
            v.expected
        );
    }
}

#[derive(Serialize)]
struct DryRunStep<'a> {
    step: &'a str,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant: Option<&'a str>,
    payload: Vec<Value>,
}

fn print_dry_run(phase: &str, plan: &Plan, global: &GlobalOpts) -> Result<()> {
    match global.format {
        OutputFormat::Auto => {
            println!(
                "{} Dry run of '{}': nothing will be sent\n",
                style("→").blue(),
                phase
            );
            for step in &plan.steps {
                match step.tenant() {
                    Some(tenant) => println!(
                        "  {} {}: {} (into {})",
                        style("○").dim(),
                        step.label(),
                        step.len(),
                        tenant
                    ),
                    None => println!("  {} {}: {}", style("○").dim(), step.label(), step.len()),
                }
            }
            if plan.skipped > 0 {
                println!(
                    "\n  {} {} row(s) skipped (blank identifying cells)",
                    style("!").yellow(),
                    plan.skipped
                );
            }
            if let Some((hierarchy_type, expected)) = &plan.verify {
                println!(
                    "\n  Verification would expect {} boundaries of '{}'",
                    expected, hierarchy_type
                );
            }
        }
        OutputFormat::Tsv => {
            for step in &plan.steps {
                println!("{}\t{}", step.label(), step.len());
            }
        }
        format => {
            let steps: Vec<DryRunStep> = plan
                .steps
                .iter()
                .map(|s| DryRunStep {
                    step: s.label(),
                    count: s.len(),
                    tenant: s.tenant(),
                    payload: s.payload(),
                })
                .collect();
            print_records(&steps, format)?;
        }
    }
    Ok(())
}

fn open(path: &Path) -> Result<Workbook> {
    Workbook::open(path).into_diagnostic()
}

/// Tenant Info, then branding if present, then the tenant labels
///
/// Tenant records belong to the state (root) tenant, where tenant lookups
/// search; branding and labels go to the target tenant.
pub fn plan_tenant(path: &Path, root_tenant: &str, tenant: &str) -> Result<Plan> {
    let mut book = open(path)?;
    let mut plan = Plan::default();

    let sheet = book.sheet(TENANT_SHEET).into_diagnostic()?;
    let tenants = read_tenants(&sheet, root_tenant).into_diagnostic()?;
    plan.records("Tenants", Some(TENANT_SHEET), RecordKind::Tenant, &tenants)?;
    if root_tenant != tenant {
        plan.retarget_last(root_tenant);
    }

    if let Some(name) = BRANDING_SHEETS.iter().copied().find(|n| book.has_sheet(n)) {
        let sheet = book.sheet(name).into_diagnostic()?;
        let branding = read_branding(&sheet, tenant).into_diagnostic()?;
        plan.records("Branding", Some(name), RecordKind::Branding, &branding)?;
    }

    plan.localizations("Tenant localization", tenants.localizations);
    Ok(plan)
}

/// Departments → designations → complaint types, each followed by its labels
pub fn plan_masters(path: &Path, tenant: &str) -> Result<Plan> {
    let mut book = open(path)?;
    if !book.has_sheet(DEPARTMENT_SHEET) && !book.has_sheet(COMPLAINT_SHEET) {
        return Err(miette!(
            "{} has neither a '{}' nor a '{}' sheet",
            path.display(),
            DEPARTMENT_SHEET,
            COMPLAINT_SHEET
        ));
    }

    let mut plan = Plan::default();
    let mut department_codes = None;

    if book.has_sheet(DEPARTMENT_SHEET) {
        let sheet = book.sheet(DEPARTMENT_SHEET).into_diagnostic()?;
        let masters = read_departments(&sheet, tenant).into_diagnostic()?;

        plan.records("Departments", Some(DEPARTMENT_SHEET), RecordKind::Department, &masters.departments)?;
        plan.localizations("Department localization", masters.departments.localizations.clone());
        plan.records("Designations", Some(DEPARTMENT_SHEET), RecordKind::Designation, &masters.designations)?;
        plan.localizations("Designation localization", masters.designations.localizations.clone());

        plan.department_names = masters
            .department_codes
            .iter()
            .map(|(name, code)| (code.clone(), name.clone()))
            .collect();
        department_codes = Some(masters.department_codes);
    }

    if book.has_sheet(COMPLAINT_SHEET) {
        let sheet = book.sheet(COMPLAINT_SHEET).into_diagnostic()?;
        let complaints = read_complaint_types(&sheet, tenant, department_codes.as_ref()).into_diagnostic()?;
        plan.records("Complaint types", Some(COMPLAINT_SHEET), RecordKind::ServiceDefinition, &complaints)?;
        plan.localizations("Complaint type localization", complaints.localizations);
    }

    Ok(plan)
}

pub fn plan_employees(path: &Path) -> Result<Plan> {
    let mut book = open(path)?;
    let sheet = book.sheet(EMPLOYEE_SHEET).into_diagnostic()?;
    let employees = read_employees(&sheet).into_diagnostic()?;

    let mut plan = Plan::default();
    plan.records("Employees", Some(EMPLOYEE_SHEET), RecordKind::Employee, &employees)?;
    Ok(plan)
}

pub fn plan_localization(path: &Path, default_locale: &str) -> Result<Plan> {
    let mut book = open(path)?;
    let sheet = book.first_sheet_of(&LOCALIZATION_SHEETS).into_diagnostic()?;
    let (messages, skipped) = read_localizations(&sheet, default_locale).into_diagnostic()?;

    let mut plan = Plan {
        skipped,
        ..Default::default()
    };
    plan.localizations("Localization", messages);
    Ok(plan)
}

pub fn plan_workflow(path: &Path, tenant: &str, business_service: &str) -> Result<Plan> {
    let mut book = open(path)?;
    let states = read_states(&book.sheet(STATES_SHEET).into_diagnostic()?, tenant).into_diagnostic()?;
    let actions = if book.has_sheet(ACTIONS_SHEET) {
        read_actions(&book.sheet(ACTIONS_SHEET).into_diagnostic()?, tenant).into_diagnostic()?
    } else {
        ParsedSheet::new()
    };
    if states.is_empty() {
        return Err(miette!("'{}' has no states", STATES_SHEET));
    }

    let service = build_business_service(&states.records, &actions.records, tenant, business_service);
    Ok(Plan {
        steps: vec![Step::BusinessService(service)],
        skipped: states.skipped + actions.skipped,
        ..Default::default()
    })
}

/// Hierarchy definition, then entities, then relationships
///
/// Entities and relationships come from their own sheets when present;
/// otherwise from the first sheet laid out one column per level.
pub fn plan_boundaries(path: &Path, tenant: &str, hierarchy_type: &str, verify: bool) -> Result<Plan> {
    let mut book = open(path)?;
    let mut plan = Plan::default();

    let definition = if book.has_sheet(HIERARCHY_SHEET) {
        read_hierarchy_definition(&book.sheet(HIERARCHY_SHEET).into_diagnostic()?).into_diagnostic()?
    } else {
        None
    };
    let hierarchy_type = definition
        .as_ref()
        .map(|d| d.hierarchy_type.clone())
        .unwrap_or_else(|| hierarchy_type.to_string());

    let (entities, relationships, sheets) = if book.has_sheet(ENTITY_SHEET) {
        let entities = read_entities(&book.sheet(ENTITY_SHEET).into_diagnostic()?).into_diagnostic()?;
        let relationships = if book.has_sheet(RELATIONSHIP_SHEET) {
            read_relationships(&book.sheet(RELATIONSHIP_SHEET).into_diagnostic()?).into_diagnostic()?
        } else {
            ParsedSheet::new()
        };
        (entities, relationships, (Some(ENTITY_SHEET), Some(RELATIONSHIP_SHEET)))
    } else if let Some(definition) = &definition {
        let levels = definition.levels();
        let mut found = None;
        for name in book.sheet_names() {
            if name == HIERARCHY_SHEET {
                continue;
            }
            let sheet = book.sheet(&name).into_diagnostic()?;
            if detect_layout(sheet.headers(), &levels) == TemplateLayout::ColumnPerLevel {
                tracing::debug!(sheet = %name, "reading column-per-level boundaries");
                found = Some(read_level_sheet(&sheet, tenant, &hierarchy_type, &levels).into_diagnostic()?);
                break;
            }
        }
        let (entities, relationships) = found.unwrap_or_default();
        (entities, relationships, (None, None))
    } else {
        (ParsedSheet::new(), ParsedSheet::new(), (None, None))
    };

    if let Some(definition) = definition {
        plan.push(Step::Hierarchy(definition));
    }
    plan.records("Boundary entities", sheets.0, RecordKind::BoundaryEntity, &entities)?;
    plan.records(
        "Boundary relationships",
        sheets.1,
        RecordKind::BoundaryRelationship,
        &relationships,
    )?;

    if verify {
        plan.verify = Some((hierarchy_type, entities.len()));
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workbook::{write_sheet, Sheet};
    use crate::reader::masters::{COL_COMPLAINT_TYPE, COL_DEPARTMENT, COL_DESIGNATION, COL_SUB_TYPE};
    use crate::upload::transport::fake::{ScriptedTransport, UniqueBackend};
    use crate::upload::{DigitClient, Session};
    use serde_json::json;

    fn write_book(path: &Path, sheets: &[Sheet]) {
        let mut book = rust_xlsxwriter::Workbook::new();
        for sheet in sheets {
            write_sheet(book.add_worksheet(), sheet).unwrap();
        }
        book.save(path).unwrap();
    }

    fn masters_book(dir: &Path) -> PathBuf {
        let path = dir.join("masters.xlsx");
        write_book(
            &path,
            &[
                Sheet::from_strings(
                    DEPARTMENT_SHEET,
                    &[COL_DEPARTMENT, COL_DESIGNATION],
                    &[vec!["Health", "Doctor"], vec!["Health", "Nurse"], vec!["Roads", "Engineer"]],
                ),
                Sheet::from_strings(
                    COMPLAINT_SHEET,
                    &[COL_COMPLAINT_TYPE, COL_SUB_TYPE, COL_DEPARTMENT],
                    &[vec!["Streetlights", "Not working", "Roads"], vec!["", "Flickering", ""]],
                ),
            ],
        );
        path
    }

    fn client<T: Transport>(t: T) -> DigitClient<T> {
        DigitClient::new(t, "http://digit.test").with_session(Session {
            auth_token: "token".into(),
            user_info: json!({"userName": "ADMIN"}),
        })
    }

    #[test]
    fn test_plan_masters_step_order() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_masters(&masters_book(dir.path()), "pg.citya").unwrap();

        let labels: Vec<(&str, usize)> = plan.steps.iter().map(|s| (s.label(), s.len())).collect();
        assert_eq!(
            labels,
            vec![
                ("Departments", 2),
                ("Department localization", 2),
                ("Designations", 3),
                ("Designation localization", 3),
                ("Complaint types", 2),
                ("Complaint type localization", 3),
            ]
        );
        assert_eq!(plan.department_names.get("DEPT_1").map(String::as_str), Some("Health"));
    }

    #[test]
    fn test_plan_masters_children_inherit_department() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_masters(&masters_book(dir.path()), "pg.citya").unwrap();
        let Step::Records { records, .. } = &plan.steps[4] else {
            panic!("expected complaint records");
        };
        assert_eq!(records[0].data["department"], json!("DEPT_2"));
        assert_eq!(records[1].data["department"], json!("DEPT_2"));
        assert_eq!(records[1].data["menuPath"], json!("Streetlights"));
    }

    #[test]
    fn test_plan_masters_requires_a_known_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.xlsx");
        write_book(&path, &[Sheet::from_strings("Sheet1", &["A"], &[vec!["x"]])]);
        assert!(plan_masters(&path, "pg").is_err());
    }

    #[test]
    fn test_execute_counts_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_masters(&masters_book(dir.path()), "pg.citya").unwrap();
        let client = client(ScriptedTransport::new());
        let uploader = BulkUploader::new(&client).with_options(UploadOptions::immediate());

        let report = execute(&plan, &uploader, "pg.citya", None, false).unwrap();

        assert_eq!(report.totals(), (15, 0, 0));
        assert_eq!(report.failed, 0);
        // 7 record calls and one batch per localization step
        assert_eq!(client.transport().sent_count(), 10);
        let (sheet, statuses) = &report.statuses[0];
        assert_eq!(sheet, DEPARTMENT_SHEET);
        assert_eq!(statuses.len(), 5);
        assert_eq!(report.statuses[1].0, COMPLAINT_SHEET);
    }

    #[test]
    fn test_execute_twice_reports_exists() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_masters(&masters_book(dir.path()), "pg.citya").unwrap();
        let client = client(UniqueBackend::new());
        let uploader = BulkUploader::new(&client).with_options(UploadOptions::immediate());

        let first = execute(&plan, &uploader, "pg.citya", None, false).unwrap();
        let second = execute(&plan, &uploader, "pg.citya", None, false).unwrap();

        assert_eq!(first.totals(), (15, 0, 0));
        assert_eq!(second.totals(), (0, 15, 0));
    }

    #[test]
    fn test_execute_failures_reach_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emp.xlsx");
        write_book(
            &path,
            &[Sheet::from_strings(
                EMPLOYEE_SHEET,
                &["Employee Code", "Tenant ID", "User Mobile Number", "User Name"],
                &[
                    vec!["EMP-1", "pg.citya", "9999999999", "Asha"],
                    vec!["EMP-2", "pg.citya", "8888888888", "Ravi"],
                ],
            )],
        );
        let plan = plan_employees(&path).unwrap();

        let transport = ScriptedTransport::new();
        transport.reply(200, "{}").reply(400, r#"{"Errors":[{"message":"mobile number invalid"}]}"#);
        let client = client(transport);
        let uploader = BulkUploader::new(&client).with_options(UploadOptions::immediate());
        let failures = FailureReport::in_dir(&dir.path().join("errors"));

        let report = execute(&plan, &uploader, "pg.citya", Some(&failures), false).unwrap();

        assert_eq!(report.totals(), (1, 0, 1));
        assert!(failures.path().exists());
        let mut book = Workbook::open(failures.path()).unwrap();
        assert_eq!(book.sheet("Employee").unwrap().len(), 1);
    }

    fn tenant_book(dir: &Path) -> PathBuf {
        use crate::reader::tenant::{COL_DISPLAY_NAME, COL_TENANT_CODE};
        let path = dir.join("tenant.xlsx");
        write_book(
            &path,
            &[
                Sheet::from_strings(
                    TENANT_SHEET,
                    &[COL_TENANT_CODE, COL_DISPLAY_NAME],
                    &[vec!["pg.citya", "City A"]],
                ),
                Sheet::from_strings(
                    BRANDING_SHEETS[1],
                    &["Tenant Code", "Banner URL", "Logo URL"],
                    &[vec!["pg.citya", "https://b", ""]],
                ),
            ],
        );
        path
    }

    #[test]
    fn test_plan_tenant_records_go_to_root_tenant() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_tenant(&tenant_book(dir.path()), "pg", "pg.citya").unwrap();

        let labels: Vec<&str> = plan.steps.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["Tenants", "Branding", "Tenant localization"]);
        assert_eq!(plan.steps[0].tenant(), Some("pg"));
        assert_eq!(plan.steps[1].tenant(), None);
    }

    #[test]
    fn test_execute_sends_tenants_to_root_and_branding_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_tenant(&tenant_book(dir.path()), "pg", "pg.citya").unwrap();
        let client = client(ScriptedTransport::new());
        let uploader = BulkUploader::new(&client).with_options(UploadOptions::immediate());

        execute(&plan, &uploader, "pg.citya", None, false).unwrap();

        let sent = client.transport().sent.borrow();
        assert!(sent[0].url.ends_with("/tenant.tenants"));
        assert_eq!(sent[0].body["Mdms"]["tenantId"], "pg");
        assert!(sent[1].url.ends_with("/tenant.branding"));
        assert_eq!(sent[1].body["Mdms"]["tenantId"], "pg.citya");
        assert_eq!(sent[2].body["tenantId"], "pg.citya");
    }

    #[test]
    fn test_plan_tenant_same_root_and_target() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan_tenant(&tenant_book(dir.path()), "pg", "pg").unwrap();
        assert_eq!(plan.steps[0].tenant(), None);
    }

    fn localization_book(dir: &Path) -> PathBuf {
        let path = dir.join("labels.xlsx");
        write_book(
            &path,
            &[Sheet::from_strings(
                LOCALIZATION_SHEETS[0],
                &["Code", "Message", "Locale"],
                &[vec!["CS_COMMON_SUBMIT", "जमा करें", "hi_IN"]],
            )],
        );
        path
    }

    #[test]
    fn test_plan_localization_with_language_picker() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = plan_localization(&localization_book(dir.path()), "en_IN").unwrap();
        plan.languages(Language::new("हिंदी", "hi_IN"), vec!["pg.citya".into()], "pg");

        let labels: Vec<(&str, usize)> = plan.steps.iter().map(|s| (s.label(), s.len())).collect();
        assert_eq!(labels, vec![("Localization", 1), ("Language picker", 2)]);
        assert_eq!(plan.steps[1].tenant(), Some("pg"));
        assert_eq!(plan.steps[1].payload()[0]["value"], json!("hi_IN"));
    }

    #[test]
    fn test_execute_language_picker_skips_listed_and_appends_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = plan_localization(&localization_book(dir.path()), "en_IN").unwrap();
        plan.languages(Language::new("हिंदी", "hi_IN"), vec!["pg.citya".into()], "pg");

        let transport = ScriptedTransport::new();
        transport
            // localization upsert
            .reply(200, "{}")
            // StateInfo already lists hi_IN
            .reply(
                200,
                r#"{"mdms":[{"uniqueIdentifier":"pg","data":{"languages":[{"label":"हिंदी","value":"hi_IN"}]}}]}"#,
            )
            // tenant record without it
            .reply(
                200,
                r#"{"mdms":[{"uniqueIdentifier":"pg.citya","data":{"code":"pg.citya","languages":[{"label":"ENGLISH","value":"en_IN"}]}}]}"#,
            );
        let client = client(transport);
        let uploader = BulkUploader::new(&client).with_options(UploadOptions::immediate());

        let report = execute(&plan, &uploader, "pg.citya", None, false).unwrap();

        let picker = &report.steps[1];
        assert_eq!(picker.step, "Language picker");
        assert_eq!((picker.created, picker.exists, picker.failed), (1, 1, 0));
        assert_eq!(report.failed, 0);

        let sent = client.transport().sent.borrow();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[1].body["MdmsCriteria"]["schemaCode"], "common-masters.StateInfo");
        assert_eq!(sent[1].body["MdmsCriteria"]["tenantId"], "pg");
        assert!(sent[3].url.ends_with("/_update/tenant.tenants"));
        assert_eq!(sent[3].body["Mdms"]["data"]["languages"][1]["label"], "हिंदी");
    }

    #[test]
    fn test_plan_workflow_single_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.xlsx");
        write_book(
            &path,
            &[
                Sheet::from_strings(
                    STATES_SHEET,
                    &["State Code", "State Name", "Is Start State", "Is End State"],
                    &[
                        vec!["APPLIED", "Applied", "TRUE", "FALSE"],
                        vec!["RESOLVED", "Resolved", "FALSE", "TRUE"],
                    ],
                ),
                Sheet::from_strings(
                    ACTIONS_SHEET,
                    &["From State", "To State", "Action Name", "Role Required"],
                    &[vec!["APPLIED", "RESOLVED", "RESOLVE", "PGR_LME"]],
                ),
            ],
        );
        let plan = plan_workflow(&path, "pg.citya", "PGR").unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].label(), "Business service");
        let payload = plan.steps[0].payload();
        assert_eq!(payload[0]["businessService"], json!("PGR"));
    }

    #[test]
    fn test_plan_boundaries_from_level_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boundary.xlsx");
        write_book(
            &path,
            &[
                Sheet::from_strings(
                    HIERARCHY_SHEET,
                    &["City Code", "Hierarchy Type", "Level 1", "Level 2", "Level 3"],
                    &[vec!["pg.citya", "ADMIN", "City", "Ward", "Locality"]],
                ),
                Sheet::from_strings(
                    "Boundaries",
                    &["City", "Ward", "Locality"],
                    &[
                        vec!["TS", "TS_D1", "TS_D1_B1"],
                        vec!["TS", "TS_D1", "TS_D1_B2"],
                        vec!["TS", "TS_D2", "TS_D2_B1"],
                    ],
                ),
            ],
        );

        let plan = plan_boundaries(&path, "pg.citya", DEFAULT_HIERARCHY_TYPE, true).unwrap();

        let labels: Vec<(&str, usize)> = plan.steps.iter().map(|s| (s.label(), s.len())).collect();
        assert_eq!(
            labels,
            vec![
                ("Hierarchy definition", 1),
                ("Boundary entities", 6),
                ("Boundary relationships", 6),
            ]
        );
        assert_eq!(plan.verify, Some(("ADMIN".to_string(), 6)));
    }
}
