//! Integration tests for the dataloader CLI
//!
//! These tests exercise the offline commands end-to-end using assert_cmd.
//! Nothing here talks to a DIGIT deployment.

use assert_cmd::Command;
use dataloader::core::workbook::write_sheet;
use dataloader::core::Sheet;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to get a dataloader command with no ambient DIGIT settings
fn dataloader() -> Command {
    let mut cmd = Command::cargo_bin("dataloader").unwrap();
    for var in [
        "DIGIT_URL",
        "DIGIT_USERNAME",
        "DIGIT_PASSWORD",
        "ROOT_TENANT",
        "TARGET_TENANT",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Helper to write a workbook from sheets
fn write_book(dir: &Path, name: &str, sheets: &[Sheet]) -> PathBuf {
    let path = dir.join(name);
    let mut book = rust_xlsxwriter::Workbook::new();
    for sheet in sheets {
        write_sheet(book.add_worksheet(), sheet).unwrap();
    }
    book.save(&path).unwrap();
    path
}

/// Helper to write a small schema YAML for validate tests
fn write_schema(dir: &Path) -> PathBuf {
    let path = dir.join("departments.yaml");
    fs::write(
        &path,
        r#"
name: departments
sheets:
  - name: Departments
    columns:
      - name: Code
        required: true
        pattern: "DEPT_[0-9]+"
      - name: Name
        required: true
validation_rules:
  - rule: unique_department_codes
    sheet: Departments
    columns: [Code]
"#,
    )
    .unwrap();
    path
}

fn masters_book(dir: &Path) -> PathBuf {
    write_book(
        dir,
        "masters.xlsx",
        &[
            Sheet::from_strings(
                "Department And Desgination Mast",
                &["Department Name*", "Designation Name*"],
                &[
                    vec!["Health", "Doctor"],
                    vec!["Health", "Nurse"],
                    vec!["Roads", "Engineer"],
                ],
            ),
            Sheet::from_strings(
                "Complaint Type Master",
                &["Complaint Type*", "Complaint sub type*", "Department Name*"],
                &[
                    vec!["Streetlights", "Not working", "Roads"],
                    vec!["", "Flickering", ""],
                ],
            ),
        ],
    )
}

fn boundary_book(dir: &Path) -> PathBuf {
    write_book(
        dir,
        "boundaries.xlsx",
        &[Sheet::from_strings(
            "Boundary",
            &["code", "name", "boundaryType", "parentCode"],
            &[
                vec!["TS", "Test City", "City", ""],
                vec!["TS_W1", "Ward One", "Ward", "TS"],
                vec!["TS_W2", "Ward Two", "Ward", "TS"],
            ],
        )],
    )
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_help_displays() {
    dataloader()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("DIGIT Data Loader"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("load"));
}

#[test]
fn test_version_displays() {
    dataloader()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dataloader"));
}

#[test]
fn test_unknown_command_fails() {
    dataloader().arg("frobnicate").assert().failure();
}

#[test]
fn test_completions_bash() {
    dataloader()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dataloader"));
}

// ============================================================================
// Schema Command Tests
// ============================================================================

#[test]
fn test_schema_list() {
    dataloader()
        .args(["schema", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pgr_master_data"))
        .stdout(predicate::str::contains("employee"));
}

#[test]
fn test_schema_show_columns() {
    dataloader()
        .args(["schema", "show", "pgr_master_data"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sheet: Complaint Type Master"))
        .stdout(predicate::str::contains("Resolution Time (Hours)*"));
}

#[test]
fn test_schema_show_unknown_fails() {
    dataloader()
        .args(["schema", "show", "no_such_schema"])
        .assert()
        .failure();
}

// ============================================================================
// Validate Command Tests
// ============================================================================

#[test]
fn test_validate_passes() {
    let tmp = TempDir::new().unwrap();
    let schema = write_schema(tmp.path());
    let book = write_book(
        tmp.path(),
        "good.xlsx",
        &[Sheet::from_strings(
            "Departments",
            &["Code", "Name"],
            &[vec!["DEPT_1", "Health"], vec!["DEPT_2", "Roads"]],
        )],
    );

    dataloader()
        .args(["validate", "--schema"])
        .arg(&schema)
        .arg(&book)
        .assert()
        .success()
        .stdout(predicate::str::contains("Validation Summary"))
        .stdout(predicate::str::contains("All files passed validation!"));
}

#[test]
fn test_validate_reports_errors() {
    let tmp = TempDir::new().unwrap();
    let schema = write_schema(tmp.path());
    let book = write_book(
        tmp.path(),
        "bad.xlsx",
        &[Sheet::from_strings(
            "Departments",
            &["Code", "Name"],
            &[
                vec!["DEPT_1", "Health"],
                vec!["DEPT_1", "Roads"],
                vec!["Parks", ""],
            ],
        )],
    );

    dataloader()
        .args(["validate", "--schema"])
        .arg(&schema)
        .arg(&book)
        .assert()
        .failure()
        .stdout(predicate::str::contains("DUPLICATE_ERROR"))
        .stdout(predicate::str::contains("VALIDATION_ERROR"))
        .stderr(predicate::str::contains("Validation failed"));
}

#[test]
fn test_validate_missing_columns() {
    let tmp = TempDir::new().unwrap();
    let schema = write_schema(tmp.path());
    let book = write_book(
        tmp.path(),
        "partial.xlsx",
        &[Sheet::from_strings("Departments", &["Code"], &[vec!["DEPT_1"]])],
    );

    dataloader()
        .args(["validate", "--schema"])
        .arg(&schema)
        .arg(&book)
        .assert()
        .failure()
        .stdout(predicate::str::contains("MISSING_COLUMNS"));
}

#[test]
fn test_validate_missing_file() {
    let tmp = TempDir::new().unwrap();
    let schema = write_schema(tmp.path());

    dataloader()
        .args(["validate", "--schema"])
        .arg(&schema)
        .arg(tmp.path().join("absent.xlsx"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("FILE_NOT_FOUND"));
}

#[test]
fn test_validate_tsv_output() {
    let tmp = TempDir::new().unwrap();
    let schema = write_schema(tmp.path());
    let book = write_book(
        tmp.path(),
        "bad.xlsx",
        &[Sheet::from_strings(
            "Departments",
            &["Code", "Name"],
            &[vec!["Parks", "Parks"]],
        )],
    );

    dataloader()
        .args(["validate", "-f", "tsv", "--schema"])
        .arg(&schema)
        .arg(&book)
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "error\tVALIDATION_ERROR\tDepartments\t2\tCode",
        ));
}

// ============================================================================
// Load Command Tests (dry run only)
// ============================================================================

#[test]
fn test_load_masters_dry_run() {
    let tmp = TempDir::new().unwrap();
    let book = masters_book(tmp.path());

    dataloader()
        .args(["load", "masters", "--dry-run", "--tenant", "pg.citya", "--file"])
        .arg(&book)
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run of 'masters'"))
        .stdout(predicate::str::contains("Departments: 2"))
        .stdout(predicate::str::contains("Designations: 3"))
        .stdout(predicate::str::contains("Complaint types: 2"));
}

#[test]
fn test_load_masters_dry_run_json() {
    let tmp = TempDir::new().unwrap();
    let book = masters_book(tmp.path());

    let output = dataloader()
        .args(["load", "masters", "--dry-run", "-f", "json", "--tenant", "pg.citya", "--file"])
        .arg(&book)
        .output()
        .unwrap();
    assert!(output.status.success());

    let steps: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let steps = steps.as_array().unwrap();
    assert_eq!(steps[0]["step"], "Departments");
    assert_eq!(steps[0]["count"], 2);
    assert_eq!(steps[0]["payload"][0]["code"], "DEPT_1");
    assert_eq!(steps[0]["payload"][0]["name"], "Health");
}

#[test]
fn test_load_localization_dry_run_with_language_picker() {
    let tmp = TempDir::new().unwrap();
    let book = write_book(
        tmp.path(),
        "labels.xlsx",
        &[Sheet::from_strings(
            "Localization",
            &["Code", "Message", "Locale"],
            &[vec!["CS_COMMON_SUBMIT", "जमा करें", "hi_IN"]],
        )],
    );

    dataloader()
        .args(["load", "localization", "--dry-run", "--root-tenant", "pg"])
        .args(["--language-label", "Hindi", "--locale", "hi_IN"])
        .args(["--language-tenants", "pg.citya,pg.cityb", "--file"])
        .arg(&book)
        .assert()
        .success()
        .stdout(predicate::str::contains("Localization: 1"))
        .stdout(predicate::str::contains("Language picker: 3 (into pg)"));
}

#[test]
fn test_load_localization_label_requires_locale() {
    let tmp = TempDir::new().unwrap();
    dataloader()
        .args(["load", "localization", "--dry-run", "--language-label", "Hindi", "--file"])
        .arg(tmp.path().join("labels.xlsx"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--locale"));
}

#[test]
fn test_load_missing_sheet_fails() {
    let tmp = TempDir::new().unwrap();
    let book = write_book(
        tmp.path(),
        "other.xlsx",
        &[Sheet::from_strings("Sheet1", &["A"], &[vec!["x"]])],
    );

    dataloader()
        .args(["load", "masters", "--dry-run", "--file"])
        .arg(&book)
        .assert()
        .failure();
}

// ============================================================================
// Boundary Command Tests
// ============================================================================

#[test]
fn test_boundary_flatten_tsv() {
    let tmp = TempDir::new().unwrap();
    let book = boundary_book(tmp.path());

    dataloader()
        .args(["boundary", "flatten", "--levels", "City,Ward", "--file"])
        .arg(&book)
        .assert()
        .success()
        .stdout(predicate::str::contains("City\tWard"))
        .stdout(predicate::str::contains("TS\tTS_W1"))
        .stdout(predicate::str::contains("TS\tTS_W2"));
}

#[test]
fn test_boundary_flatten_to_workbook() {
    let tmp = TempDir::new().unwrap();
    let book = boundary_book(tmp.path());
    let output = tmp.path().join("flat.xlsx");

    dataloader()
        .args(["boundary", "flatten", "--levels", "City,Ward", "--file"])
        .arg(&book)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 2 row(s)"));

    assert!(output.exists());
}

#[test]
fn test_boundary_flatten_without_levels_fails() {
    let tmp = TempDir::new().unwrap();
    let book = boundary_book(tmp.path());

    dataloader()
        .args(["boundary", "flatten", "--file"])
        .arg(&book)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--levels"));
}

// ============================================================================
// Rollback Command Tests
// ============================================================================

#[test]
fn test_rollback_refuses_without_terminal() {
    dataloader()
        .args(["rollback", "masters", "--tenant", "pg.citya"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
}
