//! Integration tests for the `render`, `data` and `validate` commands.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::path::Path;

use crate::common::TestProject;
use docweave::test_utils::DefinitionFixture;

fn docweave(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("docweave").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG").env_remove("DOCWEAVE_CONFIG").env("NO_COLOR", "1");
    cmd
}

fn report_project() -> TestProject {
    let project = TestProject::new().unwrap();
    project.add_fixture(&DefinitionFixture::report()).unwrap();
    project.add_fixture(&DefinitionFixture::library()).unwrap();
    project
}

const BROKEN_REF: &str = r#"
blocks:
  - kind: document
    name: broken
    blocks:
      - kind: content
        type: text
        value: partial
      - kind: section
        type: ref
        name: gone
        base: section.missing
"#;

#[test]
fn test_render_document() {
    let project = report_project();
    docweave(project.project_path())
        .args(["render", "document.report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# Report for ACME"))
        .stdout(predicate::str::contains("## Regions"))
        .stdout(predicate::str::contains("- emea\n\n- apac"))
        .stdout(predicate::str::contains("internal notes"));
}

#[test]
fn test_render_with_tags() {
    let project = report_project();
    docweave(project.project_path())
        .args(["render", "document.report", "--tags", "public"])
        .assert()
        .success()
        .stdout(predicate::str::contains("- emea"))
        .stdout(predicate::str::contains("internal notes").not());
}

#[test]
fn test_config_file_sets_required_tags() {
    let project = report_project();
    project.write_config("[render]\nrequired_tags = [\"public\"]\n").unwrap();
    project
        .run_docweave(&["render", "document.report"])
        .unwrap()
        .assert_success()
        .assert_stdout_contains("- apac");

    let output = project.run_docweave(&["render", "document.report"]).unwrap();
    assert!(!output.stdout.contains("internal notes"), "{}", output.stdout);
}

#[test]
fn test_invalid_config_is_fatal() {
    let project = report_project();
    project.write_config("[render]\nrequired_tag = [\"public\"]\n").unwrap();
    project
        .run_docweave(&["render", "document.report"])
        .unwrap()
        .assert_failure()
        .assert_stderr_contains("Configuration error");
}

#[test]
fn test_render_json_format() {
    let project = report_project();
    let output = project.run_docweave(&["render", "document.report", "--format", "json"]).unwrap();
    output.assert_success();

    let report: Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(report["data"]["inline"]["regions"]["list"], json!(["emea", "apac"]));
    assert_eq!(report["diagnostics"], json!([]));
    assert_eq!(report["node"]["block"], json!("document.report"));
}

#[test]
fn test_render_to_file() {
    let project = report_project();
    docweave(project.project_path())
        .args(["render", "document.report", "-o", "out.md"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Rendered document.report"));

    let written = std::fs::read_to_string(project.project_path().join("out.md")).unwrap();
    assert!(written.starts_with("# Report for ACME"));
}

/// Errors inside the tree still print the partial output, then exit 1.
#[test]
fn test_render_errors_exit_nonzero() {
    let project = TestProject::new().unwrap();
    project.write_definitions("broken.yaml", BROKEN_REF).unwrap();
    docweave(project.project_path())
        .args(["render", "document.broken"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("partial"))
        .stderr(predicate::str::contains("Block not found"))
        .stderr(predicate::str::contains("document.broken > section.ref.gone"));
}

#[test]
fn test_unknown_target_suggests_close_keys() {
    let project = report_project();
    project
        .run_docweave(&["render", "document.reprot"])
        .unwrap()
        .assert_failure()
        .assert_stderr_contains("Target 'document.reprot' not found")
        .assert_stderr_contains("Did you mean: document.report?");

    project
        .run_docweave(&["render", "report"])
        .unwrap()
        .assert_failure()
        .assert_stderr_contains("Invalid target");
}

#[test]
fn test_data_command() {
    let project = report_project();
    let output = project.run_docweave(&["data", "document.report.data.inline.regions"]).unwrap();
    output.assert_success();
    let data: Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(data, json!({"list": ["emea", "apac"]}));

    let output = project
        .run_docweave(&["data", "document.report.data.inline.regions", "--format", "json"])
        .unwrap();
    let report: Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(report["data"]["list"][1], json!("apac"));
    assert_eq!(report["diagnostics"], json!([]));
}

#[test]
fn test_validate_clean_project() {
    let project = report_project();
    docweave(project.project_path())
        .args(["validate", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("document.report"))
        .stdout(predicate::str::contains("config.content.code.shell"))
        .stdout(predicate::str::contains("in 2 file(s)"));
}

#[test]
fn test_validate_reports_broken_references() {
    let project = TestProject::new().unwrap();
    project.write_definitions("defs/broken.yaml", BROKEN_REF).unwrap();

    let output = project.run_docweave(&["validate", "defs", "--format", "json"]).unwrap();
    output.assert_failure();
    let results: Value = serde_json::from_str(&output.stdout).unwrap();
    assert_eq!(results["valid"], json!(false));
    assert_eq!(results["files"], json!(1));
    assert_eq!(results["diagnostics"][0]["summary"], json!("Block not found"));
}

#[test]
fn test_unparseable_definitions_are_fatal() {
    let project = TestProject::new().unwrap();
    project.add_fixture(&DefinitionFixture::invalid_syntax()).unwrap();
    project
        .run_docweave(&["validate"])
        .unwrap()
        .assert_failure()
        .assert_stderr_contains("Invalid definition file");
}
