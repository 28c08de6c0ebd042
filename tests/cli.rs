use std::fs;

use assert_cmd::Command;
use csv_cube::schema::{DimensionType, Schema};
use predicates::str::contains;

mod common;
use common::TestWorkspace;

const SURVEY: &str = "\
Sample survey;;;;
Produced by ACME;;;;
Country;Gender;Weight;Height;Age
Australia;male;10;20;30
Australia;female;11;21;31
France;male;12;22;32
France;female;13;23;33
";

const LONG: &str = "\
country,quarter,value
Australia,1967-Q4,1.0
Australia,1968-Q1,1.2
France,1967-Q4,2.0
France,1968-Q1,2.5
";

fn cube_cmd() -> Command {
    Command::cargo_bin("csv-cube").expect("binary exists")
}

#[test]
fn guess_writes_schema_yaml() {
    let ws = TestWorkspace::new();
    let input = ws.write("survey.csv", SURVEY);
    let schema_path = ws.path().join("survey.yaml");

    cube_cmd()
        .args([
            "guess",
            "-i",
            input.to_str().unwrap(),
            "-s",
            schema_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let schema = Schema::load(&schema_path).expect("load schema");
    assert_eq!(schema.separator, ';');
    assert_eq!(schema.row_axes, 3);
    assert_eq!(schema.header_row, 2);
    assert_eq!(schema.dimension_cols, [0, 1].into());
    assert_eq!(schema.data_cols, [2, 3, 4].into());
    assert!(schema.horizontal.is_some());
}

#[test]
fn guess_prints_yaml_to_stdout_when_no_schema_path() {
    let ws = TestWorkspace::new();
    let input = ws.write("long.csv", LONG);

    cube_cmd()
        .args(["guess", "-i", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("separator:"))
        .stdout(contains("row_axes: 1"));
}

#[test]
fn import_exports_long_format_with_metadata() {
    let ws = TestWorkspace::new();
    let input = ws.write("long.csv", LONG);
    let output = ws.path().join("cube.csv");

    cube_cmd()
        .args([
            "import",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let text = fs::read_to_string(&output).expect("read export");
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].contains("RavelHypercube="));
    assert_eq!(lines[1], "country,quarter,value");
    assert_eq!(lines.len(), 6);
}

#[test]
fn import_survey_flattens_the_horizontal_axis() {
    let ws = TestWorkspace::new();
    let input = ws.write("survey.csv", SURVEY);
    let output = ws.path().join("cube.csv");

    cube_cmd()
        .args([
            "import",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let text = fs::read_to_string(&output).expect("read export");
    // 4 data rows times 3 data columns, plus metadata and header.
    assert_eq!(text.lines().count(), 14);
    assert!(text.contains("Australia,male,Weight,10"));
    assert!(text.contains("France,female,Age,33"));
}

#[test]
fn import_rejects_duplicate_keys_by_default() {
    let ws = TestWorkspace::new();
    let input = ws.write(
        "dup.csv",
        "country,quarter,value\nAustralia,1967-Q4,1.0\nAustralia,1967-Q4,1.2\n",
    );

    cube_cmd()
        .args(["import", "-i", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("Duplicate key"));
}

#[test]
fn import_duplicates_sum_policy() {
    let ws = TestWorkspace::new();
    let input = ws.write(
        "dup.csv",
        "country,quarter,value\nAustralia,1967-Q4,1.0\nAustralia,1967-Q4,1.2\nFrance,1967-Q4,2.0\nFrance,1968-Q1,2.5\n",
    );
    let output = ws.path().join("cube.csv");

    cube_cmd()
        .args([
            "import",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--duplicates",
            "sum",
        ])
        .assert()
        .success();

    let text = fs::read_to_string(&output).expect("read export");
    assert!(text.contains("Australia,1967-Q4,2.2"));
}

#[test]
fn import_merges_multiple_inputs() {
    let ws = TestWorkspace::new();
    let first = ws.write(
        "first.csv",
        "country,quarter,value\nAustralia,1967-Q4,1.0\nFrance,1967-Q4,2.0\n",
    );
    let second = ws.write(
        "second.csv",
        "country,quarter,value\nAustralia,1968-Q1,1.2\nFrance,1968-Q1,2.5\n",
    );
    let schema_path = ws.path().join("schema.yaml");
    let output = ws.path().join("cube.csv");

    cube_cmd()
        .args([
            "guess",
            "-i",
            first.to_str().unwrap(),
            "-s",
            schema_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    cube_cmd()
        .args([
            "import",
            "-i",
            first.to_str().unwrap(),
            "-i",
            second.to_str().unwrap(),
            "-s",
            schema_path.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let text = fs::read_to_string(&output).expect("read export");
    assert!(text.contains("Australia,1968-Q1,1.2"));
    assert!(text.contains("France,1967-Q4,2"));
}

#[test]
fn import_with_tight_budget_fails_cleanly() {
    let ws = TestWorkspace::new();
    let input = ws.write("long.csv", LONG);

    cube_cmd()
        .args([
            "import",
            "-i",
            input.to_str().unwrap(),
            "--budget",
            "8",
        ])
        .assert()
        .failure()
        .stderr(contains("memory budget exhausted"));
}

#[test]
fn report_annotates_bad_rows() {
    let ws = TestWorkspace::new();
    let input = ws.write(
        "bad.csv",
        "country,quarter,value\nAustralia,1966-Q,1.0\nFrance,1967-Q4,2.0\nFrance,1968-Q1,2.5\n",
    );
    let schema_path = ws.path().join("schema.yaml");
    // Guessing would type the quarter column from the malformed sample, so
    // pin the schema first from a clean sibling file.
    let clean = ws.write("clean.csv", LONG);
    cube_cmd()
        .args([
            "guess",
            "-i",
            clean.to_str().unwrap(),
            "-s",
            schema_path.to_str().unwrap(),
        ])
        .assert()
        .success();
    let output = ws.path().join("report.csv");

    cube_cmd()
        .args([
            "report",
            "-i",
            input.to_str().unwrap(),
            "-s",
            schema_path.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let text = fs::read_to_string(&output).expect("read report");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Error,country,quarter,value");
    assert!(lines[1].contains("Invalid data"));
    assert!(lines[2].starts_with(','));
}

#[test]
fn report_honors_duplicate_policy_flag() {
    let ws = TestWorkspace::new();
    let input = ws.write(
        "dup.csv",
        "country,quarter,value\nAustralia,1967-Q4,1.0\nAustralia,1967-Q4,1.2\nFrance,1967-Q4,2.0\n",
    );
    let flagged = ws.path().join("flagged.csv");
    let clean = ws.path().join("clean.csv");

    cube_cmd()
        .args([
            "report",
            "-i",
            input.to_str().unwrap(),
            "-o",
            flagged.to_str().unwrap(),
        ])
        .assert()
        .success();

    let text = fs::read_to_string(&flagged).expect("read report");
    assert!(text.contains("Duplicate key"));

    cube_cmd()
        .args([
            "report",
            "-i",
            input.to_str().unwrap(),
            "-o",
            clean.to_str().unwrap(),
            "--duplicates",
            "sum",
        ])
        .assert()
        .success();

    let text = fs::read_to_string(&clean).expect("read report");
    for line in text.lines().skip(1) {
        assert!(line.starts_with(','), "unexpected flag on {line}");
    }
}

#[test]
fn stdin_import_without_schema_is_refused() {
    cube_cmd()
        .args(["import", "-i", "-"])
        .write_stdin(LONG)
        .assert()
        .failure()
        .stderr(contains("requires --schema"));
}

#[test]
fn guess_detects_time_dimension() {
    let ws = TestWorkspace::new();
    let input = ws.write("long.csv", LONG);
    let schema_path = ws.path().join("schema.yaml");

    cube_cmd()
        .args([
            "guess",
            "-i",
            input.to_str().unwrap(),
            "-s",
            schema_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let schema = Schema::load(&schema_path).expect("load schema");
    let dim = schema.dimension_for(1);
    assert_eq!(dim.kind, DimensionType::Time);
    assert_eq!(dim.units, "%Y-Q%Q");
}
