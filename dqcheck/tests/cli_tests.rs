use anyhow::{Context, Result};
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// A throwaway project directory with its own state dir.
struct DqTestEnv {
    _tmp: TempDir,
    root: PathBuf,
}

impl DqTestEnv {
    fn new() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().to_path_buf();
        Ok(Self { _tmp: tmp, root })
    }

    fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    fn dqcheck(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dqcheck"));
        cmd.current_dir(&self.root);
        cmd.arg("--project-dir").arg(&self.root);
        cmd.env_remove("DQCHECK_STATE_DIR");
        cmd
    }

    fn json(&self, args: &[&str]) -> Result<serde_json::Value> {
        let output = self.dqcheck().arg("--json").args(args).output()?;
        assert!(
            output.status.success(),
            "dqcheck {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).context("stdout is not JSON")
    }
}

const CUSTOMERS: &str = "\
id,email,score
1,ana@example.com,50
2,not-an-email,150
3,,70
4,zoe@example.com,60
";

const RULES: &str = "\
- name: Email required
  rule_type: mandatory
  source_column: email
  severity: high
- name: Email format
  rule_type: pattern
  source_column: email
  pattern_type: email
- name: Score range
  rule_type: range
  source_column: score
  min_value: 0
  max_value: 100
";

fn setup(env: &DqTestEnv) -> Result<()> {
    env.write("customers.csv", CUSTOMERS)?;
    env.write("rules.yaml", RULES)?;
    env.dqcheck()
        .args(["rules", "create", "--file", "rules.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created rule 3 'Score range'"));
    Ok(())
}

fn session_of(report: &serde_json::Value) -> Result<String> {
    report["session_id"]
        .as_str()
        .map(str::to_string)
        .context("missing session_id")
}

#[test]
fn test_rules_are_persisted_in_state_dir() -> Result<()> {
    let env = DqTestEnv::new()?;
    setup(&env)?;

    assert!(Path::new(&env.root.join(".dqcheck/rules.json")).exists());

    let rules = env.json(&["rules", "list"])?;
    assert_eq!(rules.as_array().map(Vec::len), Some(3));
    assert_eq!(rules[2]["rule_type"], "range");

    env.dqcheck()
        .args(["rules", "deactivate", "2"])
        .assert()
        .success();
    let active = env.json(&["rules", "list"])?;
    assert_eq!(active.as_array().map(Vec::len), Some(2));
    let all = env.json(&["rules", "list", "--all"])?;
    assert_eq!(all.as_array().map(Vec::len), Some(3));
    Ok(())
}

#[test]
fn test_run_reports_violations_and_pages() -> Result<()> {
    let env = DqTestEnv::new()?;
    setup(&env)?;

    let report = env.json(&["run", "--rules", "1,2,3", "--csv", "customers.csv"])?;
    let summary = &report["summary"];
    assert_eq!(summary["total_records_checked"], 4);
    // null email, bad email, score 150
    assert_eq!(summary["total_violations"], 3);
    assert_eq!(summary["rules_failed"], 3);
    assert!(report["dq_score"].as_f64().unwrap_or(100.0) < 100.0);
    assert_eq!(report["violations"]["items"].as_array().map(Vec::len), Some(3));

    let session = session_of(&report)?;
    let page = env.json(&["violations", "--session", &session, "--page", "2", "--page-size", "2"])?;
    assert_eq!(page["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(page["pagination"]["total_pages"], 2);

    let beyond = env.json(&["violations", "--session", &session, "--page", "5", "--page-size", "2"])?;
    assert_eq!(beyond["items"].as_array().map(Vec::len), Some(0));
    assert_eq!(beyond["pagination"]["total_pages"], 2);

    let stored = env.json(&["summary", "--session", &session])?;
    assert_eq!(stored["dq_score"], report["dq_score"]);
    Ok(())
}

#[test]
fn test_source_descriptor_file() -> Result<()> {
    let env = DqTestEnv::new()?;
    setup(&env)?;
    env.write("source.yaml", "source_type: csv\npath: customers.csv\n")?;

    env.dqcheck()
        .args(["run", "--rules", "3", "--source", "source.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DQ score"));
    Ok(())
}

#[test]
fn test_fail_under_sets_exit_code() -> Result<()> {
    let env = DqTestEnv::new()?;
    setup(&env)?;
    env.dqcheck()
        .args(["run", "--rules", "1", "--csv", "customers.csv", "--fail-under", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("below the required"));
    Ok(())
}

#[test]
fn test_missing_source_fails_without_session() -> Result<()> {
    let env = DqTestEnv::new()?;
    setup(&env)?;

    env.dqcheck()
        .args(["run", "--rules", "1", "--csv", "nope.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unavailable"));

    let runs = env.json(&["runs"])?;
    assert_eq!(runs.as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn test_errors_are_structured_in_json_mode() -> Result<()> {
    let env = DqTestEnv::new()?;
    let output = env
        .dqcheck()
        .args(["--json", "summary", "--session", "6f1c2b7e-8a43-4c1e-9a55-0d2f3e4b5a6c"])
        .output()?;
    assert!(!output.status.success());
    let body: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(body["status"], 404);
    assert_eq!(body["kind"], "not_found");

    env.write("bad.yaml", "name: Broken\nrule_type: threshold\nsource_column: amount\n")?;
    let output = env
        .dqcheck()
        .args(["--json", "rules", "create", "--file", "bad.yaml"])
        .output()?;
    let body: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(body["status"], 400);
    Ok(())
}

#[test]
fn test_config_file_changes_state_dir() -> Result<()> {
    let env = DqTestEnv::new()?;
    env.write("dqcheck.yaml", "state_dir: custom_state\n")?;
    setup(&env)?;
    assert!(env.root.join("custom_state/rules.json").exists());
    Ok(())
}

#[test]
fn test_passing_kpi_value_is_shown_and_kept() -> Result<()> {
    let env = DqTestEnv::new()?;
    setup(&env)?;
    env.write(
        "kpi.yaml",
        "name: Avg score\nrule_type: kpi\nsource_column: score\noperator_type: avg\noperator: '>='\nthreshold_value: 50\n",
    )?;
    env.dqcheck()
        .args(["rules", "create", "--file", "kpi.yaml"])
        .assert()
        .success();

    let report = env.json(&["run", "--rules", "4", "--csv", "customers.csv"])?;
    let outcome = &report["summary"]["outcomes"][0];
    assert_eq!(outcome["passed"], true);
    assert_eq!(outcome["aggregate_value"], 82.5);

    let history = env.json(&["kpis", "--rule", "4"])?;
    assert_eq!(history.as_array().map(Vec::len), Some(1));
    assert_eq!(history[0]["value"], 82.5);
    assert_eq!(history[0]["passed"], true);
    assert_eq!(history[0]["session_id"], report["session_id"]);

    env.dqcheck()
        .args(["run", "--rules", "4", "--csv", "customers.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("82.5000"));
    env.dqcheck()
        .args(["kpis"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Avg score (4)"));
    Ok(())
}

#[test]
fn test_rule_file_with_one_bad_definition_creates_nothing() -> Result<()> {
    let env = DqTestEnv::new()?;
    setup(&env)?;
    env.write(
        "mixed.yaml",
        "- name: Id required\n  rule_type: mandatory\n  source_column: id\n- name: Broken\n  rule_type: threshold\n  source_column: score\n",
    )?;
    env.dqcheck()
        .args(["rules", "create", "--file", "mixed.yaml"])
        .assert()
        .failure();

    let rules = env.json(&["rules", "list", "--all"])?;
    assert_eq!(rules.as_array().map(Vec::len), Some(3));
    Ok(())
}

#[test]
fn test_input_errors_are_structured_in_json_mode() -> Result<()> {
    let env = DqTestEnv::new()?;
    let output = env
        .dqcheck()
        .args(["--json", "summary", "--session", "not-a-uuid"])
        .output()?;
    assert!(!output.status.success());
    let body: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(body["status"], 400);
    assert_eq!(body["kind"], "validation");
    assert!(body["message"].as_str().unwrap_or_default().contains("not-a-uuid"));

    let output = env
        .dqcheck()
        .args(["--json", "run", "--rules", "x", "--csv", "a.csv"])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    let body: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(body["status"], 400);

    let output = env.dqcheck().args(["--json", "rules", "create", "--file", "missing.yaml"]).output()?;
    let body: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(body["kind"], "validation");

    // Without --json the plain message stays on stderr
    env.dqcheck()
        .args(["summary", "--session", "not-a-uuid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid session id"));
    Ok(())
}
