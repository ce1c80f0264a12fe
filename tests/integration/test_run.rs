//! Integration tests for `shipline run`

use crate::helpers::{ChartRemote, TestRepo, run_shipline, run_shipline_ok, stdout_json};
use anyhow::Result;
use std::path::PathBuf;

/// Config with a fake container CLI; returns the CLI's call log
fn config(repo: &TestRepo, chart: &ChartRemote, oracle_answer: &str, reject_push: Option<&str>) -> Result<PathBuf> {
  let log = repo.path.join(".bin").join("docker.log");
  let oracle = repo.write_script("oracle", &format!("echo '{}'\n", oracle_answer))?;
  let reject = reject_push
    .map(|tag| format!("case \"$*\" in *\"push\"*\":{}\") echo 'denied: {}' >&2; exit 1;; esac\n", tag, tag))
    .unwrap_or_default();
  let docker = repo.write_script("docker", &format!("{}echo \"$*\" >> '{}'\n", reject, log.display()))?;

  repo.write_config(&format!(
    "[registry]\ncommand = '{}'\n\n[chart]\nrepository = '{}'\n\n[oracle]\nkind = \"command\"\ncommand = ['{}']\n",
    docker.display(),
    chart.url,
    oracle.display()
  ))?;
  Ok(log)
}

fn ci_args<'a>(branch: &'a str) -> Vec<&'a str> {
  vec![
    "run",
    "--token",
    "ci-token",
    "--branch",
    branch,
    "--commit-hash",
    "abc123",
    "--registry-path",
    "ghcr.io/acme/web",
    "--app-name",
    "web",
  ]
}

#[test]
fn test_local_run_publishes_nothing() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  let log = config(&repo, &chart, "not json", None)?;

  let output = run_shipline_ok(&repo.path, &["run", "--branch", "feature-a", "--commit-hash", "abc123"])?;
  let stdout = String::from_utf8_lossy(&output.stdout);

  assert!(stdout.contains("local"));
  assert!(!log.exists(), "container CLI must not run");
  assert!(!chart.has_branch("feature-a"));
  Ok(())
}

#[test]
fn test_review_run_publishes_and_updates_chart() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  let log = config(&repo, &chart, "not json", None)?;

  let mut args = ci_args("42-fix-login");
  args.push("--json");
  let report = stdout_json(&run_shipline_ok(&repo.path, &args)?)?;

  assert_eq!(report["decision"]["environment"], "review");
  let tag = report["tags"][0].as_str().unwrap_or_default().to_string();
  assert!(tag.starts_with("review-42-fix-login-abc123."));

  let calls = std::fs::read_to_string(&log)?;
  assert_eq!(
    calls,
    format!("tag web:build ghcr.io/acme/web:{tag}\npush ghcr.io/acme/web:{tag}\n")
  );

  let values = chart.show("42-fix-login", "apps/web/values.yaml").unwrap_or_default();
  assert!(values.contains("host: issue-42-web.example.com"), "values: {}", values);
  assert!(values.contains(&format!("tag: {}", tag)), "values: {}", values);

  let chart_yaml = chart.show("42-fix-login", "apps/web/Chart.yaml").unwrap_or_default();
  assert!(chart_yaml.contains("version: 0.4.0-issue-42-abc123."));

  let subject = chart.last_subject("42-fix-login")?;
  assert!(subject.starts_with("Update web to version 0.4.0-issue-42-abc123."));

  // The stable chart on main is untouched
  let main_values = chart.show("main", "apps/web/values.yaml").unwrap_or_default();
  assert!(main_values.contains("host: web.example.com"));
  Ok(())
}

#[test]
fn test_stable_run_pushes_to_chart_default_branch() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  let log = config(&repo, &chart, r#"{"last_release":"1.2.3","next_release":"1.3.0"}"#, None)?;

  run_shipline_ok(&repo.path, &ci_args("main"))?;

  let pushes: Vec<String> = std::fs::read_to_string(&log)?
    .lines()
    .filter(|l| l.starts_with("push "))
    .map(String::from)
    .collect();
  assert_eq!(
    pushes,
    vec![
      "push ghcr.io/acme/web:1.3.0",
      "push ghcr.io/acme/web:stable",
      "push ghcr.io/acme/web:latest"
    ]
  );

  let chart_yaml = chart.show("main", "apps/web/Chart.yaml").unwrap_or_default();
  assert!(chart_yaml.contains("version: 1.3.0"));
  assert!(chart_yaml.contains("appVersion: 1.3.0"));
  let values = chart.show("main", "apps/web/values.yaml").unwrap_or_default();
  assert!(values.contains("host: web.example.com"), "stable keeps the host: {}", values);
  assert_eq!(chart.last_subject("main")?, "Update web to version 1.3.0");
  Ok(())
}

#[test]
fn test_second_review_run_replaces_review_branch() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  config(&repo, &chart, "not json", None)?;

  run_shipline_ok(&repo.path, &ci_args("feature-a"))?;
  let mut args = ci_args("feature-a");
  args[6] = "def456";
  run_shipline_ok(&repo.path, &args)?;

  let chart_yaml = chart.show("feature-a", "apps/web/Chart.yaml").unwrap_or_default();
  assert!(chart_yaml.contains("-review-feature-a-def456."), "chart: {}", chart_yaml);
  let values = chart.show("feature-a", "apps/web/values.yaml").unwrap_or_default();
  assert!(values.contains("host: review-feature-a-web.example.com"), "values: {}", values);
  Ok(())
}

#[test]
fn test_latest_runs_leave_chart_default_branch_alone() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  config(&repo, &chart, r#"{"last_release":"1.2.3","next_release":null}"#, None)?;

  run_shipline_ok(&repo.path, &ci_args("main"))?;
  run_shipline_ok(&repo.path, &ci_args("main"))?;

  let values = chart.show("latest", "apps/web/values.yaml").unwrap_or_default();
  assert!(values.contains("host: latest-web.example.com"), "values: {}", values);
  let main_values = chart.show("main", "apps/web/values.yaml").unwrap_or_default();
  assert!(main_values.contains("host: web.example.com"));
  assert!(!main_values.contains("latest-"));
  assert_eq!(chart.last_subject("main")?, "Add web chart");
  Ok(())
}

#[test]
fn test_publish_failure_stops_before_chart() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  let log = config(
    &repo,
    &chart,
    r#"{"last_release":"1.2.3","next_release":"1.3.0"}"#,
    Some("stable"),
  )?;

  let output = run_shipline(&repo.path, &ci_args("main"))?;
  assert_eq!(output.status.code(), Some(5));

  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("stable"), "stderr: {}", stderr);
  assert!(stderr.contains("Partial publish: 1.3.0"), "stderr: {}", stderr);

  let calls = std::fs::read_to_string(&log)?;
  assert!(!calls.contains("push ghcr.io/acme/web:latest"));
  assert_eq!(chart.last_subject("main")?, "Add web chart");
  Ok(())
}

#[test]
fn test_missing_registry_path_is_config_error() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  let log = config(&repo, &chart, "not json", None)?;

  let output = run_shipline(
    &repo.path,
    &["run", "--token", "ci-token", "--branch", "feature-a", "--commit-hash", "abc123", "--app-name", "web"],
  )?;

  assert_eq!(output.status.code(), Some(1));
  assert!(String::from_utf8_lossy(&output.stderr).contains("registry_path"));
  assert!(!log.exists());
  Ok(())
}

#[test]
fn test_missing_chart_is_chart_error() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  config(&repo, &chart, "not json", None)?;

  let mut args = ci_args("feature-a");
  let last = args.len() - 1;
  args[last] = "api";
  let output = run_shipline(&repo.path, &args)?;

  assert_eq!(output.status.code(), Some(6));
  assert!(!chart.has_branch("feature-a"));
  Ok(())
}
