//! Integration tests for `shipline plan`

use crate::helpers::{ChartRemote, TestRepo, run_shipline, run_shipline_ok, stdout_json};
use anyhow::Result;

fn config(repo: &TestRepo, chart: &ChartRemote, oracle_answer: &str) -> Result<()> {
  let oracle = repo.write_script("oracle", &format!("echo '{}'\n", oracle_answer))?;
  repo.write_config(&format!(
    "[chart]\nrepository = '{}'\n\n[oracle]\nkind = \"command\"\ncommand = ['{}']\n",
    chart.url,
    oracle.display()
  ))
}

#[test]
fn test_plan_without_token_is_local() -> Result<()> {
  let repo = TestRepo::new()?;
  repo.checkout_new("feature-a")?;

  let output = run_shipline_ok(&repo.path, &["plan", "--json", "--commit-hash", "abc123"])?;
  let plan = stdout_json(&output)?;

  assert_eq!(plan["decision"]["environment"], "local");
  assert_eq!(plan["tags"], serde_json::json!([]));
  assert!(plan["chart"].is_null());
  Ok(())
}

#[test]
fn test_plan_review_branch() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  // The oracle must not be consulted off the main branch
  config(&repo, &chart, "not json")?;

  let output = run_shipline_ok(
    &repo.path,
    &[
      "plan",
      "--json",
      "--token",
      "ci-token",
      "--branch",
      "feature-a",
      "--commit-hash",
      "abc123",
      "--registry-path",
      "ghcr.io/acme/web",
      "--app-name",
      "web",
    ],
  )?;
  let plan = stdout_json(&output)?;

  assert_eq!(plan["decision"]["environment"], "review");
  let tag = plan["tags"][0].as_str().unwrap_or_default();
  assert!(tag.starts_with("review-feature-a-abc123."), "unexpected tag {}", tag);

  let new_version = plan["chart"]["new_version"].as_str().unwrap_or_default();
  assert!(new_version.starts_with("0.4.0-review-feature-a-abc123."));
  assert_eq!(plan["chart"]["host_prefix"], "review-feature-a-");
  assert_eq!(plan["chart"]["new_app_version"], tag);
  assert_eq!(plan["chart"]["push_branch"], "feature-a");

  // Nothing was pushed
  assert!(!chart.has_branch("feature-a"));
  Ok(())
}

#[test]
fn test_plan_defaults_branch_from_git() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  config(&repo, &chart, "not json")?;
  repo.checkout_new("42-fix-login")?;

  let output = run_shipline_ok(
    &repo.path,
    &[
      "plan",
      "--json",
      "--token",
      "ci-token",
      "--registry-path",
      "ghcr.io/acme/web",
      "--app-name",
      "web",
    ],
  )?;
  let plan = stdout_json(&output)?;

  assert_eq!(plan["decision"]["environment"], "review");
  let new_version = plan["chart"]["new_version"].as_str().unwrap_or_default();
  assert!(new_version.starts_with("0.4.0-issue-42-"), "unexpected version {}", new_version);
  assert_eq!(plan["chart"]["host_prefix"], "issue-42-");
  Ok(())
}

#[test]
fn test_plan_stable_is_reproducible() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  config(&repo, &chart, r#"{"last_release":"1.2.3","next_release":"1.3.0"}"#)?;

  let args = [
    "plan",
    "--json",
    "--token",
    "ci-token",
    "--branch",
    "main",
    "--commit-hash",
    "abc123",
    "--registry-path",
    "ghcr.io/acme/web",
    "--app-name",
    "web",
  ];
  let first = stdout_json(&run_shipline_ok(&repo.path, &args)?)?;
  let second = stdout_json(&run_shipline_ok(&repo.path, &args)?)?;

  assert_eq!(first["decision"]["environment"], "stable");
  assert_eq!(first["decision"]["version"], "1.3.0");
  assert_eq!(first["tags"], serde_json::json!(["1.3.0", "stable", "latest"]));
  assert_eq!(first["chart"]["new_version"], "1.3.0");
  assert_eq!(first["chart"]["push_branch"], "main");
  assert_eq!(first["id"], second["id"]);
  Ok(())
}

#[test]
fn test_plan_latest_on_main() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  config(&repo, &chart, r#"{"last_release":"1.2.3","next_release":null}"#)?;

  let output = run_shipline_ok(
    &repo.path,
    &[
      "plan",
      "--json",
      "--token",
      "ci-token",
      "--branch",
      "main",
      "--commit-hash",
      "abc123",
      "--registry-path",
      "ghcr.io/acme/web",
      "--app-name",
      "web",
    ],
  )?;
  let plan = stdout_json(&output)?;

  assert_eq!(plan["decision"]["environment"], "latest");
  assert_eq!(plan["tags"][1], "latest");
  assert!(plan["tags"][0].as_str().unwrap_or_default().starts_with("1.2.3-abc123."));
  assert_eq!(plan["chart"]["host_prefix"], "latest-");
  assert_eq!(plan["chart"]["push_branch"], "latest");
  Ok(())
}

#[test]
fn test_malformed_oracle_exits_with_versioning_code() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  config(&repo, &chart, r#"{"next_release":"1.3.0"}"#)?;

  let output = run_shipline(
    &repo.path,
    &[
      "plan",
      "--token",
      "ci-token",
      "--branch",
      "main",
      "--commit-hash",
      "abc123",
      "--registry-path",
      "ghcr.io/acme/web",
      "--app-name",
      "web",
    ],
  )?;

  assert_eq!(output.status.code(), Some(4));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.contains("last_release"), "stderr: {}", stderr);
  assert!(stderr.contains("classified_branch"), "stderr: {}", stderr);
  Ok(())
}

#[test]
fn test_human_output() -> Result<()> {
  let repo = TestRepo::new()?;
  let chart = ChartRemote::new()?;
  config(&repo, &chart, "not json")?;

  let output = run_shipline_ok(
    &repo.path,
    &[
      "plan",
      "--token",
      "ci-token",
      "--branch",
      "feature/login",
      "--commit-hash",
      "abc123",
      "--registry-path",
      "ghcr.io/acme/web",
      "--app-name",
      "web",
    ],
  )?;
  let stdout = String::from_utf8_lossy(&output.stdout);

  assert!(stdout.contains("review release"));
  assert!(stdout.contains("review-feature-login-abc123."));
  assert!(stdout.contains("Prefix ingress.host with 'review-feature-login-'"));
  Ok(())
}
