//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// An application source repository with git history
pub struct TestRepo {
  _root: TempDir,
  pub path: PathBuf,
}

impl TestRepo {
  /// Create a repository on `main` with one commit
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().to_path_buf();

    git(&path, &["init", "--initial-branch=main"])?;
    git(&path, &["config", "user.name", "Test User"])?;
    git(&path, &["config", "user.email", "test@example.com"])?;
    std::fs::write(path.join("Dockerfile"), "FROM scratch\n")?;
    git(&path, &["add", "."])?;
    git(&path, &["commit", "-m", "feat: initial app"])?;

    Ok(Self { _root: root, path })
  }

  /// Switch to a new branch
  pub fn checkout_new(&self, branch: &str) -> Result<()> {
    git(&self.path, &["checkout", "-b", branch])?;
    Ok(())
  }

  /// Write shipline.toml (not committed)
  pub fn write_config(&self, content: &str) -> Result<()> {
    std::fs::write(self.path.join("shipline.toml"), content)?;
    Ok(())
  }

  /// Write an executable script next to the repository and return its path
  pub fn write_script(&self, name: &str, body: &str) -> Result<PathBuf> {
    let dir = self.path.join(".bin");
    std::fs::create_dir_all(&dir)?;
    let script = dir.join(name);
    std::fs::write(&script, format!("#!/bin/sh\n{}", body))?;
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(script)
  }
}

/// A bare chart repository holding `apps/web` on `main`
pub struct ChartRemote {
  _root: TempDir,
  pub url: String,
}

impl ChartRemote {
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let bare = root.path().join("helm-charts.git");
    let seed = root.path().join("seed");
    let chart = seed.join("apps/web");
    std::fs::create_dir_all(&chart)?;
    std::fs::write(
      chart.join("Chart.yaml"),
      "apiVersion: v2\nname: web\nversion: 0.4.0\nappVersion: 1.2.3\n",
    )?;
    std::fs::write(
      chart.join("values.yaml"),
      "image:\n  repository: ghcr.io/acme/web\n  tag: 1.2.3\ningress:\n  enabled: true\n  host: web.example.com\n",
    )?;

    git(root.path(), &["init", "--bare", "--initial-branch=main", &bare.to_string_lossy()])?;
    git(&seed, &["init", "--initial-branch=main"])?;
    git(&seed, &["add", "."])?;
    git(&seed, &["-c", "user.name=seed", "-c", "user.email=seed@example.com", "commit", "-m", "Add web chart"])?;
    git(&seed, &["push", &bare.to_string_lossy(), "main"])?;

    Ok(Self {
      url: bare.to_string_lossy().to_string(),
      _root: root,
    })
  }

  /// File contents at `rev` in the remote, or `None` if it does not exist
  pub fn show(&self, rev: &str, path: &str) -> Option<String> {
    let output = Command::new("git")
      .args(["--git-dir", &self.url, "show", &format!("{}:{}", rev, path)])
      .output()
      .ok()?;
    output
      .status
      .success()
      .then(|| String::from_utf8_lossy(&output.stdout).to_string())
  }

  /// Subject of the latest commit on `branch`
  pub fn last_subject(&self, branch: &str) -> Result<String> {
    let output = Command::new("git")
      .args(["--git-dir", &self.url, "log", "-1", "--format=%s", branch])
      .output()?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  pub fn has_branch(&self, branch: &str) -> bool {
    Command::new("git")
      .args(["--git-dir", &self.url, "rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", branch)])
      .output()
      .map(|o| o.status.success())
      .unwrap_or(false)
  }
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Run shipline without inheriting CI credentials from the host
pub fn run_shipline(cwd: &Path, args: &[&str]) -> Result<Output> {
  let shipline_bin = env!("CARGO_BIN_EXE_shipline");

  Command::new(shipline_bin)
    .current_dir(cwd)
    .args(args)
    .env_remove("GITHUB_TOKEN")
    .env_remove("GITHUB_ACTOR")
    .env_remove("HELM_REPO_PAT")
    .env_remove("RUST_LOG")
    .output()
    .context("Failed to run shipline")
}

/// Run shipline and fail the test on a non-zero exit
pub fn run_shipline_ok(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = run_shipline(cwd, args)?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    anyhow::bail!(
      "shipline command failed: shipline {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      stdout,
      stderr
    );
  }

  Ok(output)
}

/// Parse stdout as JSON
pub fn stdout_json(output: &Output) -> Result<serde_json::Value> {
  serde_json::from_slice(&output.stdout).context("stdout is not JSON")
}
