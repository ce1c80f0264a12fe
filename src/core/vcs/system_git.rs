//! System git backend
//!
//! Every operation is a `git` subprocess with an isolated environment and
//! arguments passed as argv, never through a shell.

use crate::core::error::{GitError, ReleaseError, ReleaseResult, ResultExt};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Git backend using system git
pub struct SystemGit {
  /// Repository working directory
  pub(crate) repo_path: PathBuf,

  /// Working tree root
  pub(crate) work_tree: PathBuf,
}

impl SystemGit {
  /// Open a git repository
  pub fn open(path: &Path) -> ReleaseResult<Self> {
    let output = Self::base_cmd()
      .arg("-C")
      .arg(path)
      .args(["rev-parse", "--show-toplevel"])
      .output()
      .context("Failed to execute git rev-parse")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if stderr.contains("not a git repository") {
        return Err(ReleaseError::Git(GitError::RepoNotFound {
          path: path.to_path_buf(),
        }));
      }
      return Err(ReleaseError::message(format!("Failed to open git repository: {}", stderr)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let work_tree = stdout.trim();

    Ok(Self {
      repo_path: path.to_path_buf(),
      work_tree: PathBuf::from(work_tree),
    })
  }

  /// Working tree root
  pub fn work_tree(&self) -> &Path {
    &self.work_tree
  }

  /// Get HEAD commit SHA
  pub fn head_commit(&self) -> ReleaseResult<String> {
    self.run(&["rev-parse", "HEAD"])
  }

  /// Get abbreviated HEAD commit SHA (as used in image tags)
  pub fn short_head(&self) -> ReleaseResult<String> {
    self.run(&["rev-parse", "--short", "HEAD"])
  }

  /// Get current branch name
  ///
  /// A detached HEAD has no branch; CI checkouts usually need `--branch`.
  pub fn current_branch(&self) -> ReleaseResult<String> {
    let branch = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
    if branch == "HEAD" {
      return Err(ReleaseError::with_help(
        "HEAD is detached; cannot determine the current branch",
        "Pass --branch explicitly",
      ));
    }
    Ok(branch)
  }

  /// Run a git command in this repository and return trimmed stdout
  pub(crate) fn run(&self, args: &[&str]) -> ReleaseResult<String> {
    let output = self
      .git_cmd()
      .args(args)
      .output()
      .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

    if !output.status.success() {
      return Err(ReleaseError::Git(GitError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      }));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// Create a safe git command with isolated environment
  ///
  /// - Sets working directory to repo path
  /// - Clears environment variables
  /// - Whitelists only PATH and HOME
  /// - Never prompts for credentials
  pub(crate) fn git_cmd(&self) -> Command {
    let mut cmd = Self::base_cmd();
    cmd.arg("-C").arg(&self.repo_path);
    cmd
  }

  pub(crate) fn base_cmd() -> Command {
    let mut cmd = Command::new("git");

    // Isolated environment (don't trust global config)
    cmd.env_clear();
    if let Ok(path) = std::env::var("PATH") {
      cmd.env("PATH", path);
    }
    if let Ok(home) = std::env::var("HOME") {
      cmd.env("HOME", home);
    }
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    cmd.arg("-c").arg("protocol.version=2");
    cmd.arg("-c").arg("advice.detachedHead=false");
    cmd.arg("-c").arg("core.quotePath=false");

    cmd
  }
}
