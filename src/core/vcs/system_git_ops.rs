//! Write-side operations for SystemGit (clone, commit, push)

use super::CommitAuthor;
use super::system_git::SystemGit;
use crate::core::error::{GitError, ReleaseError, ReleaseResult, ResultExt};
use std::path::Path;

impl SystemGit {
  /// Shallow-clone a single branch of `url` into `dest`
  pub fn clone_branch(url: &str, branch: &str, dest: &Path) -> ReleaseResult<Self> {
    let output = Self::base_cmd()
      .args(["clone", "--depth", "1", "--single-branch", "--branch", branch, "--", url])
      .arg(dest)
      .output()
      .context("Failed to run git clone")?;

    if !output.status.success() {
      return Err(ReleaseError::Git(GitError::CommandFailed {
        command: format!("git clone --branch {}", branch),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      }));
    }

    Self::open(dest)
  }

  /// Stage every change in the working tree
  pub fn add_all(&self) -> ReleaseResult<()> {
    self.run(&["add", "--all"]).map(|_| ())
  }

  /// Whether the index differs from HEAD
  pub fn has_staged_changes(&self) -> ReleaseResult<bool> {
    let output = self
      .git_cmd()
      .args(["diff", "--cached", "--quiet"])
      .output()
      .context("Failed to run git diff")?;

    // --quiet exits 1 when there are differences
    match output.status.code() {
      Some(0) => Ok(false),
      Some(1) => Ok(true),
      _ => Err(ReleaseError::Git(GitError::CommandFailed {
        command: "git diff --cached --quiet".to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      })),
    }
  }

  /// Commit the index as `author` and return the new HEAD SHA
  pub fn commit(&self, message: &str, author: &CommitAuthor) -> ReleaseResult<String> {
    let output = self
      .git_cmd()
      .arg("-c")
      .arg(format!("user.name={}", author.name))
      .arg("-c")
      .arg(format!("user.email={}", author.email))
      .args(["commit", "--no-verify", "-m", message])
      .output()
      .context("Failed to run git commit")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let stdout = String::from_utf8_lossy(&output.stdout);
      return Err(ReleaseError::Git(GitError::CommandFailed {
        command: "git commit".to_string(),
        stderr: format!("{}{}", stderr.trim(), stdout.trim()),
      }));
    }

    self.head_commit()
  }

  /// Push HEAD to `branch` on `remote`. With `force` the remote branch is
  /// replaced instead of fast-forwarded.
  pub fn push_head(&self, remote: &str, branch: &str, force: bool) -> ReleaseResult<()> {
    let refspec = format!("{}HEAD:refs/heads/{}", if force { "+" } else { "" }, branch);
    let output = self
      .git_cmd()
      .args(["push", remote, &refspec])
      .output()
      .context("Failed to run git push")?;

    if !output.status.success() {
      return Err(ReleaseError::Git(GitError::PushFailed {
        remote: remote.to_string(),
        branch: branch.to_string(),
        reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      }));
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::process::Command;

  fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git").current_dir(dir).args(args).output().unwrap();
    assert!(output.status.success(), "git {:?} failed", args);
    String::from_utf8_lossy(&output.stdout).trim().to_string()
  }

  fn author() -> CommitAuthor {
    CommitAuthor {
      name: "bot".to_string(),
      email: "bot@example.com".to_string(),
    }
  }

  /// Bare remote with one commit on `main`
  fn bare_remote() -> (tempfile::TempDir, String) {
    let root = tempfile::TempDir::new().unwrap();
    let bare = root.path().join("remote.git");
    let seed = root.path().join("seed");
    std::fs::create_dir_all(&seed).unwrap();
    git(root.path(), &["init", "--bare", "--initial-branch=main", bare.to_str().unwrap()]);
    git(&seed, &["init", "--initial-branch=main"]);
    std::fs::write(seed.join("file.txt"), "one\n").unwrap();
    git(&seed, &["add", "."]);
    git(&seed, &["-c", "user.name=t", "-c", "user.email=t@e", "commit", "-m", "seed"]);
    git(&seed, &["push", bare.to_str().unwrap(), "main"]);
    let url = bare.to_string_lossy().to_string();
    (root, url)
  }

  #[test]
  fn test_clone_commit_push_to_new_branch() {
    let (root, url) = bare_remote();
    let dest = root.path().join("clone");
    let repo = SystemGit::clone_branch(&url, "main", &dest).unwrap();

    std::fs::write(dest.join("file.txt"), "two\n").unwrap();
    repo.add_all().unwrap();
    assert!(repo.has_staged_changes().unwrap());
    let sha = repo.commit("Update file", &author()).unwrap();
    repo.push_head("origin", "feature-a", false).unwrap();

    let remote_sha = git(root.path(), &["--git-dir", &url, "rev-parse", "refs/heads/feature-a"]);
    assert_eq!(remote_sha, sha);
    let subject = git(root.path(), &["--git-dir", &url, "log", "-1", "--format=%an %s", "feature-a"]);
    assert_eq!(subject, "bot Update file");
  }

  #[test]
  fn test_clone_missing_branch_fails() {
    let (root, url) = bare_remote();
    let result = SystemGit::clone_branch(&url, "nope", &root.path().join("clone"));
    assert!(result.is_err());
  }

  #[test]
  fn test_no_changes_after_add() {
    let (root, url) = bare_remote();
    let repo = SystemGit::clone_branch(&url, "main", &root.path().join("clone")).unwrap();
    repo.add_all().unwrap();
    assert!(!repo.has_staged_changes().unwrap());
  }
}
