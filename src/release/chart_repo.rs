//! Chart repository collaborator
//!
//! The repository is cloned fresh for every run so the chart version that
//! plans are based on is never stale.

use crate::core::config::ChartConfig;
use crate::core::context::Secret;
use crate::core::error::{ReleaseError, ReleaseResult};
use crate::core::vcs::{CommitAuthor, SystemGit};
use crate::release::chart::ChartMutationPlan;
use crate::release::values::YamlDocument;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

pub const CHART_FILE: &str = "Chart.yaml";

/// Result of applying a plan
#[derive(Debug, Clone, Serialize)]
pub struct ChartUpdate {
  /// Commit pushed to the chart repository; `None` when nothing changed
  pub commit: Option<String>,
  pub push_branch: String,
  /// Absolute path of the mutated chart directory in the working copy
  pub chart_dir: PathBuf,
}

/// Where chart mutations are applied
pub trait ChartRepository {
  /// Prepare a fresh working copy of the default branch
  fn checkout(&mut self) -> ReleaseResult<()>;

  /// `version` from `{chart_path}/Chart.yaml` in the working copy
  fn current_chart_version(&self, chart_path: &Path) -> ReleaseResult<String>;

  /// Write, commit and push the plan
  fn apply(&mut self, plan: &ChartMutationPlan) -> ReleaseResult<ChartUpdate>;
}

/// Chart repository reached through system git
pub struct GitChartRepository {
  config: ChartConfig,
  credential: Option<Secret>,
  workdir: Option<(TempDir, SystemGit)>,
}

impl GitChartRepository {
  pub fn new(config: ChartConfig, credential: Option<Secret>) -> Self {
    Self {
      config,
      credential,
      workdir: None,
    }
  }

  /// Clone URL with the token embedded for https remotes
  fn authenticated_url(&self) -> String {
    let url = self.config.repository.as_str();
    match (&self.credential, url.strip_prefix("https://")) {
      (Some(token), Some(rest)) if !rest.split('/').next().unwrap_or_default().contains('@') => {
        format!("https://x-access-token:{}@{}", token.expose(), rest)
      }
      _ => url.to_string(),
    }
  }

  fn redact(&self, text: &str) -> String {
    match &self.credential {
      Some(token) => token.redact(text),
      None => text.to_string(),
    }
  }

  fn working_copy(&self) -> ReleaseResult<&SystemGit> {
    self
      .workdir
      .as_ref()
      .map(|(_, git)| git)
      .ok_or_else(|| ReleaseError::chart("checkout", "chart repository is not checked out"))
  }

  fn git_failure(&self, step: &str, err: ReleaseError) -> ReleaseError {
    ReleaseError::chart(step, self.redact(&err.to_string()))
  }
}

impl ChartRepository for GitChartRepository {
  fn checkout(&mut self) -> ReleaseResult<()> {
    let dir = TempDir::new().map_err(|e| ReleaseError::chart("clone", e.to_string()))?;
    let dest = dir.path().join("charts");

    info!(
      repository = %self.config.repository,
      branch = %self.config.default_branch,
      "Cloning chart repository"
    );
    let git = SystemGit::clone_branch(&self.authenticated_url(), &self.config.default_branch, &dest)
      .map_err(|e| self.git_failure("clone", e))?;

    self.workdir = Some((dir, git));
    Ok(())
  }

  fn current_chart_version(&self, chart_path: &Path) -> ReleaseResult<String> {
    let git = self.working_copy()?;
    let chart_file = git.work_tree().join(chart_path).join(CHART_FILE);
    let doc = YamlDocument::load(&chart_file)?;
    let version = doc
      .get_str("version")
      .filter(|v| !v.trim().is_empty())
      .ok_or_else(|| ReleaseError::chart("read", format!("{} has no version", chart_file.display())))?;

    debug!(chart = %chart_path.display(), version = %version, "Read current chart version");
    Ok(version.trim().to_string())
  }

  fn apply(&mut self, plan: &ChartMutationPlan) -> ReleaseResult<ChartUpdate> {
    let git = self.working_copy()?;
    let chart_dir = git.work_tree().join(&plan.chart_path);

    let chart_file = chart_dir.join(CHART_FILE);
    let mut chart = YamlDocument::load(&chart_file)?;
    chart.set_str("version", &plan.new_version)?;
    chart.set_str("appVersion", &plan.new_app_version)?;
    chart.save(&chart_file)?;

    let values_file = chart_dir.join(&self.config.values_file);
    let mut values = YamlDocument::load(&values_file)?;
    for (key, value) in &plan.value_overrides {
      values.set_str(key, value)?;
    }
    if let Some(prefix) = &plan.host_prefix {
      for key in &plan.prefixed_keys {
        let updated = values.prefix_str(key, prefix)?;
        debug!(key = %key, value = %updated, "Prefixed host value");
      }
    }
    values.save(&values_file)?;

    git.add_all().map_err(|e| self.git_failure("commit", e))?;
    if !git.has_staged_changes().map_err(|e| self.git_failure("commit", e))? {
      warn!(chart = %plan.chart_path.display(), "Chart already up to date; nothing to push");
      return Ok(ChartUpdate {
        commit: None,
        push_branch: plan.push_branch.clone(),
        chart_dir,
      });
    }

    let author = CommitAuthor {
      name: self.config.author_name.clone(),
      email: self.config.author_email.clone(),
    };
    let commit = git
      .commit(&plan.commit_message, &author)
      .map_err(|e| self.git_failure("commit", e))?;
    // Other branches are rebuilt from the default branch on every run
    let force = plan.push_branch != self.config.default_branch;
    git
      .push_head("origin", &plan.push_branch, force)
      .map_err(|e| self.git_failure("push", e))?;

    info!(commit = %commit, branch = %plan.push_branch, force, "Pushed chart update");
    Ok(ChartUpdate {
      commit: Some(commit),
      push_branch: plan.push_branch.clone(),
      chart_dir,
    })
  }
}
