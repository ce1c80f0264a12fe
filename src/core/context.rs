//! Run context - resolve inputs once, pass everywhere
//!
//! `RunContext` gathers the CLI inputs, the config file and the defaults taken
//! from the source checkout (branch, commit) before any stage runs. Stages
//! only read from it.

use crate::core::config::{ShiplineConfig, is_dotted_key};
use crate::core::error::{ConfigError, ReleaseError, ReleaseResult};
use crate::core::vcs::SystemGit;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// A credential that never prints its value
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  /// The raw value, for handing to a child process
  pub fn expose(&self) -> &str {
    &self.0
  }

  /// Remove every occurrence of the secret from `text`
  pub fn redact(&self, text: &str) -> String {
    if self.0.is_empty() {
      text.to_string()
    } else {
      text.replace(&self.0, "***")
    }
  }
}

impl fmt::Debug for Secret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Secret(***)")
  }
}

/// Inputs as received from the command line
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
  pub source_dir: PathBuf,
  pub credential: Option<Secret>,
  pub username: Option<String>,
  pub branch: Option<String>,
  pub commit_hash: Option<String>,
  pub registry_path: Option<String>,
  pub repository_url: Option<String>,
  pub app_name: Option<String>,
  pub chart_repository: Option<String>,
  pub chart_credential: Option<Secret>,
  pub image: Option<String>,
}

/// Fully resolved inputs for one pipeline run
#[derive(Debug, Clone)]
pub struct RunContext {
  pub source_dir: PathBuf,
  pub credential: Option<Secret>,
  pub username: Option<String>,
  pub branch: String,
  pub commit_hash: String,
  pub registry_path: Option<String>,
  pub repository_url: Option<String>,
  pub app_name: Option<String>,
  pub chart_credential: Option<Secret>,
  pub image: Option<String>,
  pub config: ShiplineConfig,
}

impl RunContext {
  /// Resolve CLI inputs against the config file and the source checkout
  pub fn build(inputs: RunInputs) -> ReleaseResult<Self> {
    let source_dir = inputs.source_dir.clone();
    let mut config = ShiplineConfig::load(&source_dir)?;
    if let Some(repo) = inputs.chart_repository.filter(|r| !r.trim().is_empty()) {
      config.chart.repository = repo;
    }

    // Only touch git when the caller left something to discover
    let git = if inputs.branch.is_none() || inputs.commit_hash.is_none() {
      Some(SystemGit::open(&source_dir)?)
    } else {
      None
    };

    let branch = match inputs.branch {
      Some(branch) => branch,
      None => git.as_ref().map(|g| g.current_branch()).transpose()?.unwrap_or_default(),
    };
    let commit_hash = match inputs.commit_hash {
      Some(hash) => hash,
      None => git.as_ref().map(|g| g.short_head()).transpose()?.unwrap_or_default(),
    };

    if branch.trim().is_empty() {
      return Err(missing("branch"));
    }
    if commit_hash.trim().is_empty() {
      return Err(missing("commit_hash"));
    }
    if !commit_hash.chars().all(|c| c.is_ascii_alphanumeric()) {
      return Err(ReleaseError::Config(ConfigError::InvalidValue {
        field: "commit_hash".to_string(),
        reason: format!("'{}' is not a commit hash", commit_hash),
      }));
    }

    // The app name becomes a path inside the chart checkout
    if let Some(app) = inputs.app_name.as_deref().filter(|a| !a.is_empty())
      && !is_dotted_key(app)
    {
      return Err(ReleaseError::Config(ConfigError::InvalidValue {
        field: "app_name".to_string(),
        reason: format!("'{}' may only contain letters, digits, '_', '-' and single dots", app),
      }));
    }

    debug!(branch = %branch, commit = %commit_hash, "Resolved run context");

    Ok(Self {
      source_dir,
      credential: inputs.credential.filter(|s| !s.expose().is_empty()),
      username: inputs.username,
      branch,
      commit_hash,
      registry_path: inputs.registry_path,
      repository_url: inputs.repository_url.map(|u| u.trim_end_matches('/').to_string()),
      app_name: inputs.app_name,
      chart_credential: inputs.chart_credential.filter(|s| !s.expose().is_empty()),
      image: inputs.image,
      config,
    })
  }

  pub fn has_ci_credential(&self) -> bool {
    self.credential.is_some()
  }

  /// App name, required once the run touches the registry or the chart
  pub fn require_app_name(&self) -> ReleaseResult<&str> {
    self.app_name.as_deref().filter(|s| !s.is_empty()).ok_or_else(|| missing("app_name"))
  }

  pub fn require_registry_path(&self) -> ReleaseResult<&str> {
    self
      .registry_path
      .as_deref()
      .filter(|s| !s.is_empty())
      .ok_or_else(|| missing("registry_path"))
  }

  /// Local image to publish: `--image`, else the configured template
  pub fn local_image(&self) -> ReleaseResult<String> {
    match &self.image {
      Some(image) if !image.is_empty() => Ok(image.clone()),
      _ => Ok(self.config.registry.image.replace("{app}", self.require_app_name()?)),
    }
  }
}

fn missing(field: &str) -> ReleaseError {
  ReleaseError::Config(ConfigError::MissingValue {
    field: field.to_string(),
  })
}
