//! Run-context classification
//!
//! An [`Environment`] is threaded through the classification steps as a value:
//! each step consumes the current state and returns the next one, and refuses
//! to run from any state other than the one it advances. That makes the
//! sequence `None -> Ci -> LatestOrStable -> Stable|Latest` strictly forward;
//! `Local` and `Review` end classification early.

use crate::core::error::{ReleaseError, ReleaseResult};
use crate::release::oracle::{OracleReport, OracleRequest, VersionOracle, parse_oracle_report};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Where a pipeline run is executing and what kind of release it produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
  /// Uninitialized (run start)
  None,
  /// No CI credential: nothing is published
  Local,
  /// Credential present, branch not yet classified
  Ci,
  /// Any branch other than the main branch
  Review,
  /// Main branch, version not yet resolved
  LatestOrStable,
  /// Main branch, the oracle found nothing to release
  Latest,
  /// Main branch, the oracle produced a next release
  Stable,
}

impl Environment {
  pub fn as_str(&self) -> &'static str {
    match self {
      Environment::None => "none",
      Environment::Local => "local",
      Environment::Ci => "ci",
      Environment::Review => "review",
      Environment::LatestOrStable => "latest_or_stable",
      Environment::Latest => "latest",
      Environment::Stable => "stable",
    }
  }

  /// Terminal states are never advanced further within a run
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      Environment::Local | Environment::Review | Environment::Latest | Environment::Stable
    )
  }

  /// Step 1: credential check (only from `None`)
  pub fn check_credential(self, has_ci_credential: bool) -> ReleaseResult<Self> {
    if self != Environment::None {
      return Err(ReleaseError::invalid_state("credential check", self));
    }
    if has_ci_credential {
      info!("Running in CI environment");
      Ok(Environment::Ci)
    } else {
      info!("Running locally");
      Ok(Environment::Local)
    }
  }

  /// Step 2: branch check (only from `Ci`)
  pub fn check_branch(self, branch: &str, main_branch: &str) -> ReleaseResult<Self> {
    if self != Environment::Ci {
      return Err(ReleaseError::invalid_state("branch check", self));
    }
    if branch == main_branch {
      info!(branch, "Running on main branch");
      Ok(Environment::LatestOrStable)
    } else {
      info!(branch, "Running on review branch");
      Ok(Environment::Review)
    }
  }

  /// Step 3: version resolution from an oracle report (only from `LatestOrStable`)
  pub fn resolve(self, report: &OracleReport) -> ReleaseResult<ReleaseDecision> {
    if self != Environment::LatestOrStable {
      return Err(ReleaseError::invalid_state("version resolution", self));
    }

    let next = report.next_release.as_deref().filter(|v| !v.is_empty());
    let (environment, version) = match next {
      Some(next) => (Environment::Stable, next.to_string()),
      None => {
        let last = report
          .last_release
          .as_deref()
          .filter(|v| !v.is_empty())
          .ok_or_else(|| ReleaseError::versioning("oracle reported neither a next nor a last release"))?;
        (Environment::Latest, last.to_string())
      }
    };

    info!(environment = %environment, version = %version, "Version resolved");
    Ok(ReleaseDecision {
      environment,
      version: Some(version),
      last_release: report.last_release.clone(),
      next_release: report.next_release.clone(),
    })
  }
}

impl fmt::Display for Environment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Outcome of classification for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDecision {
  pub environment: Environment,
  /// Set only for `Stable` (next release) and `Latest` (last release)
  pub version: Option<String>,
  pub last_release: Option<String>,
  pub next_release: Option<String>,
}

impl ReleaseDecision {
  /// A decision that never consulted the oracle (`Local` / `Review`)
  pub fn without_version(environment: Environment) -> Self {
    Self {
      environment,
      version: None,
      last_release: None,
      next_release: None,
    }
  }
}

/// Maps (credential, branch, oracle) onto a terminal [`ReleaseDecision`]
pub struct EnvironmentClassifier<'a> {
  oracle: &'a dyn VersionOracle,
  main_branch: &'a str,
}

impl<'a> EnvironmentClassifier<'a> {
  pub fn new(oracle: &'a dyn VersionOracle, main_branch: &'a str) -> Self {
    Self { oracle, main_branch }
  }

  /// Run all classification steps, calling `on_step` with every environment
  /// reached, in order. An error from `on_step` stops classification.
  ///
  /// The oracle is consulted only when a credential is present and the branch
  /// is the main branch.
  pub fn classify<F>(
    &self,
    has_ci_credential: bool,
    request: &OracleRequest,
    mut on_step: F,
  ) -> ReleaseResult<ReleaseDecision>
  where
    F: FnMut(Environment) -> ReleaseResult<()>,
  {
    let env = Environment::None.check_credential(has_ci_credential)?;
    on_step(env)?;
    if env == Environment::Local {
      return Ok(ReleaseDecision::without_version(env));
    }

    let env = env.check_branch(&request.branch, self.main_branch)?;
    on_step(env)?;
    if env == Environment::Review {
      return Ok(ReleaseDecision::without_version(env));
    }

    let report = self.query_oracle(request)?;
    let decision = env.resolve(&report)?;
    on_step(decision.environment)?;
    Ok(decision)
  }

  /// Invoke the oracle and parse its answer
  pub fn query_oracle(&self, request: &OracleRequest) -> ReleaseResult<OracleReport> {
    debug!(branch = %request.branch, "Querying version oracle");
    let raw = self.oracle.query(request).map_err(|e| match e {
      ReleaseError::VersioningUnavailable { .. } => e,
      other => ReleaseError::versioning(other.to_string()),
    })?;
    parse_oracle_report(&raw)
  }
}
