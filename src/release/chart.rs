//! Chart mutation planning
//!
//! [`ChartMutator::plan`] only computes what must be written to the chart
//! repository; applying the plan belongs to a [`ChartRepository`].
//!
//! [`ChartRepository`]: crate::release::chart_repo::ChartRepository

use crate::core::config::ChartConfig;
use crate::core::error::{ReleaseError, ReleaseResult};
use crate::release::environment::Environment;
use crate::release::tags::{RunStamp, sanitize_branch};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

static ISSUE_BRANCH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)-").expect("valid regex"));

/// Values key that always receives the published image tag
pub const IMAGE_TAG_KEY: &str = "image.tag";

/// Everything the chart repository must change for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartMutationPlan {
  /// Chart directory relative to the repository root
  pub chart_path: PathBuf,
  /// New `version` in Chart.yaml
  pub new_version: String,
  /// New `appVersion` in Chart.yaml
  pub new_app_version: String,
  /// Dotted key to value, written into the values file
  pub value_overrides: BTreeMap<String, String>,
  /// Prepended to every key in `prefixed_keys`
  pub host_prefix: Option<String>,
  pub prefixed_keys: Vec<String>,
  pub commit_message: String,
  /// Branch of the chart repository that receives the commit
  pub push_branch: String,
}

/// Inputs for one planning call
#[derive(Debug, Clone)]
pub struct ChartInputs<'a> {
  pub environment: Environment,
  pub version: Option<&'a str>,
  pub app_name: &'a str,
  pub branch: &'a str,
  pub commit_hash: &'a str,
  pub stamp: &'a RunStamp,
  /// Tag the image was published under; becomes `appVersion` and `image.tag`
  pub primary_tag: &'a str,
  /// Chart.yaml `version` as read from the repository just now
  pub current_chart_version: &'a str,
}

pub struct ChartMutator<'a> {
  config: &'a ChartConfig,
}

impl<'a> ChartMutator<'a> {
  pub fn new(config: &'a ChartConfig) -> Self {
    Self { config }
  }

  pub fn plan(&self, inputs: &ChartInputs<'_>) -> ReleaseResult<ChartMutationPlan> {
    let base = semver::Version::parse(inputs.current_chart_version.trim()).map_err(|e| {
      ReleaseError::chart(
        "plan",
        format!("current chart version '{}' is not semver: {}", inputs.current_chart_version, e),
      )
    })?;
    let stamp = inputs.stamp.suffix();

    let (new_version, host_prefix, push_branch) = match inputs.environment {
      Environment::Stable => {
        let version = inputs
          .version
          .filter(|v| !v.is_empty())
          .ok_or_else(|| ReleaseError::invalid_state("chart planning without a version", inputs.environment))?;
        (version.to_string(), None, self.config.default_branch.clone())
      }
      Environment::Latest => (
        format!("{}-latest-{}.{}", base, inputs.commit_hash, stamp),
        Some("latest-".to_string()),
        self.config.latest_branch.clone(),
      ),
      Environment::Review => {
        let suffix = review_suffix(inputs.branch);
        (
          format!("{}-{}-{}.{}", base, suffix, inputs.commit_hash, stamp),
          Some(format!("{}-", suffix)),
          inputs.branch.to_string(),
        )
      }
      Environment::Local | Environment::None | Environment::Ci | Environment::LatestOrStable => {
        return Err(ReleaseError::invalid_state("chart planning", inputs.environment));
      }
    };

    // Prefixed hosts on the default branch would leak into the stable deployment
    if host_prefix.is_some() && push_branch == self.config.default_branch {
      return Err(ReleaseError::chart(
        "plan",
        format!(
          "{} release would write prefixed hosts to the chart default branch '{}'",
          inputs.environment, push_branch
        ),
      ));
    }

    let new_app_version = match inputs.environment {
      Environment::Stable => new_version.clone(),
      _ => inputs.primary_tag.to_string(),
    };

    let mut value_overrides = BTreeMap::new();
    value_overrides.insert(IMAGE_TAG_KEY.to_string(), new_app_version.clone());

    let prefixed_keys = if host_prefix.is_some() {
      self.config.host_keys.clone()
    } else {
      Vec::new()
    };

    Ok(ChartMutationPlan {
      chart_path: self.config.chart_path(inputs.app_name),
      commit_message: format!("Update {} to version {}", inputs.app_name, new_version),
      new_version,
      new_app_version,
      value_overrides,
      host_prefix,
      prefixed_keys,
      push_branch,
    })
  }
}

/// `issue-N` for branches named `N-...`, else `review-{branch}`
pub fn review_suffix(branch: &str) -> String {
  match ISSUE_BRANCH.captures(branch) {
    Some(caps) => format!("issue-{}", &caps[1]),
    None => format!("review-{}", sanitize_branch(branch)),
  }
}
