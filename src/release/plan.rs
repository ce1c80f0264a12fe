//! Reviewable run plans
//!
//! `shipline plan` resolves everything a run would do and prints it without
//! touching the registry or the chart repository. Identical inputs produce
//! the same [`PlanId`]; the run stamp is excluded from the hash, so stable
//! releases (whose tags and chart carry no timestamp) hash identically.

use crate::core::error::ReleaseResult;
use crate::release::chart::ChartMutationPlan;
use crate::release::environment::ReleaseDecision;
use crate::release::pipeline::PipelinePreview;
use crate::release::tags::{RunStamp, TagSet};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Plan identifier (SHA256 hash of plan contents)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(String);

impl PlanId {
  /// Create a plan ID from plan contents
  pub fn from_contents(contents: &[u8]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let result = hasher.finalize();
    Self(format!("{:x}", result))
  }

  /// Get the short ID (first 12 characters)
  pub fn short(&self) -> &str {
    &self.0[..12.min(self.0.len())]
  }
}

impl fmt::Display for PlanId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.short())
  }
}

/// A side effect the run would perform, in order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
  PublishImage { reference: String },
  UpdateChart { chart_path: String, version: String, app_version: String },
  PrefixValue { key: String, prefix: String },
  Commit { message: String },
  Push { branch: String },
}

fn operation_to_string(op: &Operation) -> String {
  match op {
    Operation::PublishImage { reference } => format!("Publish {}", reference),
    Operation::UpdateChart {
      chart_path,
      version,
      app_version,
    } => format!("Set {} version {} (appVersion {})", chart_path, version, app_version),
    Operation::PrefixValue { key, prefix } => format!("Prefix {} with '{}'", key, prefix),
    Operation::Commit { message } => format!("Commit \"{}\"", message),
    Operation::Push { branch } => format!("Push chart repository to {}", branch),
  }
}

/// Everything one run would do
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPlan {
  pub id: PlanId,
  pub decision: ReleaseDecision,
  pub tags: TagSet,
  pub chart: Option<ChartMutationPlan>,
  pub stamp: RunStamp,
  pub operations: Vec<Operation>,
}

#[derive(Serialize)]
struct HashedContents<'a> {
  decision: &'a ReleaseDecision,
  tags: &'a TagSet,
  chart: &'a Option<ChartMutationPlan>,
  operations: &'a [Operation],
}

impl RunPlan {
  pub fn from_preview(preview: PipelinePreview) -> Self {
    let mut operations: Vec<Operation> = preview
      .references
      .iter()
      .map(|reference| Operation::PublishImage {
        reference: reference.clone(),
      })
      .collect();

    if let Some(chart) = &preview.chart {
      operations.push(Operation::UpdateChart {
        chart_path: chart.chart_path.display().to_string(),
        version: chart.new_version.clone(),
        app_version: chart.new_app_version.clone(),
      });
      if let Some(prefix) = &chart.host_prefix {
        operations.extend(chart.prefixed_keys.iter().map(|key| Operation::PrefixValue {
          key: key.clone(),
          prefix: prefix.clone(),
        }));
      }
      operations.push(Operation::Commit {
        message: chart.commit_message.clone(),
      });
      operations.push(Operation::Push {
        branch: chart.push_branch.clone(),
      });
    }

    let mut plan = Self {
      id: PlanId::from_contents(&[]),
      decision: preview.decision,
      tags: preview.tags,
      chart: preview.chart,
      stamp: preview.stamp,
      operations,
    };
    plan.recompute_id();
    plan
  }

  fn recompute_id(&mut self) {
    let contents = HashedContents {
      decision: &self.decision,
      tags: &self.tags,
      chart: &self.chart,
      operations: &self.operations,
    };
    let json = serde_json::to_vec(&contents).unwrap_or_default();
    self.id = PlanId::from_contents(&json);
  }

  /// Serialize to JSON
  pub fn to_json(&self) -> ReleaseResult<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// Get human-readable representation
  pub fn to_human_readable(&self) -> String {
    let mut output = String::new();

    output.push_str(&format!(
      "📋 Plan: {} release ({})\n",
      self.decision.environment, self.id
    ));
    if let Some(version) = &self.decision.version {
      output.push_str(&format!("   Version: {}\n", version));
    }
    if let Some(last) = &self.decision.last_release {
      output.push_str(&format!("   Last release: {}\n", last));
    }

    if self.tags.is_empty() {
      output.push_str("\n   No CI credential: nothing will be published\n");
      return output;
    }

    output.push_str(&format!("\n   Tags: {}\n", self.tags.as_slice().join(", ")));
    output.push_str(&format!("\n   Operations ({}):\n", self.operations.len()));
    for (i, op) in self.operations.iter().enumerate() {
      output.push_str(&format!("   {}. {}\n", i + 1, operation_to_string(op)));
    }

    output
  }
}
