//! Release pipeline driver
//!
//! ```text
//! Start -> ClassifiedCi -> ClassifiedBranch -> VersionResolved -> Tagged
//!       -> Published -> ChartUpdated -> [ChartReleased] -> Done
//! ```
//!
//! `Local` and `Review` skip `VersionResolved`; `Local` also skips publishing
//! and the chart. States only move forward, and any failure stops the run
//! with the state it happened in attached to the error.

use crate::core::context::RunContext;
use crate::core::error::{PublishError, ReleaseError, ReleaseResult};
use crate::release::chart::{ChartInputs, ChartMutationPlan, ChartMutator};
use crate::release::chart_repo::{ChartRepository, ChartUpdate};
use crate::release::environment::{Environment, EnvironmentClassifier, ReleaseDecision};
use crate::release::oci::ChartReleaser;
use crate::release::oracle::{OracleRequest, VersionOracle};
use crate::release::publish::ImagePublisher;
use crate::release::tags::{self, RunStamp, TagSet};
use crate::ui::progress::PublishProgress;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Where a run currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
  Start,
  ClassifiedCi,
  ClassifiedBranch,
  VersionResolved,
  Tagged,
  Published,
  ChartUpdated,
  ChartReleased,
  Done,
}

impl PipelineState {
  pub fn as_str(&self) -> &'static str {
    match self {
      PipelineState::Start => "start",
      PipelineState::ClassifiedCi => "classified_ci",
      PipelineState::ClassifiedBranch => "classified_branch",
      PipelineState::VersionResolved => "version_resolved",
      PipelineState::Tagged => "tagged",
      PipelineState::Published => "published",
      PipelineState::ChartUpdated => "chart_updated",
      PipelineState::ChartReleased => "chart_released",
      PipelineState::Done => "done",
    }
  }
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// What a completed run did
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
  pub decision: ReleaseDecision,
  pub tags: TagSet,
  /// Full references pushed to the registry, in order
  pub published: Vec<String>,
  pub chart: Option<ChartMutationPlan>,
  pub chart_update: Option<ChartUpdate>,
  /// Archive pushed to the OCI registry
  pub chart_archive: Option<String>,
  pub stamp: RunStamp,
  pub trace: Vec<PipelineState>,
}

/// What a dry run would do
#[derive(Debug, Clone)]
pub struct PipelinePreview {
  pub decision: ReleaseDecision,
  pub tags: TagSet,
  pub references: Vec<String>,
  pub chart: Option<ChartMutationPlan>,
  pub stamp: RunStamp,
}

/// Drives one run through its states with injected collaborators
pub struct ReleasePipeline<'a> {
  ctx: &'a RunContext,
  stamp: RunStamp,
  oracle: &'a dyn VersionOracle,
  publisher: &'a mut dyn ImagePublisher,
  charts: &'a mut dyn ChartRepository,
  chart_releaser: Option<&'a mut dyn ChartReleaser>,
  show_progress: bool,
  state: PipelineState,
  trace: Vec<PipelineState>,
}

impl<'a> ReleasePipeline<'a> {
  pub fn new(
    ctx: &'a RunContext,
    stamp: RunStamp,
    oracle: &'a dyn VersionOracle,
    publisher: &'a mut dyn ImagePublisher,
    charts: &'a mut dyn ChartRepository,
  ) -> Self {
    Self {
      ctx,
      stamp,
      oracle,
      publisher,
      charts,
      chart_releaser: None,
      show_progress: false,
      state: PipelineState::Start,
      trace: vec![PipelineState::Start],
    }
  }

  /// Push the packaged chart after stable releases
  pub fn with_chart_releaser(mut self, releaser: &'a mut dyn ChartReleaser) -> Self {
    self.chart_releaser = Some(releaser);
    self
  }

  pub fn with_progress(mut self, show: bool) -> Self {
    self.show_progress = show;
    self
  }

  /// Execute every stage
  pub fn run(mut self) -> ReleaseResult<PipelineReport> {
    let decision = self.classify(false)?;
    let tags = self.tag(&decision)?;

    let mut report = PipelineReport {
      decision,
      tags,
      published: Vec::new(),
      chart: None,
      chart_update: None,
      chart_archive: None,
      stamp: self.stamp.clone(),
      trace: Vec::new(),
    };

    if report.decision.environment == Environment::Local {
      info!("Local run: skipping publish and chart update");
    } else {
      report.published = self.publish(&report.tags)?;
      let (plan, update) = self.update_chart(&report.decision, &report.tags)?;
      report.chart_archive = self.release_chart(&report.decision, &plan, &update)?;
      report.chart = Some(plan);
      report.chart_update = Some(update);
    }

    self.advance(PipelineState::Done)?;
    report.trace = self.trace;
    Ok(report)
  }

  /// Classify, tag and plan the chart without publishing anything
  pub fn preview(mut self) -> ReleaseResult<PipelinePreview> {
    let decision = self.classify(true)?;
    let tags = self.tag(&decision)?;

    let (references, chart) = if decision.environment == Environment::Local {
      (Vec::new(), None)
    } else {
      let ctx = self.ctx;
      let registry = ctx.require_registry_path().map_err(|e| self.fail(e))?;
      let references = tags.iter().map(|t| format!("{}:{}", registry, t)).collect();
      let plan = self.plan_chart(&decision, &tags).map_err(|e| self.fail(e))?;
      (references, Some(plan))
    };

    Ok(PipelinePreview {
      decision,
      tags,
      references,
      chart,
      stamp: self.stamp,
    })
  }

  fn advance(&mut self, next: PipelineState) -> ReleaseResult<()> {
    if next <= self.state {
      return Err(ReleaseError::invalid_state(format!("transition to {}", next), self.state));
    }
    self.state = next;
    self.trace.push(next);
    Ok(())
  }

  fn fail(&self, err: ReleaseError) -> ReleaseError {
    err.at_stage(self.state)
  }

  fn oracle_request(&self, dry_run: bool) -> OracleRequest {
    OracleRequest {
      source_dir: self.ctx.source_dir.clone(),
      branch: self.ctx.branch.clone(),
      credential: self.ctx.credential.clone(),
      username: self.ctx.username.clone(),
      repository_url: self.ctx.repository_url.clone(),
      dry_run,
    }
  }

  fn classify(&mut self, dry_run: bool) -> ReleaseResult<ReleaseDecision> {
    let ctx = self.ctx;
    let oracle = self.oracle;
    let request = self.oracle_request(dry_run);
    let classifier = EnvironmentClassifier::new(oracle, &ctx.config.main_branch);

    let decision = classifier
      .classify(ctx.has_ci_credential(), &request, |env| match env {
        Environment::Local | Environment::Ci => self.advance(PipelineState::ClassifiedCi),
        Environment::Review | Environment::LatestOrStable => self.advance(PipelineState::ClassifiedBranch),
        Environment::Latest | Environment::Stable => self.advance(PipelineState::VersionResolved),
        Environment::None => Err(ReleaseError::invalid_state("classification", env)),
      })
      .map_err(|e| self.fail(e))?;

    // Local runs never reach the branch check
    if decision.environment == Environment::Local {
      self.advance(PipelineState::ClassifiedBranch)?;
    }
    Ok(decision)
  }

  fn tag(&mut self, decision: &ReleaseDecision) -> ReleaseResult<TagSet> {
    if !decision.environment.is_terminal() {
      return Err(self.fail(ReleaseError::invalid_state("tag generation", decision.environment)));
    }
    let tags = tags::generate(
      decision.environment,
      decision.version.as_deref(),
      &self.ctx.commit_hash,
      &self.ctx.branch,
      &self.stamp,
    )
    .map_err(|e| self.fail(e))?;

    info!(environment = %decision.environment, tags = ?tags.as_slice(), "Generated tags");
    self.advance(PipelineState::Tagged)?;
    Ok(tags)
  }

  /// Push every tag in order, stopping at the first rejection
  fn publish(&mut self, tags: &TagSet) -> ReleaseResult<Vec<String>> {
    let ctx = self.ctx;
    // The chart step needs the app name; check it before anything is pushed
    ctx.require_app_name().map_err(|e| self.fail(e))?;
    let registry = ctx.require_registry_path().map_err(|e| self.fail(e))?;
    self.publisher.login(registry).map_err(|e| self.fail(e))?;

    let mut progress = PublishProgress::new(tags.len(), "Publishing image", self.show_progress);
    let mut published_tags = Vec::new();
    let mut references = Vec::new();
    for tag in tags {
      let reference = format!("{}:{}", registry, tag);
      if let Err(e) = self.publisher.publish(&reference) {
        warn!(reference = %reference, "Publish rejected; skipping remaining tags");
        let err = ReleaseError::Publish(PublishError {
          failed_tag: tag.clone(),
          published: published_tags,
          reason: e.to_string(),
        });
        return Err(self.fail(err));
      }
      info!(reference = %reference, "Published");
      published_tags.push(tag.clone());
      references.push(reference);
      progress.inc();
    }

    self.advance(PipelineState::Published)?;
    Ok(references)
  }

  /// Fresh checkout, read the current chart version, plan
  fn plan_chart(&mut self, decision: &ReleaseDecision, tags: &TagSet) -> ReleaseResult<ChartMutationPlan> {
    let ctx = self.ctx;
    let app_name = ctx.require_app_name()?;
    let chart_config = &ctx.config.chart;
    let chart_path = chart_config.chart_path(app_name);

    self.charts.checkout()?;
    let current = self.charts.current_chart_version(&chart_path)?;

    let primary = tags
      .primary()
      .ok_or_else(|| ReleaseError::invalid_state("chart planning without tags", decision.environment))?;
    ChartMutator::new(chart_config).plan(&ChartInputs {
      environment: decision.environment,
      version: decision.version.as_deref(),
      app_name,
      branch: &ctx.branch,
      commit_hash: &ctx.commit_hash,
      stamp: &self.stamp,
      primary_tag: primary,
      current_chart_version: &current,
    })
  }

  fn update_chart(
    &mut self,
    decision: &ReleaseDecision,
    tags: &TagSet,
  ) -> ReleaseResult<(ChartMutationPlan, ChartUpdate)> {
    let plan = self.plan_chart(decision, tags).map_err(|e| self.fail(e))?;
    info!(
      chart = %plan.chart_path.display(),
      version = %plan.new_version,
      branch = %plan.push_branch,
      "Updating chart"
    );
    let update = self.charts.apply(&plan).map_err(|e| self.fail(e))?;
    self.advance(PipelineState::ChartUpdated)?;
    Ok((plan, update))
  }

  fn release_chart(
    &mut self,
    decision: &ReleaseDecision,
    plan: &ChartMutationPlan,
    update: &ChartUpdate,
  ) -> ReleaseResult<Option<String>> {
    if decision.environment != Environment::Stable {
      return Ok(None);
    }
    let Some(releaser) = self.chart_releaser.as_deref_mut() else {
      return Ok(None);
    };

    let archive = releaser
      .release(&update.chart_dir, &plan.new_version, &plan.new_app_version)
      .map_err(|e| e.at_stage(self.state))?;
    self.advance(PipelineState::ChartReleased)?;
    Ok(Some(archive))
  }
}
