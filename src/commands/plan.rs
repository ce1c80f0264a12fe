//! `shipline plan`

use crate::commands::build_oracle;
use crate::core::context::RunContext;
use crate::core::error::{ReleaseError, ReleaseResult};
use crate::release::chart_repo::GitChartRepository;
use crate::release::pipeline::ReleasePipeline;
use crate::release::plan::RunPlan;
use crate::release::publish::ImagePublisher;
use crate::release::tags::RunStamp;

/// Publisher that refuses to run; planning never publishes
struct NoPublish;

impl ImagePublisher for NoPublish {
  fn login(&mut self, _registry_path: &str) -> ReleaseResult<()> {
    Err(ReleaseError::invalid_state("registry login", "plan"))
  }

  fn publish(&mut self, _reference: &str) -> ReleaseResult<()> {
    Err(ReleaseError::invalid_state("image publish", "plan"))
  }
}

/// Resolve the run and print what it would do
pub fn run_plan(ctx: &RunContext, json: bool) -> ReleaseResult<()> {
  let oracle = build_oracle(ctx);
  let mut publisher = NoPublish;
  let chart_credential = ctx.chart_credential.clone().or_else(|| ctx.credential.clone());
  let mut charts = GitChartRepository::new(ctx.config.chart.clone(), chart_credential);

  let preview = ReleasePipeline::new(ctx, RunStamp::now(), oracle.as_ref(), &mut publisher, &mut charts).preview()?;
  let plan = RunPlan::from_preview(preview);

  if json {
    println!("{}", plan.to_json()?);
  } else {
    print!("{}", plan.to_human_readable());
  }
  Ok(())
}
