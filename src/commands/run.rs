//! `shipline run`

use crate::commands::build_oracle;
use crate::core::context::RunContext;
use crate::core::error::ReleaseResult;
use crate::release::chart_repo::GitChartRepository;
use crate::release::environment::Environment;
use crate::release::oci::HelmOciReleaser;
use crate::release::pipeline::{PipelineReport, ReleasePipeline};
use crate::release::publish::DockerPublisher;
use crate::release::tags::RunStamp;

/// Run the release pipeline with real collaborators
pub fn run_pipeline(ctx: &RunContext, json: bool) -> ReleaseResult<()> {
  let oracle = build_oracle(ctx);
  let mut publisher = DockerPublisher::new(&ctx.config.registry.command, ctx.local_image().unwrap_or_default())
    .with_credentials(ctx.username.clone(), ctx.credential.clone());

  let chart_credential = ctx.chart_credential.clone().or_else(|| ctx.credential.clone());
  let mut charts = GitChartRepository::new(ctx.config.chart.clone(), chart_credential);

  let mut releaser = ctx
    .config
    .chart
    .oci
    .clone()
    .map(|oci| HelmOciReleaser::new(oci, ctx.username.clone(), ctx.credential.clone()));

  let mut pipeline = ReleasePipeline::new(ctx, RunStamp::now(), oracle.as_ref(), &mut publisher, &mut charts)
    .with_progress(!json);
  if let Some(releaser) = releaser.as_mut() {
    pipeline = pipeline.with_chart_releaser(releaser);
  }

  let report = pipeline.run()?;

  if json {
    println!("{}", serde_json::to_string_pretty(&report)?);
  } else {
    print_report(&report);
  }
  Ok(())
}

fn print_report(report: &PipelineReport) {
  let decision = &report.decision;
  println!("🚀 Environment: {}", decision.environment);
  if let Some(version) = &decision.version {
    println!("   Version: {}", version);
  }

  if decision.environment == Environment::Local {
    println!("\n   No CI credential: nothing was published");
    return;
  }

  println!("\n📦 Published {} tag(s):", report.published.len());
  for reference in &report.published {
    println!("   ✅ {}", reference);
  }

  if let (Some(plan), Some(update)) = (&report.chart, &report.chart_update) {
    println!("\n📝 Chart {} -> {}", plan.chart_path.display(), plan.new_version);
    match &update.commit {
      Some(commit) => println!("   ✅ Pushed {} to {}", &commit[..12.min(commit.len())], update.push_branch),
      None => println!("   ⚠️  Chart already up to date"),
    }
  }

  if let Some(archive) = &report.chart_archive {
    println!("   ✅ Released {}", archive);
  }
}
