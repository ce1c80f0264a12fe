mod commands;
mod core;
mod logging;
mod release;
mod ui;

use clap::{Args, Parser, Subcommand};
use core::context::{RunContext, RunInputs, Secret};
use core::error::{ReleaseError, print_error};
use std::path::PathBuf;

/// Classify a CI run, publish the image and mirror the version into the Helm chart
#[derive(Parser)]
#[command(name = "shipline")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct Cli {
  #[command(subcommand)]
  command: Commands,

  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  /// Emit logs as JSON lines on stderr
  #[arg(long, global = true)]
  log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the pipeline: classify, publish tags, update the chart
  Run(RunArgs),

  /// Show what a run would do without publishing or pushing anything
  Plan(RunArgs),
}

#[derive(Args)]
struct RunArgs {
  /// Source repository directory
  #[arg(long, default_value = ".")]
  source: PathBuf,

  /// CI credential; without it the run is local and publishes nothing
  #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
  token: Option<String>,

  /// Registry / GitHub username
  #[arg(long, env = "GITHUB_ACTOR")]
  username: Option<String>,

  /// Branch being built (default: current branch of --source)
  #[arg(long)]
  branch: Option<String>,

  /// Commit hash used in tags (default: short HEAD of --source)
  #[arg(long)]
  commit_hash: Option<String>,

  /// Image repository, e.g. ghcr.io/acme/web
  #[arg(long)]
  registry_path: Option<String>,

  /// Source repository URL handed to the version oracle
  #[arg(long)]
  repository_url: Option<String>,

  /// Application name; selects the chart directory
  #[arg(long)]
  app_name: Option<String>,

  /// Chart repository URL or path (overrides shipline.toml)
  #[arg(long)]
  chart_repo: Option<String>,

  /// Token for pushing to the chart repository
  #[arg(long, env = "HELM_REPO_PAT", hide_env_values = true)]
  chart_token: Option<String>,

  /// Local image to publish (default: from shipline.toml)
  #[arg(long)]
  image: Option<String>,

  /// Output in JSON format
  #[arg(long)]
  json: bool,
}

impl RunArgs {
  fn into_inputs(self) -> RunInputs {
    RunInputs {
      source_dir: self.source,
      credential: self.token.map(Secret::new),
      username: self.username,
      branch: self.branch,
      commit_hash: self.commit_hash,
      registry_path: self.registry_path,
      repository_url: self.repository_url,
      app_name: self.app_name,
      chart_repository: self.chart_repo,
      chart_credential: self.chart_token.map(Secret::new),
      image: self.image,
    }
  }
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

fn main() {
  let cli = Cli::parse();
  logging::init_tracing(cli.log_json, logging::level_for(cli.verbose));

  let (args, plan_only) = match cli.command {
    Commands::Run(args) => (args, false),
    Commands::Plan(args) => (args, true),
  };
  let json = args.json;

  let ctx = match RunContext::build(args.into_inputs()) {
    Ok(ctx) => ctx,
    Err(e) => handle_error(e),
  };

  let result = if plan_only {
    commands::run_plan(&ctx, json)
  } else {
    commands::run_pipeline(&ctx, json)
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: ReleaseError) -> ! {
  if let Some(stage) = err.stage() {
    tracing::error!(
      stage = %stage,
      cause = %err.root(),
      exit_code = err.exit_code().as_i32(),
      "Pipeline failed"
    );
  }
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}
