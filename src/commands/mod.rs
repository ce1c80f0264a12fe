//! CLI commands for shipline
//!
//! - **run**: drive the full pipeline (publish image, update chart)
//! - **plan**: resolve the same decisions without side effects
//!
//! Both accept a resolved `&RunContext`.

pub mod plan;
pub mod run;

pub use plan::run_plan;
pub use run::run_pipeline;

use crate::core::config::OracleKind;
use crate::core::context::RunContext;
use crate::release::oracle::{CommandOracle, SemanticReleaseOracle, VersionOracle};

/// Oracle selected by `[oracle]` in shipline.toml
pub(crate) fn build_oracle(ctx: &RunContext) -> Box<dyn VersionOracle> {
  let argv = ctx.config.oracle.command.clone();
  match ctx.config.oracle.kind {
    OracleKind::SemanticRelease => Box::new(SemanticReleaseOracle::new(argv)),
    OracleKind::Command => Box::new(CommandOracle::new(argv)),
  }
}
