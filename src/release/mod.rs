//! Release decision pipeline
//!
//! Data flows one way: the [`environment`] classifier decides what kind of
//! release a run is (consulting the [`oracle`] only on the main branch with a
//! credential), [`tags`] and [`chart`] turn that decision into registry tags
//! and chart edits, and [`pipeline`] drives the side-effecting collaborators
//! ([`publish`], [`chart_repo`], [`oci`]) in order.

pub mod chart;
pub mod chart_repo;
pub mod environment;
pub mod oci;
pub mod oracle;
pub mod pipeline;
pub mod plan;
pub mod publish;
pub mod tags;
pub mod values;

