//! Core building blocks shared by every command
//!
//! - **config**: shipline.toml parsing and validation
//! - **context**: run inputs resolved once before any stage runs
//! - **error**: error taxonomy with exit codes and help messages
//! - **vcs**: git operations through the system git binary

pub mod config;
pub mod context;
pub mod error;
pub mod vcs;
