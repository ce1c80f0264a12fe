pub mod system_git;
mod system_git_ops;

pub use system_git::SystemGit;

/// Author identity used for commits made by shipline
#[derive(Debug, Clone)]
pub struct CommitAuthor {
  pub name: String,
  pub email: String,
}
