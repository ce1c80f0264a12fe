//! Error types for shipline with contextual messages and exit codes
//!
//! Every failure in a run maps onto one category of [`ReleaseError`]. Failures
//! raised while the pipeline is driving a transition are wrapped in
//! [`ReleaseError::Stage`] so the caller learns which state the run stopped in.

use crate::release::pipeline::PipelineState;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for shipline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing files)
  User = 1,
  /// System error (git, I/O)
  System = 2,
  /// Version oracle unreachable or malformed
  Versioning = 4,
  /// Registry rejected a tag
  Publish = 5,
  /// Chart repository clone/mutate/commit/push failed
  Chart = 6,
  /// Internal invariant violated
  Internal = 70,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for shipline
#[derive(Debug)]
pub enum ReleaseError {
  /// The version oracle could not be reached or returned malformed data
  VersioningUnavailable { reason: String },

  /// A component was invoked with a transitional or uninitialized environment
  InvalidState { operation: String, state: String },

  /// Registry rejected a push
  Publish(PublishError),

  /// Chart repository step failed
  ChartMutation { step: String, reason: String },

  /// Configuration errors
  Config(ConfigError),

  /// Git operation errors
  Git(GitError),

  /// I/O errors
  Io(io::Error),

  /// A failure annotated with the pipeline state it happened in
  Stage {
    stage: PipelineState,
    source: Box<ReleaseError>,
  },

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl ReleaseError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    ReleaseError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    ReleaseError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  pub fn versioning(reason: impl Into<String>) -> Self {
    ReleaseError::VersioningUnavailable { reason: reason.into() }
  }

  pub fn invalid_state(operation: impl Into<String>, state: impl fmt::Display) -> Self {
    ReleaseError::InvalidState {
      operation: operation.into(),
      state: state.to_string(),
    }
  }

  pub fn chart(step: impl Into<String>, reason: impl Into<String>) -> Self {
    ReleaseError::ChartMutation {
      step: step.into(),
      reason: reason.into(),
    }
  }

  /// Wrap this error with the pipeline state it was raised in.
  ///
  /// An error that already carries a stage keeps the innermost one.
  pub fn at_stage(self, stage: PipelineState) -> Self {
    match self {
      ReleaseError::Stage { .. } => self,
      other => ReleaseError::Stage {
        stage,
        source: Box::new(other),
      },
    }
  }

  /// The pipeline state this error was raised in, if known
  pub fn stage(&self) -> Option<PipelineState> {
    match self {
      ReleaseError::Stage { stage, .. } => Some(*stage),
      _ => None,
    }
  }

  /// The underlying error with any stage annotation removed
  pub fn root(&self) -> &ReleaseError {
    match self {
      ReleaseError::Stage { source, .. } => source.root(),
      other => other,
    }
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      ReleaseError::Message { message, context, help } => ReleaseError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      ReleaseError::Io(e) => ReleaseError::Message {
        message: format!("I/O error: {}", e),
        context: Some(ctx_str),
        help: None,
      },
      _ => self,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      ReleaseError::VersioningUnavailable { .. } => ExitCode::Versioning,
      ReleaseError::InvalidState { .. } => ExitCode::Internal,
      ReleaseError::Publish(_) => ExitCode::Publish,
      ReleaseError::ChartMutation { .. } => ExitCode::Chart,
      ReleaseError::Config(_) => ExitCode::User,
      ReleaseError::Git(_) => ExitCode::System,
      ReleaseError::Io(_) => ExitCode::System,
      ReleaseError::Stage { source, .. } => source.exit_code(),
      ReleaseError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      ReleaseError::VersioningUnavailable { .. } => Some(
        "The oracle must print a JSON object with both `last_release` and `next_release` keys. Nothing was published."
          .to_string(),
      ),
      ReleaseError::Publish(e) => e.help_message(),
      ReleaseError::ChartMutation { reason, .. } if reason.contains("non-fast-forward") || reason.contains("[rejected]") => {
        Some("Another run pushed to the chart branch first. Serialize runs per chart branch and re-run.".to_string())
      }
      ReleaseError::ChartMutation { .. } => Some(
        "The chart repository was not updated. Fix the cause and re-run the pipeline; there is no automatic retry."
          .to_string(),
      ),
      ReleaseError::Config(e) => e.help_message(),
      ReleaseError::Git(e) => e.help_message(),
      ReleaseError::Stage { source, .. } => source.help_message(),
      ReleaseError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }
}

impl fmt::Display for ReleaseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReleaseError::VersioningUnavailable { reason } => write!(f, "Versioning unavailable: {}", reason),
      ReleaseError::InvalidState { operation, state } => {
        write!(f, "Invalid state: {} cannot run with environment '{}'", operation, state)
      }
      ReleaseError::Publish(e) => write!(f, "{}", e),
      ReleaseError::ChartMutation { step, reason } => write!(f, "Chart update failed during {}: {}", step, reason),
      ReleaseError::Config(e) => write!(f, "{}", e),
      ReleaseError::Git(e) => write!(f, "{}", e),
      ReleaseError::Io(e) => write!(f, "I/O error: {}", e),
      ReleaseError::Stage { stage, source } => write!(f, "Pipeline failed in state {}: {}", stage, source),
      ReleaseError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for ReleaseError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      ReleaseError::Io(e) => Some(e),
      ReleaseError::Stage { source, .. } => Some(source.as_ref()),
      _ => None,
    }
  }
}

impl From<io::Error> for ReleaseError {
  fn from(err: io::Error) -> Self {
    ReleaseError::Io(err)
  }
}

impl From<String> for ReleaseError {
  fn from(msg: String) -> Self {
    ReleaseError::message(msg)
  }
}

impl From<&str> for ReleaseError {
  fn from(msg: &str) -> Self {
    ReleaseError::message(msg)
  }
}

impl From<toml_edit::de::Error> for ReleaseError {
  fn from(err: toml_edit::de::Error) -> Self {
    ReleaseError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<serde_json::Error> for ReleaseError {
  fn from(err: serde_json::Error) -> Self {
    ReleaseError::message(format!("JSON error: {}", err))
  }
}

impl From<serde_yaml::Error> for ReleaseError {
  fn from(err: serde_yaml::Error) -> Self {
    ReleaseError::message(format!("YAML error: {}", err))
  }
}

impl From<anyhow::Error> for ReleaseError {
  fn from(err: anyhow::Error) -> Self {
    ReleaseError::message(err.to_string())
  }
}

/// Registry publish failure
///
/// Tags are pushed in order and the run stops at the first rejection, so
/// `published` lists exactly the tags that reached the registry.
#[derive(Debug)]
pub struct PublishError {
  pub failed_tag: String,
  pub published: Vec<String>,
  pub reason: String,
}

impl PublishError {
  fn help_message(&self) -> Option<String> {
    if self.published.is_empty() {
      Some("No tags were published.".to_string())
    } else {
      Some(format!(
        "Partial publish: {} already pushed. The chart was not updated.",
        self.published.join(", ")
      ))
    }
  }
}

impl fmt::Display for PublishError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Publishing tag '{}' failed: {}", self.failed_tag, self.reason)
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// Config file could not be parsed
  Invalid { path: PathBuf, reason: String },

  /// A value the resolved environment needs was not provided
  MissingValue { field: String },

  /// A value was provided but is not acceptable
  InvalidValue { field: String, reason: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::MissingValue { field } => Some(format!(
        "Pass --{} on the command line or set it in shipline.toml.",
        field.replace('_', "-")
      )),
      ConfigError::Invalid { path, .. } => Some(format!("Check the syntax of {}", path.display())),
      ConfigError::InvalidValue { .. } => None,
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::Invalid { path, reason } => write!(f, "Invalid configuration in {}: {}", path.display(), reason),
      ConfigError::MissingValue { field } => write!(f, "Missing required value: {}", field),
      ConfigError::InvalidValue { field, reason } => write!(f, "Invalid value for {}: {}", field, reason),
    }
  }
}

/// Git operation errors
#[derive(Debug)]
pub enum GitError {
  /// Git command failed
  CommandFailed { command: String, stderr: String },

  /// Repository not found
  RepoNotFound { path: PathBuf },

  /// Push failed
  PushFailed {
    remote: String,
    branch: String,
    reason: String,
  },
}

impl GitError {
  fn help_message(&self) -> Option<String> {
    match self {
      GitError::PushFailed { reason, .. } => {
        if reason.contains("non-fast-forward") || reason.contains("rejected") {
          Some("Another run pushed to the chart branch first. Serialize runs per branch and retry.".to_string())
        } else if reason.contains("permission denied") || reason.contains("403") {
          Some("Check that the chart repository token has write access.".to_string())
        } else {
          None
        }
      }
      GitError::RepoNotFound { path } => Some(format!(
        "Pass --branch and --commit-hash explicitly or run inside a git checkout: {}",
        path.display()
      )),
      _ => None,
    }
  }
}

impl fmt::Display for GitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GitError::CommandFailed { command, stderr } => {
        write!(f, "Git command failed: {}\n{}", command, stderr)
      }
      GitError::RepoNotFound { path } => {
        write!(f, "Git repository not found at: {}", path.display())
      }
      GitError::PushFailed { remote, branch, reason } => {
        write!(f, "Push to {}/{} failed: {}", remote, branch, reason)
      }
    }
  }
}

/// Result type alias for shipline
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> ReleaseResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> ReleaseResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<ReleaseError>,
{
  fn context(self, ctx: impl Into<String>) -> ReleaseResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> ReleaseResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &ReleaseError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}
