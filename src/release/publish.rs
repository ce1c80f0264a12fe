//! Container image publishing

use crate::core::context::Secret;
use crate::core::error::{ReleaseError, ReleaseResult};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Pushes one local image to a registry under many references
pub trait ImagePublisher {
  /// Authenticate against the registry hosting `registry_path`
  fn login(&mut self, registry_path: &str) -> ReleaseResult<()>;

  /// Push the image as `reference` (`{registry_path}:{tag}`)
  fn publish(&mut self, reference: &str) -> ReleaseResult<()>;
}

/// Publishes through a docker-compatible CLI
pub struct DockerPublisher {
  command: String,
  image: String,
  username: Option<String>,
  credential: Option<Secret>,
}

impl DockerPublisher {
  pub fn new(command: impl Into<String>, image: impl Into<String>) -> Self {
    Self {
      command: command.into(),
      image: image.into(),
      username: None,
      credential: None,
    }
  }

  pub fn with_credentials(mut self, username: Option<String>, credential: Option<Secret>) -> Self {
    self.username = username;
    self.credential = credential;
    self
  }

  fn run(&self, args: &[&str]) -> ReleaseResult<()> {
    debug!(command = %self.command, args = ?args, "Running container CLI");
    let output = Command::new(&self.command)
      .args(args)
      .output()
      .map_err(|e| ReleaseError::message(format!("failed to run '{}': {}", self.command, e)))?;

    if !output.status.success() {
      return Err(ReleaseError::message(format!(
        "'{} {}' exited with {}: {}",
        self.command,
        args.first().copied().unwrap_or_default(),
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
      )));
    }
    Ok(())
  }
}

/// Registry host of `ghcr.io/acme/web`, or `None` for Docker Hub style paths
pub fn registry_host(registry_path: &str) -> Option<&str> {
  let (first, _) = registry_path.split_once('/')?;
  (first.contains('.') || first.contains(':') || first == "localhost").then_some(first)
}

impl ImagePublisher for DockerPublisher {
  fn login(&mut self, registry_path: &str) -> ReleaseResult<()> {
    let (Some(username), Some(token)) = (&self.username, &self.credential) else {
      debug!("No registry credentials; skipping login");
      return Ok(());
    };

    let mut args = vec!["login".to_string()];
    if let Some(host) = registry_host(registry_path) {
      args.push(host.to_string());
    }
    args.extend(["-u".to_string(), username.clone(), "--password-stdin".to_string()]);

    let mut child = Command::new(&self.command)
      .args(&args)
      .stdin(Stdio::piped())
      .stdout(Stdio::null())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| ReleaseError::message(format!("failed to run '{}': {}", self.command, e)))?;

    if let Some(mut stdin) = child.stdin.take() {
      stdin.write_all(token.expose().as_bytes())?;
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
      return Err(ReleaseError::message(format!(
        "registry login failed: {}",
        token.redact(String::from_utf8_lossy(&output.stderr).trim())
      )));
    }

    info!(registry = registry_host(registry_path).unwrap_or("docker.io"), "Logged in to registry");
    Ok(())
  }

  fn publish(&mut self, reference: &str) -> ReleaseResult<()> {
    self.run(&["tag", self.image.as_str(), reference])?;
    self.run(&["push", reference])
  }
}
