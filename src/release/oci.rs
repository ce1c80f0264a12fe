//! Packaging the chart and pushing it to an OCI registry

use crate::core::config::OciConfig;
use crate::core::context::Secret;
use crate::core::error::{ReleaseError, ReleaseResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Publishes a chart directory as a versioned artifact
pub trait ChartReleaser {
  /// Returns the pushed archive's file name
  fn release(&mut self, chart_dir: &Path, version: &str, app_version: &str) -> ReleaseResult<String>;
}

/// `helm package` + `helm push`
pub struct HelmOciReleaser {
  config: OciConfig,
  username: Option<String>,
  credential: Option<Secret>,
}

impl HelmOciReleaser {
  pub fn new(config: OciConfig, username: Option<String>, credential: Option<Secret>) -> Self {
    Self {
      config,
      username,
      credential,
    }
  }

  fn helm(&self, args: &[&str], step: &str) -> ReleaseResult<String> {
    debug!(command = %self.config.command, args = ?args, "Running helm");
    let output = Command::new(&self.config.command)
      .args(args)
      .output()
      .map_err(|e| ReleaseError::chart(step, format!("failed to run '{}': {}", self.config.command, e)))?;

    if !output.status.success() {
      return Err(ReleaseError::chart(
        step,
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
      ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  fn login(&self) -> ReleaseResult<()> {
    let (Some(username), Some(token)) = (&self.username, &self.credential) else {
      return Ok(());
    };
    let Some(host) = oci_host(&self.config.registry) else {
      return Err(ReleaseError::chart(
        "oci login",
        format!("'{}' is not an oci:// reference", self.config.registry),
      ));
    };

    let mut child = Command::new(&self.config.command)
      .args(["registry", "login", host, "-u", username, "--password-stdin"])
      .stdin(Stdio::piped())
      .stdout(Stdio::null())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| ReleaseError::chart("oci login", e.to_string()))?;
    if let Some(mut stdin) = child.stdin.take() {
      stdin.write_all(token.expose().as_bytes())?;
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
      return Err(ReleaseError::chart(
        "oci login",
        token.redact(String::from_utf8_lossy(&output.stderr).trim()),
      ));
    }
    Ok(())
  }
}

/// Host part of `oci://ghcr.io/acme`
pub fn oci_host(registry: &str) -> Option<&str> {
  let rest = registry.strip_prefix("oci://")?;
  rest.split('/').next().filter(|h| !h.is_empty())
}

fn find_archive(dir: &Path) -> ReleaseResult<PathBuf> {
  let entries = fs::read_dir(dir).map_err(|e| ReleaseError::chart("oci package", e.to_string()))?;
  entries
    .filter_map(Result::ok)
    .map(|e| e.path())
    .find(|p| p.extension().is_some_and(|ext| ext == "tgz"))
    .ok_or_else(|| ReleaseError::chart("oci package", "helm package produced no archive"))
}

impl ChartReleaser for HelmOciReleaser {
  fn release(&mut self, chart_dir: &Path, version: &str, app_version: &str) -> ReleaseResult<String> {
    self.login()?;

    let out = tempfile::TempDir::new().map_err(|e| ReleaseError::chart("oci package", e.to_string()))?;
    let chart = chart_dir.to_string_lossy();
    let dest = out.path().to_string_lossy();
    self.helm(
      &[
        "package",
        &chart,
        "--version",
        version,
        "--app-version",
        app_version,
        "--destination",
        &dest,
      ],
      "oci package",
    )?;

    let archive = find_archive(out.path())?;
    let archive_str = archive.to_string_lossy();
    self.helm(&["push", &archive_str, &self.config.registry], "oci push")?;

    let name = archive
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_default();
    info!(archive = %name, registry = %self.config.registry, "Pushed chart to OCI registry");
    Ok(name)
  }
}
