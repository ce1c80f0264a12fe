//! Version oracle: the only component allowed to look at commit semantics
//!
//! An oracle answers with a JSON document `{"last_release": .., "next_release": ..}`.
//! Both keys must be present; a key may be `null`. The answer is parsed by
//! [`parse_oracle_report`] so every implementation is held to the same contract.

use crate::core::context::Secret;
use crate::core::error::{ReleaseError, ReleaseResult};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

const RELEASERC_FILE: &str = ".releaserc";
const NEXT_RELEASE_FILE: &str = "next-release.txt";
const LAST_RELEASE_FILE: &str = "last-release.txt";

/// Everything an oracle may need to inspect the source repository
#[derive(Debug, Clone)]
pub struct OracleRequest {
  pub source_dir: PathBuf,
  pub branch: String,
  pub credential: Option<Secret>,
  pub username: Option<String>,
  pub repository_url: Option<String>,
  /// Compute versions without creating releases
  pub dry_run: bool,
}

#[cfg(test)]
impl OracleRequest {
  pub fn for_test(branch: &str) -> Self {
    Self {
      source_dir: PathBuf::from("."),
      branch: branch.to_string(),
      credential: None,
      username: None,
      repository_url: None,
      dry_run: true,
    }
  }
}

/// Parsed oracle answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleReport {
  pub last_release: Option<String>,
  pub next_release: Option<String>,
}

/// Injected collaborator that inspects repository history
pub trait VersionOracle {
  /// Return the raw JSON answer for this request
  fn query(&self, request: &OracleRequest) -> ReleaseResult<String>;
}

/// Parse and validate a raw oracle answer.
///
/// Missing keys, non-JSON output, non-string values and non-semver versions
/// (build metadata included) are all `VersioningUnavailable`. Empty strings count as `null`.
pub fn parse_oracle_report(raw: &str) -> ReleaseResult<OracleReport> {
  let value: Value = serde_json::from_str(raw.trim())
    .map_err(|e| ReleaseError::versioning(format!("oracle output is not JSON: {}", e)))?;

  let object = value
    .as_object()
    .ok_or_else(|| ReleaseError::versioning("oracle output is not a JSON object"))?;

  let field = |key: &str| -> ReleaseResult<Option<String>> {
    match object.get(key) {
      None => Err(ReleaseError::versioning(format!("oracle output is missing '{}'", key))),
      Some(Value::Null) => Ok(None),
      Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
      Some(Value::String(s)) => {
        let version = s.trim();
        let parsed = semver::Version::parse(version)
          .map_err(|e| ReleaseError::versioning(format!("'{}' is not a valid version for {}: {}", version, key, e)))?;
        // '+' is not allowed in a registry tag
        if !parsed.build.is_empty() {
          return Err(ReleaseError::versioning(format!(
            "'{}' for {} carries build metadata, which cannot be used as an image tag",
            version, key
          )));
        }
        Ok(Some(version.to_string()))
      }
      Some(other) => Err(ReleaseError::versioning(format!(
        "'{}' must be a string or null, got {}",
        key, other
      ))),
    }
  };

  Ok(OracleReport {
    last_release: field("last_release")?,
    next_release: field("next_release")?,
  })
}

/// Runs an arbitrary command whose stdout is the JSON answer
pub struct CommandOracle {
  argv: Vec<String>,
}

impl CommandOracle {
  pub fn new(argv: Vec<String>) -> Self {
    Self { argv }
  }
}

impl VersionOracle for CommandOracle {
  fn query(&self, request: &OracleRequest) -> ReleaseResult<String> {
    let (program, args) = self
      .argv
      .split_first()
      .ok_or_else(|| ReleaseError::versioning("oracle command is empty"))?;

    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(&request.source_dir);
    cmd.env("SHIPLINE_BRANCH", &request.branch);
    if let Some(token) = &request.credential {
      cmd.env("GITHUB_TOKEN", token.expose());
    }

    debug!(program = %program, "Running oracle command");
    let output = cmd
      .output()
      .map_err(|e| ReleaseError::versioning(format!("failed to run '{}': {}", program, e)))?;

    if !output.status.success() {
      return Err(ReleaseError::versioning(format!(
        "'{}' exited with {}: {}",
        program,
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
      )));
    }

    String::from_utf8(output.stdout).map_err(|e| ReleaseError::versioning(format!("oracle output is not UTF-8: {}", e)))
  }
}

/// Drives semantic-release and reports the versions it computed
///
/// semantic-release is configured through a generated `.releaserc` whose exec
/// plugin writes the last and next versions to files in the source tree.
pub struct SemanticReleaseOracle {
  argv: Vec<String>,
}

impl SemanticReleaseOracle {
  pub fn new(argv: Vec<String>) -> Self {
    Self { argv }
  }

  /// Build the `.releaserc` document for a request
  pub fn releaserc(request: &OracleRequest) -> Value {
    let mut plugins = vec![
      json!("@semantic-release/commit-analyzer"),
      json!([
        "@semantic-release/exec",
        {
          "analyzeCommitsCmd": format!("echo ${{lastRelease.version}} > {}", LAST_RELEASE_FILE),
          "verifyReleaseCmd": format!("echo ${{nextRelease.version}} > {}", NEXT_RELEASE_FILE),
        }
      ]),
    ];

    let in_ci = request.credential.is_some();
    if in_ci {
      plugins.push(json!(["@semantic-release/github", { "addReleases": "top" }]));
      plugins.push(json!("@semantic-release/release-notes-generator"));
    }

    // Local runs never create releases
    let dry_run = !in_ci || request.dry_run;
    json!({
      "branches": [request.branch],
      "repositoryUrl": request.repository_url.clone().unwrap_or_default(),
      "plugins": plugins,
      "dryRun": dry_run,
      "debug": !in_ci,
      "ci": in_ci,
    })
  }

  fn read_version_file(path: &Path) -> ReleaseResult<Option<String>> {
    match fs::read_to_string(path) {
      Ok(content) => {
        let trimmed = content.trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(ReleaseError::versioning(format!("failed to read {}: {}", path.display(), e))),
    }
  }
}

impl VersionOracle for SemanticReleaseOracle {
  fn query(&self, request: &OracleRequest) -> ReleaseResult<String> {
    let (program, args) = self
      .argv
      .split_first()
      .ok_or_else(|| ReleaseError::versioning("semantic-release command is empty"))?;

    let source = &request.source_dir;
    let _workspace = ScratchFiles::prepare(
      source,
      &serde_json::to_string_pretty(&Self::releaserc(request))?,
    )?;

    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(source);
    if let Some(token) = &request.credential {
      let actor = request.username.clone().unwrap_or_default();
      info!("Running semantic-release in GitHub Actions mode");
      cmd
        .env("GITHUB_TOKEN", token.expose())
        .env("GITHUB_USERNAME", &actor)
        .env("GITHUB_ACTOR", &actor)
        .env("GITHUB_REF", format!("refs/heads/{}", request.branch))
        .env("GITHUB_ACTIONS", "true");
    } else {
      info!("Running semantic-release locally (dry run)");
    }

    let output = cmd
      .output()
      .map_err(|e| ReleaseError::versioning(format!("failed to run '{}': {}", program, e)))?;
    if !output.status.success() {
      return Err(ReleaseError::versioning(format!(
        "semantic-release exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
      )));
    }

    let last = Self::read_version_file(&source.join(LAST_RELEASE_FILE))?;
    let next = Self::read_version_file(&source.join(NEXT_RELEASE_FILE))?;
    debug!(last = ?last, next = ?next, "semantic-release finished");

    Ok(json!({ "last_release": last, "next_release": next }).to_string())
  }
}

/// Writes `.releaserc` into the source tree for one oracle call and restores
/// the tree afterwards
struct ScratchFiles {
  root: PathBuf,
  previous_releaserc: Option<String>,
}

impl ScratchFiles {
  fn prepare(root: &Path, releaserc: &str) -> ReleaseResult<Self> {
    let rc_path = root.join(RELEASERC_FILE);
    let previous_releaserc = fs::read_to_string(&rc_path).ok();
    for name in [LAST_RELEASE_FILE, NEXT_RELEASE_FILE] {
      let _ = fs::remove_file(root.join(name));
    }
    fs::write(&rc_path, releaserc)
      .map_err(|e| ReleaseError::versioning(format!("failed to write {}: {}", rc_path.display(), e)))?;

    Ok(Self {
      root: root.to_path_buf(),
      previous_releaserc,
    })
  }
}

impl Drop for ScratchFiles {
  fn drop(&mut self) {
    let rc_path = self.root.join(RELEASERC_FILE);
    let restored = match &self.previous_releaserc {
      Some(content) => fs::write(&rc_path, content),
      None => fs::remove_file(&rc_path),
    };
    if let Err(e) = restored {
      warn!(path = %rc_path.display(), error = %e, "Failed to restore .releaserc");
    }
    for name in [LAST_RELEASE_FILE, NEXT_RELEASE_FILE] {
      let _ = fs::remove_file(self.root.join(name));
    }
  }
}
