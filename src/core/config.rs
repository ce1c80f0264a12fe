use crate::core::error::{ConfigError, ReleaseError, ReleaseResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for shipline
/// Searched in order: shipline.toml, .shipline.toml, .config/shipline.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiplineConfig {
  /// Branch whose runs produce stable/latest releases
  #[serde(default = "default_main_branch")]
  pub main_branch: String,
  #[serde(default)]
  pub registry: RegistryConfig,
  #[serde(default)]
  pub chart: ChartConfig,
  #[serde(default)]
  pub oracle: OracleConfig,
}

fn default_main_branch() -> String {
  "main".to_string()
}

/// Container registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
  /// Locally built image that gets tagged and pushed (`{app}` is substituted)
  #[serde(default = "default_image")]
  pub image: String,

  /// Container CLI used for login/tag/push
  #[serde(default = "default_container_command")]
  pub command: String,
}

fn default_image() -> String {
  "{app}:build".to_string()
}

fn default_container_command() -> String {
  "docker".to_string()
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      image: default_image(),
      command: default_container_command(),
    }
  }
}

/// Helm chart repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
  /// Git URL (or local path) of the chart repository
  #[serde(default = "default_chart_repository")]
  pub repository: String,

  /// Branch stable releases are pushed to
  #[serde(default = "default_chart_branch")]
  pub default_branch: String,

  /// Branch latest releases are pushed to; never the default branch
  #[serde(default = "default_latest_branch")]
  pub latest_branch: String,

  /// Chart directory inside the repository (`{app}` is substituted)
  #[serde(default = "default_chart_path")]
  pub path: String,

  /// Values file inside the chart directory
  #[serde(default = "default_values_file")]
  pub values_file: String,

  /// Dotted keys in the values file that receive the host prefix
  #[serde(default = "default_host_keys")]
  pub host_keys: Vec<String>,

  #[serde(default = "default_author_name")]
  pub author_name: String,

  #[serde(default = "default_author_email")]
  pub author_email: String,

  /// Push the packaged chart to an OCI registry after stable releases
  #[serde(default)]
  pub oci: Option<OciConfig>,
}

fn default_chart_repository() -> String {
  "https://github.com/bcit-ltc/helm-charts".to_string()
}

fn default_chart_branch() -> String {
  "main".to_string()
}

fn default_latest_branch() -> String {
  "latest".to_string()
}

fn default_chart_path() -> String {
  "apps/{app}".to_string()
}

fn default_values_file() -> String {
  "values.yaml".to_string()
}

fn default_host_keys() -> Vec<String> {
  vec!["ingress.host".to_string()]
}

fn default_author_name() -> String {
  "github-actions[bot]".to_string()
}

fn default_author_email() -> String {
  "github-actions[bot]@users.noreply.github.com".to_string()
}

impl Default for ChartConfig {
  fn default() -> Self {
    Self {
      repository: default_chart_repository(),
      default_branch: default_chart_branch(),
      latest_branch: default_latest_branch(),
      path: default_chart_path(),
      values_file: default_values_file(),
      host_keys: default_host_keys(),
      author_name: default_author_name(),
      author_email: default_author_email(),
      oci: None,
    }
  }
}

impl ChartConfig {
  /// Chart directory for an application, relative to the repository root
  pub fn chart_path(&self, app_name: &str) -> PathBuf {
    PathBuf::from(self.path.replace("{app}", app_name))
  }

  pub fn validate(&self) -> ReleaseResult<()> {
    if self.repository.trim().is_empty() {
      return Err(invalid("chart.repository", "must not be empty"));
    }
    if self.default_branch.trim().is_empty() {
      return Err(invalid("chart.default_branch", "must not be empty"));
    }
    if self.latest_branch.trim().is_empty() || self.latest_branch == self.default_branch {
      return Err(invalid(
        "chart.latest_branch",
        "must be set and differ from chart.default_branch",
      ));
    }

    let path = Path::new(&self.path);
    if path.is_absolute() || path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
      return Err(invalid("chart.path", "must be relative to the repository root without '..'"));
    }

    for key in &self.host_keys {
      if !is_dotted_key(key) {
        return Err(invalid(
          "chart.host_keys",
          &format!("'{}' is not a dotted key like 'ingress.host'", key),
        ));
      }
    }
    Ok(())
  }
}

/// OCI registry the packaged chart is pushed to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OciConfig {
  /// e.g. `oci://ghcr.io/acme`
  pub registry: String,

  #[serde(default = "default_helm_command")]
  pub command: String,
}

fn default_helm_command() -> String {
  "helm".to_string()
}

/// Which version oracle to run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OracleKind {
  #[default]
  SemanticRelease,
  /// Any command printing the JSON answer on stdout
  Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
  #[serde(default)]
  pub kind: OracleKind,

  #[serde(default = "default_oracle_command")]
  pub command: Vec<String>,
}

fn default_oracle_command() -> Vec<String> {
  vec!["npx".to_string(), "semantic-release".to_string()]
}

impl Default for OracleConfig {
  fn default() -> Self {
    Self {
      kind: OracleKind::default(),
      command: default_oracle_command(),
    }
  }
}

impl Default for ShiplineConfig {
  fn default() -> Self {
    Self {
      main_branch: default_main_branch(),
      registry: RegistryConfig::default(),
      chart: ChartConfig::default(),
      oracle: OracleConfig::default(),
    }
  }
}

impl ShiplineConfig {
  /// Find config file in search order: shipline.toml, .shipline.toml, .config/shipline.toml
  pub fn find_config_path(path: &Path) -> Option<PathBuf> {
    let candidates = [
      path.join("shipline.toml"),
      path.join(".shipline.toml"),
      path.join(".config").join("shipline.toml"),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load config from the source directory, falling back to defaults when no file exists
  pub fn load(path: &Path) -> ReleaseResult<Self> {
    let Some(config_path) = Self::find_config_path(path) else {
      return Ok(Self::default());
    };

    let content = fs::read_to_string(&config_path).map_err(|e| {
      ReleaseError::Config(ConfigError::Invalid {
        path: config_path.clone(),
        reason: e.to_string(),
      })
    })?;
    let config = Self::parse(&content).map_err(|e| match e {
      ReleaseError::Config(ConfigError::InvalidValue { field, reason }) => ReleaseError::Config(ConfigError::Invalid {
        path: config_path.clone(),
        reason: format!("{}: {}", field, reason),
      }),
      other => ReleaseError::Config(ConfigError::Invalid {
        path: config_path.clone(),
        reason: other.to_string(),
      }),
    })?;

    tracing::debug!(path = %config_path.display(), "Loaded configuration");
    Ok(config)
  }

  /// Parse and validate a TOML document
  pub fn parse(content: &str) -> ReleaseResult<Self> {
    let config: ShiplineConfig = toml_edit::de::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> ReleaseResult<()> {
    if self.main_branch.trim().is_empty() {
      return Err(invalid("main_branch", "must not be empty"));
    }
    if self.oracle.command.is_empty() {
      return Err(invalid("oracle.command", "must not be empty"));
    }
    if self.registry.command.trim().is_empty() {
      return Err(invalid("registry.command", "must not be empty"));
    }
    self.chart.validate()
  }
}

fn invalid(field: &str, reason: &str) -> ReleaseError {
  ReleaseError::Config(ConfigError::InvalidValue {
    field: field.to_string(),
    reason: reason.to_string(),
  })
}

/// `a.b.c` where every segment is a plain identifier
pub fn is_dotted_key(key: &str) -> bool {
  !key.is_empty()
    && key
      .split('.')
      .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_without_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = ShiplineConfig::load(dir.path()).unwrap();
    assert_eq!(config.main_branch, "main");
    assert_eq!(config.chart.values_file, "values.yaml");
    assert_eq!(config.chart.host_keys, vec!["ingress.host"]);
    assert_eq!(config.chart.latest_branch, "latest");
    assert_eq!(config.oracle.kind, OracleKind::SemanticRelease);
    assert!(config.chart.oci.is_none());
  }

  #[test]
  fn test_parse_partial_file() {
    let config = ShiplineConfig::parse(
      r#"
main_branch = "trunk"

[chart]
repository = "/tmp/charts.git"
host_keys = ["ingress.host", "web.hostname"]

[chart.oci]
registry = "oci://ghcr.io/acme"

[oracle]
kind = "command"
command = ["./version.sh"]
"#,
    )
    .unwrap();

    assert_eq!(config.main_branch, "trunk");
    assert_eq!(config.chart.repository, "/tmp/charts.git");
    assert_eq!(config.chart.path, "apps/{app}");
    assert_eq!(config.chart.host_keys.len(), 2);
    assert_eq!(config.chart.oci.as_ref().unwrap().command, "helm");
    assert_eq!(config.oracle.kind, OracleKind::Command);
  }

  #[test]
  fn test_rejects_bad_values() {
    assert!(ShiplineConfig::parse("main_branch = \"\"").is_err());
    assert!(ShiplineConfig::parse("[chart]\npath = \"../outside\"").is_err());
    assert!(ShiplineConfig::parse("[chart]\nhost_keys = [\"ingress..host\"]").is_err());
    assert!(ShiplineConfig::parse("[oracle]\ncommand = []").is_err());
    assert!(ShiplineConfig::parse("[chart]\nlatest_branch = \"main\"").is_err());
  }

  #[test]
  fn test_load_reports_file_path() {
    let dir = tempfile::TempDir::new().unwrap();
    fs::write(dir.path().join(".shipline.toml"), "main_branch = 3").unwrap();
    let err = ShiplineConfig::load(dir.path()).unwrap_err();
    assert!(err.to_string().contains(".shipline.toml"));
  }

  #[test]
  fn test_chart_path_substitutes_app() {
    let chart = ChartConfig::default();
    assert_eq!(chart.chart_path("web"), PathBuf::from("apps/web"));
  }

  #[test]
  fn test_dotted_keys() {
    assert!(is_dotted_key("ingress.host"));
    assert!(is_dotted_key("image"));
    assert!(!is_dotted_key(""));
    assert!(!is_dotted_key(".host"));
    assert!(!is_dotted_key("a b"));
  }
}
