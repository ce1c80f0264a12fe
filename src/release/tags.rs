//! Registry tag generation

use crate::core::error::{ConfigError, ReleaseError, ReleaseResult};
use crate::release::environment::Environment;
use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest tag a container registry accepts
pub const MAX_TAG_LEN: usize = 128;

/// Date and unix time captured once per run
///
/// Tags and chart versions both embed [`RunStamp::suffix`]; sharing one stamp
/// keeps them identical even if the run straddles a clock tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStamp {
  /// `YYYY-MM-DD`
  pub date: String,
  pub unix: i64,
}

impl RunStamp {
  pub fn new(date: impl Into<String>, unix: i64) -> Self {
    Self {
      date: date.into(),
      unix,
    }
  }

  pub fn now() -> Self {
    Self::at(&Local::now())
  }

  pub fn at<Tz: TimeZone>(time: &DateTime<Tz>) -> Self
  where
    Tz::Offset: fmt::Display,
  {
    Self::new(time.format("%Y-%m-%d").to_string(), time.timestamp())
  }

  /// `{date}.{unix}`
  pub fn suffix(&self) -> String {
    format!("{}.{}", self.date, self.unix)
  }
}

/// Ordered registry tags; the first one is the canonical version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
  pub fn primary(&self) -> Option<&str> {
    self.0.first().map(String::as_str)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }

  pub fn as_slice(&self) -> &[String] {
    &self.0
  }
}

impl<'a> IntoIterator for &'a TagSet {
  type Item = &'a String;
  type IntoIter = std::slice::Iter<'a, String>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.iter()
  }
}

/// Replace every character a registry tag cannot hold with `-`
pub fn sanitize_branch(branch: &str) -> String {
  branch
    .chars()
    .map(|c| if is_tag_char(c) { c } else { '-' })
    .collect()
}

fn is_tag_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Check registry tag syntax
pub fn validate_tag(tag: &str) -> ReleaseResult<()> {
  let reason = if tag.is_empty() {
    Some("tag is empty".to_string())
  } else if tag.len() > MAX_TAG_LEN {
    Some(format!("'{}' is longer than {} characters", tag, MAX_TAG_LEN))
  } else if tag.starts_with('.') || tag.starts_with('-') {
    Some(format!("'{}' must not start with '.' or '-'", tag))
  } else if let Some(c) = tag.chars().find(|c| !is_tag_char(*c)) {
    Some(format!("'{}' contains '{}'", tag, c))
  } else {
    None
  };

  match reason {
    Some(reason) => Err(ReleaseError::Config(ConfigError::InvalidValue {
      field: "tag".to_string(),
      reason: format!("invalid tag: {}", reason),
    })),
    None => Ok(()),
  }
}

/// Compute the tags for a terminal environment.
///
/// `Local` yields no tags. Transitional states are rejected.
pub fn generate(
  environment: Environment,
  version: Option<&str>,
  commit_hash: &str,
  branch: &str,
  stamp: &RunStamp,
) -> ReleaseResult<TagSet> {
  let suffix = stamp.suffix();
  let tags = match environment {
    Environment::Local => Vec::new(),
    Environment::Stable => {
      let version = require_version(environment, version)?;
      vec![version.to_string(), "stable".to_string(), "latest".to_string()]
    }
    Environment::Latest => {
      let version = require_version(environment, version)?;
      vec![format!("{}-{}.{}", version, commit_hash, suffix), "latest".to_string()]
    }
    Environment::Review => {
      vec![format!("review-{}-{}.{}", sanitize_branch(branch), commit_hash, suffix)]
    }
    Environment::None | Environment::Ci | Environment::LatestOrStable => {
      return Err(ReleaseError::invalid_state("tag generation", environment));
    }
  };

  for tag in &tags {
    validate_tag(tag)?;
  }
  Ok(TagSet(tags))
}

fn require_version(environment: Environment, version: Option<&str>) -> ReleaseResult<&str> {
  version
    .filter(|v| !v.is_empty())
    .ok_or_else(|| ReleaseError::invalid_state("tag generation without a version", environment))
}
