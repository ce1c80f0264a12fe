//! Structured edits of Helm chart YAML documents
//!
//! Keys are dotted paths (`ingress.host`) walked through nested mappings.
//! Values never pass through a shell.

use crate::core::error::{ReleaseError, ReleaseResult};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;

/// A parsed YAML document tied to its file
pub struct YamlDocument {
  root: Value,
}

impl YamlDocument {
  pub fn load(path: &Path) -> ReleaseResult<Self> {
    let content = fs::read_to_string(path)
      .map_err(|e| ReleaseError::chart("read", format!("{}: {}", path.display(), e)))?;
    Self::parse(&content).map_err(|e| match e {
      ReleaseError::ChartMutation { step, reason } => {
        ReleaseError::chart(step, format!("{}: {}", path.display(), reason))
      }
      other => other,
    })
  }

  pub fn parse(content: &str) -> ReleaseResult<Self> {
    let root: Value = serde_yaml::from_str(content).map_err(|e| ReleaseError::chart("parse", e.to_string()))?;
    let root = match root {
      Value::Null => Value::Mapping(Mapping::new()),
      Value::Mapping(_) => root,
      _ => return Err(ReleaseError::chart("parse", "document is not a mapping")),
    };
    Ok(Self { root })
  }

  pub fn save(&self, path: &Path) -> ReleaseResult<()> {
    let content = self.render()?;
    fs::write(path, content).map_err(|e| ReleaseError::chart("write", format!("{}: {}", path.display(), e)))
  }

  pub fn render(&self) -> ReleaseResult<String> {
    serde_yaml::to_string(&self.root).map_err(|e| ReleaseError::chart("write", e.to_string()))
  }

  /// Read a string-ish scalar at `key`
  pub fn get_str(&self, key: &str) -> Option<String> {
    let mut current = &self.root;
    for segment in key.split('.') {
      current = current.as_mapping()?.get(segment)?;
    }
    scalar_to_string(current)
  }

  /// Set `key` to a string, creating intermediate mappings
  pub fn set_str(&mut self, key: &str, value: &str) -> ReleaseResult<()> {
    let segments: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
      return Err(ReleaseError::chart("set", "empty key"));
    };

    let mut current = &mut self.root;
    for segment in parents {
      let map = current
        .as_mapping_mut()
        .ok_or_else(|| ReleaseError::chart("set", format!("'{}' is not a mapping on the way to '{}'", segment, key)))?;
      current = map
        .entry(Value::String(segment.to_string()))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    }

    let map = current
      .as_mapping_mut()
      .ok_or_else(|| ReleaseError::chart("set", format!("parent of '{}' is not a mapping", key)))?;
    map.insert(Value::String(last.to_string()), Value::String(value.to_string()));
    Ok(())
  }

  /// Prepend `prefix` to the existing string at `key`.
  ///
  /// The key must already hold a non-empty string.
  pub fn prefix_str(&mut self, key: &str, prefix: &str) -> ReleaseResult<String> {
    let current = self
      .get_str(key)
      .filter(|v| !v.is_empty())
      .ok_or_else(|| ReleaseError::chart("prefix", format!("'{}' is missing or not a string", key)))?;

    let updated = format!("{}{}", prefix, current);
    self.set_str(key, &updated)?;
    Ok(updated)
  }
}

fn scalar_to_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}
