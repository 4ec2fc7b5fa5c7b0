// Layered Configuration
// Support for layered configuration with precedence

use toml::Value;
use toml::map::Map;

use crate::error::ConfigError;
use crate::types::Config;

/// Layered configuration wrapper. Later layers win.
#[derive(Debug, Clone, Default)]
pub struct LayeredConfig {
  layers: Vec<ConfigLayer>,
}

/// Configuration layer with source tracking
#[derive(Debug, Clone)]
pub struct ConfigLayer {
  pub source: ConfigLayerSource,
  pub values: Value,
}

/// Configuration layer source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayerSource {
  /// Built-in defaults
  Default,
  /// Global user config
  GlobalConfig,
  /// Project-specific config
  ProjectConfig,
  /// CLI override
  CliOverride,
}

impl LayeredConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_layer(&mut self, source: ConfigLayerSource, values: Value) {
    self.layers.push(ConfigLayer { source, values });
  }

  pub fn sources(&self) -> Vec<ConfigLayerSource> {
    self.layers.iter().map(|layer| layer.source.clone()).collect()
  }

  /// Deep-merges tables; scalars and arrays from later layers replace earlier ones.
  pub fn merge(&self) -> Value {
    let mut merged = Value::Table(Map::new());
    for layer in &self.layers {
      merge_into(&mut merged, &layer.values);
    }
    merged
  }

  pub fn resolve(&self) -> Result<Config, ConfigError> {
    self
      .merge()
      .try_into::<Config>()
      .map_err(|e| ConfigError::Invalid(e.to_string()))
  }
}

fn merge_into(base: &mut Value, overlay: &Value) {
  match (base, overlay) {
    (Value::Table(base_table), Value::Table(overlay_table)) => {
      for (key, value) in overlay_table {
        match base_table.get_mut(key) {
          Some(existing) => merge_into(existing, value),
          None => {
            base_table.insert(key.clone(), value.clone());
          }
        }
      }
    }
    (slot, value) => *slot = value.clone(),
  }
}

/// Sets `a.b.c = value` inside a table, creating intermediate tables.
pub(crate) fn set_path(root: &mut Value, key: &str, value: Value) -> Result<(), ConfigError> {
  let parts: Vec<&str> = key.split('.').collect();
  if parts.iter().any(|part| part.trim().is_empty()) {
    return Err(ConfigError::InvalidKey {
      key: key.to_string(),
      reason: "empty path segment".to_string(),
    });
  }

  let mut cursor = root;
  for part in &parts[..parts.len() - 1] {
    let Value::Table(table) = cursor else {
      return Err(ConfigError::InvalidKey {
        key: key.to_string(),
        reason: format!("'{part}' is not a table"),
      });
    };
    cursor = table
      .entry(part.to_string())
      .or_insert_with(|| Value::Table(Map::new()));
  }

  let Value::Table(table) = cursor else {
    return Err(ConfigError::InvalidKey {
      key: key.to_string(),
      reason: "parent is not a table".to_string(),
    });
  };
  if let Some(last) = parts.last() {
    table.insert(last.to_string(), value);
  }
  Ok(())
}

/// Parses an override value as a TOML literal, falling back to a plain string.
pub(crate) fn parse_override_value(raw: &str) -> Value {
  let wrapped = format!("v = {raw}");
  match toml::from_str::<Map<String, Value>>(&wrapped) {
    Ok(mut table) => table
      .remove("v")
      .unwrap_or_else(|| Value::String(raw.to_string())),
    Err(_) => Value::String(raw.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn table(text: &str) -> Value {
    Value::Table(toml::from_str::<toml::Table>(text).expect("toml"))
  }

  #[test]
  fn later_layers_deep_merge_tables() {
    let mut layered = LayeredConfig::new();
    layered.add_layer(
      ConfigLayerSource::Default,
      table("[agent]\nmax_tool_steps = 5\nhistory_window = 20"),
    );
    layered.add_layer(
      ConfigLayerSource::ProjectConfig,
      table("[agent]\nmax_tool_steps = 2"),
    );

    let merged = layered.merge();
    assert_eq!(merged["agent"]["max_tool_steps"].as_integer(), Some(2));
    assert_eq!(merged["agent"]["history_window"].as_integer(), Some(20));
  }

  #[test]
  fn override_values_parse_as_toml_or_string() {
    assert_eq!(parse_override_value("3"), Value::Integer(3));
    assert_eq!(parse_override_value("true"), Value::Boolean(true));
    assert_eq!(
      parse_override_value("gpt-4o"),
      Value::String("gpt-4o".to_string())
    );
  }

  #[test]
  fn set_path_creates_intermediate_tables() {
    let mut root = Value::Table(Map::new());
    set_path(&mut root, "mcp.servers.fs.command", Value::String("npx".into()))
      .expect("set path");
    assert_eq!(root["mcp"]["servers"]["fs"]["command"].as_str(), Some("npx"));
  }
}
