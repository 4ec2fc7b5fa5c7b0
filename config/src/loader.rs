// Configuration Loader
// Layered configuration loading system

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::layered::{ConfigLayerSource, LayeredConfig, parse_override_value, set_path};
use crate::types::Config;

const CONFIG_DIR_NAME: &str = ".sage";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration loader with layered support
pub struct ConfigLoader {
  /// Global config directory
  global_dir: PathBuf,
  /// Project config directory
  project_dir: Option<PathBuf>,
}

impl ConfigLoader {
  pub fn new() -> Self {
    let global_dir = dirs::home_dir()
      .unwrap_or_else(|| PathBuf::from("."))
      .join(CONFIG_DIR_NAME);

    Self {
      global_dir,
      project_dir: None,
    }
  }

  pub fn with_global_dir(mut self, dir: PathBuf) -> Self {
    self.global_dir = dir;
    self
  }

  pub fn with_project_dir(mut self, dir: PathBuf) -> Self {
    self.project_dir = Some(dir);
    self
  }

  pub fn global_config_path(&self) -> PathBuf {
    self.global_dir.join(CONFIG_FILE_NAME)
  }

  pub fn load(&self) -> Result<Config, ConfigError> {
    self.load_with_cli_overrides(Vec::new())
  }

  /// Load configuration with CLI overrides
  pub fn load_with_cli_overrides(
    &self,
    cli_overrides: Vec<(String, String)>,
  ) -> Result<Config, ConfigError> {
    // Layers in order:
    // 1. Built-in defaults
    // 2. Global config (~/.sage/config.toml)
    // 3. Project config (.sage/config.toml)
    // 4. CLI overrides
    let mut layered = LayeredConfig::new();

    let defaults =
      toml::Value::try_from(Config::default()).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    layered.add_layer(ConfigLayerSource::Default, defaults);

    if let Some(global) = read_layer(&self.global_config_path())? {
      layered.add_layer(ConfigLayerSource::GlobalConfig, global);
    }

    if let Some(project_dir) = &self.project_dir {
      let path = project_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
      if let Some(project) = read_layer(&path)? {
        layered.add_layer(ConfigLayerSource::ProjectConfig, project);
      }
    }

    if !cli_overrides.is_empty() {
      let mut overrides = toml::Value::Table(toml::Table::new());
      for (key, value) in cli_overrides {
        set_path(&mut overrides, &key, parse_override_value(&value))?;
      }
      layered.add_layer(ConfigLayerSource::CliOverride, overrides);
    }

    debug!(layers = ?layered.sources(), "resolved configuration layers");
    layered.resolve()
  }

  /// Writes one value into the global config file, keeping existing
  /// formatting and comments.
  pub fn set_global_value(&self, key: &str, raw_value: &str) -> Result<PathBuf, ConfigError> {
    let path = self.global_config_path();
    let existing = match std::fs::read_to_string(&path) {
      Ok(text) => text,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
      Err(source) => return Err(ConfigError::Io { path, source }),
    };

    let mut document = existing
      .parse::<toml_edit::DocumentMut>()
      .map_err(|e| ConfigError::Edit {
        path: path.clone(),
        reason: e.to_string(),
      })?;

    let value = raw_value
      .parse::<toml_edit::Value>()
      .unwrap_or_else(|_| toml_edit::Value::from(raw_value));

    let mut item = document.as_item_mut();
    for part in key.split('.') {
      if part.trim().is_empty() {
        return Err(ConfigError::InvalidKey {
          key: key.to_string(),
          reason: "empty path segment".to_string(),
        });
      }
      item = &mut item[part];
    }
    *item = toml_edit::Item::Value(value);

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
        path: parent.to_path_buf(),
        source,
      })?;
    }
    std::fs::write(&path, document.to_string()).map_err(|source| ConfigError::Io {
      path: path.clone(),
      source,
    })?;
    Ok(path)
  }
}

impl Default for ConfigLoader {
  fn default() -> Self {
    Self::new()
  }
}

/// Splits a `KEY=VALUE` CLI argument.
pub fn parse_cli_override(raw: &str) -> Result<(String, String), ConfigError> {
  match raw.split_once('=') {
    Some((key, value)) if !key.trim().is_empty() => {
      Ok((key.trim().to_string(), value.trim().to_string()))
    }
    _ => Err(ConfigError::InvalidOverride(raw.to_string())),
  }
}

fn read_layer(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
  let text = match std::fs::read_to_string(path) {
    Ok(text) => text,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      debug!(path = %path.display(), "config layer not present");
      return Ok(None);
    }
    Err(source) => {
      return Err(ConfigError::Io {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  let table = toml::from_str::<toml::Table>(&text).map_err(|source| ConfigError::Parse {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(Some(toml::Value::Table(table)))
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn write(path: &Path, text: &str) {
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, text).expect("write config");
  }

  #[test]
  fn layers_apply_in_precedence_order() {
    let home = tempfile::tempdir().expect("tempdir");
    let project = tempfile::tempdir().expect("tempdir");
    write(
      &home.path().join("config.toml"),
      "[models]\nprovider = \"openai\"\nmodel = \"gpt-4o\"\n\n[agent]\nmax_tool_steps = 8\n",
    );
    write(
      &project.path().join(".sage").join("config.toml"),
      "[agent]\nmax_tool_steps = 3\n",
    );

    let config = ConfigLoader::new()
      .with_global_dir(home.path().to_path_buf())
      .with_project_dir(project.path().to_path_buf())
      .load_with_cli_overrides(vec![("models.model".to_string(), "gpt-4o-mini".to_string())])
      .expect("load config");

    assert_eq!(config.models.provider, "openai");
    assert_eq!(config.models.model, "gpt-4o-mini");
    assert_eq!(config.agent.max_tool_steps, 3);
    assert_eq!(config.agent.history_window, 20);
  }

  #[test]
  fn missing_files_yield_defaults() {
    let home = tempfile::tempdir().expect("tempdir");
    let config = ConfigLoader::new()
      .with_global_dir(home.path().join("absent"))
      .load()
      .expect("load config");
    assert_eq!(config, Config::default());
  }

  #[test]
  fn malformed_file_is_reported() {
    let home = tempfile::tempdir().expect("tempdir");
    write(&home.path().join("config.toml"), "[agent\n");
    let err = ConfigLoader::new()
      .with_global_dir(home.path().to_path_buf())
      .load()
      .expect_err("parse failure");
    assert!(matches!(err, ConfigError::Parse { .. }));
  }

  #[test]
  fn set_global_value_preserves_comments() {
    let home = tempfile::tempdir().expect("tempdir");
    write(
      &home.path().join("config.toml"),
      "# my settings\n[features]\nrag = false\n",
    );
    let loader = ConfigLoader::new().with_global_dir(home.path().to_path_buf());

    loader.set_global_value("features.rag", "true").expect("set");
    loader.set_global_value("models.model", "llama3.1").expect("set");

    let text = std::fs::read_to_string(home.path().join("config.toml")).expect("read");
    assert!(text.starts_with("# my settings"));
    let config = loader.load().expect("load");
    assert!(config.features.rag);
    assert_eq!(config.models.model, "llama3.1");
  }

  #[test]
  fn cli_override_parsing() {
    assert_eq!(
      parse_cli_override("agent.max_tool_steps=2").expect("parse"),
      ("agent.max_tool_steps".to_string(), "2".to_string())
    );
    assert!(parse_cli_override("novalue").is_err());
  }
}
