use std::path::PathBuf;

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid override '{0}': expected KEY=VALUE")]
  InvalidOverride(String),

  #[error("cannot set '{key}': {reason}")]
  InvalidKey { key: String, reason: String },

  #[error("merged configuration is invalid: {0}")]
  Invalid(String),

  #[error("failed to edit {path}: {reason}")]
  Edit { path: PathBuf, reason: String },
}
