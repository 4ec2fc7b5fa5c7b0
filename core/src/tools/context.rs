use std::path::PathBuf;

use serde::de::DeserializeOwned;

/// Per-session facts a handler may need: which conversation it serves,
/// the file the user attached, and the directory host paths must stay in.
#[derive(Debug, Clone)]
pub struct ToolSessionContext {
  pub session_id: String,
  pub current_file: Option<PathBuf>,
  pub cwd: PathBuf,
}

impl ToolSessionContext {
  pub fn new(session_id: impl Into<String>) -> Self {
    Self {
      session_id: session_id.into(),
      current_file: None,
      cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
  }

  pub fn with_current_file(mut self, path: Option<PathBuf>) -> Self {
    self.current_file = path;
    self
  }

  pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
    self.cwd = cwd;
    self
  }
}

/// Invocation payload passed to a tool handler.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
  pub id: String,
  pub name: String,
  pub arguments: String,
  pub session: ToolSessionContext,
}

impl ToolInvocation {
  pub fn parse_arguments<T: DeserializeOwned>(&self) -> Result<T, FunctionCallError> {
    serde_json::from_str(&self.arguments).map_err(|e| {
      FunctionCallError::InvalidArguments(format!("invalid arguments for {}: {e}", self.name))
    })
  }
}

/// Standard output from a tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
  pub id: String,
  pub content: String,
  pub is_error: bool,
  /// Host paths of files the tool produced.
  pub artifacts: Vec<PathBuf>,
}

impl ToolOutput {
  pub fn success(content: impl Into<String>) -> Self {
    Self {
      content: content.into(),
      ..Default::default()
    }
  }

  pub fn error(content: impl Into<String>) -> Self {
    Self {
      content: content.into(),
      is_error: true,
      ..Default::default()
    }
  }

  pub fn with_artifacts(mut self, artifacts: Vec<PathBuf>) -> Self {
    self.artifacts = artifacts;
    self
  }
}

/// Tool invocation failures raised by handlers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FunctionCallError {
  #[error("{0}")]
  InvalidArguments(String),
  #[error("{0}")]
  PermissionDenied(String),
  #[error("{0}")]
  Execution(String),
}
