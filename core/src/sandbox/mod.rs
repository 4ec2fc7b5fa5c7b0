//! Isolated code execution, one environment per conversation.
//!
//! [`SandboxSupervisor`] hands out a locked [`SandboxHandle`] per session;
//! the container runtime itself sits behind [`SandboxBackend`].

mod backend;
mod docker;
mod markers;
mod script;
mod supervisor;

pub use backend::{EnvironmentSpec, ExecOutput, SandboxBackend, Snapshot};
pub use docker::DockerCliBackend;
pub use markers::{ArtifactKind, MarkedArtifact, ParsedOutput, parse_markers};
pub use script::{
  DRIVER_SCRIPT_NAME, OUTPUT_EXTENSIONS, build_driver, environment_name, rewrite_host_paths,
  strip_code_fence,
};
pub use supervisor::{Artifact, ExecutionResult, SandboxHandle, SandboxSupervisor};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
  #[error("failed to create sandbox environment '{name}': {reason}")]
  Creation { name: String, reason: String },

  #[error("failed to sync {path} into the sandbox: {reason}")]
  FileSync { path: PathBuf, reason: String },

  #[error("sandbox execution failed: {0}")]
  Execution(String),

  #[error("failed to retrieve '{file}' from the sandbox: {reason}")]
  ArtifactRetrieval { file: String, reason: String },

  #[error("sandbox backend error: {0}")]
  Backend(String),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
