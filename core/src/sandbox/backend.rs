use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::Result;

/// Relative path inside the working directory mapped to its modification
/// time in seconds since the epoch.
pub type Snapshot = BTreeMap<String, f64>;

/// What an execution environment must look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
  pub name: String,
  pub image: String,
  pub memory_limit: String,
  pub network: bool,
  pub workdir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
  pub stdout: String,
  pub stderr: String,
  pub exit_code: Option<i32>,
  pub timed_out: bool,
}

/// Container runtime operations used by the supervisor. Paths inside the
/// environment are relative to [`EnvironmentSpec::workdir`].
#[async_trait]
pub trait SandboxBackend: Send + Sync {
  /// Starts the environment, creating it when it does not exist yet.
  async fn ensure_environment(&self, spec: &EnvironmentSpec) -> Result<()>;

  async fn upload(&self, env: &str, host_path: &Path, file_name: &str) -> Result<()>;

  /// Recursive listing of files with one of `extensions`.
  async fn snapshot(&self, env: &str, extensions: &[&str]) -> Result<Snapshot>;

  /// Writes `script` as the driver file and runs it with a wall-clock limit.
  async fn run_script(&self, env: &str, script: &str, timeout: Duration) -> Result<ExecOutput>;

  async fn download(&self, env: &str, rel_path: &str, host_dest: &Path) -> Result<()>;

  async fn remove_environment(&self, env: &str) -> Result<()>;
}
