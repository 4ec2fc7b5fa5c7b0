// Docker CLI Backend
// Drives the container runtime binary through tokio::process

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::backend::{EnvironmentSpec, ExecOutput, SandboxBackend, Snapshot};
use super::script::DRIVER_SCRIPT_NAME;
use super::{Result, SandboxError};

/// Exit status `timeout(1)` uses when the limit was hit.
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Extra host-side wait on top of the in-container limit.
const HOST_GRACE: Duration = Duration::from_secs(5);

const SNAPSHOT_SCRIPT: &str = "import glob, json, os, sys\n\
snap = {}\n\
for ext in json.loads(sys.argv[1]):\n    \
for f in glob.glob('**/*.' + ext, recursive=True):\n        \
try:\n            snap[f] = os.path.getmtime(f)\n        \
except OSError:\n            pass\n\
print(json.dumps(snap))\n";

#[derive(Debug, Clone)]
pub struct DockerCliBackend {
  docker_bin: String,
  workdir: String,
}

struct CommandOutput {
  stdout: String,
  stderr: String,
  code: Option<i32>,
}

impl DockerCliBackend {
  pub fn new(docker_bin: impl Into<String>, workdir: impl Into<String>) -> Self {
    Self {
      docker_bin: docker_bin.into(),
      workdir: workdir.into(),
    }
  }

  fn command(&self, args: &[&str]) -> Command {
    let mut cmd = Command::new(&self.docker_bin);
    cmd
      .args(args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    cmd
  }

  async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
    debug!(args = ?args, "docker");
    let output = self
      .command(args)
      .output()
      .await
      .map_err(|e| SandboxError::Backend(format!("failed to launch {}: {e}", self.docker_bin)))?;
    Ok(CommandOutput {
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
      code: output.status.code(),
    })
  }

  /// Runs a command that must exit 0; stderr becomes the error text.
  async fn run_checked(&self, args: &[&str]) -> std::result::Result<String, String> {
    let output = self.run(args).await.map_err(|e| e.to_string())?;
    if output.code == Some(0) {
      Ok(output.stdout)
    } else {
      Err(output.stderr.trim().to_string())
    }
  }

  fn container_path(&self, env: &str, rel_path: &str) -> String {
    format!("{env}:{}/{rel_path}", self.workdir.trim_end_matches('/'))
  }

  async fn write_driver(&self, env: &str, script: &str) -> Result<()> {
    let target = format!("cat > {}/{DRIVER_SCRIPT_NAME}", self.workdir.trim_end_matches('/'));
    let mut child = self
      .command(&["exec", "-i", env, "sh", "-c", &target])
      .stdin(Stdio::piped())
      .spawn()
      .map_err(|e| SandboxError::Execution(format!("failed to start script upload: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
      stdin
        .write_all(script.as_bytes())
        .await
        .map_err(|e| SandboxError::Execution(format!("failed to write script: {e}")))?;
    }

    let output = child
      .wait_with_output()
      .await
      .map_err(|e| SandboxError::Execution(format!("script upload failed: {e}")))?;
    if !output.status.success() {
      return Err(SandboxError::Execution(format!(
        "script upload failed: {}",
        String::from_utf8_lossy(&output.stderr).trim()
      )));
    }
    Ok(())
  }
}

#[async_trait]
impl SandboxBackend for DockerCliBackend {
  async fn ensure_environment(&self, spec: &EnvironmentSpec) -> Result<()> {
    let creation = |reason: String| SandboxError::Creation {
      name: spec.name.clone(),
      reason,
    };

    let inspect = self
      .run(&["inspect", "-f", "{{.State.Running}}", &spec.name])
      .await?;
    if inspect.code == Some(0) {
      if inspect.stdout.trim() != "true" {
        self
          .run_checked(&["start", &spec.name])
          .await
          .map_err(creation)?;
        info!(container = %spec.name, "restarted sandbox container");
      }
      return Ok(());
    }

    let mut args = vec![
      "run",
      "-d",
      "--name",
      spec.name.as_str(),
      "--memory",
      spec.memory_limit.as_str(),
      "-w",
      spec.workdir.as_str(),
    ];
    if !spec.network {
      args.extend(["--network", "none"]);
    }
    args.extend([spec.image.as_str(), "sleep", "infinity"]);

    self.run_checked(&args).await.map_err(creation)?;
    info!(container = %spec.name, image = %spec.image, "created sandbox container");
    Ok(())
  }

  async fn upload(&self, env: &str, host_path: &Path, file_name: &str) -> Result<()> {
    let source = host_path.display().to_string();
    let target = self.container_path(env, file_name);
    self
      .run_checked(&["cp", &source, &target])
      .await
      .map_err(|reason| SandboxError::FileSync {
        path: host_path.to_path_buf(),
        reason,
      })?;
    info!(container = env, file = file_name, "uploaded file to sandbox");
    Ok(())
  }

  async fn snapshot(&self, env: &str, extensions: &[&str]) -> Result<Snapshot> {
    let exts = serde_json::to_string(extensions)
      .map_err(|e| SandboxError::Backend(format!("failed to encode extensions: {e}")))?;
    let stdout = self
      .run_checked(&[
        "exec",
        "-w",
        &self.workdir,
        env,
        "python",
        "-c",
        SNAPSHOT_SCRIPT,
        &exts,
      ])
      .await
      .map_err(|reason| SandboxError::Backend(format!("snapshot failed: {reason}")))?;
    serde_json::from_str(stdout.trim())
      .map_err(|e| SandboxError::Backend(format!("snapshot output is not valid JSON: {e}")))
  }

  async fn run_script(&self, env: &str, script: &str, timeout: Duration) -> Result<ExecOutput> {
    self.write_driver(env, script).await?;

    let limit = timeout.as_secs().max(1).to_string();
    let args = [
      "exec",
      "-w",
      self.workdir.as_str(),
      env,
      "timeout",
      limit.as_str(),
      "python",
      DRIVER_SCRIPT_NAME,
    ];

    match tokio::time::timeout(timeout + HOST_GRACE, self.run(&args)).await {
      Ok(output) => {
        let output = output?;
        Ok(ExecOutput {
          timed_out: output.code == Some(TIMEOUT_EXIT_CODE),
          stdout: output.stdout,
          stderr: output.stderr,
          exit_code: output.code,
        })
      }
      Err(_) => Ok(ExecOutput {
        timed_out: true,
        ..Default::default()
      }),
    }
  }

  async fn download(&self, env: &str, rel_path: &str, host_dest: &Path) -> Result<()> {
    let retrieval = |reason: String| SandboxError::ArtifactRetrieval {
      file: rel_path.to_string(),
      reason,
    };
    if let Some(parent) = host_dest.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| retrieval(e.to_string()))?;
    }
    let source = self.container_path(env, rel_path);
    let dest = host_dest.display().to_string();
    self
      .run_checked(&["cp", &source, &dest])
      .await
      .map_err(retrieval)?;
    Ok(())
  }

  async fn remove_environment(&self, env: &str) -> Result<()> {
    self
      .run_checked(&["rm", "-f", env])
      .await
      .map_err(SandboxError::Backend)?;
    info!(container = env, "removed sandbox container");
    Ok(())
  }
}
