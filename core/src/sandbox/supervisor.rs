// Sandbox Supervisor
// One execution environment per session, created lazily and reused

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use sage_config::SandboxConfig;
use sage_protocol::FILE_MARKER;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::backend::{EnvironmentSpec, SandboxBackend, Snapshot};
use super::markers::{ArtifactKind, parse_markers};
use super::script::{
  DRIVER_SCRIPT_NAME, OUTPUT_EXTENSIONS, build_driver, environment_name, rewrite_host_paths,
  strip_code_fence,
};
use super::{Result, SandboxError};

/// A retrieved artifact on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub kind: ArtifactKind,
  pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
  /// Stdout with marker lines removed, plus stderr and timeout notes.
  pub output: String,
  pub artifacts: Vec<Artifact>,
}

#[derive(Debug)]
struct SandboxSession {
  env_name: String,
  ready: bool,
  /// File name -> source modification time at the last upload.
  synced: HashMap<String, SystemTime>,
}

pub struct SandboxSupervisor {
  backend: Arc<dyn SandboxBackend>,
  config: Arc<SandboxConfig>,
  sessions: Mutex<HashMap<String, Arc<Mutex<SandboxSession>>>>,
}

impl SandboxSupervisor {
  pub fn new(backend: Arc<dyn SandboxBackend>, config: SandboxConfig) -> Self {
    Self {
      backend,
      config: Arc::new(config),
      sessions: Mutex::new(HashMap::new()),
    }
  }

  pub fn config(&self) -> &SandboxConfig {
    &self.config
  }

  /// Locks the session's environment, creating it on first use. The
  /// returned handle keeps the lock, so work on one session serializes.
  pub async fn session(&self, session_id: &str) -> Result<SandboxHandle> {
    let entry = {
      let mut sessions = self.sessions.lock().await;
      sessions
        .entry(session_id.to_string())
        .or_insert_with(|| {
          Arc::new(Mutex::new(SandboxSession {
            env_name: environment_name(session_id),
            ready: false,
            synced: HashMap::new(),
          }))
        })
        .clone()
    };

    let mut session = entry.lock_owned().await;
    if !session.ready {
      let spec = EnvironmentSpec {
        name: session.env_name.clone(),
        image: self.config.image.clone(),
        memory_limit: self.config.memory_limit.clone(),
        network: self.config.network,
        workdir: self.config.workdir.clone(),
      };
      self.backend.ensure_environment(&spec).await?;
      session.ready = true;
      info!(session_id, container = %session.env_name, "sandbox environment ready");
    }

    Ok(SandboxHandle {
      session,
      backend: Arc::clone(&self.backend),
      config: Arc::clone(&self.config),
    })
  }

  /// Removes the session's environment and forgets its cached state.
  pub async fn stop(&self, session_id: &str) -> Result<()> {
    let name = environment_name(session_id);
    self.sessions.lock().await.remove(session_id);
    self.backend.remove_environment(&name).await
  }
}

/// Exclusive access to one session's environment.
pub struct SandboxHandle {
  session: OwnedMutexGuard<SandboxSession>,
  backend: Arc<dyn SandboxBackend>,
  config: Arc<SandboxConfig>,
}

impl SandboxHandle {
  pub fn environment_name(&self) -> &str {
    &self.session.env_name
  }

  /// Uploads `host_path` unless the same modification time was already
  /// synced. Returns whether a transfer happened.
  pub async fn sync_file(&mut self, host_path: &Path) -> Result<bool> {
    let sync_error = |reason: String| SandboxError::FileSync {
      path: host_path.to_path_buf(),
      reason,
    };
    let file_name = host_path
      .file_name()
      .and_then(|name| name.to_str())
      .ok_or_else(|| sync_error("path has no file name".to_string()))?
      .to_string();
    let modified = tokio::fs::metadata(host_path)
      .await
      .and_then(|meta| meta.modified())
      .map_err(|e| sync_error(e.to_string()))?;

    if self.session.synced.get(&file_name) == Some(&modified) {
      debug!(file = %file_name, "sandbox copy is current");
      return Ok(false);
    }

    self
      .backend
      .upload(&self.session.env_name, host_path, &file_name)
      .await?;
    self.session.synced.insert(file_name, modified);
    Ok(true)
  }

  /// Runs `code` and collects new or modified output files.
  ///
  /// Runtime errors in the code come back as output text. Only backend
  /// failures to run the script are errors here.
  pub async fn execute_code(
    &mut self,
    code: &str,
    host_file: Option<&Path>,
  ) -> Result<ExecutionResult> {
    let env = self.session.env_name.clone();
    let mut code = strip_code_fence(code);
    if let Some(host_file) = host_file {
      code = rewrite_host_paths(&code, host_file, &self.config.upload_dir.to_string_lossy());
    }

    let before = match self.backend.snapshot(&env, OUTPUT_EXTENSIONS).await {
      Ok(snapshot) => Some(snapshot),
      Err(e) => {
        warn!(container = %env, error = %e, "pre-execution snapshot failed; skipping file diff");
        None
      }
    };

    let timeout = Duration::from_secs(self.config.exec_timeout_secs);
    let driver = build_driver(&code, &self.config.workdir);
    let exec = self.backend.run_script(&env, &driver, timeout).await?;

    let mut stdout = exec.stdout;
    if let Some(before) = before {
      match self.backend.snapshot(&env, OUTPUT_EXTENSIONS).await {
        Ok(after) => {
          let reported: BTreeSet<String> = parse_markers(&stdout)
            .artifacts
            .into_iter()
            .map(|artifact| artifact.source)
            .collect();
          for path in changed_files(&before, &after, &reported) {
            if !stdout.is_empty() && !stdout.ends_with('\n') {
              stdout.push('\n');
            }
            stdout.push_str(FILE_MARKER);
            stdout.push_str(&path);
            stdout.push('\n');
          }
        }
        Err(e) => warn!(container = %env, error = %e, "post-execution snapshot failed"),
      }
    }

    let parsed = parse_markers(&stdout);
    let output_dir = self.config.output_dir.join(&env);
    let mut artifacts = Vec::new();
    for marked in parsed.artifacts {
      let dest = output_dir.join(&marked.local_name);
      match self.backend.download(&env, &marked.source, &dest).await {
        Ok(()) => artifacts.push(Artifact {
          kind: marked.kind,
          path: dest,
        }),
        Err(e) => warn!(container = %env, file = %marked.source, error = %e, "artifact retrieval skipped"),
      }
    }

    let mut output = parsed.text;
    let stderr = exec.stderr.trim();
    if !stderr.is_empty() {
      if !output.is_empty() {
        output.push('\n');
      }
      output.push_str("Stderr:\n");
      output.push_str(stderr);
    }
    if exec.timed_out {
      if !output.is_empty() {
        output.push('\n');
      }
      output.push_str(&format!(
        "Execution timed out after {} seconds.",
        self.config.exec_timeout_secs
      ));
    }

    info!(container = %env, artifacts = artifacts.len(), "sandbox execution finished");
    Ok(ExecutionResult { output, artifacts })
  }
}

/// Paths new in `after` or with a later modification time, minus the
/// driver script and anything already announced.
fn changed_files(before: &Snapshot, after: &Snapshot, reported: &BTreeSet<String>) -> Vec<String> {
  after
    .iter()
    .filter(|(path, _)| path.as_str() != DRIVER_SCRIPT_NAME && !reported.contains(*path))
    .filter(|(path, mtime)| before.get(*path).is_none_or(|old| *mtime > old))
    .map(|(path, _)| path.clone())
    .collect()
}
