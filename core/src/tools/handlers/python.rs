// Python Interpreter Handler
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::sandbox::{ExecutionResult, SandboxSupervisor};
use crate::tools::context::{FunctionCallError, ToolInvocation, ToolOutput};
use crate::tools::registry::ToolHandler;

const NO_OUTPUT: &str = "Code executed successfully (No output).";

/// Runs model-written code in the session's sandbox.
pub struct PythonInterpreterHandler {
  supervisor: Arc<SandboxSupervisor>,
}

impl PythonInterpreterHandler {
  pub fn new(supervisor: Arc<SandboxSupervisor>) -> Self {
    Self { supervisor }
  }
}

#[derive(serde::Deserialize)]
struct PythonArgs {
  code: String,
}

#[async_trait]
impl ToolHandler for PythonInterpreterHandler {
  async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
    let args: PythonArgs = invocation.parse_arguments()?;
    let session = &invocation.session;

    let mut sandbox = self
      .supervisor
      .session(&session.session_id)
      .await
      .map_err(|e| FunctionCallError::Execution(e.to_string()))?;

    let context_file = session.current_file.as_deref();
    if let Some(file) = context_file {
      // The code may not need the file; run it anyway.
      if let Err(e) = sandbox.sync_file(file).await {
        warn!(session_id = %session.session_id, error = %e, "context file sync failed");
      }
    }

    let result = sandbox
      .execute_code(&args.code, context_file)
      .await
      .map_err(|e| FunctionCallError::Execution(e.to_string()))?;

    let artifacts = result
      .artifacts
      .iter()
      .map(|artifact| artifact.path.clone())
      .collect();
    Ok(ToolOutput::success(format_result(&result)).with_artifacts(artifacts))
  }
}

fn format_result(result: &ExecutionResult) -> String {
  let mut text = String::new();
  if !result.output.trim().is_empty() {
    text.push_str("Output:\n");
    text.push_str(&result.output);
  }
  if !result.artifacts.is_empty() {
    text.push_str("\nGenerated Files:\n");
    for artifact in &result.artifacts {
      text.push_str(artifact.kind.marker());
      text.push_str(&artifact.path.display().to_string());
      text.push('\n');
    }
  }

  if text.trim().is_empty() {
    NO_OUTPUT.to_string()
  } else {
    text.trim_end().to_string()
  }
}
