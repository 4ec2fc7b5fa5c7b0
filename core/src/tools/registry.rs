use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sage_config::ToolsConfig;
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::Tool;
use crate::tools::context::{FunctionCallError, ToolInvocation, ToolOutput, ToolSessionContext};
use crate::tools::spec::ToolSpec;
use crate::tools::validation::{check_argument_shape, supplied_names};

#[async_trait]
pub trait ToolHandler: Send + Sync {
  async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError>;
}

/// Failures rendered into `tool` messages so the model can react to them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolFailure {
  #[error("Error: Tool '{name}' not found. Available tools: {}", render_names(.available))]
  ToolNotFound { name: String, available: Vec<String> },

  #[error(
    "Error: Arguments mismatch for tool '{name}'. The function expects parameters: {}. You provided: {}. Error details: {detail}",
    render_names(.expected),
    render_names(.supplied)
  )]
  ArgumentMismatch {
    name: String,
    expected: Vec<String>,
    supplied: Vec<String>,
    detail: String,
  },

  #[error("Execution Error: {0}")]
  Execution(String),
}

fn render_names(names: &[String]) -> String {
  let quoted: Vec<String> = names.iter().map(|name| format!("'{name}'")).collect();
  format!("[{}]", quoted.join(", "))
}

struct RegisteredTool {
  spec: ToolSpec,
  handler: Arc<dyn ToolHandler>,
}

/// Collects tools during startup. Registering a name twice keeps the last.
#[derive(Default)]
pub struct ToolRegistryBuilder {
  tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistryBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> &mut Self {
    if self.tools.contains_key(&spec.name) {
      debug!(tool = %spec.name, "replacing previously registered tool");
    }
    self
      .tools
      .insert(spec.name.clone(), RegisteredTool { spec, handler });
    self
  }

  pub fn build(self) -> ToolRegistry {
    ToolRegistry { tools: self.tools }
  }
}

/// Immutable catalog of local tools.
#[derive(Default)]
pub struct ToolRegistry {
  tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
  pub fn builder() -> ToolRegistryBuilder {
    ToolRegistryBuilder::new()
  }

  pub fn names(&self) -> Vec<String> {
    self.tools.keys().cloned().collect()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.tools.contains_key(name)
  }

  pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
    self.tools.get(name).map(|tool| &tool.spec)
  }

  /// Specs of the tools whose enabled flag is on.
  pub fn list_enabled(&self, flags: &ToolsConfig) -> Vec<&ToolSpec> {
    self
      .tools
      .values()
      .filter(|tool| flags.is_enabled(&tool.spec.name))
      .map(|tool| &tool.spec)
      .collect()
  }

  pub fn model_tools(&self, flags: &ToolsConfig) -> Vec<Tool> {
    self
      .list_enabled(flags)
      .into_iter()
      .map(ToolSpec::to_model_tool)
      .collect()
  }

  /// Error output for a name nothing can serve.
  pub fn not_found(&self, call_id: &str, name: &str, available: Vec<String>) -> ToolOutput {
    let failure = ToolFailure::ToolNotFound {
      name: name.to_string(),
      available,
    };
    warn!(tool = name, "tool not found");
    let mut output = ToolOutput::error(failure.to_string());
    output.id = call_id.to_string();
    output
  }

  /// Runs a tool. Every failure comes back as error output text rather than
  /// as an `Err`.
  pub async fn execute(
    &self,
    call_id: &str,
    name: &str,
    arguments: &str,
    session: &ToolSessionContext,
  ) -> ToolOutput {
    match self.try_execute(call_id, name, arguments, session).await {
      Ok(mut output) => {
        output.id = call_id.to_string();
        output
      }
      Err(failure) => {
        warn!(tool = name, error = %failure, "tool call failed");
        let mut output = ToolOutput::error(failure.to_string());
        output.id = call_id.to_string();
        output
      }
    }
  }

  async fn try_execute(
    &self,
    call_id: &str,
    name: &str,
    arguments: &str,
    session: &ToolSessionContext,
  ) -> Result<ToolOutput, ToolFailure> {
    let tool = self.tools.get(name).ok_or_else(|| ToolFailure::ToolNotFound {
      name: name.to_string(),
      available: self.names(),
    })?;

    let mismatch = |supplied: Vec<String>, detail: String| ToolFailure::ArgumentMismatch {
      name: name.to_string(),
      expected: tool.spec.parameter_names(),
      supplied,
      detail,
    };

    let parsed: Value = if arguments.trim().is_empty() {
      Value::Null
    } else {
      serde_json::from_str(arguments)
        .map_err(|e| mismatch(Vec::new(), format!("arguments are not valid JSON: {e}")))?
    };
    check_argument_shape(&tool.spec, &parsed)
      .map_err(|e| mismatch(supplied_names(&parsed), e.to_string()))?;

    let invocation = ToolInvocation {
      id: call_id.to_string(),
      name: name.to_string(),
      arguments: if parsed.is_null() {
        "{}".to_string()
      } else {
        arguments.to_string()
      },
      session: session.clone(),
    };

    debug!(tool = name, call_id, "executing tool");
    match tool.handler.handle(invocation).await {
      Ok(output) => Ok(output),
      Err(FunctionCallError::InvalidArguments(detail)) => {
        Err(mismatch(supplied_names(&parsed), detail))
      }
      Err(err) => Err(ToolFailure::Execution(err.to_string())),
    }
  }
}
