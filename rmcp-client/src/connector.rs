// MCP Connector
// One short-lived child-process session per request

use std::borrow::Cow;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::handler::client::ClientHandler;
use rmcp::model::{CallToolRequestParam, JsonObject, Tool};
use rmcp::service::serve_client;
use rmcp::transport::TokioChildProcess;
use sage_config::McpServerConfig;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::utils::run_with_timeout;

#[derive(Debug, thiserror::Error)]
pub enum McpClientError {
  #[error("failed to launch MCP server '{server}': {source}")]
  Spawn {
    server: String,
    #[source]
    source: std::io::Error,
  },

  #[error("MCP server '{server}': {message}")]
  Protocol { server: String, message: String },

  #[error("MCP server '{server}': {label} timed out after {timeout:?}")]
  Timeout {
    server: String,
    label: String,
    timeout: Duration,
  },
}

/// Tool advertised by an MCP server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
  pub name: String,
  pub description: String,
  pub input_schema: Value,
}

/// Opens a session, performs one request and closes the session again.
#[async_trait]
pub trait McpConnector: Send + Sync {
  async fn list_tools(
    &self,
    server_name: &str,
    config: &McpServerConfig,
  ) -> Result<Vec<RemoteTool>, McpClientError>;

  /// Returns the raw content blocks of the tool result.
  async fn call_tool(
    &self,
    server_name: &str,
    config: &McpServerConfig,
    tool_name: &str,
    arguments: Option<JsonObject>,
  ) -> Result<Vec<Value>, McpClientError>;
}

#[derive(Clone, Default)]
struct NoopClientHandler;

impl ClientHandler for NoopClientHandler {}

/// [`McpConnector`] speaking MCP over the stdio of a spawned process.
#[derive(Debug, Clone, Default)]
pub struct RmcpConnector;

impl RmcpConnector {
  pub fn new() -> Self {
    Self
  }

  fn transport(
    server_name: &str,
    config: &McpServerConfig,
  ) -> Result<TokioChildProcess, McpClientError> {
    let mut command = Command::new(&config.command);
    command.args(&config.args).envs(&config.env).kill_on_drop(true);
    if let Some(cwd) = &config.cwd {
      command.current_dir(cwd);
    }

    let (transport, _stderr) = TokioChildProcess::builder(command)
      .stderr(Stdio::null())
      .spawn()
      .map_err(|source| McpClientError::Spawn {
        server: server_name.to_string(),
        source,
      })?;
    Ok(transport)
  }
}

#[async_trait]
impl McpConnector for RmcpConnector {
  async fn list_tools(
    &self,
    server_name: &str,
    config: &McpServerConfig,
  ) -> Result<Vec<RemoteTool>, McpClientError> {
    let startup = Duration::from_secs(config.startup_timeout_secs);
    let transport = Self::transport(server_name, config)?;
    let service = run_with_timeout(
      serve_client(NoopClientHandler, transport),
      startup,
      server_name,
      "initialize",
    )
    .await?;

    let listed = run_with_timeout(service.list_all_tools(), startup, server_name, "tools/list").await;
    if let Err(e) = service.cancel().await {
      warn!(server = server_name, error = %e, "failed to close MCP session");
    }

    let tools = listed?
      .into_iter()
      .filter_map(remote_tool)
      .collect::<Vec<_>>();
    debug!(server = server_name, count = tools.len(), "listed MCP tools");
    Ok(tools)
  }

  async fn call_tool(
    &self,
    server_name: &str,
    config: &McpServerConfig,
    tool_name: &str,
    arguments: Option<JsonObject>,
  ) -> Result<Vec<Value>, McpClientError> {
    let transport = Self::transport(server_name, config)?;
    let service = run_with_timeout(
      serve_client(NoopClientHandler, transport),
      Duration::from_secs(config.startup_timeout_secs),
      server_name,
      "initialize",
    )
    .await?;

    let called = run_with_timeout(
      service.call_tool(CallToolRequestParam {
        name: Cow::Owned(tool_name.to_string()),
        arguments,
      }),
      Duration::from_secs(config.tool_timeout_secs),
      server_name,
      "tools/call",
    )
    .await;
    if let Err(e) = service.cancel().await {
      warn!(server = server_name, error = %e, "failed to close MCP session");
    }

    let result = called?;
    debug!(
      server = server_name,
      tool = tool_name,
      blocks = result.content.len(),
      "MCP tool returned"
    );
    Ok(
      result
        .content
        .into_iter()
        .map(|block| serde_json::to_value(block).unwrap_or(Value::Null))
        .collect(),
    )
  }
}

fn remote_tool(tool: Tool) -> Option<RemoteTool> {
  let name = tool.name.to_string();
  if name.is_empty() {
    return None;
  }
  Some(RemoteTool {
    description: tool
      .description
      .as_deref()
      .unwrap_or_default()
      .trim()
      .to_string(),
    input_schema: tool.schema_as_json_value(),
    name,
  })
}
