// Sage MCP Module
// Tools exposed by external MCP servers

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use sage_config::McpConfig;
use sage_rmcp_client::{McpConnector, RemoteTool, flatten_content};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::model::{FunctionDefinition, Tool};

/// A remote tool and the server that advertised it.
#[derive(Debug, Clone, PartialEq)]
pub struct McpTool {
  pub server: String,
  pub tool: RemoteTool,
}

/// Discovers and calls tools across the configured MCP servers. Listings
/// are cached by tool name until a refresh is forced.
pub struct McpConnectionManager {
  config: McpConfig,
  connector: Arc<dyn McpConnector>,
  cache: RwLock<BTreeMap<String, McpTool>>,
}

impl McpConnectionManager {
  pub fn new(config: McpConfig, connector: Arc<dyn McpConnector>) -> Self {
    Self {
      config,
      connector,
      cache: RwLock::new(BTreeMap::new()),
    }
  }

  /// All known tools. Servers are queried in parallel; a failing server
  /// contributes nothing and is logged.
  pub async fn list_tools(&self, force_refresh: bool) -> Vec<McpTool> {
    if !force_refresh {
      let cache = self.cache.read().await;
      if !cache.is_empty() {
        return cache.values().cloned().collect();
      }
    }

    let connector = &self.connector;
    let listings = join_all(self.config.enabled_servers().map(|(name, server)| async move {
      (name.clone(), connector.list_tools(name, server).await)
    }))
    .await;

    let mut fresh = BTreeMap::new();
    for (server, listing) in listings {
      match listing {
        Ok(tools) => {
          info!(server = %server, tools = tools.len(), "listed MCP tools");
          for tool in tools {
            if let Some(previous) = fresh.get(&tool.name).map(|t: &McpTool| t.server.clone()) {
              debug!(tool = %tool.name, previous = %previous, server = %server, "MCP tool name shadowed");
            }
            fresh.insert(
              tool.name.clone(),
              McpTool {
                server: server.clone(),
                tool,
              },
            );
          }
        }
        Err(e) => error!(server = %server, error = %e, "failed to list MCP tools"),
      }
    }

    let tools = fresh.values().cloned().collect();
    *self.cache.write().await = fresh;
    tools
  }

  /// Tools grouped by the server that owns them.
  pub async fn tools_by_server(&self) -> BTreeMap<String, Vec<RemoteTool>> {
    let mut grouped: BTreeMap<String, Vec<RemoteTool>> = BTreeMap::new();
    for entry in self.list_tools(false).await {
      grouped.entry(entry.server).or_default().push(entry.tool);
    }
    grouped
  }

  pub async fn model_tools(&self) -> Vec<Tool> {
    self
      .list_tools(false)
      .await
      .into_iter()
      .map(|entry| {
        Tool::function(FunctionDefinition {
          name: entry.tool.name,
          description: entry.tool.description,
          parameters: entry.tool.input_schema,
        })
      })
      .collect()
  }

  async fn resolve(&self, name: &str) -> Option<McpTool> {
    self.cache.read().await.get(name).cloned()
  }

  /// Calls `name` on its owning server and flattens the result to text.
  /// Failures come back as text as well.
  pub async fn execute_tool(&self, name: &str, arguments: &str) -> String {
    let owner = match self.resolve(name).await {
      Some(owner) => Some(owner),
      None => {
        self.list_tools(true).await;
        self.resolve(name).await
      }
    };
    let Some((owner, server)) = owner.and_then(|owner| {
      let server = self.config.servers.get(&owner.server)?;
      Some((owner, server))
    }) else {
      return format!("Error: Tool '{name}' not found in any active MCP server.");
    };

    let arguments = match parse_arguments(arguments) {
      Ok(arguments) => arguments,
      Err(e) => return format!("MCP Execution Error: {e}"),
    };

    match self
      .connector
      .call_tool(&owner.server, server, name, arguments)
      .await
    {
      Ok(parts) => flatten_content(&parts),
      Err(e) => {
        error!(server = %owner.server, tool = name, error = %e, "MCP tool call failed");
        format!("MCP Execution Error: {e}")
      }
    }
  }
}

fn parse_arguments(raw: &str) -> Result<Option<serde_json::Map<String, Value>>, String> {
  if raw.trim().is_empty() {
    return Ok(None);
  }
  match serde_json::from_str::<Value>(raw) {
    Ok(Value::Object(map)) => Ok(Some(map)),
    Ok(Value::Null) => Ok(None),
    Ok(other) => Err(format!("arguments must be a JSON object, got {other}")),
    Err(e) => Err(format!("arguments are not valid JSON: {e}")),
  }
}
