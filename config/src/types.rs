// Configuration Types
// All configuration type definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  /// Model provider settings
  pub models: ModelsConfig,
  /// Conversation loop settings
  pub agent: AgentConfig,
  /// Feature flags
  pub features: FeaturesConfig,
  /// Per-tool enabled flags
  pub tools: ToolsConfig,
  /// Code execution sandbox
  pub sandbox: SandboxConfig,
  /// Knowledge base
  pub knowledge: KnowledgeConfig,
  /// MCP server configurations
  pub mcp: McpConfig,
  /// Session history
  pub history: HistoryConfig,
  /// Log output
  pub logging: LoggingConfig,
}

// ============================================================================
// MODELS CONFIGURATION
// ============================================================================

/// Models configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
  /// Model provider (`ollama`, `openai`, or any OpenAI-compatible id)
  pub provider: String,
  /// Model name
  pub model: String,
  /// Base URL for API, defaults per provider
  pub base_url: Option<String>,
  /// Environment variable holding the API key
  pub api_key_env: Option<String>,
  /// HTTP timeout in seconds
  pub timeout_secs: u64,
}

impl Default for ModelsConfig {
  fn default() -> Self {
    Self {
      provider: "ollama".to_string(),
      model: "qwen2.5:7b".to_string(),
      base_url: None,
      api_key_env: None,
      timeout_secs: 120,
    }
  }
}

// ============================================================================
// AGENT CONFIGURATION
// ============================================================================

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

pub const DEFAULT_PLANNING_TEMPLATE: &str = "User request: {prompt}\n\nYou are an expert Planner. Please create a comprehensive, step-by-step execution plan to fulfill the request using the available tools.\nRequirements:\n1. The plan must be a clear, numbered list.\n2. Do NOT execute any tools yet, just list the logical steps.\n3. If the request is trivial (e.g. 'hello'), reply with 'No plan needed'.";

/// Conversation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
  pub system_prompt: String,
  /// Sampling temperature for loop iterations
  pub temperature: f32,
  /// Step budget per user turn
  pub max_tool_steps: usize,
  /// Non-system messages replayed to the model
  pub history_window: usize,
  /// Planning prompt, `{prompt}` is replaced by the user request
  pub planning_template: String,
  pub planning_temperature: f32,
}

impl Default for AgentConfig {
  fn default() -> Self {
    Self {
      system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
      temperature: 0.3,
      max_tool_steps: 5,
      history_window: 20,
      planning_template: DEFAULT_PLANNING_TEMPLATE.to_string(),
      planning_temperature: 0.7,
    }
  }
}

// ============================================================================
// FEATURES CONFIGURATION
// ============================================================================

/// Feature flags configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeaturesConfig {
  /// Offer locally registered tools
  pub custom_tools: bool,
  /// Offer MCP server tools
  pub mcp: bool,
  /// Offer knowledge base search
  pub rag: bool,
  /// Rerank knowledge base hits
  pub rerank: bool,
  /// Run a planning call before the loop
  pub plan_solve: bool,
}

impl Default for FeaturesConfig {
  fn default() -> Self {
    Self {
      custom_tools: true,
      mcp: false,
      rag: false,
      rerank: false,
      plan_solve: false,
    }
  }
}

// ============================================================================
// TOOLS CONFIGURATION
// ============================================================================

/// Per-tool enabled flags; tools absent from the map are enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ToolsConfig {
  pub enabled: BTreeMap<String, bool>,
}

impl ToolsConfig {
  pub fn is_enabled(&self, name: &str) -> bool {
    self.enabled.get(name).copied().unwrap_or(true)
  }
}

// ============================================================================
// SANDBOX CONFIGURATION
// ============================================================================

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
  /// Container image with the Python toolchain
  pub image: String,
  /// Memory limit passed to the container runtime
  pub memory_limit: String,
  /// Network access inside the container
  pub network: bool,
  /// Working directory inside the container
  pub workdir: String,
  /// Wall-clock limit for one code execution
  pub exec_timeout_secs: u64,
  /// Container runtime binary
  pub docker_bin: String,
  /// Host directory holding user uploads
  pub upload_dir: PathBuf,
  /// Host directory receiving generated artifacts
  pub output_dir: PathBuf,
}

impl Default for SandboxConfig {
  fn default() -> Self {
    Self {
      image: "ai-sandbox:latest".to_string(),
      memory_limit: "512m".to_string(),
      network: false,
      workdir: "/workspace".to_string(),
      exec_timeout_secs: 120,
      docker_bin: "docker".to_string(),
      upload_dir: PathBuf::from("uploads"),
      output_dir: PathBuf::from("uploads").join("outputs"),
    }
  }
}

// ============================================================================
// KNOWLEDGE CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KnowledgeConfig {
  pub store_dir: PathBuf,
  pub embed_model: String,
  pub rerank_model: Option<String>,
}

impl Default for KnowledgeConfig {
  fn default() -> Self {
    Self {
      store_dir: PathBuf::from("knowledge"),
      embed_model: "nomic-embed-text".to_string(),
      rerank_model: None,
    }
  }
}

// ============================================================================
// MCP CONFIGURATION
// ============================================================================

/// MCP configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct McpConfig {
  /// MCP server configurations keyed by server name
  pub servers: BTreeMap<String, McpServerConfig>,
}

impl McpConfig {
  pub fn enabled_servers(&self) -> impl Iterator<Item = (&String, &McpServerConfig)> {
    self.servers.iter().filter(|(_, server)| server.enabled)
  }
}

/// MCP server launched as a child process speaking stdio
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpServerConfig {
  pub command: String,
  #[serde(default)]
  pub args: Vec<String>,
  #[serde(default)]
  pub env: BTreeMap<String, String>,
  #[serde(default)]
  pub cwd: Option<PathBuf>,
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Connect and initialize timeout in seconds
  #[serde(default = "default_startup_timeout")]
  pub startup_timeout_secs: u64,
  /// Tool call timeout in seconds
  #[serde(default = "default_tool_timeout")]
  pub tool_timeout_secs: u64,
}

impl McpServerConfig {
  pub fn new(command: impl Into<String>) -> Self {
    Self {
      command: command.into(),
      args: Vec::new(),
      env: BTreeMap::new(),
      cwd: None,
      enabled: true,
      startup_timeout_secs: default_startup_timeout(),
      tool_timeout_secs: default_tool_timeout(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_startup_timeout() -> u64 {
  10
}

fn default_tool_timeout() -> u64 {
  60
}

// ============================================================================
// HISTORY / LOGGING CONFIGURATION
// ============================================================================

/// History configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
  /// Directory holding one JSON file per session
  pub dir: PathBuf,
}

impl Default for HistoryConfig {
  fn default() -> Self {
    Self {
      dir: PathBuf::from("history"),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter directive used when `RUST_LOG` is unset
  pub level: String,
  /// Daily rolling log files are written here when set
  pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      dir: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_file_fills_defaults() {
    let config: Config = toml::from_str(
      r#"
        [agent]
        max_tool_steps = 2

        [tools]
        python_interpreter = false

        [mcp.servers.fs]
        command = "npx"
        args = ["-y", "@modelcontextprotocol/server-filesystem"]
      "#,
    )
    .expect("parse config");

    assert_eq!(config.agent.max_tool_steps, 2);
    assert_eq!(config.agent.history_window, 20);
    assert!(!config.tools.is_enabled("python_interpreter"));
    assert!(config.tools.is_enabled("excel_read"));
    let fs = &config.mcp.servers["fs"];
    assert!(fs.enabled);
    assert_eq!(fs.tool_timeout_secs, 60);
  }

  #[test]
  fn defaults_match_source_behavior() {
    let config = Config::default();
    assert_eq!(config.sandbox.memory_limit, "512m");
    assert!(!config.sandbox.network);
    assert!(config.agent.planning_template.contains("{prompt}"));
    assert!(config.features.custom_tools);
  }
}
