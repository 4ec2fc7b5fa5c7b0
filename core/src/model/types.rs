//! Model layer types
//!
//! Requests, responses and tool definitions in the OpenAI chat shape

use sage_protocol::{Message, ToolCall};
use serde::{Deserialize, Serialize};

/// Chat completion request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
  /// Model identifier, filled from configuration when empty
  pub model: String,

  /// System prompt first, then the conversation window
  pub messages: Vec<Message>,

  /// Sampling temperature
  #[serde(default)]
  pub temperature: Option<f32>,

  /// Tools offered for this call; `None` disables tool calling
  #[serde(default)]
  pub tools: Option<Vec<Tool>>,

  /// Whether to stream responses
  #[serde(default)]
  pub stream: bool,
}

impl ChatRequest {
  pub fn new(messages: Vec<Message>) -> Self {
    Self {
      messages,
      ..Default::default()
    }
  }

  pub fn with_tools(mut self, tools: Option<Vec<Tool>>) -> Self {
    self.tools = tools.filter(|tools| !tools.is_empty());
    self
  }

  pub fn with_temperature(mut self, temperature: f32) -> Self {
    self.temperature = Some(temperature);
    self
  }
}

/// Tool definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
  /// Tool type (currently only "function")
  #[serde(rename = "type")]
  pub tool_type: String,

  #[serde(default)]
  pub function: Option<FunctionDefinition>,
}

impl Tool {
  /// Create a function tool
  pub fn function(function: FunctionDefinition) -> Self {
    Self {
      tool_type: "function".to_string(),
      function: Some(function),
    }
  }

  pub fn name(&self) -> Option<&str> {
    self.function.as_ref().map(|function| function.name.as_str())
  }
}

/// Function definition for a tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
  pub name: String,

  pub description: String,

  /// JSON schema for the function parameters
  #[serde(default)]
  pub parameters: serde_json::Value,
}

/// Chat completion response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
  #[serde(default)]
  pub id: String,

  #[serde(default)]
  pub model: String,

  pub choices: Vec<Choice>,

  #[serde(default)]
  pub usage: Option<Usage>,
}

impl ChatResponse {
  /// Content of the first choice, empty when absent.
  pub fn text(&self) -> &str {
    self
      .choices
      .first()
      .and_then(|choice| choice.message.content.as_deref())
      .unwrap_or_default()
  }
}

/// A completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
  #[serde(default)]
  pub index: u32,

  pub message: ChoiceMessage,

  /// Why the assistant stopped
  #[serde(default)]
  pub finish_reason: Option<String>,
}

/// Message in a choice
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
  #[serde(default)]
  pub content: Option<String>,

  #[serde(default, alias = "reasoning")]
  pub reasoning_content: Option<String>,

  #[serde(default)]
  pub tool_calls: Option<Vec<ToolCall>>,
}

/// Token usage statistics
#[derive(Debug, Clone, Deserialize, Default, Serialize, PartialEq, Eq)]
pub struct Usage {
  #[serde(default, rename = "prompt_tokens")]
  pub input_tokens: u32,

  #[serde(default, rename = "completion_tokens")]
  pub output_tokens: u32,

  #[serde(default)]
  pub total_tokens: u32,
}

/// Model information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
  pub id: String,

  #[serde(default)]
  pub owned_by: Option<String>,
}

/// List models response
#[derive(Debug, Clone, Deserialize)]
pub struct ListModelsResponse {
  pub data: Vec<ModelInfo>,
}
