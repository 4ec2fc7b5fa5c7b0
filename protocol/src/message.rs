use serde::{Deserialize, Serialize};

use crate::markers::CONTEXT_FILE_PREFIX;

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  System,
  User,
  Assistant,
  Tool,
}

/// One turn of the conversation, in the shape replayed to the model and
/// written to session files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
  pub role: Role,

  #[serde(default)]
  pub content: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tool_calls: Option<Vec<ToolCall>>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tool_call_id: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
}

impl Message {
  fn with_role(role: Role, content: Option<String>) -> Self {
    Self {
      role,
      content,
      tool_calls: None,
      tool_call_id: None,
      name: None,
    }
  }

  pub fn system(content: impl Into<String>) -> Self {
    Self::with_role(Role::System, Some(content.into()))
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self::with_role(Role::User, Some(content.into()))
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self::with_role(Role::Assistant, Some(content.into()))
  }

  /// Assistant message requesting tool calls. Empty text is kept as an
  /// empty string so providers that reject `null` content still accept it.
  pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
    let mut message = Self::with_role(Role::Assistant, Some(content.into()));
    message.tool_calls = Some(tool_calls);
    message
  }

  pub fn tool(
    tool_call_id: impl Into<String>,
    name: impl Into<String>,
    content: impl Into<String>,
  ) -> Self {
    let mut message = Self::with_role(Role::Tool, Some(content.into()));
    message.tool_call_id = Some(tool_call_id.into());
    message.name = Some(name.into());
    message
  }

  /// User message carrying a reference to the file the user is working on.
  pub fn user_with_context_file(content: impl Into<String>, context_file: Option<&str>) -> Self {
    let mut text = content.into();
    if let Some(path) = context_file {
      text.push_str(CONTEXT_FILE_PREFIX);
      text.push_str(path);
      text.push(']');
    }
    Self::user(text)
  }

  pub fn text(&self) -> &str {
    self.content.as_deref().unwrap_or_default()
  }

  pub fn has_tool_calls(&self) -> bool {
    self
      .tool_calls
      .as_ref()
      .is_some_and(|calls| !calls.is_empty())
  }

  /// Text with the trailing context-file reference removed.
  pub fn text_without_context_file(&self) -> &str {
    let text = self.text();
    match text.find(CONTEXT_FILE_PREFIX) {
      Some(idx) => &text[..idx],
      None => text,
    }
  }
}

/// Tool call requested by an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
  pub id: String,

  #[serde(rename = "type", default = "function_type")]
  pub call_type: String,

  pub function: FunctionCall,
}

/// Function name plus JSON-encoded arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
  pub name: String,
  pub arguments: String,
}

fn function_type() -> String {
  "function".to_string()
}

impl ToolCall {
  pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      call_type: function_type(),
      function: FunctionCall {
        name: name.into(),
        arguments: arguments.into(),
      },
    }
  }

  /// Id used when a provider omitted one: `call_` plus eight hex chars.
  pub fn generated_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{}", &hex[..8])
  }
}
