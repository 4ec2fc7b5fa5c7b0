use std::path::PathBuf;

use sage_protocol::{Message, Role};

use crate::tools::ToolSessionContext;

/// Conversation state for one chat, owned by the caller and passed into
/// each turn. Loaded and saved explicitly at turn boundaries.
#[derive(Debug, Clone)]
pub struct SessionContext {
  /// Keys per-session runtime resources such as the sandbox.
  pub runtime_id: String,
  /// Identity in the session store, assigned on first save.
  pub persisted_id: Option<String>,
  pub messages: Vec<Message>,
  /// File the user is working on, referenced from user messages.
  pub current_file: Option<PathBuf>,
}

impl SessionContext {
  pub fn new() -> Self {
    Self {
      runtime_id: uuid::Uuid::new_v4().to_string(),
      persisted_id: None,
      messages: Vec::new(),
      current_file: None,
    }
  }

  /// Resumes a stored session. The stored id doubles as the runtime id so
  /// a resumed chat gets its previous sandbox back.
  pub fn resume(id: impl Into<String>, messages: Vec<Message>) -> Self {
    let id = id.into();
    Self {
      runtime_id: id.clone(),
      persisted_id: Some(id),
      messages,
      current_file: None,
    }
  }

  pub fn with_current_file(mut self, path: Option<PathBuf>) -> Self {
    self.current_file = path;
    self
  }

  pub fn push(&mut self, message: Message) {
    self.messages.push(message);
  }

  pub fn last_is_tool(&self) -> bool {
    self
      .messages
      .last()
      .is_some_and(|message| message.role == Role::Tool)
  }

  /// Context handed to tool handlers for this session.
  pub fn tool_context(&self, cwd: PathBuf) -> ToolSessionContext {
    ToolSessionContext::new(self.runtime_id.clone())
      .with_current_file(self.current_file.clone())
      .with_cwd(cwd)
  }

  /// System prompt followed by the last `window` non-system messages.
  pub fn context_window(&self, system_prompt: &str, window: usize) -> Vec<Message> {
    let history: Vec<&Message> = self
      .messages
      .iter()
      .filter(|message| message.role != Role::System)
      .collect();
    let start = history.len().saturating_sub(window);
    // A tool result cut off from its assistant call is rejected by providers.
    let recent = history[start..]
      .iter()
      .skip_while(|message| message.role == Role::Tool);

    let mut messages = vec![Message::system(system_prompt)];
    messages.extend(recent.map(|message| (*message).clone()));
    messages
  }
}

impl Default for SessionContext {
  fn default() -> Self {
    Self::new()
  }
}
