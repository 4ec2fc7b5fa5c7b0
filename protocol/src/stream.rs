use serde::{Deserialize, Serialize};

/// One incremental piece of a streamed completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamDelta {
  /// Answer text, possibly carrying inline thought tags.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,

  /// Text from a dedicated reasoning field.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reasoning: Option<String>,

  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tool_calls: Vec<ToolCallFragment>,
}

impl StreamDelta {
  pub fn content(text: impl Into<String>) -> Self {
    Self {
      content: Some(text.into()),
      ..Default::default()
    }
  }

  pub fn reasoning(text: impl Into<String>) -> Self {
    Self {
      reasoning: Some(text.into()),
      ..Default::default()
    }
  }

  pub fn tool_call(fragment: ToolCallFragment) -> Self {
    Self {
      tool_calls: vec![fragment],
      ..Default::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    self.content.as_deref().is_none_or(str::is_empty)
      && self.reasoning.as_deref().is_none_or(str::is_empty)
      && self.tool_calls.is_empty()
  }
}

/// Partial tool call addressed by its position in the assistant's call list.
/// Pieces for the same index are concatenated in arrival order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallFragment {
  pub index: usize,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub arguments: Option<ArgumentPayload>,
}

impl ToolCallFragment {
  pub fn new(index: usize) -> Self {
    Self {
      index,
      ..Default::default()
    }
  }

  pub fn with_id(mut self, id: impl Into<String>) -> Self {
    self.id = Some(id.into());
    self
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
    self.arguments = Some(ArgumentPayload::Text(arguments.into()));
    self
  }

  pub fn with_structured_arguments(mut self, arguments: serde_json::Value) -> Self {
    self.arguments = Some(ArgumentPayload::Structured(arguments));
    self
  }
}

/// Tool arguments as delivered by a provider: either a (possibly partial)
/// JSON string, or an already decoded object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ArgumentPayload {
  Text(String),
  Structured(serde_json::Value),
}

impl ArgumentPayload {
  /// Merges a later piece into this one. Text pieces concatenate; a
  /// structured payload replaces whatever came before.
  pub fn merge(&mut self, next: ArgumentPayload) {
    match (self, next) {
      (ArgumentPayload::Text(current), ArgumentPayload::Text(piece)) => current.push_str(&piece),
      (slot, next) => *slot = next,
    }
  }

  /// JSON string encoding; empty input becomes `{}`.
  pub fn into_encoded(self) -> String {
    match self {
      ArgumentPayload::Text(text) if text.trim().is_empty() => "{}".to_string(),
      ArgumentPayload::Text(text) => text,
      ArgumentPayload::Structured(serde_json::Value::Null) => "{}".to_string(),
      ArgumentPayload::Structured(value) => value.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn text_pieces_concatenate() {
    let mut payload = ArgumentPayload::Text("{\"qu".to_string());
    payload.merge(ArgumentPayload::Text("ery\":1}".to_string()));
    assert_eq!(payload.into_encoded(), "{\"query\":1}");
  }

  #[test]
  fn structured_payload_is_encoded() {
    let payload = ArgumentPayload::Structured(serde_json::json!({ "code": "print(1)" }));
    assert_eq!(payload.into_encoded(), r#"{"code":"print(1)"}"#);
  }

  #[test]
  fn blank_arguments_default_to_empty_object() {
    assert_eq!(ArgumentPayload::Text("  ".to_string()).into_encoded(), "{}");
    assert_eq!(
      ArgumentPayload::Structured(serde_json::Value::Null).into_encoded(),
      "{}"
    );
  }

  #[test]
  fn empty_delta_detection() {
    assert!(StreamDelta::content("").is_empty());
    assert!(!StreamDelta::reasoning("hmm").is_empty());
    assert!(!StreamDelta::tool_call(ToolCallFragment::new(0)).is_empty());
  }
}
