// Tool Call Assembly
use std::collections::BTreeMap;

use sage_protocol::{ArgumentPayload, ToolCall, ToolCallFragment};

#[derive(Debug, Default)]
struct PendingCall {
  id: String,
  name: String,
  arguments: Option<ArgumentPayload>,
}

/// Reassembles tool calls streamed piecewise, keyed by positional index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
  pending: BTreeMap<usize, PendingCall>,
}

impl ToolCallAccumulator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, fragment: ToolCallFragment) {
    let call = self.pending.entry(fragment.index).or_default();
    if let Some(id) = fragment.id {
      call.id.push_str(&id);
    }
    if let Some(name) = fragment.name {
      call.name.push_str(&name);
    }
    if let Some(piece) = fragment.arguments {
      match call.arguments.as_mut() {
        Some(arguments) => arguments.merge(piece),
        None => call.arguments = Some(piece),
      }
    }
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty()
  }

  /// Normalized calls in index order: missing ids are generated and
  /// missing arguments become `{}`.
  pub fn finish(self) -> Vec<ToolCall> {
    self
      .pending
      .into_values()
      .map(|call| {
        let id = if call.id.is_empty() {
          ToolCall::generated_id()
        } else {
          call.id
        };
        let arguments = call
          .arguments
          .map_or_else(|| "{}".to_string(), ArgumentPayload::into_encoded);
        ToolCall::new(id, call.name, arguments)
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use super::*;

  #[test]
  fn character_stream_is_reassembled() {
    let mut acc = ToolCallAccumulator::new();
    acc.push(ToolCallFragment::new(0).with_id("call_").with_name("list"));
    acc.push(ToolCallFragment::new(0).with_id("9").with_name("_files"));
    for piece in ["{\"ext", "ension\"", ": \"csv\"}"] {
      acc.push(ToolCallFragment::new(0).with_arguments(piece));
    }

    assert_eq!(
      acc.finish(),
      vec![ToolCall::new("call_9", "list_files", r#"{"extension": "csv"}"#)]
    );
  }

  #[test]
  fn interleaved_indices_stay_separate_and_ordered() {
    let mut acc = ToolCallAccumulator::new();
    acc.push(ToolCallFragment::new(1).with_id("b").with_name("excel_read"));
    acc.push(ToolCallFragment::new(0).with_id("a").with_name("list_files"));
    acc.push(ToolCallFragment::new(1).with_structured_arguments(json!({"file_path": "x.xlsx"})));

    let calls = acc.finish();
    assert_eq!(calls[0], ToolCall::new("a", "list_files", "{}"));
    assert_eq!(calls[1], ToolCall::new("b", "excel_read", r#"{"file_path":"x.xlsx"}"#));
  }

  #[test]
  fn missing_id_is_generated() {
    let mut acc = ToolCallAccumulator::new();
    assert!(acc.is_empty());
    acc.push(ToolCallFragment::new(0).with_name("kb_search").with_arguments(""));
    let calls = acc.finish();
    assert!(calls[0].id.starts_with("call_"));
    assert_eq!(calls[0].function.arguments, "{}");
  }
}
