//! Server-sent event parsing for OpenAI-compatible streams.

use sage_protocol::{StreamDelta, ToolCallFragment};
use serde_json::Value;

/// Parsed stream event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedStreamEvent {
  pub delta: Option<StreamDelta>,
  pub done: bool,
}

/// Stateful SSE parser. Bytes may split events anywhere; complete events
/// end with a blank line.
pub struct StreamingProcessor {
  separator: &'static str,
  buffer: String,
}

impl Default for StreamingProcessor {
  fn default() -> Self {
    Self::new()
  }
}

impl StreamingProcessor {
  pub fn new() -> Self {
    Self {
      separator: "\n\n",
      buffer: String::new(),
    }
  }

  /// Feeds one text segment and returns the events it completed.
  pub fn push_text(&mut self, text: &str) -> Vec<ParsedStreamEvent> {
    self.buffer.push_str(&text.replace("\r\n", "\n"));
    self.drain_events()
  }

  /// Flushes the remaining buffer.
  pub fn finish(&mut self) -> Vec<ParsedStreamEvent> {
    if self.buffer.trim().is_empty() {
      self.buffer.clear();
      return Vec::new();
    }
    let remaining = std::mem::take(&mut self.buffer);
    vec![parse_event(&remaining)]
  }

  fn drain_events(&mut self) -> Vec<ParsedStreamEvent> {
    let mut events = Vec::new();
    while let Some(idx) = self.buffer.find(self.separator) {
      let event = self.buffer[..idx].to_string();
      self.buffer.drain(..idx + self.separator.len());
      events.push(parse_event(&event));
    }
    events
  }
}

fn parse_event(raw: &str) -> ParsedStreamEvent {
  let mut event = ParsedStreamEvent::default();

  for line in raw.lines() {
    let Some(payload) = line.strip_prefix("data:") else {
      continue;
    };
    let payload = payload.trim();

    if payload == "[DONE]" {
      event.done = true;
      continue;
    }

    let Ok(value) = serde_json::from_str::<Value>(payload) else {
      continue;
    };
    if let Some(delta) = parse_delta(&value) {
      match event.delta.as_mut() {
        Some(existing) => merge_delta(existing, delta),
        None => event.delta = Some(delta),
      }
    }
  }

  event
}

fn merge_delta(into: &mut StreamDelta, next: StreamDelta) {
  if let Some(text) = next.content {
    into.content.get_or_insert_default().push_str(&text);
  }
  if let Some(text) = next.reasoning {
    into.reasoning.get_or_insert_default().push_str(&text);
  }
  into.tool_calls.extend(next.tool_calls);
}

/// Reads `choices[0].delta`. Content, reasoning (`reasoning_content` or
/// `reasoning`) and every tool-call entry are kept.
fn parse_delta(value: &Value) -> Option<StreamDelta> {
  let choice = value
    .get("choices")
    .and_then(Value::as_array)
    .and_then(|choices| choices.first())?;
  let delta = choice.get("delta").or_else(|| choice.get("message"))?;

  let text_field = |key: &str| {
    delta
      .get(key)
      .and_then(Value::as_str)
      .filter(|text| !text.is_empty())
      .map(ToString::to_string)
  };

  let tool_calls = delta
    .get("tool_calls")
    .and_then(Value::as_array)
    .map(|calls| {
      calls
        .iter()
        .enumerate()
        .map(|(position, call)| parse_fragment(position, call))
        .collect()
    })
    .unwrap_or_default();

  let parsed = StreamDelta {
    content: text_field("content"),
    reasoning: text_field("reasoning_content").or_else(|| text_field("reasoning")),
    tool_calls,
  };
  (!parsed.is_empty()).then_some(parsed)
}

fn parse_fragment(position: usize, call: &Value) -> ToolCallFragment {
  let index = call
    .get("index")
    .and_then(Value::as_u64)
    .map(|index| index as usize)
    .unwrap_or(position);
  let mut fragment = ToolCallFragment::new(index);

  if let Some(id) = call.get("id").and_then(Value::as_str).filter(|id| !id.is_empty()) {
    fragment = fragment.with_id(id);
  }

  let function = call.get("function").unwrap_or(&Value::Null);
  if let Some(name) = function
    .get("name")
    .and_then(Value::as_str)
    .filter(|name| !name.is_empty())
  {
    fragment = fragment.with_name(name);
  }
  match function.get("arguments") {
    Some(Value::String(piece)) => fragment = fragment.with_arguments(piece.as_str()),
    Some(Value::Null) | None => {}
    Some(structured) => fragment = fragment.with_structured_arguments(structured.clone()),
  }
  fragment
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use sage_protocol::ArgumentPayload;
  use serde_json::json;

  use super::*;

  #[test]
  fn content_event_split_across_pushes() {
    let mut processor = StreamingProcessor::new();
    let raw = "data: {\"choices\":[{\"delta\":{\"content\":\"hello\"},\"finish_reason\":null}]}\n\n";
    assert!(processor.push_text(&raw[..20]).is_empty());
    let events = processor.push_text(&raw[20..]);
    assert_eq!(
      events,
      vec![ParsedStreamEvent {
        delta: Some(StreamDelta::content("hello")),
        done: false,
      }]
    );
  }

  #[test]
  fn reasoning_and_done() {
    let mut processor = StreamingProcessor::new();
    let events = processor.push_text(
      "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hmm\"}}]}\r\n\r\ndata: [DONE]\n\n",
    );
    assert_eq!(events[0].delta, Some(StreamDelta::reasoning("hmm")));
    assert!(events[1].done);
    assert_eq!(events[1].delta, None);
  }

  #[test]
  fn every_tool_call_entry_becomes_a_fragment() {
    let mut processor = StreamingProcessor::new();
    let payload = json!({
      "choices": [{"delta": {"tool_calls": [
        {"index": 0, "id": "call_a", "function": {"name": "list_files", "arguments": "{\"ext"}},
        {"index": 1, "function": {"name": "kb_search", "arguments": {"query": "q"}}}
      ]}}]
    });
    let events = processor.push_text(&format!("data: {payload}\n\n"));
    let delta = events[0].delta.clone().expect("delta");

    assert_eq!(delta.tool_calls.len(), 2);
    assert_eq!(delta.tool_calls[0].id.as_deref(), Some("call_a"));
    assert_eq!(
      delta.tool_calls[0].arguments,
      Some(ArgumentPayload::Text("{\"ext".to_string()))
    );
    assert_eq!(delta.tool_calls[1].index, 1);
    assert_eq!(
      delta.tool_calls[1].arguments,
      Some(ArgumentPayload::Structured(json!({"query": "q"})))
    );
  }

  #[test]
  fn finish_flushes_unterminated_event() {
    let mut processor = StreamingProcessor::new();
    assert!(
      processor
        .push_text("data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
        .is_empty()
    );
    let events = processor.finish();
    assert_eq!(events[0].delta, Some(StreamDelta::content("tail")));
    assert!(processor.finish().is_empty());
  }
}
