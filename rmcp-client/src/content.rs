//! Flattening of MCP result content into plain text for the model.

use serde_json::Value;

/// Text blocks verbatim, binary blocks as short placeholders, anything
/// unrecognized as its JSON encoding. Blocks are joined by newlines.
pub fn flatten_content(blocks: &[Value]) -> String {
  blocks
    .iter()
    .map(flatten_block)
    .collect::<Vec<_>>()
    .join("\n")
}

fn flatten_block(block: &Value) -> String {
  let field = |key: &str| block.get(key).and_then(Value::as_str);
  match field("type") {
    Some("text") => field("text").unwrap_or_default().to_string(),
    Some("image") => format!("[Image Data: {}]", field("mimeType").unwrap_or("unknown")),
    Some("audio") => format!("[Audio Data: {}]", field("mimeType").unwrap_or("unknown")),
    Some("resource") => {
      let uri = block
        .get("resource")
        .and_then(|resource| resource.get("uri"))
        .and_then(Value::as_str)
        .unwrap_or_default();
      format!("[Resource: {uri}]")
    }
    Some("resource_link") => format!("[Resource: {}]", field("uri").unwrap_or_default()),
    _ => block.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use super::*;

  #[test]
  fn mixed_blocks_flatten_in_order() {
    let blocks = vec![
      json!({"type": "text", "text": "3 files"}),
      json!({"type": "image", "data": "aGk=", "mimeType": "image/png"}),
      json!({"type": "resource", "resource": {"uri": "file:///tmp/a.txt", "text": "hi"}}),
      json!({"type": "resource_link", "uri": "file:///tmp/b.txt", "name": "b"}),
    ];

    assert_eq!(
      flatten_content(&blocks),
      "3 files\n[Image Data: image/png]\n[Resource: file:///tmp/a.txt]\n[Resource: file:///tmp/b.txt]"
    );
  }

  #[test]
  fn unknown_block_is_json() {
    let blocks = vec![json!({"type": "widget", "size": 3})];
    assert_eq!(flatten_content(&blocks), r#"{"size":3,"type":"widget"}"#);
  }

  #[test]
  fn empty_result_is_empty_text() {
    assert_eq!(flatten_content(&[]), "");
  }
}
