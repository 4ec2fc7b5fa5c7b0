//! Splits streamed model output into thought and answer text.
//!
//! Thought text arrives either through a dedicated reasoning field or inline,
//! wrapped in one of the recognized tag pairs (`<think>…</think>`,
//! `[thought]…[/thought]`, matched case-insensitively). Tags may be split
//! across deltas at any character, so a tail that could still grow into a
//! tag is held back until the next delta decides it.

use std::sync::LazyLock;

use regex::Regex;
use sage_protocol::StreamDelta;

struct TagPair {
  start: &'static str,
  end: &'static str,
}

const TAG_PAIRS: &[TagPair] = &[
  TagPair {
    start: "<think>",
    end: "</think>",
  },
  TagPair {
    start: "[thought]",
    end: "[/thought]",
  },
];

#[allow(clippy::expect_used)]
static STATIC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
  [r"(?is)<think>(.*?)</think>", r"(?is)\[thought\](.*?)\[/thought\]"]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("thought pattern compiles"))
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
  Thought,
  Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFragment {
  pub kind: FragmentKind,
  pub text: String,
}

impl ParsedFragment {
  pub fn thought(text: impl Into<String>) -> Self {
    Self {
      kind: FragmentKind::Thought,
      text: text.into(),
    }
  }

  pub fn answer(text: impl Into<String>) -> Self {
    Self {
      kind: FragmentKind::Answer,
      text: text.into(),
    }
  }
}

#[derive(Debug, Default)]
pub struct StreamParser {
  in_thought: bool,
  buffer: String,
  thought_content: String,
}

impl StreamParser {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every fragment classified as thought so far, in order.
  pub fn thought_content(&self) -> &str {
    &self.thought_content
  }

  pub fn in_thought(&self) -> bool {
    self.in_thought
  }

  /// Classifies one delta. Fragments come back in stream order; text both
  /// before a start tag and after an end tag in the same delta is kept.
  pub fn parse(&mut self, delta: &StreamDelta) -> Vec<ParsedFragment> {
    if let Some(reasoning) = delta.reasoning.as_deref().filter(|text| !text.is_empty()) {
      self.thought_content.push_str(reasoning);
      return vec![ParsedFragment::thought(reasoning)];
    }

    match delta.content.as_deref() {
      Some(text) if !text.is_empty() => self.scan(text),
      _ => Vec::new(),
    }
  }

  /// Releases text held back as a possible tag prefix. Call once the stream
  /// has ended.
  pub fn finish(&mut self) -> Option<ParsedFragment> {
    if self.buffer.is_empty() {
      return None;
    }
    let rest = std::mem::take(&mut self.buffer);
    Some(self.classify(rest))
  }

  fn scan(&mut self, text: &str) -> Vec<ParsedFragment> {
    let mut pending = std::mem::take(&mut self.buffer);
    pending.push_str(text);

    let mut fragments = Vec::new();
    while !pending.is_empty() {
      let tags = self.active_tags();
      if let Some((pos, len)) = find_earliest_tag(&pending, &tags) {
        let rest = pending.split_off(pos);
        if !pending.is_empty() {
          fragments.push(self.classify(pending));
        }
        self.in_thought = !self.in_thought;
        pending = rest[len..].to_string();
        continue;
      }

      let held = partial_tag_len(&pending, &tags);
      let held_text = pending.split_off(pending.len() - held);
      if !pending.is_empty() {
        fragments.push(self.classify(pending));
      }
      self.buffer = held_text;
      break;
    }
    fragments
  }

  fn active_tags(&self) -> Vec<&'static str> {
    TAG_PAIRS
      .iter()
      .map(|pair| if self.in_thought { pair.end } else { pair.start })
      .collect()
  }

  fn classify(&mut self, text: String) -> ParsedFragment {
    if self.in_thought {
      self.thought_content.push_str(&text);
      ParsedFragment::thought(text)
    } else {
      ParsedFragment::answer(text)
    }
  }
}

/// Byte offset and length of the first complete tag in `text`.
fn find_earliest_tag(text: &str, tags: &[&str]) -> Option<(usize, usize)> {
  // ASCII lowering keeps byte offsets stable.
  let lowered = text.to_ascii_lowercase();
  tags
    .iter()
    .filter_map(|tag| lowered.find(tag).map(|pos| (pos, tag.len())))
    .min_by_key(|(pos, _)| *pos)
}

/// Length of the longest suffix of `text` that is a strict prefix of a tag.
fn partial_tag_len(text: &str, tags: &[&str]) -> usize {
  let lowered = text.to_ascii_lowercase();
  tags
    .iter()
    .filter_map(|tag| {
      (1..tag.len())
        .rev()
        .find(|&len| lowered.ends_with(&tag[..len]))
    })
    .max()
    .unwrap_or(0)
}

/// Extracts thought text from a complete message. Returns the trimmed
/// interior of the first matching tag pair and the trimmed text with every
/// such block removed; without a match the input is returned unchanged.
pub fn extract_thought(text: &str) -> (Option<String>, String) {
  for pattern in STATIC_PATTERNS.iter() {
    if let Some(captures) = pattern.captures(text) {
      let thought = captures
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
      let content = pattern.replace_all(text, "").trim().to_string();
      return (Some(thought), content);
    }
  }
  (None, text.to_string())
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn feed(parser: &mut StreamParser, chunks: &[&str]) -> (String, String) {
    let mut thought = String::new();
    let mut answer = String::new();
    let mut fragments = Vec::new();
    for chunk in chunks {
      fragments.extend(parser.parse(&StreamDelta::content(*chunk)));
    }
    fragments.extend(parser.finish());
    for fragment in fragments {
      match fragment.kind {
        FragmentKind::Thought => thought.push_str(&fragment.text),
        FragmentKind::Answer => answer.push_str(&fragment.text),
      }
    }
    (thought, answer)
  }

  #[test]
  fn reasoning_field_is_thought_without_scanning() {
    let mut parser = StreamParser::new();
    let fragments = parser.parse(&StreamDelta::reasoning("<think>raw"));
    assert_eq!(fragments, vec![ParsedFragment::thought("<think>raw")]);
    assert_eq!(parser.thought_content(), "<think>raw");
    assert!(!parser.in_thought());
  }

  #[test]
  fn tags_split_at_every_boundary_reassemble() {
    let input = "<think>weigh options</think>The answer is 4.";
    for first in 1..input.len() {
      for second in first + 1..input.len() {
        let chunks = [&input[..first], &input[first..second], &input[second..]];
        let mut parser = StreamParser::new();
        let (thought, answer) = feed(&mut parser, &chunks);
        assert_eq!(thought, "weigh options", "split at {first}/{second}");
        assert_eq!(answer, "The answer is 4.", "split at {first}/{second}");
        assert_eq!(parser.thought_content(), "weigh options");
      }
    }
  }

  #[test]
  fn text_around_tags_in_one_delta_keeps_order() {
    let mut parser = StreamParser::new();
    let fragments = parser.parse(&StreamDelta::content("Hi <THINK>plan</Think> done"));
    assert_eq!(
      fragments,
      vec![
        ParsedFragment::answer("Hi "),
        ParsedFragment::thought("plan"),
        ParsedFragment::answer(" done"),
      ]
    );
  }

  #[test]
  fn bracket_tags_are_recognized() {
    let mut parser = StreamParser::new();
    let (thought, answer) = feed(&mut parser, &["[THOUGHT]", "check", "[/thou", "ght]ok"]);
    assert_eq!(thought, "check");
    assert_eq!(answer, "ok");
  }

  #[test]
  fn partial_prefix_is_withheld_then_released() {
    let mut parser = StreamParser::new();
    assert_eq!(
      parser.parse(&StreamDelta::content("a <th")),
      vec![ParsedFragment::answer("a ")]
    );
    assert_eq!(
      parser.parse(&StreamDelta::content("ree")),
      vec![ParsedFragment::answer("<three")]
    );
  }

  #[test]
  fn unterminated_prefix_flushes_on_finish() {
    let mut parser = StreamParser::new();
    assert!(parser.parse(&StreamDelta::content("<")).is_empty());
    assert_eq!(parser.finish(), Some(ParsedFragment::answer("<")));
    assert_eq!(parser.finish(), None);
  }

  #[test]
  fn multibyte_text_is_safe() {
    let mut parser = StreamParser::new();
    let (thought, answer) = feed(&mut parser, &["<think>思考", "中</thi", "nk>答案。"]);
    assert_eq!(thought, "思考中");
    assert_eq!(answer, "答案。");
  }

  #[test]
  fn static_extraction_strips_first_pair() {
    let (thought, content) = extract_thought("<think>\n step one \n</think>\nFinal answer");
    assert_eq!(thought.as_deref(), Some("step one"));
    assert_eq!(content, "Final answer");

    let (thought, content) = extract_thought("[THOUGHT]why[/THOUGHT] result");
    assert_eq!(thought.as_deref(), Some("why"));
    assert_eq!(content, "result");
  }

  #[test]
  fn static_extraction_is_idempotent() {
    let (_, content) = extract_thought("<think>a</think>b <think>c</think>");
    assert_eq!(content, "b");
    assert_eq!(extract_thought(&content), (None, "b".to_string()));
  }
}
