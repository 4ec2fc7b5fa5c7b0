// Sage Events
// Events emitted while a turn runs, in emission order

use serde::{Deserialize, Serialize};

/// Events emitted during a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EventMsg {
  /// Turn accepted and user message recorded.
  TurnStarted(TurnStartedEvent),
  /// Planning produced an approved plan.
  PlanGenerated(PlanGeneratedEvent),
  /// A streaming iteration began.
  StepStarted(StepStartedEvent),
  /// Reasoning text fragment.
  ThoughtDelta(TextDeltaEvent),
  /// Answer text fragment.
  AnswerDelta(TextDeltaEvent),
  /// Tool dispatch about to run.
  ToolCallBegin(ToolCallBeginEvent),
  /// Tool dispatch finished (successfully or with a textual failure).
  ToolCallEnd(ToolCallEndEvent),
  /// Step budget exhausted; a tools-disabled summary call follows.
  Finalizing(FinalizingEvent),
  /// User-visible error banner.
  Error(ErrorEvent),
  /// Turn finished.
  TurnCompleted(TurnCompletedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnStartedEvent {
  pub turn_id: String,
  pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanGeneratedEvent {
  pub turn_id: String,
  pub plan: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepStartedEvent {
  pub turn_id: String,
  pub step: usize,
  pub max_steps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextDeltaEvent {
  pub turn_id: String,
  pub delta: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallBeginEvent {
  pub turn_id: String,
  pub call_id: String,
  pub name: String,
  pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallEndEvent {
  pub turn_id: String,
  pub call_id: String,
  pub name: String,
  pub output: String,
  pub is_error: bool,
  #[serde(default)]
  pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinalizingEvent {
  pub turn_id: String,
  pub max_steps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEvent {
  pub turn_id: String,
  pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnCompletedEvent {
  pub turn_id: String,
  pub content: String,
  pub steps: usize,
  pub finalized: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tool_call_end_roundtrip_keeps_artifacts() {
    let event = EventMsg::ToolCallEnd(ToolCallEndEvent {
      turn_id: "t1".to_string(),
      call_id: "call_1".to_string(),
      name: "python_interpreter".to_string(),
      output: "Output:\n42".to_string(),
      is_error: false,
      artifacts: vec!["uploads/outputs/sandbox_x/plot_1.png".to_string()],
    });

    let json = serde_json::to_string(&event).expect("serialize event");
    let parsed: EventMsg = serde_json::from_str(&json).expect("deserialize event");
    assert_eq!(parsed, event);
  }
}
