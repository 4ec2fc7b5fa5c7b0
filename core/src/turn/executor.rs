// Turn Executor
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use sage_config::Config;
use sage_protocol::{
  ErrorEvent, EventMsg, FinalizingEvent, Message, PlanGeneratedEvent, StepStartedEvent,
  TextDeltaEvent, THINK_CLOSE, THINK_OPEN, ToolCall, ToolCallBeginEvent, ToolCallEndEvent,
  TurnCompletedEvent, TurnStartedEvent,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::model::{ChatRequest, ModelClient, ModelError};
use crate::session::SessionContext;
use crate::stream_parser::{FragmentKind, StreamParser};

use super::dispatch::ToolDispatcher;
use super::planning::{PlanningConfig, generate_plan, inject_plan};
use super::tool_calls::ToolCallAccumulator;

/// Per-turn loop settings.
#[derive(Debug, Clone)]
pub struct TurnConfig {
  pub system_prompt: String,
  pub temperature: f32,
  /// Streaming iterations allowed before forced finalization.
  pub max_steps: usize,
  pub history_window: usize,
  /// Set when plan-and-solve is enabled and a template exists.
  pub planning: Option<PlanningConfig>,
  /// Directory tool paths are resolved against.
  pub cwd: PathBuf,
}

impl TurnConfig {
  pub fn from_config(config: &Config, cwd: PathBuf) -> Self {
    let agent = &config.agent;
    let planning = (config.features.plan_solve && !agent.planning_template.trim().is_empty())
      .then(|| PlanningConfig {
        template: agent.planning_template.clone(),
        temperature: agent.planning_temperature,
      });
    Self {
      system_prompt: agent.system_prompt.clone(),
      temperature: agent.temperature,
      max_steps: agent.max_tool_steps,
      history_window: agent.history_window,
      planning,
      cwd,
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
  #[error("model error: {0}")]
  Model(#[from] ModelError),

  #[error("event receiver dropped")]
  EventChannelClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
  /// Final answer text, without the thought segment.
  pub content: String,
  pub thought: Option<String>,
  /// Streaming iterations used, not counting finalization.
  pub steps: usize,
  /// Whether the step budget ran out and a summary call was made.
  pub finalized: bool,
}

/// Output of one streamed model call.
struct StepOutput {
  answer: String,
  thought: String,
  calls: Vec<ToolCall>,
}

impl StepOutput {
  /// Assistant text as stored in history, thought re-wrapped in tags.
  fn persisted_content(&self) -> String {
    if self.thought.is_empty() {
      self.answer.clone()
    } else {
      format!("{THINK_OPEN}{}{THINK_CLOSE}\n{}", self.thought, self.answer)
    }
  }

  fn into_result(self, steps: usize, finalized: bool) -> TurnResult {
    TurnResult {
      content: self.answer,
      thought: (!self.thought.is_empty()).then_some(self.thought),
      steps,
      finalized,
    }
  }
}

pub fn finalize_instruction(max_steps: usize) -> String {
  format!(
    "System Alert: The maximum tool execution limit ({max_steps}) has been reached. Please STOP using tools immediately. Based on the information you have gathered so far, provide a final summary or answer to my original request."
  )
}

/// Drives one user turn: optional planning, then streamed model calls
/// alternating with sequential tool dispatch until a plain answer arrives
/// or the step budget runs out.
pub struct TurnExecutor {
  model_client: Arc<ModelClient>,
  dispatcher: Arc<ToolDispatcher>,
  tx_event: mpsc::Sender<EventMsg>,
  config: TurnConfig,
}

impl TurnExecutor {
  pub fn new(
    model_client: Arc<ModelClient>,
    dispatcher: Arc<ToolDispatcher>,
    tx_event: mpsc::Sender<EventMsg>,
    config: TurnConfig,
  ) -> Self {
    Self {
      model_client,
      dispatcher,
      tx_event,
      config,
    }
  }

  pub async fn run_turn(
    &self,
    session: &mut SessionContext,
    prompt: &str,
  ) -> Result<TurnResult, TurnError> {
    let turn_id = uuid::Uuid::new_v4().to_string();
    let context_file = session
      .current_file
      .as_ref()
      .map(|path| path.display().to_string());
    session.push(Message::user_with_context_file(prompt, context_file.as_deref()));

    info!(session_id = %session.runtime_id, turn_id = %turn_id, "turn started");
    self
      .send_event(EventMsg::TurnStarted(TurnStartedEvent {
        turn_id: turn_id.clone(),
        session_id: session.runtime_id.clone(),
      }))
      .await?;

    let system_prompt = self.system_prompt(&turn_id, prompt).await?;
    let tool_context = session.tool_context(self.config.cwd.clone());
    let max_steps = self.config.max_steps;

    let mut steps = 0;
    while steps < max_steps {
      steps += 1;
      debug!(turn_id = %turn_id, step = steps, "streaming step");
      self
        .send_event(EventMsg::StepStarted(StepStartedEvent {
          turn_id: turn_id.clone(),
          step: steps,
          max_steps,
        }))
        .await?;

      let request = ChatRequest::new(session.context_window(&system_prompt, self.config.history_window))
        .with_tools(self.dispatcher.offered_tools().await)
        .with_temperature(self.config.temperature);
      let output = self.stream_step(&turn_id, request).await?;

      if output.calls.is_empty() {
        session.push(Message::assistant(output.persisted_content()));
        let result = output.into_result(steps, false);
        self.complete(&turn_id, &result).await?;
        return Ok(result);
      }

      session.push(Message::assistant_with_tools(
        output.persisted_content(),
        output.calls.clone(),
      ));
      for call in &output.calls {
        self
          .send_event(EventMsg::ToolCallBegin(ToolCallBeginEvent {
            turn_id: turn_id.clone(),
            call_id: call.id.clone(),
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
          }))
          .await?;

        let result = self.dispatcher.dispatch(call, &tool_context).await;
        info!(
          session_id = %session.runtime_id,
          tool = %call.function.name,
          step = steps,
          is_error = result.is_error,
          "tool call finished"
        );

        self
          .send_event(EventMsg::ToolCallEnd(ToolCallEndEvent {
            turn_id: turn_id.clone(),
            call_id: call.id.clone(),
            name: call.function.name.clone(),
            output: result.content.clone(),
            is_error: result.is_error,
            artifacts: result
              .artifacts
              .iter()
              .map(|path| path.display().to_string())
              .collect(),
          }))
          .await?;
        session.push(Message::tool(&call.id, &call.function.name, result.content));
      }
    }

    if !session.last_is_tool() {
      let result = TurnResult {
        content: String::new(),
        thought: None,
        steps,
        finalized: false,
      };
      self.complete(&turn_id, &result).await?;
      return Ok(result);
    }

    warn!(session_id = %session.runtime_id, max_steps, "step budget exhausted, finalizing");
    self
      .send_event(EventMsg::Finalizing(FinalizingEvent {
        turn_id: turn_id.clone(),
        max_steps,
      }))
      .await?;

    // The instruction only goes to the model, never into history.
    let mut messages = session.context_window(&system_prompt, self.config.history_window);
    messages.push(Message::user(finalize_instruction(max_steps)));
    let request = ChatRequest::new(messages).with_temperature(self.config.temperature);
    let output = self.stream_step(&turn_id, request).await?;

    session.push(Message::assistant(output.persisted_content()));
    let result = output.into_result(steps, true);
    self.complete(&turn_id, &result).await?;
    Ok(result)
  }

  async fn system_prompt(&self, turn_id: &str, prompt: &str) -> Result<String, TurnError> {
    let base = self.config.system_prompt.clone();
    let Some(planning) = &self.config.planning else {
      return Ok(base);
    };
    let Some(plan) = generate_plan(&self.model_client, planning, prompt).await else {
      return Ok(base);
    };

    self
      .send_event(EventMsg::PlanGenerated(PlanGeneratedEvent {
        turn_id: turn_id.to_string(),
        plan: plan.clone(),
      }))
      .await?;
    Ok(inject_plan(&base, &plan))
  }

  /// Streams one model call. A model failure is reported as an error event
  /// and ends the turn.
  async fn stream_step(&self, turn_id: &str, request: ChatRequest) -> Result<StepOutput, TurnError> {
    match self.try_stream_step(turn_id, request).await {
      Err(TurnError::Model(e)) => {
        warn!(turn_id, error = %e, "model stream failed");
        self
          .send_event(EventMsg::Error(ErrorEvent {
            turn_id: turn_id.to_string(),
            message: e.to_string(),
          }))
          .await?;
        Err(TurnError::Model(e))
      }
      other => other,
    }
  }

  async fn try_stream_step(
    &self,
    turn_id: &str,
    request: ChatRequest,
  ) -> Result<StepOutput, TurnError> {
    let mut stream = self.model_client.chat_stream(request).await?;
    let mut parser = StreamParser::new();
    let mut calls = ToolCallAccumulator::new();
    let mut answer = String::new();

    while let Some(delta) = stream.next().await {
      let delta = delta?;
      for fragment in parser.parse(&delta) {
        self.emit_fragment(turn_id, fragment.kind, fragment.text, &mut answer).await?;
      }
      for fragment in delta.tool_calls {
        calls.push(fragment);
      }
    }
    if let Some(fragment) = parser.finish() {
      self.emit_fragment(turn_id, fragment.kind, fragment.text, &mut answer).await?;
    }

    Ok(StepOutput {
      answer,
      thought: parser.thought_content().to_string(),
      calls: calls.finish(),
    })
  }

  async fn emit_fragment(
    &self,
    turn_id: &str,
    kind: FragmentKind,
    text: String,
    answer: &mut String,
  ) -> Result<(), TurnError> {
    if text.is_empty() {
      return Ok(());
    }
    let event = TextDeltaEvent {
      turn_id: turn_id.to_string(),
      delta: text,
    };
    match kind {
      FragmentKind::Thought => self.send_event(EventMsg::ThoughtDelta(event)).await,
      FragmentKind::Answer => {
        answer.push_str(&event.delta);
        self.send_event(EventMsg::AnswerDelta(event)).await
      }
    }
  }

  async fn complete(&self, turn_id: &str, result: &TurnResult) -> Result<(), TurnError> {
    info!(turn_id, steps = result.steps, finalized = result.finalized, "turn completed");
    self
      .send_event(EventMsg::TurnCompleted(TurnCompletedEvent {
        turn_id: turn_id.to_string(),
        content: result.content.clone(),
        steps: result.steps,
        finalized: result.finalized,
      }))
      .await
  }

  async fn send_event(&self, event: EventMsg) -> Result<(), TurnError> {
    self
      .tx_event
      .send(event)
      .await
      .map_err(|_| TurnError::EventChannelClosed)
  }
}
