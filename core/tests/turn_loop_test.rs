use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use sage_config::Config;
use sage_core::model::{
  ChatRequest, ChatResponse, DeltaStream, ListModelsResponse, ModelClient, ModelError,
  ModelProvider,
};
use sage_core::{Sage, SessionContext};
use sage_protocol::{EventMsg, Message, Role, StreamDelta, ToolCallFragment};

/// Streams one scripted response per call and records every request.
struct ScriptedProvider {
  scripts: Mutex<VecDeque<Vec<StreamDelta>>>,
  /// Replayed for every call once the scripts run out.
  repeat: Option<Vec<StreamDelta>>,
  requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
  fn new(scripts: Vec<Vec<StreamDelta>>) -> Self {
    Self {
      scripts: Mutex::new(scripts.into()),
      repeat: None,
      requests: Mutex::new(Vec::new()),
    }
  }

  fn requests(&self) -> Vec<ChatRequest> {
    self.requests.lock().expect("requests").clone()
  }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
  fn provider_id(&self) -> &str {
    "scripted"
  }

  async fn chat_completion(&self, _request: ChatRequest) -> sage_core::model::Result<ChatResponse> {
    Err(ModelError::InvalidRequest(
      "chat_completion is unused in this test provider".to_string(),
    ))
  }

  async fn chat_completion_stream(&self, request: ChatRequest) -> sage_core::model::Result<DeltaStream> {
    let tools_offered = request.tools.is_some();
    self.requests.lock().expect("requests").push(request);

    let next = self.scripts.lock().expect("scripts").pop_front();
    let script = match (next, &self.repeat) {
      (Some(script), _) => script,
      (None, Some(repeat)) if tools_offered => repeat.clone(),
      (None, _) => vec![StreamDelta::content("Summary: the files were listed.")],
    };
    Ok(Box::pin(futures::stream::iter(script.into_iter().map(Ok))))
  }

  async fn list_models(&self) -> sage_core::model::Result<ListModelsResponse> {
    Ok(ListModelsResponse { data: Vec::new() })
  }
}

fn list_files_call(id: &str) -> Vec<StreamDelta> {
  vec![
    StreamDelta::tool_call(ToolCallFragment::new(0).with_id(id).with_name("list_")),
    StreamDelta::tool_call(ToolCallFragment::new(0).with_name("files").with_arguments("{")),
    StreamDelta::tool_call(ToolCallFragment::new(0).with_arguments("}")),
  ]
}

struct Fixture {
  _dir: tempfile::TempDir,
  provider: Arc<ScriptedProvider>,
  sage: Sage,
}

fn fixture(provider: ScriptedProvider, max_steps: usize) -> Fixture {
  let dir = tempfile::tempdir().expect("tempdir");
  let uploads = dir.path().join("uploads");
  std::fs::create_dir_all(&uploads).expect("mkdir uploads");
  std::fs::write(uploads.join("a.txt"), "a").expect("write a");
  std::fs::write(uploads.join("b.txt"), "b").expect("write b");

  let mut config = Config::default();
  config.agent.max_tool_steps = max_steps;

  let provider = Arc::new(provider);
  let client = Arc::new(ModelClient::new(provider.clone(), "qwen2.5:7b", 0.3));
  let sage = Sage::new_with_model_client(config, client, dir.path().to_path_buf());
  Fixture {
    _dir: dir,
    provider,
    sage,
  }
}

fn events() -> (mpsc::Sender<EventMsg>, mpsc::Receiver<EventMsg>) {
  mpsc::channel(256)
}

#[tokio::test]
async fn list_files_end_to_end() {
  let f = fixture(
    ScriptedProvider::new(vec![
      list_files_call("call_ls"),
      vec![
        StreamDelta::content("Here are your files: "),
        StreamDelta::content("a.txt, b.txt"),
      ],
    ]),
    2,
  );
  let (tx, _rx) = events();
  let mut session = SessionContext::new();

  let result = f
    .sage
    .run_turn(&mut session, "list files", tx)
    .await
    .expect("turn");

  assert_eq!(result.content, "Here are your files: a.txt, b.txt");
  assert_eq!(result.steps, 2);
  assert!(!result.finalized);
  assert_eq!(f.provider.requests().len(), 2);

  let id = session.persisted_id.clone().expect("session saved");
  let stored = f.sage.store().load(&id).await.expect("load");
  assert_eq!(stored, session.messages);
  assert_eq!(
    stored[2],
    Message::tool("call_ls", "list_files", "a.txt, b.txt")
  );
  assert_eq!(
    stored.last(),
    Some(&Message::assistant("Here are your files: a.txt, b.txt"))
  );
  assert!(id.ends_with("_list_files"));
}

#[tokio::test]
async fn exhausted_budget_forces_one_tool_free_summary() {
  let mut provider = ScriptedProvider::new(Vec::new());
  provider.repeat = Some(list_files_call("call_again"));
  let f = fixture(provider, 1);
  let (tx, mut rx) = events();
  let mut session = SessionContext::new();

  let result = f
    .sage
    .run_turn(&mut session, "list files", tx)
    .await
    .expect("turn");

  assert!(result.finalized);
  assert_eq!(result.steps, 1);
  assert_eq!(result.content, "Summary: the files were listed.");

  let requests = f.provider.requests();
  assert_eq!(requests.len(), 2);
  assert!(requests[0].tools.is_some());
  assert!(requests[1].tools.is_none());
  let instruction = requests[1].messages.last().expect("instruction");
  assert_eq!(instruction.role, Role::User);
  assert!(instruction.text().starts_with("System Alert: The maximum tool execution limit (1)"));

  let stored = f
    .sage
    .store()
    .load(session.persisted_id.as_deref().expect("saved"))
    .await
    .expect("load");
  let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
  assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
  assert!(!stored.iter().any(|m| m.text().contains("System Alert")));

  let mut saw_finalizing = false;
  while let Ok(event) = rx.try_recv() {
    saw_finalizing |= matches!(event, EventMsg::Finalizing(_));
  }
  assert!(saw_finalizing);
}

#[tokio::test]
async fn unknown_tool_is_reported_and_loop_continues() {
  let f = fixture(
    ScriptedProvider::new(vec![
      vec![StreamDelta::tool_call(
        ToolCallFragment::new(0)
          .with_id("call_x")
          .with_name("send_email")
          .with_arguments(r#"{"to": "a@b.c"}"#),
      )],
      vec![StreamDelta::content("I cannot send email.")],
    ]),
    5,
  );
  let (tx, _rx) = events();
  let mut session = SessionContext::new();

  let result = f
    .sage
    .run_turn(&mut session, "email the report", tx)
    .await
    .expect("turn");

  assert_eq!(result.content, "I cannot send email.");
  let tool_message = &session.messages[2];
  assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_x"));
  assert!(
    tool_message
      .text()
      .starts_with("Error: Tool 'send_email' not found. Available tools: ["),
    "{}",
    tool_message.text()
  );
}

#[tokio::test]
async fn second_turn_appends_to_the_same_session_file() {
  let f = fixture(
    ScriptedProvider::new(vec![
      vec![StreamDelta::content("Hi!")],
      vec![StreamDelta::content("Still here.")],
    ]),
    5,
  );
  let mut session = SessionContext::new();
  let (tx, _rx) = events();
  f.sage.run_turn(&mut session, "hello", tx.clone()).await.expect("turn 1");
  let first_id = session.persisted_id.clone();
  f.sage.run_turn(&mut session, "again", tx).await.expect("turn 2");

  assert_eq!(session.persisted_id, first_id);
  let sessions = f.sage.store().list().await.expect("list");
  assert_eq!(sessions.len(), 1);

  let resumed = f
    .sage
    .resume_session(first_id.as_deref().expect("id"))
    .await
    .expect("resume");
  assert_eq!(resumed.messages.len(), 4);
}
