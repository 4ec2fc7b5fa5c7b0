use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use sage_config::Config;
use sage_protocol::EventMsg;
use sage_rmcp_client::RmcpConnector;
use sage_state::SessionStore;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::knowledge::{KnowledgeRetriever, LocalKnowledgeBase};
use crate::mcp::McpConnectionManager;
use crate::model::{ModelClient, init_model_layer};
use crate::sandbox::{DockerCliBackend, SandboxSupervisor};
use crate::session::SessionContext;
use crate::tools::build_default_tools;
use crate::turn::{KnowledgeSearch, ToolDispatcher, TurnConfig, TurnExecutor, TurnResult};

/// Everything a chat front end needs, built once at startup.
pub struct Sage {
  config: Arc<Config>,
  model_client: Arc<ModelClient>,
  dispatcher: Arc<ToolDispatcher>,
  sandbox: Arc<SandboxSupervisor>,
  mcp: Arc<McpConnectionManager>,
  knowledge: Arc<dyn KnowledgeRetriever>,
  store: SessionStore,
  cwd: PathBuf,
}

impl Sage {
  pub async fn new(config: Config) -> anyhow::Result<Self> {
    let model_client = init_model_layer(&config).context("failed to initialize model layer")?;
    let cwd = std::env::current_dir().context("failed to read working directory")?;
    Ok(Self::new_with_model_client(config, model_client, cwd))
  }

  /// Builds the runtime around an existing model client. Relative paths in
  /// the configuration resolve against `cwd`.
  pub fn new_with_model_client(config: Config, model_client: Arc<ModelClient>, cwd: PathBuf) -> Self {
    let backend = Arc::new(DockerCliBackend::new(
      config.sandbox.docker_bin.clone(),
      config.sandbox.workdir.clone(),
    ));
    let mut sandbox_config = config.sandbox.clone();
    sandbox_config.upload_dir = cwd.join(&sandbox_config.upload_dir);
    sandbox_config.output_dir = cwd.join(&sandbox_config.output_dir);
    let sandbox = Arc::new(SandboxSupervisor::new(backend, sandbox_config));

    let registry = Arc::new(build_default_tools(&config, Some(sandbox.clone())));
    let mcp = Arc::new(McpConnectionManager::new(
      config.mcp.clone(),
      Arc::new(RmcpConnector::new()),
    ));
    let knowledge: Arc<dyn KnowledgeRetriever> =
      Arc::new(LocalKnowledgeBase::new(cwd.join(&config.knowledge.store_dir)));

    let dispatcher = ToolDispatcher::new(registry, config.tools.clone(), config.features)
      .with_knowledge(Some(KnowledgeSearch {
        retriever: knowledge.clone(),
        embed_model: config.knowledge.embed_model.clone(),
        rerank_model: config.knowledge.rerank_model.clone(),
      }))
      .with_mcp(Some(mcp.clone()));

    info!(
      provider = model_client.provider_id(),
      model = model_client.model(),
      "sage runtime ready"
    );

    Self {
      store: SessionStore::new(cwd.join(&config.history.dir)),
      config: Arc::new(config),
      model_client,
      dispatcher: Arc::new(dispatcher),
      sandbox,
      mcp,
      knowledge,
      cwd,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn model_client(&self) -> &Arc<ModelClient> {
    &self.model_client
  }

  pub fn store(&self) -> &SessionStore {
    &self.store
  }

  pub fn mcp(&self) -> &McpConnectionManager {
    &self.mcp
  }

  pub fn knowledge(&self) -> &dyn KnowledgeRetriever {
    self.knowledge.as_ref()
  }

  pub fn sandbox(&self) -> &SandboxSupervisor {
    &self.sandbox
  }

  /// Loads a stored session for resuming.
  pub async fn resume_session(&self, id: &str) -> anyhow::Result<SessionContext> {
    let messages = self
      .store
      .load(id)
      .await
      .with_context(|| format!("failed to load session {id}"))?;
    Ok(SessionContext::resume(id, messages))
  }

  /// Runs one turn and saves the session afterwards, also when the turn
  /// ended on a model error.
  pub async fn run_turn(
    &self,
    session: &mut SessionContext,
    prompt: &str,
    tx_event: mpsc::Sender<EventMsg>,
  ) -> anyhow::Result<TurnResult> {
    let executor = TurnExecutor::new(
      self.model_client.clone(),
      self.dispatcher.clone(),
      tx_event,
      TurnConfig::from_config(&self.config, self.cwd.clone()),
    );
    let outcome = executor.run_turn(session, prompt).await;

    match self
      .store
      .save(session.persisted_id.as_deref(), &session.messages)
      .await
    {
      Ok(id) => session.persisted_id = Some(id),
      Err(e) => warn!(session_id = %session.runtime_id, error = %e, "failed to save session"),
    }

    Ok(outcome?)
  }

  pub async fn stop_sandbox(&self, session_id: &str) -> anyhow::Result<()> {
    self
      .sandbox
      .stop(session_id)
      .await
      .with_context(|| format!("failed to stop sandbox for session {session_id}"))
  }
}
