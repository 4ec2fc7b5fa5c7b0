// Tool Dispatch
use std::sync::Arc;

use sage_config::{FeaturesConfig, ToolsConfig};
use sage_protocol::ToolCall;
use tracing::{debug, warn};

use crate::knowledge::KnowledgeRetriever;
use crate::mcp::McpConnectionManager;
use crate::model::Tool;
use crate::tools::registry::ToolRegistry;
use crate::tools::spec::{KB_SEARCH, kb_search_tool};
use crate::tools::{ToolOutput, ToolSessionContext};

/// Retrieval backend plus the models it is queried with.
#[derive(Clone)]
pub struct KnowledgeSearch {
  pub retriever: Arc<dyn KnowledgeRetriever>,
  pub embed_model: String,
  pub rerank_model: Option<String>,
}

#[derive(serde::Deserialize)]
struct SearchArgs {
  query: String,
}

/// Routes tool calls to retrieval, the local registry or MCP servers,
/// according to the feature flags.
pub struct ToolDispatcher {
  registry: Arc<ToolRegistry>,
  tool_flags: ToolsConfig,
  features: FeaturesConfig,
  knowledge: Option<KnowledgeSearch>,
  mcp: Option<Arc<McpConnectionManager>>,
}

impl ToolDispatcher {
  pub fn new(registry: Arc<ToolRegistry>, tool_flags: ToolsConfig, features: FeaturesConfig) -> Self {
    Self {
      registry,
      tool_flags,
      features,
      knowledge: None,
      mcp: None,
    }
  }

  pub fn with_knowledge(mut self, knowledge: Option<KnowledgeSearch>) -> Self {
    self.knowledge = knowledge;
    self
  }

  pub fn with_mcp(mut self, mcp: Option<Arc<McpConnectionManager>>) -> Self {
    self.mcp = mcp;
    self
  }

  fn knowledge(&self) -> Option<&KnowledgeSearch> {
    self.knowledge.as_ref().filter(|_| self.features.rag)
  }

  fn mcp(&self) -> Option<&McpConnectionManager> {
    self.mcp.as_deref().filter(|_| self.features.mcp)
  }

  /// Tools to offer on the next model call; `None` when nothing is enabled.
  pub async fn offered_tools(&self) -> Option<Vec<Tool>> {
    let mut tools = Vec::new();
    if self.features.custom_tools {
      tools.extend(self.registry.model_tools(&self.tool_flags));
    }
    if self.knowledge().is_some() {
      tools.push(kb_search_tool().to_model_tool());
    }
    if let Some(mcp) = self.mcp() {
      tools.extend(mcp.model_tools().await);
    }
    (!tools.is_empty()).then_some(tools)
  }

  pub async fn dispatch(&self, call: &ToolCall, session: &ToolSessionContext) -> ToolOutput {
    let name = call.function.name.as_str();
    let arguments = call.function.arguments.as_str();

    if name == KB_SEARCH
      && let Some(knowledge) = self.knowledge()
    {
      return self.search_knowledge(knowledge, &call.id, arguments).await;
    }

    if self.serves_locally(name) {
      return self.registry.execute(&call.id, name, arguments, session).await;
    }

    if let Some(mcp) = self.mcp() {
      debug!(tool = name, "routing tool call to MCP");
      let text = mcp.execute_tool(name, arguments).await;
      let failed = text.starts_with("Error:") || text.starts_with("MCP Execution Error:");
      let mut output = if failed {
        ToolOutput::error(text)
      } else {
        ToolOutput::success(text)
      };
      output.id = call.id.clone();
      return output;
    }

    let available = if self.features.custom_tools {
      self
        .registry
        .list_enabled(&self.tool_flags)
        .into_iter()
        .map(|spec| spec.name.clone())
        .collect()
    } else {
      Vec::new()
    };
    self.registry.not_found(&call.id, name, available)
  }

  /// Disabled tools stay registered but are neither offered nor run.
  fn serves_locally(&self, name: &str) -> bool {
    self.features.custom_tools && self.registry.contains(name) && self.tool_flags.is_enabled(name)
  }

  async fn search_knowledge(
    &self,
    knowledge: &KnowledgeSearch,
    call_id: &str,
    arguments: &str,
  ) -> ToolOutput {
    let rerank = knowledge
      .rerank_model
      .as_deref()
      .filter(|_| self.features.rerank);
    let result = match serde_json::from_str::<SearchArgs>(arguments) {
      Ok(args) => knowledge
        .retriever
        .search(&args.query, &knowledge.embed_model, rerank)
        .await
        .map_err(|e| e.to_string()),
      Err(e) => Err(format!("invalid arguments for {KB_SEARCH}: {e}")),
    };

    let mut output = match result {
      Ok(text) => ToolOutput::success(text),
      Err(e) => {
        warn!(tool = KB_SEARCH, error = %e, "knowledge search failed");
        ToolOutput::error(format!("Error: {e}"))
      }
    };
    output.id = call_id.to_string();
    output
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;
  use std::sync::Mutex;

  use async_trait::async_trait;
  use pretty_assertions::assert_eq;
  use sage_config::Config;

  use super::*;
  use crate::knowledge::{self, KnowledgeError};

  #[derive(Default)]
  struct RecordingRetriever {
    queries: Mutex<Vec<(String, Option<String>)>>,
  }

  #[async_trait]
  impl KnowledgeRetriever for RecordingRetriever {
    async fn search(
      &self,
      query: &str,
      _embed_model: &str,
      rerank_model: Option<&str>,
    ) -> knowledge::Result<String> {
      self
        .queries
        .lock()
        .expect("queries")
        .push((query.to_string(), rerank_model.map(str::to_string)));
      if query == "broken" {
        return Err(KnowledgeError::Extract("index unreadable".to_string()));
      }
      Ok(format!("[Source: notes.md]\n{query}"))
    }

    async fn add_document(&self, _path: &Path, _embed_model: &str) -> knowledge::Result<String> {
      Ok(String::new())
    }

    async fn list_files(&self, _embed_model: &str) -> knowledge::Result<Vec<String>> {
      Ok(Vec::new())
    }

    async fn delete_file(&self, _name: &str, _embed_model: &str) -> knowledge::Result<()> {
      Ok(())
    }
  }

  fn dispatcher(features: FeaturesConfig, retriever: Arc<RecordingRetriever>) -> ToolDispatcher {
    let config = Config::default();
    let registry = Arc::new(crate::tools::build_default_tools(&config, None));
    ToolDispatcher::new(registry, config.tools.clone(), features).with_knowledge(Some(
      KnowledgeSearch {
        retriever,
        embed_model: "nomic-embed-text".to_string(),
        rerank_model: Some("bge-reranker".to_string()),
      },
    ))
  }

  fn session() -> ToolSessionContext {
    ToolSessionContext::new("s1").with_cwd(std::env::temp_dir())
  }

  #[tokio::test]
  async fn offered_tools_follow_feature_flags() {
    let retriever = Arc::new(RecordingRetriever::default());
    let all = FeaturesConfig {
      rag: true,
      ..FeaturesConfig::default()
    };
    let names: Vec<String> = dispatcher(all, retriever.clone())
      .offered_tools()
      .await
      .unwrap_or_default()
      .iter()
      .filter_map(|tool| tool.name().map(str::to_string))
      .collect();
    assert_eq!(names, vec!["excel_delete", "excel_read", "excel_write", "list_files", "kb_search"]);

    let none = FeaturesConfig {
      custom_tools: false,
      ..FeaturesConfig::default()
    };
    assert!(dispatcher(none, retriever).offered_tools().await.is_none());
  }

  #[tokio::test]
  async fn kb_search_goes_to_retriever_with_rerank_when_enabled() {
    let retriever = Arc::new(RecordingRetriever::default());
    let features = FeaturesConfig {
      rag: true,
      rerank: true,
      ..FeaturesConfig::default()
    };
    let dispatcher = dispatcher(features, retriever.clone());

    let output = dispatcher
      .dispatch(&ToolCall::new("c1", KB_SEARCH, r#"{"query": "refunds"}"#), &session())
      .await;
    assert_eq!(output.content, "[Source: notes.md]\nrefunds");
    assert_eq!(output.id, "c1");

    let failed = dispatcher
      .dispatch(&ToolCall::new("c2", KB_SEARCH, r#"{"query": "broken"}"#), &session())
      .await;
    assert!(failed.is_error);
    assert_eq!(failed.content, "Error: failed to extract text: index unreadable");

    assert_eq!(
      retriever.queries.lock().expect("queries")[0],
      ("refunds".to_string(), Some("bge-reranker".to_string()))
    );
  }

  #[tokio::test]
  async fn unknown_tool_without_mcp_is_not_found_text() {
    let dispatcher = dispatcher(FeaturesConfig::default(), Arc::new(RecordingRetriever::default()));
    let output = dispatcher
      .dispatch(&ToolCall::new("c1", "weather", "{}"), &session())
      .await;
    assert!(output.is_error);
    assert_eq!(
      output.content,
      "Error: Tool 'weather' not found. Available tools: ['excel_delete', 'excel_read', 'excel_write', 'list_files']"
    );
  }

  #[tokio::test]
  async fn disabled_tool_is_not_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("secret.txt"), "x").expect("write");
    let mut config = Config::default();
    config.sandbox.upload_dir = dir.path().to_path_buf();
    config.tools.enabled.insert("list_files".to_string(), false);
    let registry = Arc::new(crate::tools::build_default_tools(&config, None));
    let dispatcher = ToolDispatcher::new(registry, config.tools.clone(), config.features);

    let offered: Vec<String> = dispatcher
      .offered_tools()
      .await
      .unwrap_or_default()
      .iter()
      .filter_map(|tool| tool.name().map(str::to_string))
      .collect();
    assert_eq!(offered, vec!["excel_delete", "excel_read", "excel_write"]);

    let output = dispatcher
      .dispatch(&ToolCall::new("c1", "list_files", "{}"), &session())
      .await;
    assert!(output.is_error);
    assert_eq!(output.id, "c1");
    assert_eq!(
      output.content,
      "Error: Tool 'list_files' not found. Available tools: ['excel_delete', 'excel_read', 'excel_write']"
    );
  }

  #[tokio::test]
  async fn kb_search_with_rag_off_is_not_found() {
    let dispatcher = dispatcher(FeaturesConfig::default(), Arc::new(RecordingRetriever::default()));
    let output = dispatcher
      .dispatch(&ToolCall::new("c1", KB_SEARCH, r#"{"query": "x"}"#), &session())
      .await;
    assert!(output.content.starts_with("Error: Tool 'kb_search' not found."));
  }
}
