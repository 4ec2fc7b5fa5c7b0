//! Model client
//!
//! One configured provider plus the defaults applied to every request

use std::sync::Arc;

use super::error::Result;
use super::provider::{DeltaStream, ModelProvider};
use super::types::{ChatRequest, ChatResponse, ListModelsResponse};

pub struct ModelClient {
  provider: Arc<dyn ModelProvider>,
  model: String,
  default_temperature: f32,
}

impl ModelClient {
  pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>, default_temperature: f32) -> Self {
    Self {
      provider,
      model: model.into(),
      default_temperature,
    }
  }

  pub fn provider_id(&self) -> &str {
    self.provider.provider_id()
  }

  pub fn model(&self) -> &str {
    &self.model
  }

  /// Send a chat completion request
  pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
    let mut request = self.enrich_request(request);
    request.stream = false;
    self.provider.chat_completion(request).await
  }

  /// Send a streaming chat completion request
  pub async fn chat_stream(&self, request: ChatRequest) -> Result<DeltaStream> {
    let mut request = self.enrich_request(request);
    request.stream = true;
    self.provider.chat_completion_stream(request).await
  }

  pub async fn list_models(&self) -> Result<ListModelsResponse> {
    self.provider.list_models().await
  }

  /// Enrich request with default values
  fn enrich_request(&self, mut request: ChatRequest) -> ChatRequest {
    if request.model.is_empty() {
      request.model = get_model_name(&self.model).to_string();
    }
    if request.temperature.is_none() {
      request.temperature = Some(self.default_temperature);
    }
    request
  }
}

/// Helper to parse model ID
///
/// Returns (provider_id, model_name)
pub fn parse_model_id(model_id: &str) -> (Option<&str>, &str) {
  // Ollama tags such as `qwen2.5:7b` never carry a provider prefix.
  if let Some((provider_id, model_name)) = model_id.split_once('/') {
    return (Some(provider_id), model_name);
  }
  (None, model_id)
}

/// Get just the model name without provider prefix
pub fn get_model_name(model_id: &str) -> &str {
  parse_model_id(model_id).1
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use async_trait::async_trait;
  use futures::stream;
  use pretty_assertions::assert_eq;
  use sage_protocol::Message;

  use super::*;
  use crate::model::types::{Choice, ChoiceMessage};

  #[derive(Default)]
  struct RecordingProvider {
    seen: Mutex<Vec<ChatRequest>>,
  }

  #[async_trait]
  impl ModelProvider for RecordingProvider {
    fn provider_id(&self) -> &str {
      "recording"
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
      self.seen.lock().expect("seen").push(request);
      Ok(ChatResponse {
        id: "r1".to_string(),
        model: "m".to_string(),
        choices: vec![Choice {
          index: 0,
          message: ChoiceMessage {
            content: Some("ok".to_string()),
            reasoning_content: None,
            tool_calls: None,
          },
          finish_reason: Some("stop".to_string()),
        }],
        usage: None,
      })
    }

    async fn chat_completion_stream(&self, request: ChatRequest) -> Result<DeltaStream> {
      self.seen.lock().expect("seen").push(request);
      Ok(Box::pin(stream::empty()))
    }

    async fn list_models(&self) -> Result<ListModelsResponse> {
      Ok(ListModelsResponse { data: Vec::new() })
    }
  }

  #[tokio::test]
  async fn defaults_fill_missing_fields_only() {
    let provider = Arc::new(RecordingProvider::default());
    let client = ModelClient::new(provider.clone(), "openai/gpt-4o", 0.3);

    let response = client
      .chat(ChatRequest::new(vec![Message::user("hi")]))
      .await
      .expect("chat");
    assert_eq!(response.text(), "ok");

    client
      .chat_stream(ChatRequest::new(vec![Message::user("hi")]).with_temperature(0.7))
      .await
      .expect("stream");

    let seen = provider.seen.lock().expect("seen");
    assert_eq!(seen[0].model, "gpt-4o");
    assert_eq!(seen[0].temperature, Some(0.3));
    assert!(!seen[0].stream);
    assert_eq!(seen[1].temperature, Some(0.7));
    assert!(seen[1].stream);
  }

  #[test]
  fn model_ids_split_on_provider_prefix() {
    assert_eq!(parse_model_id("qwen2.5:7b"), (None, "qwen2.5:7b"));
    assert_eq!(parse_model_id("openai/gpt-4o"), (Some("openai"), "gpt-4o"));
  }
}
