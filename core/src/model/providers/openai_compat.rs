//! OpenAI-compatible Provider
//!
//! Serves OpenAI and any server exposing `/chat/completions` and `/models`
//! in the same shape, Ollama included.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};

use super::super::error::{ModelError, Result};
use super::super::provider::{DeltaStream, ModelProvider, parse_response};
use super::super::types::{ChatRequest, ChatResponse, ListModelsResponse};
use super::{build_openai_request, create_response_stream};

pub struct OpenAICompatibleProvider {
  id: String,
  client: Client,
  base_url: String,
  api_key: Option<String>,
}

impl OpenAICompatibleProvider {
  pub fn new(
    id: impl Into<String>,
    base_url: impl Into<String>,
    api_key: Option<String>,
    client: Client,
  ) -> Self {
    Self {
      id: id.into(),
      client,
      base_url: base_url.into(),
      api_key,
    }
  }

  /// Get the API endpoint URL
  fn endpoint(&self, path: &str) -> String {
    format!("{}/{}", self.base_url.trim_end_matches('/'), path)
  }

  fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
    match &self.api_key {
      Some(key) => builder.bearer_auth(key),
      None => builder,
    }
  }
}

#[async_trait]
impl ModelProvider for OpenAICompatibleProvider {
  fn provider_id(&self) -> &str {
    &self.id
  }

  async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
    let body = build_openai_request(&request);
    let response = self
      .authorize(self.client.post(self.endpoint("chat/completions")))
      .json(&body)
      .send()
      .await?;
    let parsed: ChatResponse = parse_response(response).await?;
    if parsed.choices.is_empty() {
      return Err(ModelError::InvalidResponse("response has no choices".to_string()));
    }
    Ok(parsed)
  }

  async fn chat_completion_stream(&self, request: ChatRequest) -> Result<DeltaStream> {
    let mut body = build_openai_request(&request);
    body["stream"] = serde_json::json!(true);

    let response = self
      .authorize(self.client.post(self.endpoint("chat/completions")))
      .json(&body)
      .send()
      .await?;

    Ok(create_response_stream(response))
  }

  async fn list_models(&self) -> Result<ListModelsResponse> {
    let response = self
      .authorize(self.client.get(self.endpoint("models")))
      .send()
      .await?;
    parse_response(response).await
  }
}
