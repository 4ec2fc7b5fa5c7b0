//! Model Provider trait
//!
//! This module defines the [ModelProvider] trait that all LLM providers must implement.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use sage_protocol::StreamDelta;

use super::error::{ModelError, Result};
use super::types::{ChatRequest, ChatResponse, ListModelsResponse};

/// Deltas of one streamed completion, ending with the stream.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta>> + Send>>;

/// Model Provider trait
///
/// The turn loop only sees this interface, so tests substitute scripted
/// providers for the HTTP ones.
#[async_trait]
pub trait ModelProvider: Send + Sync {
  /// Returns the unique identifier for this provider
  fn provider_id(&self) -> &str;

  /// Creates a chat completion
  async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse>;

  /// Creates a streaming chat completion
  async fn chat_completion_stream(&self, request: ChatRequest) -> Result<DeltaStream>;

  /// Lists available models for this provider
  async fn list_models(&self) -> Result<ListModelsResponse>;
}

/// Standard error handling for HTTP responses
pub async fn handle_response(response: reqwest::Response) -> Result<String> {
  if response.status().is_success() {
    Ok(response.text().await?)
  } else {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ModelError::ApiError(format!("HTTP {status}: {body}")))
  }
}

/// Parse JSON from response
pub async fn parse_response<T: serde::de::DeserializeOwned>(
  response: reqwest::Response,
) -> Result<T> {
  let body = handle_response(response).await?;
  Ok(serde_json::from_str(&body)?)
}
