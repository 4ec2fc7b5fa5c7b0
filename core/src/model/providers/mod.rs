//! Model provider implementations

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use sage_config::ModelsConfig;
use serde_json::json;
use tracing::{debug, warn};

use super::error::{ModelError, Result};
use super::provider::{DeltaStream, ModelProvider};
use super::streaming::StreamingProcessor;
use super::types::ChatRequest;

pub mod openai_compat;

pub use openai_compat::OpenAICompatibleProvider;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434/v1";

/// Builds the provider named by `models.provider`.
pub fn create_provider(config: &ModelsConfig) -> Result<Arc<dyn ModelProvider>> {
  let client = create_client(config.timeout_secs)?;
  let provider = config.provider.as_str();

  let (default_url, default_key_env) = match provider {
    "ollama" => (Some(OLLAMA_BASE_URL), None),
    "openai" => (Some(OPENAI_BASE_URL), Some("OPENAI_API_KEY")),
    _ => (None, None),
  };

  let base_url = config
    .base_url
    .clone()
    .or_else(|| default_url.map(ToString::to_string))
    .ok_or_else(|| ModelError::ProviderNotFound(format!("{provider} (set models.base_url)")))?;

  let key_env = config.api_key_env.as_deref().or(default_key_env);
  let api_key = match key_env {
    Some(name) => match std::env::var(name) {
      Ok(key) if !key.trim().is_empty() => Some(key),
      _ => {
        warn!(provider, env = name, "API key variable is not set");
        None
      }
    },
    None => None,
  };

  debug!(provider, base_url = %base_url, "model provider configured");
  Ok(Arc::new(OpenAICompatibleProvider::new(
    provider, base_url, api_key, client,
  )))
}

/// Create a default HTTP client for providers
pub fn create_client(timeout_secs: u64) -> Result<Client> {
  Ok(
    Client::builder()
      .timeout(Duration::from_secs(timeout_secs))
      .build()?,
  )
}

/// Build OpenAI-compatible request body
pub fn build_openai_request(request: &ChatRequest) -> serde_json::Value {
  let mut body = json!({
    "model": request.model,
    "messages": request.messages,
    "stream": request.stream,
  });
  if let Some(temperature) = request.temperature {
    body["temperature"] = json!(temperature);
  }
  if let Some(tools) = &request.tools {
    body["tools"] = json!(tools);
  }
  body
}

/// Turns an SSE response into a stream of deltas.
pub fn create_response_stream(response: reqwest::Response) -> DeltaStream {
  Box::pin(async_stream::stream! {
      let status = response.status();
      let mut stream = response.bytes_stream();
      let mut processor = StreamingProcessor::new();

      if !status.is_success() {
          let mut body = String::new();
          while let Some(item) = stream.next().await {
              match item {
                  Ok(bytes) => body.push_str(&String::from_utf8_lossy(&bytes)),
                  Err(err) => {
                      yield Err(ModelError::StreamError(err.to_string()));
                      return;
                  }
              }
          }
          yield Err(ModelError::ApiError(format!("HTTP {status}: {body}")));
          return;
      }

      let mut pending: Vec<u8> = Vec::new();
      while let Some(item) = stream.next().await {
          match item {
              Ok(bytes) => {
                  pending.extend_from_slice(&bytes);
                  let text = take_decodable(&mut pending);
                  for event in processor.push_text(&text) {
                      if let Some(delta) = event.delta {
                          yield Ok(delta);
                      }
                      if event.done {
                          return;
                      }
                  }
              }
              Err(e) => {
                  yield Err(ModelError::StreamError(e.to_string()));
                  return;
              }
          }
      }

      if !pending.is_empty() {
          warn!(bytes = pending.len(), "stream ended inside a multi-byte character");
          let tail = String::from_utf8_lossy(&pending).into_owned();
          for event in processor.push_text(&tail) {
              if let Some(delta) = event.delta {
                  yield Ok(delta);
              }
              if event.done {
                  return;
              }
          }
      }

      for event in processor.finish() {
          if let Some(delta) = event.delta {
              yield Ok(delta);
          }
      }
  })
}

/// Decodes as much of `pending` as possible and leaves only an incomplete
/// trailing sequence behind. Invalid bytes decode to U+FFFD.
fn take_decodable(pending: &mut Vec<u8>) -> String {
  let mut text = String::new();
  loop {
    let (valid, invalid) = match std::str::from_utf8(pending) {
      Ok(_) => (pending.len(), None),
      Err(err) => (err.valid_up_to(), err.error_len()),
    };
    let consumed = valid + invalid.unwrap_or(0);
    text.push_str(&String::from_utf8_lossy(&pending[..consumed]));
    pending.drain(..consumed);
    if invalid.is_none() {
      return text;
    }
  }
}
