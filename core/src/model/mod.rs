//! Sage Model Provider Layer
//!
//! Chat completions against OpenAI-compatible endpoints (OpenAI itself and
//! Ollama's `/v1` surface).
//!
//! - [ModelProvider] trait: the interface the turn loop talks to
//! - [ModelClient]: one provider plus request defaults
//! - Provider implementations in [providers]

pub mod client;
pub mod error;
pub mod provider;
pub mod providers;
pub mod streaming;
pub mod types;

pub use client::ModelClient;
pub use error::{ModelError, Result};
pub use provider::{DeltaStream, ModelProvider};
pub use streaming::{ParsedStreamEvent, StreamingProcessor};
pub use types::*;

use std::sync::Arc;

/// Builds the model client described by the configuration.
pub fn init_model_layer(config: &sage_config::Config) -> Result<Arc<ModelClient>> {
  let provider = providers::create_provider(&config.models)?;
  Ok(Arc::new(ModelClient::new(
    provider,
    config.models.model.clone(),
    config.agent.temperature,
  )))
}
