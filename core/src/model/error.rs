//! Model layer error types

use thiserror::Error;

/// Model provider errors
#[derive(Error, Debug)]
pub enum ModelError {
  /// Missing or rejected credentials
  #[error("Authentication failed: {0}")]
  AuthError(String),

  /// Invalid request
  #[error("Invalid request: {0}")]
  InvalidRequest(String),

  /// Invalid response from provider
  #[error("Invalid response: {0}")]
  InvalidResponse(String),

  /// Provider API error
  #[error("Provider API error: {0}")]
  ApiError(String),

  /// Network error
  #[error("Network error: {0}")]
  NetworkError(#[from] reqwest::Error),

  /// JSON parse error
  #[error("JSON parse error: {0}")]
  JsonError(#[from] serde_json::Error),

  /// Unknown provider id in configuration
  #[error("Provider not found: {0}")]
  ProviderNotFound(String),

  /// Streaming error
  #[error("Streaming error: {0}")]
  StreamError(String),
}

/// Alias for Result<T, ModelError>
pub type Result<T> = std::result::Result<T, ModelError>;
