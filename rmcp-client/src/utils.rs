use std::future::Future;
use std::time::Duration;

use tokio::time;

use crate::connector::McpClientError;

/// Awaits `fut`, converting elapsed time into [`McpClientError::Timeout`].
pub(crate) async fn run_with_timeout<F, T, E>(
  fut: F,
  timeout: Duration,
  server: &str,
  label: &str,
) -> Result<T, McpClientError>
where
  F: Future<Output = Result<T, E>>,
  E: std::fmt::Display,
{
  match time::timeout(timeout, fut).await {
    Ok(result) => result.map_err(|err| McpClientError::Protocol {
      server: server.to_string(),
      message: format!("{label} failed: {err}"),
    }),
    Err(_) => Err(McpClientError::Timeout {
      server: server.to_string(),
      label: label.to_string(),
      timeout,
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn elapsed_future_reports_timeout() {
    let err = run_with_timeout(
      async {
        time::sleep(Duration::from_millis(200)).await;
        Ok::<(), String>(())
      },
      Duration::from_millis(10),
      "slow",
      "tools/list",
    )
    .await
    .expect_err("timeout");
    assert!(matches!(err, McpClientError::Timeout { .. }));
  }

  #[tokio::test]
  async fn inner_error_keeps_label() {
    let err = run_with_timeout(
      async { Err::<(), _>("boom") },
      Duration::from_secs(1),
      "fs",
      "tools/call",
    )
    .await
    .expect_err("inner error");
    assert_eq!(err.to_string(), "MCP server 'fs': tools/call failed: boom");
  }
}
