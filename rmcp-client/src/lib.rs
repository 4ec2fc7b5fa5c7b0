// Sage RMCP Client
// Short-lived MCP sessions over child-process stdio

pub mod connector;
pub mod content;
mod utils;

pub use connector::{McpClientError, McpConnector, RemoteTool, RmcpConnector};
pub use content::flatten_content;
