pub mod context;
pub mod handlers;
pub mod registry;
pub mod spec;
pub mod validation;

use std::sync::Arc;

use sage_config::Config;

use crate::sandbox::SandboxSupervisor;
use crate::tools::registry::ToolRegistry;

pub use context::{FunctionCallError, ToolInvocation, ToolOutput, ToolSessionContext};
pub use registry::{ToolFailure, ToolHandler, ToolRegistryBuilder};
pub use spec::{JsonSchema, ToolSpec};

/// Builds the local tool catalog once at startup.
pub fn build_default_tools(
  config: &Config,
  sandbox: Option<Arc<SandboxSupervisor>>,
) -> ToolRegistry {
  let mut builder = ToolRegistry::builder();
  handlers::register_builtin_handlers(&mut builder, config, sandbox);
  builder.build()
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn interpreter_needs_a_sandbox() {
    let registry = build_default_tools(&Config::default(), None);
    assert_eq!(registry.names(), vec!["excel_delete", "excel_read", "excel_write", "list_files"]);
  }
}
