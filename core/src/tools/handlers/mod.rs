pub mod excel_edit;
pub mod excel_read;
pub mod list_files;
pub mod python;

use std::sync::Arc;

use sage_config::Config;

use crate::sandbox::SandboxSupervisor;
use crate::tools::registry::ToolRegistryBuilder;
use crate::tools::spec::{
  excel_delete_tool, excel_read_tool, excel_write_tool, list_files_tool, python_interpreter_tool,
};

/// Registers the built-in handlers. The interpreter is only present when a
/// sandbox is available.
pub fn register_builtin_handlers(
  builder: &mut ToolRegistryBuilder,
  config: &Config,
  sandbox: Option<Arc<SandboxSupervisor>>,
) {
  if let Some(supervisor) = sandbox {
    builder.register(
      python_interpreter_tool(),
      Arc::new(python::PythonInterpreterHandler::new(supervisor)),
    );
  }
  builder.register(excel_read_tool(), Arc::new(excel_read::ExcelReadHandler));
  builder.register(excel_write_tool(), Arc::new(excel_edit::ExcelWriteHandler));
  builder.register(excel_delete_tool(), Arc::new(excel_edit::ExcelDeleteHandler));
  builder.register(
    list_files_tool(),
    Arc::new(list_files::ListFilesHandler::new(
      config.sandbox.upload_dir.clone(),
    )),
  );
}
