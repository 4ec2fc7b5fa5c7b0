// Excel Read Handler
use std::path::Path;

use async_trait::async_trait;
use calamine::{Data, Reader, open_workbook_auto};

use crate::tools::context::{FunctionCallError, ToolInvocation, ToolOutput};
use crate::tools::registry::ToolHandler;
use crate::tools::validation::sanitize_path;

const DEFAULT_ROWS: usize = 20;

pub struct ExcelReadHandler;

#[derive(serde::Deserialize)]
struct ExcelReadArgs {
  file_path: String,
  sheet_name: Option<String>,
  max_rows: Option<usize>,
}

#[async_trait]
impl ToolHandler for ExcelReadHandler {
  async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
    let args: ExcelReadArgs = invocation.parse_arguments()?;
    let path = sanitize_path(&args.file_path, &invocation.session.cwd)?;
    if !path.is_file() {
      return Err(FunctionCallError::Execution(format!(
        "File not found: {}",
        args.file_path
      )));
    }

    let max_rows = args.max_rows.unwrap_or(DEFAULT_ROWS);
    let text = tokio::task::spawn_blocking(move || {
      read_sheet(&path, args.sheet_name.as_deref(), max_rows)
    })
    .await
    .map_err(|e| FunctionCallError::Execution(format!("spreadsheet reader panicked: {e}")))?
    .map_err(FunctionCallError::Execution)?;

    Ok(ToolOutput::success(text))
  }
}

/// First `max_rows` rows of one sheet, cells separated by ` | `.
fn read_sheet(path: &Path, sheet: Option<&str>, max_rows: usize) -> Result<String, String> {
  let mut workbook =
    open_workbook_auto(path).map_err(|e| format!("Failed to open spreadsheet: {e}"))?;
  let sheet_names = workbook.sheet_names();
  let name = match sheet {
    Some(name) if sheet_names.iter().any(|candidate| candidate == name) => name.to_string(),
    Some(name) => {
      return Err(format!(
        "Sheet '{name}' not found. Available sheets: {}",
        sheet_names.join(", ")
      ));
    }
    None => sheet_names
      .first()
      .cloned()
      .ok_or_else(|| "Spreadsheet has no sheets".to_string())?,
  };

  let range = workbook
    .worksheet_range(&name)
    .map_err(|e| format!("Failed to read sheet '{name}': {e}"))?;
  let total = range.height();
  let mut out = format!("Sheet: {name} ({total} rows)\n");
  for row in range.rows().take(max_rows) {
    let cells: Vec<String> = row.iter().map(cell_text).collect();
    out.push_str(&cells.join(" | "));
    out.push('\n');
  }
  if total > max_rows {
    out.push_str(&format!("... {} more rows", total - max_rows));
  }
  Ok(out.trim_end().to_string())
}

fn cell_text(cell: &Data) -> String {
  match cell {
    Data::Empty => String::new(),
    other => other.to_string(),
  }
}

/// Text of every sheet, for indexing.
pub(crate) fn workbook_text(path: &Path) -> Result<String, String> {
  let mut workbook =
    open_workbook_auto(path).map_err(|e| format!("Failed to open spreadsheet: {e}"))?;
  let mut out = String::new();
  for name in workbook.sheet_names() {
    let Ok(range) = workbook.worksheet_range(&name) else {
      continue;
    };
    out.push_str(&format!("Sheet: {name}\n"));
    for row in range.rows() {
      let cells: Vec<String> = row.iter().map(cell_text).collect();
      out.push_str(&cells.join(" | "));
      out.push('\n');
    }
    out.push('\n');
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tools::context::ToolSessionContext;

  fn invocation(cwd: &Path, arguments: &str) -> ToolInvocation {
    ToolInvocation {
      id: "call_1".to_string(),
      name: "excel_read".to_string(),
      arguments: arguments.to_string(),
      session: ToolSessionContext::new("s1").with_cwd(cwd.to_path_buf()),
    }
  }

  #[tokio::test]
  async fn missing_file_is_an_execution_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = ExcelReadHandler
      .handle(invocation(dir.path(), r#"{"file_path": "'missing.xlsx'"}"#))
      .await
      .expect_err("missing file");
    assert_eq!(
      err,
      FunctionCallError::Execution("File not found: 'missing.xlsx'".to_string())
    );
  }

  #[tokio::test]
  async fn escaping_path_is_denied() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = ExcelReadHandler
      .handle(invocation(dir.path(), r#"{"file_path": "../../etc/passwd"}"#))
      .await
      .expect_err("outside cwd");
    assert!(matches!(err, FunctionCallError::PermissionDenied(_)));
  }

  #[tokio::test]
  async fn non_spreadsheet_fails_to_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("notes.xlsx"), b"plain text").expect("write");
    let err = ExcelReadHandler
      .handle(invocation(dir.path(), r#"{"file_path": "notes.xlsx"}"#))
      .await
      .expect_err("not a workbook");
    match err {
      FunctionCallError::Execution(message) => {
        assert!(message.starts_with("Failed to open spreadsheet"), "{message}")
      }
      other => panic!("unexpected error {other:?}"),
    }
  }
}
