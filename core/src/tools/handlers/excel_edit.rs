// Excel Edit Handlers
// In-place row edits on .xlsx workbooks
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;
use umya_spreadsheet::{Spreadsheet, Worksheet, reader, writer};

use crate::tools::context::{FunctionCallError, ToolInvocation, ToolOutput};
use crate::tools::registry::ToolHandler;
use crate::tools::validation::sanitize_path;

pub struct ExcelWriteHandler;

pub struct ExcelDeleteHandler;

#[derive(serde::Deserialize)]
struct ExcelWriteArgs {
  file_path: String,
  data: Value,
  sheet_name: Option<String>,
}

#[derive(serde::Deserialize)]
struct ExcelDeleteArgs {
  file_path: String,
  row_index: Option<Value>,
  target_content: Option<String>,
  sheet_name: Option<String>,
}

enum RowTarget {
  /// 1-based, ascending, deduplicated.
  Indexes(Vec<u32>),
  Content(String),
}

#[async_trait]
impl ToolHandler for ExcelWriteHandler {
  async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
    let args: ExcelWriteArgs = invocation.parse_arguments()?;
    let values = row_values(args.data);
    if values.is_empty() {
      return Err(FunctionCallError::InvalidArguments(
        "data must contain at least one value".to_string(),
      ));
    }
    let path = workbook_path(&args.file_path, &invocation.session.cwd)?;

    let written = values.clone();
    let row = run_blocking(move || append_row(&path, args.sheet_name.as_deref(), &written)).await?;
    info!(file = %args.file_path, row, "spreadsheet row appended");
    Ok(ToolOutput::success(format!(
      "Wrote row {row}: [{}]",
      values.join(", ")
    )))
  }
}

#[async_trait]
impl ToolHandler for ExcelDeleteHandler {
  async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
    let args: ExcelDeleteArgs = invocation.parse_arguments()?;
    let target = match (&args.row_index, args.target_content.as_deref().map(str::trim)) {
      (Some(raw), _) if !parse_row_indexes(raw).is_empty() => RowTarget::Indexes(parse_row_indexes(raw)),
      (_, Some(content)) if !content.is_empty() => RowTarget::Content(content.to_string()),
      _ => {
        return Err(FunctionCallError::InvalidArguments(
          "provide row_index (e.g. '2,3') or target_content".to_string(),
        ));
      }
    };
    let path = workbook_path(&args.file_path, &invocation.session.cwd)?;

    let deleted = run_blocking(move || delete_rows(&path, args.sheet_name.as_deref(), target)).await?;
    info!(file = %args.file_path, deleted, "spreadsheet rows deleted");
    Ok(ToolOutput::success(format!("Deleted {deleted} rows")))
  }
}

fn workbook_path(raw: &str, cwd: &Path) -> Result<PathBuf, FunctionCallError> {
  let path = sanitize_path(raw, cwd)?;
  let is_xlsx = path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
  if !is_xlsx {
    return Err(FunctionCallError::Execution(format!(
      "Only .xlsx files can be edited: {raw}"
    )));
  }
  if !path.is_file() {
    return Err(FunctionCallError::Execution(format!("File not found: {raw}")));
  }
  Ok(path)
}

async fn run_blocking<T, F>(job: F) -> Result<T, FunctionCallError>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T, String> + Send + 'static,
{
  tokio::task::spawn_blocking(job)
    .await
    .map_err(|e| FunctionCallError::Execution(format!("spreadsheet editor panicked: {e}")))?
    .map_err(FunctionCallError::Execution)
}

/// Cell texts for one row. A string holding a JSON array is unpacked, any
/// other string becomes a single cell.
fn row_values(data: Value) -> Vec<String> {
  match data {
    Value::Array(items) => items.into_iter().map(cell_string).collect(),
    Value::String(text) => match serde_json::from_str::<Value>(&text) {
      Ok(Value::Array(items)) => items.into_iter().map(cell_string).collect(),
      _ => vec![text],
    },
    Value::Null => Vec::new(),
    other => vec![cell_string(other)],
  }
}

fn cell_string(value: Value) -> String {
  match value {
    Value::String(text) => text,
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

/// Accepts `"2,3"`, `2` or `[2, "3"]`.
fn parse_row_indexes(raw: &Value) -> Vec<u32> {
  let mut rows: Vec<u32> = match raw {
    Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).into_iter().collect(),
    Value::String(text) => text
      .split(',')
      .filter_map(|part| part.trim().parse().ok())
      .collect(),
    Value::Array(items) => items.iter().flat_map(parse_row_indexes).collect(),
    _ => Vec::new(),
  };
  rows.retain(|&row| row > 0);
  rows.sort_unstable();
  rows.dedup();
  rows
}

fn open_book(path: &Path) -> Result<Spreadsheet, String> {
  reader::xlsx::read(path).map_err(|e| format!("Failed to open spreadsheet: {e}"))
}

fn save_book(book: &Spreadsheet, path: &Path) -> Result<(), String> {
  writer::xlsx::write(book, path).map_err(|e| format!("Failed to save spreadsheet: {e}"))
}

/// The named sheet when it exists, else the active one.
fn select_sheet<'a>(book: &'a mut Spreadsheet, name: Option<&str>) -> Result<&'a mut Worksheet, String> {
  match name.filter(|name| book.get_sheet_by_name(name).is_some()) {
    Some(name) => book
      .get_sheet_by_name_mut(name)
      .ok_or_else(|| format!("Sheet '{name}' not found")),
    None => Ok(book.get_active_sheet_mut()),
  }
}

fn append_row(path: &Path, sheet: Option<&str>, values: &[String]) -> Result<u32, String> {
  let mut book = open_book(path)?;
  let worksheet = select_sheet(&mut book, sheet)?;
  let row = worksheet.get_highest_row() + 1;
  for (col, value) in (1u32..).zip(values) {
    worksheet.get_cell_mut((col, row)).set_value(value.clone());
  }
  save_book(&book, path)?;
  Ok(row)
}

fn delete_rows(path: &Path, sheet: Option<&str>, target: RowTarget) -> Result<usize, String> {
  let mut book = open_book(path)?;
  let worksheet = select_sheet(&mut book, sheet)?;
  let highest = worksheet.get_highest_row();
  let rows: Vec<u32> = match target {
    RowTarget::Indexes(rows) => rows.into_iter().filter(|&row| row <= highest).collect(),
    RowTarget::Content(needle) => (1..=highest)
      .filter(|&row| row_contains(worksheet, row, &needle))
      .collect(),
  };
  // Bottom-up so earlier removals don't shift later targets.
  for row in rows.iter().rev() {
    worksheet.remove_row(row, &1);
  }
  if !rows.is_empty() {
    save_book(&book, path)?;
  }
  Ok(rows.len())
}

fn row_contains(worksheet: &Worksheet, row: u32, needle: &str) -> bool {
  (1..=worksheet.get_highest_column()).any(|col| worksheet.get_value((col, row)).contains(needle))
}
