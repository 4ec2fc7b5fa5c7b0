// List Files Handler
use std::path::PathBuf;

use async_trait::async_trait;

use crate::tools::context::{FunctionCallError, ToolInvocation, ToolOutput};
use crate::tools::registry::ToolHandler;

const NO_FILES: &str = "No files found.";

/// Lists the upload directory, relative to the session's working directory.
pub struct ListFilesHandler {
  upload_dir: PathBuf,
}

impl ListFilesHandler {
  pub fn new(upload_dir: PathBuf) -> Self {
    Self { upload_dir }
  }
}

#[derive(serde::Deserialize)]
struct ListFilesArgs {
  extension: Option<String>,
}

#[async_trait]
impl ToolHandler for ListFilesHandler {
  async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
    let args: ListFilesArgs = invocation.parse_arguments()?;
    let dir = invocation.session.cwd.join(&self.upload_dir);
    let extension = args
      .extension
      .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
      .filter(|ext| !ext.is_empty());

    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Ok(ToolOutput::success(NO_FILES));
      }
      Err(e) => {
        return Err(FunctionCallError::Execution(format!(
          "Failed to list {}: {e}",
          dir.display()
        )));
      }
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
      .next_entry()
      .await
      .map_err(|e| FunctionCallError::Execution(e.to_string()))?
    {
      let is_file = entry
        .file_type()
        .await
        .map(|kind| kind.is_file())
        .unwrap_or(false);
      if !is_file {
        continue;
      }
      let name = entry.file_name().to_string_lossy().into_owned();
      let matches = extension.as_deref().is_none_or(|ext| {
        name
          .rsplit_once('.')
          .is_some_and(|(_, actual)| actual.eq_ignore_ascii_case(ext))
      });
      if matches {
        names.push(name);
      }
    }

    if names.is_empty() {
      return Ok(ToolOutput::success(NO_FILES));
    }
    names.sort();
    Ok(ToolOutput::success(names.join(", ")))
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use pretty_assertions::assert_eq;

  use super::*;
  use crate::tools::context::ToolSessionContext;

  fn invocation(cwd: &Path, arguments: &str) -> ToolInvocation {
    ToolInvocation {
      id: "call_1".to_string(),
      name: "list_files".to_string(),
      arguments: arguments.to_string(),
      session: ToolSessionContext::new("s1").with_cwd(cwd.to_path_buf()),
    }
  }

  #[tokio::test]
  async fn lists_sorted_files_and_filters_by_extension() {
    let dir = tempfile::tempdir().expect("tempdir");
    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(uploads.join("outputs")).expect("mkdir");
    for name in ["b.txt", "a.txt", "data.XLSX"] {
      std::fs::write(uploads.join(name), b"x").expect("write");
    }
    let handler = ListFilesHandler::new(PathBuf::from("uploads"));

    let all = handler
      .handle(invocation(dir.path(), "{}"))
      .await
      .expect("list");
    assert_eq!(all.content, "a.txt, b.txt, data.XLSX");

    let sheets = handler
      .handle(invocation(dir.path(), r#"{"extension": ".xlsx"}"#))
      .await
      .expect("list");
    assert_eq!(sheets.content, "data.XLSX");
  }

  #[tokio::test]
  async fn missing_directory_has_no_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = ListFilesHandler::new(PathBuf::from("uploads"))
      .handle(invocation(dir.path(), "{}"))
      .await
      .expect("list");
    assert_eq!(output.content, NO_FILES);
  }
}
