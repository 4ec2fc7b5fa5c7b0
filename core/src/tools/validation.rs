use std::path::{Component, Path, PathBuf};

use serde_json::Value;

use crate::tools::context::FunctionCallError;
use crate::tools::spec::ToolSpec;

/// Why a set of arguments does not fit a tool's declared parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentShapeError {
  #[error("arguments must be a JSON object, got {0}")]
  NotAnObject(String),
  #[error("missing required argument(s): {}", .0.join(", "))]
  MissingRequired(Vec<String>),
  #[error("unexpected keyword argument(s): {}", .0.join(", "))]
  Unexpected(Vec<String>),
}

/// Checks argument names against the tool's object schema. `null` counts
/// as an empty object.
pub fn check_argument_shape(spec: &ToolSpec, arguments: &Value) -> Result<(), ArgumentShapeError> {
  let empty = serde_json::Map::new();
  let supplied = match arguments {
    Value::Object(map) => map,
    Value::Null => &empty,
    other => return Err(ArgumentShapeError::NotAnObject(json_type(other).to_string())),
  };

  let missing: Vec<String> = spec
    .required_parameters()
    .iter()
    .filter(|name| !supplied.contains_key(name.as_str()))
    .cloned()
    .collect();
  if !missing.is_empty() {
    return Err(ArgumentShapeError::MissingRequired(missing));
  }

  let declared = spec.parameter_names();
  let unexpected: Vec<String> = supplied
    .keys()
    .filter(|key| !declared.contains(key))
    .cloned()
    .collect();
  if !unexpected.is_empty() {
    return Err(ArgumentShapeError::Unexpected(unexpected));
  }
  Ok(())
}

/// Names of the keys actually supplied, for error reporting.
pub fn supplied_names(arguments: &Value) -> Vec<String> {
  match arguments {
    Value::Object(map) => map.keys().cloned().collect(),
    _ => Vec::new(),
  }
}

fn json_type(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

/// Strips stray quotes from a model-supplied path and requires it to stay
/// inside `base`. Resolution is lexical; the file need not exist.
pub fn sanitize_path(raw: &str, base: &Path) -> Result<PathBuf, FunctionCallError> {
  let cleaned = raw.trim().replace(['"', '\''], "");
  if cleaned.is_empty() {
    return Err(FunctionCallError::InvalidArguments(
      "file path is empty".to_string(),
    ));
  }

  let candidate = Path::new(&cleaned);
  let joined = if candidate.is_absolute() {
    candidate.to_path_buf()
  } else {
    base.join(candidate)
  };

  let resolved = normalize(&joined);
  if !resolved.starts_with(normalize(base)) {
    return Err(FunctionCallError::PermissionDenied(format!(
      "Access denied: path outside the working directory: {cleaned}"
    )));
  }
  Ok(resolved)
}

fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::ParentDir => {
        out.pop();
      }
      Component::CurDir => {}
      other => out.push(other.as_os_str()),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use super::*;
  use crate::tools::spec::excel_read_tool;

  #[test]
  fn missing_and_unknown_keys_are_reported() {
    let spec = excel_read_tool();
    assert_eq!(
      check_argument_shape(&spec, &json!({"sheet_name": "A"})),
      Err(ArgumentShapeError::MissingRequired(vec!["file_path".to_string()]))
    );
    assert_eq!(
      check_argument_shape(&spec, &json!({"file_path": "a.xlsx", "path": "b"})),
      Err(ArgumentShapeError::Unexpected(vec!["path".to_string()]))
    );
    assert!(check_argument_shape(&spec, &json!({"file_path": "a.xlsx"})).is_ok());
  }

  #[test]
  fn non_object_arguments_are_rejected() {
    let spec = excel_read_tool();
    assert_eq!(
      check_argument_shape(&spec, &json!(["a.xlsx"])),
      Err(ArgumentShapeError::NotAnObject("array".to_string()))
    );
  }

  #[test]
  fn sanitize_strips_quotes_and_blocks_traversal() {
    let base = Path::new("/srv/app");
    assert_eq!(
      sanitize_path("\"uploads/data.xlsx\"", base).expect("inside"),
      PathBuf::from("/srv/app/uploads/data.xlsx")
    );
    assert!(matches!(
      sanitize_path("../etc/passwd", base),
      Err(FunctionCallError::PermissionDenied(_))
    ));
    assert!(matches!(
      sanitize_path("/etc/passwd", base),
      Err(FunctionCallError::PermissionDenied(_))
    ));
  }
}
