use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{FunctionDefinition, Tool};

/// JSON schema representation for tool input contracts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonSchema {
  String {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
  },
  Integer {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
  },
  Number {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
  },
  Boolean {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
  },
  Array {
    items: Box<JsonSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
  },
  Object {
    properties: BTreeMap<String, JsonSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<Vec<String>>,
  },
}

impl JsonSchema {
  pub fn to_value(&self) -> serde_json::Value {
    serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
  pub name: String,
  pub description: String,
  pub input_schema: JsonSchema,
}

impl ToolSpec {
  pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: JsonSchema) -> Self {
    Self {
      name: name.into(),
      description: description.into(),
      input_schema,
    }
  }

  /// Declared parameter names, in schema order.
  pub fn parameter_names(&self) -> Vec<String> {
    match &self.input_schema {
      JsonSchema::Object { properties, .. } => properties.keys().cloned().collect(),
      _ => Vec::new(),
    }
  }

  pub fn required_parameters(&self) -> &[String] {
    match &self.input_schema {
      JsonSchema::Object {
        required: Some(required),
        ..
      } => required,
      _ => &[],
    }
  }

  pub fn to_model_tool(&self) -> Tool {
    Tool::function(FunctionDefinition {
      name: self.name.clone(),
      description: self.description.clone(),
      parameters: self.input_schema.to_value(),
    })
  }
}

pub const PYTHON_INTERPRETER: &str = "python_interpreter";
pub const EXCEL_READ: &str = "excel_read";
pub const EXCEL_WRITE: &str = "excel_write";
pub const EXCEL_DELETE: &str = "excel_delete";
pub const LIST_FILES: &str = "list_files";
pub const KB_SEARCH: &str = "kb_search";

pub(crate) fn obj(properties: BTreeMap<String, JsonSchema>, required: &[&str]) -> JsonSchema {
  JsonSchema::Object {
    properties,
    required: if required.is_empty() {
      None
    } else {
      Some(required.iter().map(|s| s.to_string()).collect())
    },
  }
}

pub(crate) fn str_field(desc: &str) -> JsonSchema {
  JsonSchema::String {
    description: Some(desc.to_string()),
  }
}

fn int_field(desc: &str) -> JsonSchema {
  JsonSchema::Integer {
    description: Some(desc.to_string()),
  }
}

pub fn python_interpreter_tool() -> ToolSpec {
  let mut props = BTreeMap::new();
  props.insert("code".to_string(), str_field("The python code to execute."));
  ToolSpec::new(
    PYTHON_INTERPRETER,
    "Python Code Interpreter. Use this to analyze data, plot charts, or process files. \n\
     The user's file is ALREADY in the current directory '/workspace'. \n\
     IMPORTANT: If you modify a file, please save it with a NEW filename ending in '_new' or \
     '_processed' (e.g., 'data_new.xlsx') instead of overwriting the original file. This helps \
     the user distinguish the output.",
    obj(props, &["code"]),
  )
}

pub fn excel_read_tool() -> ToolSpec {
  let mut props = BTreeMap::new();
  props.insert("file_path".to_string(), str_field("Path to the spreadsheet"));
  props.insert(
    "sheet_name".to_string(),
    str_field("Optional sheet name, default is the first sheet"),
  );
  props.insert("max_rows".to_string(), int_field("Rows to return, default 20"));
  ToolSpec::new(EXCEL_READ, "Read Excel data.", obj(props, &["file_path"]))
}

pub fn excel_write_tool() -> ToolSpec {
  let mut props = BTreeMap::new();
  props.insert("file_path".to_string(), str_field("Path to the .xlsx file"));
  props.insert(
    "data".to_string(),
    JsonSchema::Array {
      items: Box::new(str_field("Cell value")),
      description: Some(
        "Values to append as a new row, e.g. ['Tom', '18', 'Student']".to_string(),
      ),
    },
  );
  props.insert(
    "sheet_name".to_string(),
    str_field("Optional sheet name, default is the active sheet"),
  );
  ToolSpec::new(
    EXCEL_WRITE,
    "Append a row to an Excel file.",
    obj(props, &["file_path", "data"]),
  )
}

pub fn excel_delete_tool() -> ToolSpec {
  let mut props = BTreeMap::new();
  props.insert("file_path".to_string(), str_field("Path to the .xlsx file"));
  props.insert(
    "row_index".to_string(),
    str_field("1-based rows to delete, e.g. '2,3'"),
  );
  props.insert(
    "target_content".to_string(),
    str_field("Delete every row with a cell containing this text"),
  );
  props.insert(
    "sheet_name".to_string(),
    str_field("Optional sheet name, default is the active sheet"),
  );
  ToolSpec::new(
    EXCEL_DELETE,
    "Delete rows from an Excel file by row number or by content.",
    obj(props, &["file_path"]),
  )
}

pub fn list_files_tool() -> ToolSpec {
  let mut props = BTreeMap::new();
  props.insert(
    "extension".to_string(),
    str_field("Only list files with this extension, e.g. 'xlsx'"),
  );
  ToolSpec::new(
    LIST_FILES,
    "List the files the user has uploaded.",
    obj(props, &[]),
  )
}

/// Offered to the model when retrieval is on; dispatched outside the registry.
pub fn kb_search_tool() -> ToolSpec {
  let mut props = BTreeMap::new();
  props.insert("query".to_string(), str_field("The search query string"));
  ToolSpec::new(KB_SEARCH, "Search the knowledge base.", obj(props, &["query"]))
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn object_schema_omits_null_required_field() {
    let value = list_files_tool().input_schema.to_value();
    assert_eq!(value["type"], "object");
    assert!(value.get("required").is_none());
  }

  #[test]
  fn model_tool_carries_schema() {
    let tool = kb_search_tool().to_model_tool();
    let function = tool.function.expect("function definition");
    assert_eq!(function.name, "kb_search");
    assert_eq!(function.parameters["required"][0], "query");
    assert_eq!(function.parameters["properties"]["query"]["type"], "string");
  }

  #[test]
  fn parameter_names_follow_schema() {
    let spec = excel_read_tool();
    assert_eq!(
      spec.parameter_names(),
      vec!["file_path", "max_rows", "sheet_name"]
    );
    assert_eq!(spec.required_parameters(), ["file_path".to_string()]);
  }
}
