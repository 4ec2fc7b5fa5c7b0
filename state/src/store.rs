use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use sage_protocol::{Message, Role};
use tracing::{debug, info};

const DEFAULT_SLUG: &str = "new_chat";
const SLUG_MAX_CHARS: usize = 20;
const FORBIDDEN_SLUG_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|', '\n', '\r', '\t'];

#[derive(Debug, thiserror::Error)]
pub enum StateError {
  #[error("session io failed for {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("session file {path} is not valid: {source}")]
  Corrupt {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to encode session: {0}")]
  Encode(#[from] serde_json::Error),

  #[error("invalid session id '{0}'")]
  InvalidId(String),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Listing entry for a persisted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
  pub id: String,
  pub path: PathBuf,
}

/// Directory of `{id}.json` files, each holding the ordered message list
/// of one conversation.
#[derive(Debug, Clone)]
pub struct SessionStore {
  dir: PathBuf,
}

impl SessionStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Writes the session and returns its id. A new id is derived from the
  /// first user message when `id` is `None`.
  pub async fn save(&self, id: Option<&str>, messages: &[Message]) -> Result<String> {
    let id = match id {
      Some(id) => validate_id(id)?.to_string(),
      None => session_id_for(messages, Local::now()),
    };

    tokio::fs::create_dir_all(&self.dir)
      .await
      .map_err(|source| StateError::Io {
        path: self.dir.clone(),
        source,
      })?;

    let path = self.path_for(&id);
    let body = serde_json::to_vec_pretty(messages)?;

    // Write then rename so a crash never leaves a truncated session file.
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body)
      .await
      .map_err(|source| StateError::Io {
        path: tmp.clone(),
        source,
      })?;
    tokio::fs::rename(&tmp, &path)
      .await
      .map_err(|source| StateError::Io {
        path: path.clone(),
        source,
      })?;

    debug!(session_id = %id, messages = messages.len(), "session saved");
    Ok(id)
  }

  pub async fn load(&self, id: &str) -> Result<Vec<Message>> {
    let path = self.path_for(validate_id(id)?);
    let bytes = tokio::fs::read(&path)
      .await
      .map_err(|source| StateError::Io {
        path: path.clone(),
        source,
      })?;
    serde_json::from_slice(&bytes).map_err(|source| StateError::Corrupt { path, source })
  }

  /// Sessions newest first. Ids start with a timestamp, so lexical order is
  /// chronological.
  pub async fn list(&self) -> Result<Vec<SessionSummary>> {
    let mut entries = match tokio::fs::read_dir(&self.dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(StateError::Io {
          path: self.dir.clone(),
          source,
        });
      }
    };

    let mut sessions = Vec::new();
    loop {
      let entry = entries
        .next_entry()
        .await
        .map_err(|source| StateError::Io {
          path: self.dir.clone(),
          source,
        })?;
      let Some(entry) = entry else {
        break;
      };
      let path = entry.path();
      if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        continue;
      }
      if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
        sessions.push(SessionSummary {
          id: stem.to_string(),
          path: path.clone(),
        });
      }
    }

    sessions.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(sessions)
  }

  pub async fn delete(&self, id: &str) -> Result<()> {
    let path = self.path_for(validate_id(id)?);
    tokio::fs::remove_file(&path)
      .await
      .map_err(|source| StateError::Io {
        path: path.clone(),
        source,
      })?;
    info!(session_id = %id, "session deleted");
    Ok(())
  }

  fn path_for(&self, id: &str) -> PathBuf {
    self.dir.join(format!("{id}.json"))
  }
}

fn validate_id(id: &str) -> Result<&str> {
  let invalid = id.is_empty()
    || id == "."
    || id == ".."
    || id.contains(['/', '\\'])
    || id.contains("..");
  if invalid {
    return Err(StateError::InvalidId(id.to_string()));
  }
  Ok(id)
}

/// `{YYYYmmdd_HHMMSS}_{slug}` from the first user message.
pub fn session_id_for(messages: &[Message], now: DateTime<Local>) -> String {
  let first_user = messages
    .iter()
    .find(|message| message.role == Role::User)
    .map(Message::text_without_context_file)
    .unwrap_or_default();
  format!("{}_{}", now.format("%Y%m%d_%H%M%S"), session_slug(first_user))
}

/// File-name-safe slug: forbidden characters removed, spaces to `_`,
/// at most 20 characters.
pub fn session_slug(text: &str) -> String {
  let slug: String = text
    .trim()
    .chars()
    .filter(|c| !FORBIDDEN_SLUG_CHARS.contains(c))
    .map(|c| if c == ' ' { '_' } else { c })
    .take(SLUG_MAX_CHARS)
    .collect();

  if slug.is_empty() {
    DEFAULT_SLUG.to_string()
  } else {
    slug
  }
}
