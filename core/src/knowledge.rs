// Sage Knowledge Module
// Local document store behind the kb_search tool

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use bm25::{Embedder, EmbedderBuilder, Scorer, Tokenizer};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use text_splitter::{ChunkConfig, ChunkConfigError, TextSplitter};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::tools::handlers::excel_read::workbook_text;

pub const CHUNK_SIZE: usize = 600;
pub const CHUNK_OVERLAP: usize = 100;
const TOP_K: usize = 5;
const RERANK_POOL: usize = 15;
const PHRASE_BONUS: f32 = 2.0;
const NO_RESULTS: &str = "No relevant information found in the knowledge base.";

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "py", "json", "csv"];
const HTML_EXTENSIONS: &[&str] = &["html", "htm"];
const SHEET_EXTENSIONS: &[&str] = &["xlsx", "xls"];

#[allow(clippy::expect_used)]
static HTML_TAG: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<[^>]+>").expect("tag pattern"));

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
  #[error("knowledge store io failed for {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("knowledge store {path} is not valid: {source}")]
  Corrupt {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported document type: {0}")]
  Unsupported(String),

  #[error("failed to extract text: {0}")]
  Extract(String),

  #[error("'{0}' is not in the knowledge base")]
  NotFound(String),

  #[error("invalid chunk settings: {0}")]
  Chunking(#[from] ChunkConfigError),
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;

/// Document retrieval used by the `kb_search` tool and the CLI.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
  async fn search(&self, query: &str, embed_model: &str, rerank_model: Option<&str>)
  -> Result<String>;

  /// Indexes a document and returns a status line.
  async fn add_document(&self, path: &Path, embed_model: &str) -> Result<String>;

  async fn list_files(&self, embed_model: &str) -> Result<Vec<String>>;

  async fn delete_file(&self, name: &str, embed_model: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collection {
  chunks: Vec<StoredChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
  /// SHA-256 of the text.
  id: String,
  source: String,
  text: String,
}

/// JSON-backed collections, one file per embedding model.
pub struct LocalKnowledgeBase {
  store_dir: PathBuf,
  write_lock: Mutex<()>,
}

impl LocalKnowledgeBase {
  pub fn new(store_dir: impl Into<PathBuf>) -> Self {
    Self {
      store_dir: store_dir.into(),
      write_lock: Mutex::new(()),
    }
  }

  fn collection_path(&self, embed_model: &str) -> PathBuf {
    let safe: String = embed_model
      .chars()
      .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
      .collect();
    self.store_dir.join(format!("kb_{safe}.json"))
  }

  async fn load(&self, embed_model: &str) -> Result<Collection> {
    let path = self.collection_path(embed_model);
    match tokio::fs::read(&path).await {
      Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| KnowledgeError::Corrupt { path, source }),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Collection::default()),
      Err(source) => Err(KnowledgeError::Io { path, source }),
    }
  }

  async fn store(&self, embed_model: &str, collection: &Collection) -> Result<()> {
    tokio::fs::create_dir_all(&self.store_dir)
      .await
      .map_err(|source| KnowledgeError::Io {
        path: self.store_dir.clone(),
        source,
      })?;
    let path = self.collection_path(embed_model);
    let body = serde_json::to_vec(collection).map_err(|source| KnowledgeError::Corrupt {
      path: path.clone(),
      source,
    })?;
    tokio::fs::write(&path, body)
      .await
      .map_err(|source| KnowledgeError::Io { path, source })
  }
}

#[async_trait]
impl KnowledgeRetriever for LocalKnowledgeBase {
  async fn search(
    &self,
    query: &str,
    embed_model: &str,
    rerank_model: Option<&str>,
  ) -> Result<String> {
    let collection = self.load(embed_model).await?;
    if TermTokenizer.tokenize(query).is_empty() || collection.chunks.is_empty() {
      return Ok(NO_RESULTS.to_string());
    }

    let corpus: Vec<&str> = collection.chunks.iter().map(|chunk| chunk.text.as_str()).collect();
    let embedder: Embedder<u32, TermTokenizer> =
      EmbedderBuilder::with_tokenizer_and_fit_to_corpus(TermTokenizer, &corpus).build();
    let mut scorer = Scorer::<usize>::new();
    for (index, chunk) in collection.chunks.iter().enumerate() {
      scorer.upsert(&index, embedder.embed(&chunk.text));
    }

    let mut scored: Vec<(f32, &StoredChunk)> = scorer
      .matches(&embedder.embed(query))
      .into_iter()
      .filter(|doc| doc.score > 0.0)
      .filter_map(|doc| collection.chunks.get(doc.id).map(|chunk| (doc.score, chunk)))
      .collect();
    sort_by_score(&mut scored);

    if let Some(model) = rerank_model {
      debug!(rerank_model = model, candidates = scored.len().min(RERANK_POOL), "reranking");
      scored.truncate(RERANK_POOL);
      let phrase = query.trim().to_lowercase();
      for (score, chunk) in scored.iter_mut() {
        if !phrase.is_empty() && chunk.text.to_lowercase().contains(&phrase) {
          *score += PHRASE_BONUS;
        }
      }
      sort_by_score(&mut scored);
    }

    if scored.is_empty() {
      return Ok(NO_RESULTS.to_string());
    }
    let rendered: Vec<String> = scored
      .into_iter()
      .take(TOP_K)
      .map(|(_, chunk)| format!("[Source: {}]\n{}", chunk.source, chunk.text))
      .collect();
    Ok(rendered.join("\n\n"))
  }

  async fn add_document(&self, path: &Path, embed_model: &str) -> Result<String> {
    let name = path
      .file_name()
      .and_then(|name| name.to_str())
      .ok_or_else(|| KnowledgeError::Unsupported(path.display().to_string()))?
      .to_string();
    let text = extract_text(path).await?;
    if text.trim().is_empty() {
      return Ok(format!("No text extracted from {name}"));
    }

    let _guard = self.write_lock.lock().await;
    let mut collection = self.load(embed_model).await?;
    let mut known: HashSet<String> = collection.chunks.iter().map(|c| c.id.clone()).collect();

    let mut added = 0;
    for chunk in chunk_text(&text, CHUNK_SIZE, CHUNK_OVERLAP)? {
      let id = content_hash(&chunk);
      if !known.insert(id.clone()) {
        continue;
      }
      collection.chunks.push(StoredChunk {
        id,
        source: name.clone(),
        text: chunk,
      });
      added += 1;
    }

    if added == 0 {
      return Ok(format!("No new content in {name}"));
    }
    self.store(embed_model, &collection).await?;
    info!(file = %name, chunks = added, embed_model, "document indexed");
    Ok(format!("Added {added} chunks from {name}"))
  }

  async fn list_files(&self, embed_model: &str) -> Result<Vec<String>> {
    let collection = self.load(embed_model).await?;
    let mut names: Vec<String> = collection
      .chunks
      .into_iter()
      .map(|chunk| chunk.source)
      .collect::<HashSet<_>>()
      .into_iter()
      .collect();
    names.sort();
    Ok(names)
  }

  async fn delete_file(&self, name: &str, embed_model: &str) -> Result<()> {
    let _guard = self.write_lock.lock().await;
    let mut collection = self.load(embed_model).await?;
    let before = collection.chunks.len();
    collection.chunks.retain(|chunk| chunk.source != name);
    if collection.chunks.len() == before {
      return Err(KnowledgeError::NotFound(name.to_string()));
    }
    self.store(embed_model, &collection).await?;
    info!(file = name, embed_model, "document removed");
    Ok(())
  }
}

async fn extract_text(path: &Path) -> Result<String> {
  let ext = path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(str::to_ascii_lowercase)
    .unwrap_or_default();
  let io = |source| KnowledgeError::Io {
    path: path.to_path_buf(),
    source,
  };

  if TEXT_EXTENSIONS.contains(&ext.as_str()) {
    let bytes = tokio::fs::read(path).await.map_err(io)?;
    return Ok(String::from_utf8_lossy(&bytes).into_owned());
  }
  if HTML_EXTENSIONS.contains(&ext.as_str()) {
    let bytes = tokio::fs::read(path).await.map_err(io)?;
    let html = String::from_utf8_lossy(&bytes);
    return Ok(HTML_TAG.replace_all(&html, " ").into_owned());
  }
  if SHEET_EXTENSIONS.contains(&ext.as_str()) {
    let owned = path.to_path_buf();
    return tokio::task::spawn_blocking(move || workbook_text(&owned))
      .await
      .map_err(|e| KnowledgeError::Extract(e.to_string()))?
      .map_err(KnowledgeError::Extract);
  }
  Err(KnowledgeError::Unsupported(format!(".{ext}")))
}

/// Splits `text` into chunks of at most `size` characters that overlap by
/// up to `overlap`, preferring paragraph, then line, then sentence breaks.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
  let splitter = TextSplitter::new(ChunkConfig::new(size).with_overlap(overlap)?);
  Ok(splitter.chunks(text).map(str::to_string).collect())
}

fn content_hash(text: &str) -> String {
  hex::encode(Sha256::digest(text.as_bytes()))
}

fn is_cjk(c: char) -> bool {
  matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

/// Lowercased alphanumeric words; CJK ideographs count as one term each.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermTokenizer;

impl Tokenizer for TermTokenizer {
  fn tokenize(&self, input_text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    for c in input_text.chars() {
      if is_cjk(c) {
        if !current.is_empty() {
          terms.push(std::mem::take(&mut current));
        }
        terms.push(c.to_string());
      } else if c.is_alphanumeric() {
        current.extend(c.to_lowercase());
      } else if !current.is_empty() {
        terms.push(std::mem::take(&mut current));
      }
    }
    if !current.is_empty() {
      terms.push(current);
    }
    terms
  }
}

fn sort_by_score(scored: &mut [(f32, &StoredChunk)]) {
  scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  const MODEL: &str = "nomic-embed-text";

  #[test]
  fn chunks_respect_size_and_overlap() {
    let paragraph = "Sales grew in the north region. ".repeat(12);
    let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}");
    let chunks = chunk_text(&text, CHUNK_SIZE, CHUNK_OVERLAP).expect("chunks");

    assert!(chunks.len() >= 2);
    assert!(chunks.iter().all(|chunk| chunk.chars().count() <= CHUNK_SIZE));
    assert!(chunks[0].ends_with("region."));
  }

  #[test]
  fn short_text_is_one_chunk() {
    assert_eq!(
      chunk_text("  hello  ", CHUNK_SIZE, CHUNK_OVERLAP).expect("chunks"),
      vec!["hello"]
    );
    assert!(chunk_text("", CHUNK_SIZE, CHUNK_OVERLAP).expect("chunks").is_empty());
  }

  #[test]
  fn overlap_must_be_smaller_than_size() {
    assert!(matches!(
      chunk_text("text", 100, 100),
      Err(KnowledgeError::Chunking(_))
    ));
  }

  #[test]
  fn tokenize_splits_cjk_per_character() {
    assert_eq!(
      TermTokenizer.tokenize("Revenue 收入, revenue!"),
      vec!["revenue", "收", "入", "revenue"]
    );
  }

  #[tokio::test]
  async fn add_search_list_delete() {
    let dir = tempfile::tempdir().expect("tempdir");
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).expect("mkdir");
    std::fs::write(docs.join("policy.md"), "Refunds are issued within 14 days.").expect("write");
    std::fs::write(
      docs.join("page.html"),
      "<html><style>p{}</style><p>Shipping takes 3 days.</p></html>",
    )
    .expect("write");

    let kb = LocalKnowledgeBase::new(dir.path().join("store"));
    assert_eq!(
      kb.add_document(&docs.join("policy.md"), MODEL).await.expect("add"),
      "Added 1 chunks from policy.md"
    );
    assert_eq!(
      kb.add_document(&docs.join("policy.md"), MODEL).await.expect("re-add"),
      "No new content in policy.md"
    );
    kb.add_document(&docs.join("page.html"), MODEL).await.expect("add html");

    assert_eq!(
      kb.list_files(MODEL).await.expect("list"),
      vec!["page.html", "policy.md"]
    );

    let hit = kb.search("how many days for refunds", MODEL, None).await.expect("search");
    assert!(hit.starts_with("[Source: policy.md]\nRefunds are issued"), "{hit}");

    let shipping = kb.search("shipping", MODEL, Some("rerank")).await.expect("search");
    assert_eq!(shipping, "[Source: page.html]\nShipping takes 3 days.");

    assert_eq!(kb.search("unrelated", MODEL, None).await.expect("search"), NO_RESULTS);

    kb.delete_file("policy.md", MODEL).await.expect("delete");
    assert_eq!(kb.list_files(MODEL).await.expect("list"), vec!["page.html"]);
    assert!(matches!(
      kb.delete_file("policy.md", MODEL).await,
      Err(KnowledgeError::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn rerank_lifts_exact_phrase_matches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scattered = dir.path().join("scattered.txt");
    let exact = dir.path().join("exact.txt");
    std::fs::write(&scattered, "North sales: north north sales figures in the north.").expect("write");
    std::fs::write(&exact, "Quarterly report on sales in the north region with long commentary.")
      .expect("write");
    let kb = LocalKnowledgeBase::new(dir.path().join("store"));
    kb.add_document(&scattered, MODEL).await.expect("add");
    kb.add_document(&exact, MODEL).await.expect("add");

    let hits = kb.search("sales in the north", MODEL, Some("rerank")).await.expect("search");
    assert!(hits.starts_with("[Source: exact.txt]"), "{hits}");
    assert!(hits.contains("[Source: scattered.txt]"), "{hits}");
  }

  #[tokio::test]
  async fn collections_are_per_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("a.txt");
    std::fs::write(&file, "alpha beta").expect("write");
    let kb = LocalKnowledgeBase::new(dir.path().join("store"));

    kb.add_document(&file, "bge-m3:latest").await.expect("add");
    assert!(kb.list_files(MODEL).await.expect("list").is_empty());
    assert!(dir.path().join("store").join("kb_bge-m3_latest.json").exists());
  }

  #[tokio::test]
  async fn unsupported_extension_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("image.png");
    std::fs::write(&file, b"\x89PNG").expect("write");
    let err = LocalKnowledgeBase::new(dir.path())
      .add_document(&file, MODEL)
      .await
      .expect_err("unsupported");
    assert!(matches!(err, KnowledgeError::Unsupported(_)));
  }
}
