//! Publishing extracted pages
//!
//! A crawled page is published in two steps: its markdown is written to blob
//! storage under a key derived from the URL, then a document pointing at that
//! key is upserted into the search index. Both steps are idempotent per URL.

mod blob;
mod index;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use index::{MemoryIndex, SearchIndex, SearchPage, SqliteIndex};

use crate::config::{BlobConfig, IndexConfig};
use crate::url::url_digest;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Content type recorded for every stored markdown object
pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

/// Maximum number of characters of markdown copied into the index
pub const MAX_INDEXED_CHARS: usize = 200_000;

/// Errors raised by blob storage or the search index
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Blob storage error: {0}")]
    Blob(String),

    #[error("Search index error: {0}")]
    Index(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Stored object is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Index lock poisoned")]
    LockPoisoned,
}

/// Result type for publish operations
pub type PublishResult<T> = Result<T, PublishError>;

/// One search document per crawled URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Hex SHA-256 of the URL
    pub id: String,
    pub url: String,
    pub title: String,
    /// Markdown, truncated to `MAX_INDEXED_CHARS`
    pub content: String,
    pub storage_key: String,
    /// Unix seconds
    pub fetched_at: i64,
}

/// Blob key for a URL: `<prefix><sha256-hex(url)>.md`
///
/// ```
/// use clawdgle::publish::storage_key;
///
/// let key = storage_key("markdown/", "https://a.example/");
/// assert!(key.starts_with("markdown/"));
/// assert!(key.ends_with(".md"));
/// assert_eq!(key.len(), "markdown/".len() + 64 + 3);
/// ```
pub fn storage_key(prefix: &str, url: &str) -> String {
    format!("{}{}.md", prefix, url_digest(url))
}

/// Cuts `text` to at most `max_chars` characters, never splitting a char
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Writes markdown to blob storage and documents to the search index
#[derive(Clone)]
pub struct Publisher {
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn SearchIndex>,
    bucket: String,
    prefix: String,
    collection: String,
}

impl Publisher {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn SearchIndex>,
        blob_config: &BlobConfig,
        index_config: &IndexConfig,
    ) -> Self {
        Self {
            blobs,
            index,
            bucket: blob_config.bucket.clone(),
            prefix: blob_config.prefix.clone(),
            collection: index_config.collection.clone(),
        }
    }

    /// Creates the index collection if it does not exist yet
    pub async fn prepare(&self) -> PublishResult<()> {
        self.index.ensure_collection(&self.collection).await
    }

    pub fn storage_key(&self, url: &str) -> String {
        storage_key(&self.prefix, url)
    }

    /// Stores markdown for a URL, returning the blob key
    ///
    /// Repeated calls for the same URL overwrite the same object.
    pub async fn store(&self, url: &str, markdown: &str) -> PublishResult<String> {
        let key = self.storage_key(url);
        self.blobs
            .put(
                &self.bucket,
                &key,
                markdown.as_bytes().to_vec(),
                MARKDOWN_CONTENT_TYPE,
            )
            .await?;
        Ok(key)
    }

    /// Builds the search document for a stored page, stamped with now
    pub fn document_for(
        &self,
        url: &str,
        title: &str,
        markdown: &str,
        storage_key: &str,
    ) -> IndexedDocument {
        IndexedDocument {
            id: url_digest(url),
            url: url.to_string(),
            title: title.to_string(),
            content: truncate_chars(markdown, MAX_INDEXED_CHARS).to_string(),
            storage_key: storage_key.to_string(),
            fetched_at: Utc::now().timestamp(),
        }
    }

    /// Upserts a document by id
    pub async fn index(&self, document: &IndexedDocument) -> PublishResult<()> {
        self.index.upsert(&self.collection, document).await
    }

    /// Reads stored markdown back
    pub async fn load(&self, storage_key: &str) -> PublishResult<String> {
        let bytes = self.blobs.get(&self.bucket, storage_key).await?;
        Ok(String::from_utf8(bytes)?)
    }

    pub async fn find_by_url(&self, url: &str) -> PublishResult<Option<IndexedDocument>> {
        self.index.find_by_url(&self.collection, url).await
    }

    pub async fn search(&self, query: &str, page: u32, per_page: u32) -> PublishResult<SearchPage> {
        self.index
            .search(&self.collection, query, page, per_page)
            .await
    }
}
