//! Search index backends
//!
//! Ranking is not a concern here: a query is a case-insensitive substring
//! match over title, content and URL, newest first.

use crate::publish::{IndexedDocument, PublishError, PublishResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// One page of search results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPage {
    /// Total matches across all pages
    pub found: u64,
    pub page: u32,
    pub per_page: u32,
    pub hits: Vec<IndexedDocument>,
}

/// Document index keyed by collection and document id
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn ensure_collection(&self, name: &str) -> PublishResult<()>;

    /// Inserts or replaces the document with the same id
    async fn upsert(&self, collection: &str, document: &IndexedDocument) -> PublishResult<()>;

    /// `page` is 1-based; 0 is treated as 1
    async fn search(
        &self,
        collection: &str,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> PublishResult<SearchPage>;

    async fn find_by_url(
        &self,
        collection: &str,
        url: &str,
    ) -> PublishResult<Option<IndexedDocument>>;
}

/// Search index stored in the crawl database
#[derive(Clone)]
pub struct SqliteIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteIndex {
    /// Uses an already-initialized connection, usually the crawl store's
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn open(path: &Path) -> PublishResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        crate::storage::initialize_schema(&conn)?;
        Ok(Self::new(Arc::new(Mutex::new(conn))))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> PublishResult<T> {
        let conn = self.conn.lock().map_err(|_| PublishError::LockPoisoned)?;
        Ok(f(&conn)?)
    }

    fn has_collection(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT COUNT(*) FROM collections WHERE name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)
    }
}

fn document_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexedDocument> {
    Ok(IndexedDocument {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        content: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        storage_key: row.get(4)?,
        fetched_at: row.get(5)?,
    })
}

#[async_trait]
impl SearchIndex for SqliteIndex {
    async fn ensure_collection(&self, name: &str) -> PublishResult<()> {
        let now = Utc::now().timestamp();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?1, ?2)",
                params![name, now],
            )
        })?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, document: &IndexedDocument) -> PublishResult<()> {
        let exists = self.with_conn(|conn| Self::has_collection(conn, collection))?;
        if !exists {
            return Err(PublishError::Index(format!(
                "Collection {} does not exist",
                collection
            )));
        }

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (collection, id, url, title, content, storage_key, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    url = excluded.url,
                    title = excluded.title,
                    content = excluded.content,
                    storage_key = excluded.storage_key,
                    fetched_at = excluded.fetched_at",
                params![
                    collection,
                    document.id,
                    document.url,
                    document.title,
                    document.content,
                    document.storage_key,
                    document.fetched_at
                ],
            )
        })?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> PublishResult<SearchPage> {
        let page = page.max(1);
        let offset = (page as i64 - 1).saturating_mul(per_page as i64);
        let needle = query.trim().to_lowercase();

        let (found, hits) = self.with_conn(|conn| {
            const MATCH: &str = "collection = ?1 AND (?2 = ''
                 OR instr(lower(coalesce(title, '')), ?2) > 0
                 OR instr(lower(coalesce(content, '')), ?2) > 0
                 OR instr(lower(url), ?2) > 0)";

            let found: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM documents WHERE {}", MATCH),
                params![collection, needle],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT id, url, title, content, storage_key, fetched_at FROM documents
                 WHERE {} ORDER BY fetched_at DESC, id LIMIT ?3 OFFSET ?4",
                MATCH
            ))?;
            let hits = stmt
                .query_map(
                    params![collection, needle, per_page as i64, offset],
                    document_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok((found, hits))
        })?;

        Ok(SearchPage {
            found: found.max(0) as u64,
            page,
            per_page,
            hits,
        })
    }

    async fn find_by_url(
        &self,
        collection: &str,
        url: &str,
    ) -> PublishResult<Option<IndexedDocument>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, url, title, content, storage_key, fetched_at FROM documents
                 WHERE collection = ?1 AND url = ?2
                 ORDER BY fetched_at DESC LIMIT 1",
                params![collection, url],
                document_from_row,
            )
            .optional()
        })
    }
}

/// In-memory search index
#[derive(Debug, Default)]
pub struct MemoryIndex {
    collections: Mutex<HashMap<String, BTreeMap<String, IndexedDocument>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub fn len(&self, collection: &str) -> PublishResult<usize> {
        Ok(self
            .collections
            .lock()
            .map_err(|_| PublishError::LockPoisoned)?
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0))
    }

    fn matches(document: &IndexedDocument, needle: &str) -> bool {
        needle.is_empty()
            || document.title.to_lowercase().contains(needle)
            || document.content.to_lowercase().contains(needle)
            || document.url.to_lowercase().contains(needle)
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn ensure_collection(&self, name: &str) -> PublishResult<()> {
        self.collections
            .lock()
            .map_err(|_| PublishError::LockPoisoned)?
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn upsert(&self, collection: &str, document: &IndexedDocument) -> PublishResult<()> {
        let mut collections = self
            .collections
            .lock()
            .map_err(|_| PublishError::LockPoisoned)?;
        let docs = collections.get_mut(collection).ok_or_else(|| {
            PublishError::Index(format!("Collection {} does not exist", collection))
        })?;
        docs.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> PublishResult<SearchPage> {
        let page = page.max(1);
        let needle = query.trim().to_lowercase();

        let mut matched: Vec<IndexedDocument> = self
            .collections
            .lock()
            .map_err(|_| PublishError::LockPoisoned)?
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| Self::matches(doc, &needle))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matched.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at).then_with(|| a.id.cmp(&b.id)));

        let found = matched.len() as u64;
        let skip = (page as usize - 1).saturating_mul(per_page as usize);
        let hits = matched
            .into_iter()
            .skip(skip)
            .take(per_page as usize)
            .collect();

        Ok(SearchPage {
            found,
            page,
            per_page,
            hits,
        })
    }

    async fn find_by_url(
        &self,
        collection: &str,
        url: &str,
    ) -> PublishResult<Option<IndexedDocument>> {
        Ok(self
            .collections
            .lock()
            .map_err(|_| PublishError::LockPoisoned)?
            .get(collection)
            .and_then(|docs| docs.values().find(|doc| doc.url == url).cloned()))
    }
}
