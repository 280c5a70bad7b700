//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the store traits.
//! Several worker processes may open the same database file; every
//! cross-worker guarantee rests on a single SQL statement.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    FrontierStore, PolitenessStore, StatsStore, StorageError, StorageResult,
};
use crate::storage::CrawlTask;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// How often an empty frontier is re-polled while a dequeue waits
const DEQUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// SQLite storage backend
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        // Other processes hold the write lock briefly; wait rather than fail.
        conn.busy_timeout(Duration::from_secs(5))?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Shared handle to the underlying connection
    ///
    /// The SQLite search index keeps its documents in the same file.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StorageResult<T> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(&conn)?)
    }

    fn pop_payload(&self) -> StorageResult<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "DELETE FROM frontier
                 WHERE id = (SELECT id FROM frontier ORDER BY id LIMIT 1)
                 RETURNING payload",
                [],
                |row| row.get(0),
            )
            .optional()
        })
    }
}

#[async_trait]
impl FrontierStore for SqliteStore {
    async fn enqueue(&self, task: &CrawlTask) -> StorageResult<()> {
        let payload = task.to_json()?;
        let now = Utc::now().timestamp_millis();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO frontier (payload, enqueued_at) VALUES (?1, ?2)",
                params![payload, now],
            )
        })?;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> StorageResult<Option<CrawlTask>> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.pop_payload()? {
                Some(payload) => match CrawlTask::from_json(&payload) {
                    Ok(task) => return Ok(Some(task)),
                    Err(e) => {
                        tracing::warn!("Dropping malformed frontier record {:?}: {}", payload, e);
                    }
                },
                None => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    tokio::time::sleep_until(deadline.min(Instant::now() + DEQUEUE_POLL_INTERVAL))
                        .await;
                }
            }
        }
    }

    async fn mark_seen(&self, url: &str) -> StorageResult<bool> {
        let now = Utc::now().timestamp_millis();
        let inserted = self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO seen (url, seen_at) VALUES (?1, ?2)",
                params![url, now],
            )
        })?;
        Ok(inserted == 1)
    }

    async fn queue_depth(&self) -> StorageResult<u64> {
        let count: i64 =
            self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM frontier", [], |row| row.get(0)))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl PolitenessStore for SqliteStore {
    async fn last_fetch(&self, host: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let ms: Option<i64> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT last_fetch_ms FROM host_politeness WHERE host = ?1",
                params![host],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }

    async fn record_fetch(&self, host: &str, at: DateTime<Utc>) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO host_politeness (host, last_fetch_ms) VALUES (?1, ?2)
                 ON CONFLICT(host) DO UPDATE SET last_fetch_ms = excluded.last_fetch_ms",
                params![host, at.timestamp_millis()],
            )
        })?;
        Ok(())
    }
}

#[async_trait]
impl StatsStore for SqliteStore {
    async fn incr_stat(&self, name: &str, by: u64) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO crawl_stats (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = value + excluded.value",
                params![name, by as i64],
            )
        })?;
        Ok(())
    }

    async fn stats(&self) -> StorageResult<BTreeMap<String, u64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name, value FROM crawl_stats")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let stats = rows
                .map(|row| row.map(|(name, value)| (name, value.max(0) as u64)))
                .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
            Ok(stats)
        })
    }

    async fn set_heartbeat(&self, at: DateTime<Utc>, ttl: Duration) -> StorageResult<()> {
        let ts = at.timestamp_millis();
        let expires_at = ts + ttl.as_millis() as i64;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO heartbeat (id, ts, expires_at) VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET ts = excluded.ts, expires_at = excluded.expires_at",
                params![ts, expires_at],
            )
        })?;
        Ok(())
    }

    async fn heartbeat(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let now = Utc::now().timestamp_millis();
        let ts: Option<i64> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT ts FROM heartbeat WHERE id = 1 AND expires_at > ?1",
                params![now],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(ts.and_then(|ts| Utc.timestamp_millis_opt(ts).single()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_in_memory() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert_eq!(store.queue_depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.enqueue(&CrawlTask::seed("https://a.example/1")).await.unwrap();
        store.enqueue(&CrawlTask::seed("https://a.example/2")).await.unwrap();
        assert_eq!(store.queue_depth().await.unwrap(), 2);

        let first = store.dequeue(Duration::from_millis(10)).await.unwrap().unwrap();
        let second = store.dequeue(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.url, "https://a.example/1");
        assert_eq!(second.url, "https://a.example/2");
        assert_eq!(store.queue_depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dequeue_empty_times_out() {
        let store = SqliteStore::new_in_memory().unwrap();
        let started = std::time::Instant::now();
        let task = store.dequeue(Duration::from_millis(150)).await.unwrap();
        assert!(task.is_none());
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_dequeue_sees_late_enqueue() {
        let store = SqliteStore::new_in_memory().unwrap();
        let producer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            producer
                .enqueue(&CrawlTask::seed("https://late.example/"))
                .await
                .unwrap();
        });

        let task = store.dequeue(Duration::from_secs(2)).await.unwrap();
        assert_eq!(task.unwrap().url, "https://late.example/");
    }

    #[tokio::test]
    async fn test_malformed_record_is_dropped() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO frontier (payload, enqueued_at) VALUES ('{broken', 0)",
                    [],
                )
            })
            .unwrap();
        store.enqueue(&CrawlTask::seed("https://a.example/")).await.unwrap();

        let task = store.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(task.unwrap().url, "https://a.example/");
        assert_eq!(store.queue_depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_seen_first_only() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.mark_seen("https://a.example/").await.unwrap());
        assert!(!store.mark_seen("https://a.example/").await.unwrap());
        assert!(store.mark_seen("https://a.example/other").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_consumers_never_share_a_task() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");
        let producer = SqliteStore::new(&path).unwrap();
        for i in 0..40 {
            producer
                .enqueue(&CrawlTask::seed(format!("https://a.example/{}", i)))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            // Separate connections, as separate worker processes would have.
            let store = SqliteStore::new(&path).unwrap();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(task) = store.dequeue(Duration::from_millis(50)).await.unwrap() {
                    got.push(task.url);
                }
                got
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        let unique: HashSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), 40);
        assert_eq!(unique.len(), 40);
    }

    #[tokio::test]
    async fn test_host_politeness_roundtrip() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.last_fetch("https://a.example").await.unwrap().is_none());

        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        store.record_fetch("https://a.example", at).await.unwrap();
        assert_eq!(store.last_fetch("https://a.example").await.unwrap(), Some(at));

        let later = Utc.timestamp_millis_opt(1_700_000_005_000).unwrap();
        store.record_fetch("https://a.example", later).await.unwrap();
        assert_eq!(
            store.last_fetch("https://a.example").await.unwrap(),
            Some(later)
        );
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.incr_stat("fetched", 1).await.unwrap();
        store.incr_stat("fetched", 2).await.unwrap();
        store.incr_stat("stored", 1).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.get("fetched"), Some(&3));
        assert_eq!(stats.get("stored"), Some(&1));
        assert_eq!(stats.get("indexed"), None);
    }

    #[tokio::test]
    async fn test_heartbeat_expires() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.heartbeat().await.unwrap().is_none());

        let now = Utc::now();
        store
            .set_heartbeat(now, Duration::from_secs(120))
            .await
            .unwrap();
        let beat = store.heartbeat().await.unwrap().unwrap();
        assert_eq!(beat.timestamp_millis(), now.timestamp_millis());

        let stale = now - chrono::Duration::seconds(300);
        store
            .set_heartbeat(stale, Duration::from_secs(120))
            .await
            .unwrap();
        assert!(store.heartbeat().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_state_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");
        {
            let store = SqliteStore::new(&path).unwrap();
            store.enqueue(&CrawlTask::seed("https://a.example/")).await.unwrap();
            store.mark_seen("https://a.example/").await.unwrap();
            store.incr_stat("fetched", 5).await.unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.queue_depth().await.unwrap(), 1);
        assert!(!store.mark_seen("https://a.example/").await.unwrap());
        assert_eq!(store.stats().await.unwrap().get("fetched"), Some(&5));
    }
}
