//! In-process store
//!
//! Same contracts as the SQLite store, scoped to one process. Used for
//! single-process runs and as the default fixture in tests.

use crate::storage::traits::{
    FrontierStore, PolitenessStore, StatsStore, StorageError, StorageResult,
};
use crate::storage::CrawlTask;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct MemoryState {
    queue: VecDeque<CrawlTask>,
    seen: HashSet<String>,
    hosts: HashMap<String, DateTime<Utc>>,
    stats: BTreeMap<String, u64>,
    heartbeat: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// In-memory implementation of every store trait
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    arrivals: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StorageResult<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Snapshot of the pending tasks, head first
    pub fn pending(&self) -> StorageResult<Vec<CrawlTask>> {
        Ok(self.state()?.queue.iter().cloned().collect())
    }

    /// Whether a URL has been marked seen
    pub fn is_seen(&self, url: &str) -> StorageResult<bool> {
        Ok(self.state()?.seen.contains(url))
    }
}

#[async_trait]
impl FrontierStore for MemoryStore {
    async fn enqueue(&self, task: &CrawlTask) -> StorageResult<()> {
        self.state()?.queue.push_back(task.clone());
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> StorageResult<Option<CrawlTask>> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register before checking so an enqueue in between is not missed.
            let arrived = self.arrivals.notified();
            let next = self.state()?.queue.pop_front();
            if let Some(task) = next {
                return Ok(Some(task));
            }
            if tokio::time::timeout_at(deadline, arrived).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn mark_seen(&self, url: &str) -> StorageResult<bool> {
        Ok(self.state()?.seen.insert(url.to_string()))
    }

    async fn queue_depth(&self) -> StorageResult<u64> {
        Ok(self.state()?.queue.len() as u64)
    }
}

#[async_trait]
impl PolitenessStore for MemoryStore {
    async fn last_fetch(&self, host: &str) -> StorageResult<Option<DateTime<Utc>>> {
        Ok(self.state()?.hosts.get(host).copied())
    }

    async fn record_fetch(&self, host: &str, at: DateTime<Utc>) -> StorageResult<()> {
        self.state()?.hosts.insert(host.to_string(), at);
        Ok(())
    }
}

#[async_trait]
impl StatsStore for MemoryStore {
    async fn incr_stat(&self, name: &str, by: u64) -> StorageResult<()> {
        *self.state()?.stats.entry(name.to_string()).or_insert(0) += by;
        Ok(())
    }

    async fn stats(&self) -> StorageResult<BTreeMap<String, u64>> {
        Ok(self.state()?.stats.clone())
    }

    async fn set_heartbeat(&self, at: DateTime<Utc>, ttl: Duration) -> StorageResult<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Database(format!("Invalid heartbeat TTL: {}", e)))?;
        self.state()?.heartbeat = Some((at, at + ttl));
        Ok(())
    }

    async fn heartbeat(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let now = Utc::now();
        Ok(self
            .state()?
            .heartbeat
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(ts, _)| ts))
    }
}
