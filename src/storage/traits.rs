//! Storage traits and error types
//!
//! This module defines the trait interfaces for the shared store and the
//! associated error types. Every trait is safe to call from many workers at
//! once; coordination is pushed down into atomic store primitives.

use crate::storage::CrawlTask;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable FIFO of pending crawl tasks plus the seen-URL set
#[async_trait]
pub trait FrontierStore: Send + Sync {
    /// Appends a task to the tail of the queue
    ///
    /// No uniqueness check is made; the same URL may be queued many times.
    async fn enqueue(&self, task: &CrawlTask) -> StorageResult<()>;

    /// Pops the task at the head, waiting up to `timeout` for one to arrive
    ///
    /// Each task is handed to exactly one caller, however many consumers race.
    async fn dequeue(&self, timeout: Duration) -> StorageResult<Option<CrawlTask>>;

    /// Registers a URL as seen
    ///
    /// Returns `true` for the first call with a given URL and `false` for
    /// every later call, atomically with respect to concurrent callers.
    async fn mark_seen(&self, url: &str) -> StorageResult<bool>;

    /// Number of tasks waiting in the queue
    async fn queue_depth(&self) -> StorageResult<u64>;
}

/// Per-host last-fetch records used by the politeness gate
#[async_trait]
pub trait PolitenessStore: Send + Sync {
    async fn last_fetch(&self, host: &str) -> StorageResult<Option<DateTime<Utc>>>;

    async fn record_fetch(&self, host: &str, at: DateTime<Utc>) -> StorageResult<()>;
}

/// Monotonic counters and the worker liveness heartbeat
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn incr_stat(&self, name: &str, by: u64) -> StorageResult<()>;

    /// All counters by name
    async fn stats(&self) -> StorageResult<BTreeMap<String, u64>>;

    /// Overwrites the heartbeat; it reads as absent once `ttl` has passed
    async fn set_heartbeat(&self, at: DateTime<Utc>, ttl: Duration) -> StorageResult<()>;

    /// The last heartbeat, or `None` if it was never set or has expired
    async fn heartbeat(&self) -> StorageResult<Option<DateTime<Utc>>>;
}
