//! Storage module for the shared crawl state
//!
//! This module holds everything workers coordinate through:
//! - The frontier queue of pending crawl tasks
//! - The seen-URL set used for deduplication
//! - Per-origin last-fetch timestamps for politeness
//! - Crawl counters and the liveness heartbeat
//!
//! Two backends implement the traits: a SQLite store shared by every worker
//! process pointed at the same database file, and an in-memory store for
//! single-process runs and tests.

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use schema::initialize_schema;
pub use sqlite::SqliteStore;
pub use traits::{FrontierStore, PolitenessStore, StatsStore, StorageError, StorageResult};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Opens (or creates) the shared SQLite store at `path`
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}

/// A unit of work in the frontier
///
/// Serialized as JSON in the queue. `attempt` is absent from records written
/// by older producers and defaults to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTask {
    pub url: String,
    pub depth: u32,
    #[serde(default, skip_serializing_if = "is_first_attempt")]
    pub attempt: u32,
}

fn is_first_attempt(attempt: &u32) -> bool {
    *attempt == 0
}

impl CrawlTask {
    /// A fresh task at the given depth
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
            attempt: 0,
        }
    }

    /// A seed task (depth 0)
    pub fn seed(url: impl Into<String>) -> Self {
        Self::new(url, 0)
    }

    /// The next attempt at this task's depth, fetching `url`
    ///
    /// Workers pass the normalized form so the retry skips renormalizing.
    pub fn retry_as(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: self.depth,
            attempt: self.attempt + 1,
        }
    }

    /// Whether this task is a redelivery of one that already passed dedup
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }

    pub fn to_json(&self) -> StorageResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> StorageResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}
