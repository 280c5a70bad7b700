//! Crawl counters and worker liveness
//!
//! Every task a worker handles ends in exactly one counter increment, plus
//! `stored` and `links_enqueued` on the success path. Counters only grow.

mod report;

pub use report::{load_status, print_status, StatusReport};

use crate::storage::{StatsStore, StorageResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How long a heartbeat stays visible after it is written
pub const HEARTBEAT_TTL: Duration = Duration::from_secs(120);

/// A named crawl counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    FetchErrors,
    FetchRetries,
    ExtractErrors,
    StoreErrors,
    IndexErrors,
    Stored,
    Indexed,
    SkippedInvalid,
    SkippedSeen,
    SkippedDomain,
    SkippedMaxDepth,
    SkippedRobots,
    LinksEnqueued,
}

impl Stat {
    pub const ALL: [Stat; 13] = [
        Stat::FetchErrors,
        Stat::FetchRetries,
        Stat::ExtractErrors,
        Stat::StoreErrors,
        Stat::IndexErrors,
        Stat::Stored,
        Stat::Indexed,
        Stat::SkippedInvalid,
        Stat::SkippedSeen,
        Stat::SkippedDomain,
        Stat::SkippedMaxDepth,
        Stat::SkippedRobots,
        Stat::LinksEnqueued,
    ];

    /// The counter's name in the store
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchErrors => "fetch_errors",
            Self::FetchRetries => "fetch_retries",
            Self::ExtractErrors => "extract_errors",
            Self::StoreErrors => "store_errors",
            Self::IndexErrors => "index_errors",
            Self::Stored => "stored",
            Self::Indexed => "indexed",
            Self::SkippedInvalid => "skipped_invalid",
            Self::SkippedSeen => "skipped_seen",
            Self::SkippedDomain => "skipped_domain",
            Self::SkippedMaxDepth => "skipped_max_depth",
            Self::SkippedRobots => "skipped_robots",
            Self::LinksEnqueued => "links_enqueued",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stat| stat.as_str() == name)
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter and heartbeat service handed to each worker
#[derive(Clone)]
pub struct CrawlStats {
    store: Arc<dyn StatsStore>,
}

impl CrawlStats {
    pub fn new(store: Arc<dyn StatsStore>) -> Self {
        Self { store }
    }

    /// Increments a counter by one
    ///
    /// Failures are logged and swallowed; a lost increment never stops a task.
    pub async fn incr(&self, stat: Stat) {
        if let Err(e) = self.store.incr_stat(stat.as_str(), 1).await {
            tracing::warn!("Failed to increment {}: {}", stat, e);
        }
    }

    /// Every counter, with zero for the ones never incremented
    pub async fn snapshot(&self) -> StorageResult<BTreeMap<String, u64>> {
        let mut counters = self.store.stats().await?;
        for stat in Stat::ALL {
            counters.entry(stat.as_str().to_string()).or_insert(0);
        }
        Ok(counters)
    }

    pub async fn get(&self, stat: Stat) -> StorageResult<u64> {
        Ok(self
            .store
            .stats()
            .await?
            .get(stat.as_str())
            .copied()
            .unwrap_or(0))
    }

    /// Overwrites the heartbeat with the current time
    pub async fn beat(&self) {
        if let Err(e) = self.store.set_heartbeat(Utc::now(), HEARTBEAT_TTL).await {
            tracing::warn!("Failed to refresh heartbeat: {}", e);
        }
    }

    /// The last heartbeat, if one is still live
    pub async fn heartbeat(&self) -> StorageResult<Option<DateTime<Utc>>> {
        self.store.heartbeat().await
    }
}
