//! Operator status report
//!
//! Gathers counters, queue depth and heartbeat age from the shared store and
//! prints them for the `stats` command.

use crate::stats::{CrawlStats, Stat, HEARTBEAT_TTL};
use crate::storage::{FrontierStore, StorageResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Snapshot of crawl progress
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub counters: BTreeMap<String, u64>,
    pub queue_depth: u64,
    /// Last live heartbeat, `None` when absent or expired
    pub heartbeat: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
}

impl StatusReport {
    /// Seconds since the last heartbeat
    pub fn heartbeat_age_secs(&self) -> Option<i64> {
        self.heartbeat
            .map(|beat| (self.generated_at - beat).num_seconds().max(0))
    }

    /// Whether some worker has refreshed the heartbeat within its TTL
    pub fn is_active(&self) -> bool {
        self.heartbeat_age_secs()
            .map(|age| (age as u64) < HEARTBEAT_TTL.as_secs())
            .unwrap_or(false)
    }

    pub fn counter(&self, stat: Stat) -> u64 {
        self.counters.get(stat.as_str()).copied().unwrap_or(0)
    }
}

/// Loads a status report from the store
pub async fn load_status(
    stats: &CrawlStats,
    frontier: &dyn FrontierStore,
) -> StorageResult<StatusReport> {
    Ok(StatusReport {
        counters: stats.snapshot().await?,
        queue_depth: frontier.queue_depth().await?,
        heartbeat: stats.heartbeat().await?,
        generated_at: Utc::now(),
    })
}

/// Prints a status report to stdout
pub fn print_status(report: &StatusReport) {
    println!("=== Crawl Status ===\n");

    let state = if report.is_active() { "active" } else { "stale" };
    match report.heartbeat_age_secs() {
        Some(age) => println!("Worker: {} (last heartbeat {}s ago)", state, age),
        None => println!("Worker: {} (no heartbeat)", state),
    }
    println!("Queue depth: {}", report.queue_depth);
    println!();

    println!("Counters:");
    for (name, value) in &report.counters {
        println!("  {}: {}", name, value);
    }
    println!();

    let stored = report.counter(Stat::Stored);
    let attempted = stored
        + report.counter(Stat::FetchErrors)
        + report.counter(Stat::ExtractErrors)
        + report.counter(Stat::StoreErrors);
    let success_rate = if attempted > 0 {
        (stored as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} fetched pages stored)",
        success_rate, stored, attempted
    );
}
