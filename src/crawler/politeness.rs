//! Per-origin request spacing
//!
//! The last fetch time for every origin lives in the shared store, so all
//! workers (and all processes on the same database) space their requests to
//! one origin. The read-then-write is not atomic: two workers can pass the
//! gate together and both fetch after one delay.

use crate::robots::RobotsDecision;
use crate::storage::{PolitenessStore, StorageResult};
use crate::url::authority_key;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// The delay actually honored: whichever of the configured and robots delays is larger
pub fn effective_delay(polite_delay: Duration, robots: &RobotsDecision) -> Duration {
    polite_delay.max(robots.delay())
}

/// Gate that holds a worker back until its target origin may be hit again
#[derive(Clone)]
pub struct PolitenessGate {
    store: Arc<dyn PolitenessStore>,
}

impl PolitenessGate {
    pub fn new(store: Arc<dyn PolitenessStore>) -> Self {
        Self { store }
    }

    /// Waits out the rest of `min_delay` since the origin's last fetch
    ///
    /// Records now as the origin's last fetch before returning, whether or not
    /// it slept. Returns the time spent sleeping.
    ///
    /// Fails without sleeping only when the last fetch cannot be read. A
    /// failed record is logged; the wait has already been served.
    pub async fn wait(&self, url: &Url, min_delay: Duration) -> StorageResult<Duration> {
        let key = authority_key(url);
        let mut slept = Duration::ZERO;

        if let Some(last) = self.store.last_fetch(&key).await? {
            // A last fetch in the future reads as "just now".
            let elapsed = (Utc::now() - last).to_std().unwrap_or(Duration::ZERO);
            if elapsed < min_delay {
                slept = min_delay - elapsed;
                tracing::debug!("Waiting {:?} before fetching from {}", slept, key);
                tokio::time::sleep(slept).await;
            }
        }

        if let Err(e) = self.store.record_fetch(&key, Utc::now()).await {
            tracing::warn!("Failed to record fetch time for {}: {}", key, e);
        }
        Ok(slept)
    }
}
