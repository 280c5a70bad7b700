//! The crawl worker loop
//!
//! Each dequeued task is driven through a fixed sequence of gates and stages:
//!
//! 1. Normalize the URL
//! 2. Depth bound
//! 3. Domain allow-list
//! 4. Seen-set dedup (skipped for retries)
//! 5. robots.txt
//! 6. Politeness wait
//! 7. Fetch, extract, store, index
//! 8. Enqueue discovered links at depth + 1
//!
//! Stage failures end the task and are counted; they never stop the loop.
//! Only store failures while dequeuing or deduplicating bubble up, and the
//! loop answers those by backing off.

use crate::config::{Config, RetryConfig};
use crate::crawler::extract::{Extractor, HtmlExtractor};
use crate::crawler::fetcher::{build_http_client, Fetcher};
use crate::crawler::politeness::{effective_delay, PolitenessGate};
use crate::publish::Publisher;
use crate::robots::RobotsPolicy;
use crate::stats::{CrawlStats, Stat};
use crate::storage::{CrawlTask, FrontierStore, PolitenessStore, StatsStore, StorageResult};
use crate::url::{domain_allowed, extract_domain, normalize_url};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Pause after an empty dequeue
pub const IDLE_DELAY: Duration = Duration::from_millis(500);

/// Progress is logged every this many tasks per worker
const PROGRESS_INTERVAL: u64 = 25;

/// Crawl limits a worker applies to every task
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_depth: u32,
    pub allow_domains: Vec<String>,
    pub polite_delay: Duration,
    pub dequeue_timeout: Duration,
    pub idle_delay: Duration,
    pub retry: RetryConfig,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_depth: config.crawler.max_depth,
            allow_domains: config.crawler.allow_domains.clone(),
            polite_delay: config.crawler.polite_delay(),
            dequeue_timeout: config.crawler.dequeue_timeout(),
            idle_delay: IDLE_DELAY,
            retry: config.retry.clone(),
        }
    }
}

/// Everything the workers of one pool share
pub struct CrawlContext {
    pub frontier: Arc<dyn FrontierStore>,
    pub gate: PolitenessGate,
    pub robots: RobotsPolicy,
    pub fetcher: Fetcher,
    pub extractor: Arc<dyn Extractor>,
    pub publisher: Publisher,
    pub stats: CrawlStats,
    pub settings: WorkerSettings,
}

impl CrawlContext {
    pub fn new<S>(
        store: Arc<S>,
        fetcher: Fetcher,
        robots: RobotsPolicy,
        extractor: Arc<dyn Extractor>,
        publisher: Publisher,
        settings: WorkerSettings,
    ) -> Self
    where
        S: FrontierStore + PolitenessStore + StatsStore + 'static,
    {
        let politeness: Arc<dyn PolitenessStore> = store.clone();
        let stats: Arc<dyn StatsStore> = store.clone();
        Self {
            frontier: store,
            gate: PolitenessGate::new(politeness),
            robots,
            fetcher,
            extractor,
            publisher,
            stats: CrawlStats::new(stats),
            settings,
        }
    }

    /// Wires up the HTTP client, robots policy and default extractor from config
    pub fn from_config<S>(config: &Config, store: Arc<S>, publisher: Publisher) -> crate::Result<Self>
    where
        S: FrontierStore + PolitenessStore + StatsStore + 'static,
    {
        let client = build_http_client(&config.user_agent, config.crawler.timeout())?;

        let robots = if config.crawler.respect_robots {
            RobotsPolicy::new(client.clone(), config.user_agent.product_token())
        } else {
            RobotsPolicy::disabled(client.clone())
        };

        Ok(Self::new(
            store,
            Fetcher::new(client, config.crawler.max_bytes),
            robots,
            Arc::new(HtmlExtractor::new()),
            publisher,
            WorkerSettings::from_config(config),
        ))
    }
}

/// How a single task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The URL could not be parsed as http(s)
    Invalid,
    TooDeep,
    OffDomain,
    AlreadySeen,
    RobotsDisallowed,
    FetchFailed { retry_scheduled: bool },
    ExtractFailed,
    StoreFailed,
    /// Markdown stored; `links_enqueued` is `None` at the depth limit
    Published {
        indexed: bool,
        links_enqueued: Option<usize>,
    },
}

impl TaskOutcome {
    /// The counter this outcome is recorded under
    pub fn stat(&self) -> Stat {
        match self {
            Self::Invalid => Stat::SkippedInvalid,
            Self::TooDeep => Stat::SkippedMaxDepth,
            Self::OffDomain => Stat::SkippedDomain,
            Self::AlreadySeen => Stat::SkippedSeen,
            Self::RobotsDisallowed => Stat::SkippedRobots,
            Self::FetchFailed { .. } => Stat::FetchErrors,
            Self::ExtractFailed => Stat::ExtractErrors,
            Self::StoreFailed => Stat::StoreErrors,
            Self::Published { .. } => Stat::Stored,
        }
    }
}

/// Exponential backoff for store failures: 1s doubling up to 30s
#[derive(Debug, Clone)]
struct StoreBackoff {
    next: Duration,
}

impl StoreBackoff {
    const INITIAL: Duration = Duration::from_secs(1);
    const MAX: Duration = Duration::from_secs(30);

    fn new() -> Self {
        Self { next: Self::INITIAL }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(Self::MAX);
        delay
    }

    fn reset(&mut self) {
        self.next = Self::INITIAL;
    }
}

/// One crawl loop
pub struct Worker {
    id: usize,
    ctx: Arc<CrawlContext>,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<CrawlContext>) -> Self {
        Self { id, ctx }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Runs until `shutdown` turns true, returning the number of tasks handled
    ///
    /// The flag is checked between tasks; an in-flight task always finishes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        tracing::info!("Worker {} started", self.id);

        let mut backoff = StoreBackoff::new();
        let mut processed: u64 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.run_once().await {
                Ok(Some(outcome)) => {
                    backoff.reset();
                    processed += 1;
                    tracing::trace!("Worker {} task outcome: {:?}", self.id, outcome);
                    if processed % PROGRESS_INTERVAL == 0 {
                        tracing::info!("Worker {} progress: {} tasks handled", self.id, processed);
                    }
                    None
                }
                Ok(None) => {
                    backoff.reset();
                    Some(self.ctx.settings.idle_delay)
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::error!(
                        "Worker {} store error: {}; retrying in {:?}",
                        self.id,
                        e,
                        delay
                    );
                    Some(delay)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("Worker {} stopped after {} tasks", self.id, processed);
        processed
    }

    /// Refreshes the heartbeat, then dequeues and processes at most one task
    ///
    /// Returns `Ok(None)` when the frontier stayed empty for the dequeue timeout.
    pub async fn run_once(&self) -> StorageResult<Option<TaskOutcome>> {
        self.ctx.stats.beat().await;

        let Some(task) = self
            .ctx
            .frontier
            .dequeue(self.ctx.settings.dequeue_timeout)
            .await?
        else {
            return Ok(None);
        };

        self.process_task(task).await.map(Some)
    }

    /// Drives one task through every gate and stage
    pub async fn process_task(&self, task: CrawlTask) -> StorageResult<TaskOutcome> {
        let ctx = &self.ctx;
        let settings = &ctx.settings;

        let url = match normalize_url(&task.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Skipping invalid URL {:?}: {}", task.url, e);
                return Ok(self.finish(TaskOutcome::Invalid).await);
            }
        };

        if task.depth > settings.max_depth {
            tracing::debug!("Skipping {} at depth {}", url, task.depth);
            return Ok(self.finish(TaskOutcome::TooDeep).await);
        }

        let host = extract_domain(&url).unwrap_or_default();
        if !domain_allowed(&host, &settings.allow_domains) {
            tracing::debug!("Skipping {}: domain not allowed", url);
            return Ok(self.finish(TaskOutcome::OffDomain).await);
        }

        if !task.is_retry() {
            let first = match ctx.frontier.mark_seen(url.as_str()).await {
                Ok(first) => first,
                Err(e) => {
                    // Put the task back so it is not lost while the store is down.
                    if let Err(requeue) = ctx.frontier.enqueue(&task).await {
                        tracing::error!("Dropping {} after store failure: {}", task.url, requeue);
                    }
                    return Err(e);
                }
            };
            if !first {
                tracing::debug!("Skipping {}: already seen", url);
                return Ok(self.finish(TaskOutcome::AlreadySeen).await);
            }
        }

        let robots = ctx.robots.decision(&url).await;
        if !robots.allowed {
            tracing::debug!("Skipping {}: disallowed by robots.txt", url);
            return Ok(self.finish(TaskOutcome::RobotsDisallowed).await);
        }

        let delay = effective_delay(settings.polite_delay, &robots);
        if let Err(e) = ctx.gate.wait(&url, delay).await {
            tracing::error!("Politeness record unavailable for {}: {}; waiting {:?}", url, e, delay);
            tokio::time::sleep(delay).await;
        }

        let html = match ctx.fetcher.fetch(&url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Fetch failed for {}: {}", url, e);
                let retry_scheduled = self.schedule_retry(&task, url.as_str()).await;
                return Ok(self.finish(TaskOutcome::FetchFailed { retry_scheduled }).await);
            }
        };

        let extracted = match ctx.extractor.extract(&html) {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::warn!("Extraction failed for {}: {}", url, e);
                return Ok(self.finish(TaskOutcome::ExtractFailed).await);
            }
        };

        let follow_links = task.depth < settings.max_depth;
        let links = if follow_links {
            ctx.extractor.discover_links(&url, &html)
        } else {
            Vec::new()
        };

        let storage_key = match ctx.publisher.store(url.as_str(), &extracted.markdown).await {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Storing markdown failed for {}: {}", url, e);
                return Ok(self.finish(TaskOutcome::StoreFailed).await);
            }
        };
        ctx.stats.incr(Stat::Stored).await;

        let document = ctx.publisher.document_for(
            url.as_str(),
            &extracted.title,
            &extracted.markdown,
            &storage_key,
        );
        let indexed = match ctx.publisher.index(&document).await {
            Ok(()) => {
                ctx.stats.incr(Stat::Indexed).await;
                true
            }
            Err(e) => {
                tracing::warn!("Indexing failed for {}: {}", url, e);
                ctx.stats.incr(Stat::IndexErrors).await;
                false
            }
        };

        let links_enqueued = if follow_links {
            let mut enqueued = 0;
            for link in links {
                match ctx.frontier.enqueue(&CrawlTask::new(link, task.depth + 1)).await {
                    Ok(()) => enqueued += 1,
                    Err(e) => tracing::warn!("Failed to enqueue link from {}: {}", url, e),
                }
            }
            ctx.stats.incr(Stat::LinksEnqueued).await;
            Some(enqueued)
        } else {
            None
        };

        tracing::debug!(
            "Published {} (indexed: {}, links: {:?})",
            url,
            indexed,
            links_enqueued
        );
        Ok(TaskOutcome::Published {
            indexed,
            links_enqueued,
        })
    }

    /// Counts a terminal outcome and hands it back
    async fn finish(&self, outcome: TaskOutcome) -> TaskOutcome {
        self.ctx.stats.incr(outcome.stat()).await;
        outcome
    }

    /// Re-enqueues a failed fetch after a backoff, if attempts remain
    ///
    /// The delayed enqueue runs on a detached task; it is lost if the process
    /// exits first.
    async fn schedule_retry(&self, task: &CrawlTask, url: &str) -> bool {
        let retry = &self.ctx.settings.retry;
        if task.attempt >= retry.max_attempts {
            return false;
        }

        let next = task.retry_as(url);
        let backoff = retry.backoff_for(next.attempt);
        let frontier = Arc::clone(&self.ctx.frontier);

        tracing::info!(
            "Retrying {} in {:?} (attempt {} of {})",
            url,
            backoff,
            next.attempt,
            retry.max_attempts
        );
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            if let Err(e) = frontier.enqueue(&next).await {
                tracing::error!("Failed to re-enqueue {}: {}", next.url, e);
            }
        });

        self.ctx.stats.incr(Stat::FetchRetries).await;
        true
    }
}
