//! Crawler module for fetching and processing pages
//!
//! This module contains the crawl worker and its collaborators:
//! - HTTP fetching with a size cap
//! - HTML to markdown extraction and link discovery
//! - Per-origin politeness
//! - The worker loop and the pool that runs N of them

mod extract;
mod fetcher;
mod politeness;
mod scheduler;
mod worker;

pub use extract::{ExtractError, Extracted, Extractor, HtmlExtractor};
pub use fetcher::{build_http_client, FetchError, Fetcher, MAX_REDIRECTS};
pub use politeness::{effective_delay, PolitenessGate};
pub use scheduler::WorkerPool;
pub use worker::{CrawlContext, TaskOutcome, Worker, WorkerSettings, IDLE_DELAY};

pub use crate::storage::CrawlTask;
