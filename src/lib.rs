//! Clawdgle: a polite crawl worker feeding a markdown search index
//!
//! This crate implements the crawl worker: it pulls tasks from a shared
//! frontier, gates them on depth, domain, dedup and robots.txt, rate-limits
//! per host, fetches and converts pages to markdown, stores the markdown as a
//! blob, indexes it for search and re-enqueues discovered links.

pub mod config;
pub mod crawler;
pub mod publish;
pub mod robots;
pub mod stats;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Clawdgle operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Publish error: {0}")]
    Publish(#[from] publish::PublishError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Extract error: {0}")]
    Extract(#[from] crawler::ExtractError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Clawdgle operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlTask, TaskOutcome, Worker, WorkerPool};
pub use stats::{CrawlStats, Stat};
pub use url::{authority_key, domain_allowed, normalize_url};
