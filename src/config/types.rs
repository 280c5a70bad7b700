use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Clawdgle
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub blob: BlobConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of independent worker loops sharing the frontier
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Timeout for a single page fetch (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of body bytes read per page
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum depth to crawl from seed URLs
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Hosts (and their subdomains) the crawl may visit; empty means unrestricted
    #[serde(default)]
    pub allow_domains: Vec<String>,

    /// Whether robots.txt is consulted before each fetch
    #[serde(default = "default_true")]
    pub respect_robots: bool,

    /// Locally configured floor between two fetches of the same host (seconds)
    #[serde(default = "default_polite_delay_secs")]
    pub polite_delay_secs: u64,

    /// How long a dequeue blocks before reporting an empty frontier (seconds)
    #[serde(default = "default_dequeue_timeout_secs")]
    pub dequeue_timeout_secs: u64,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn polite_delay(&self) -> Duration {
        Duration::from_secs(self.polite_delay_secs)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_secs(self.dequeue_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            max_bytes: default_max_bytes(),
            max_depth: default_max_depth(),
            allow_domains: Vec::new(),
            respect_robots: true,
            polite_delay_secs: default_polite_delay_secs(),
            dequeue_timeout_secs: default_dequeue_timeout_secs(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also the token matched against robots.txt groups
    pub name: String,

    /// Version of the crawler
    pub version: String,

    /// URL with information about the crawler
    #[serde(default)]
    pub contact_url: Option<String>,

    /// Complete User-Agent header, replacing the composed one when set
    #[serde(default)]
    pub header: Option<String>,
}

impl UserAgentConfig {
    /// Returns the User-Agent header value
    ///
    /// Format: `Name/Version (+ContactURL)`, unless an explicit header is set.
    pub fn header_value(&self) -> String {
        if let Some(header) = &self.header {
            return header.clone();
        }

        match &self.contact_url {
            Some(contact) => format!("{}/{} (+{})", self.name, self.version, contact),
            None => format!("{}/{}", self.name, self.version),
        }
    }

    /// Returns the product token used for robots.txt group matching
    pub fn product_token(&self) -> String {
        let header = self.header_value();
        header
            .split(['/', ' '])
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

/// Shared store configuration (frontier, seen set, politeness, stats, index)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

/// Blob storage configuration for rendered markdown
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlobConfig {
    /// Root directory holding one subdirectory per bucket
    #[serde(default = "default_blob_root")]
    pub root: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Key prefix prepended to every object key
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: default_blob_root(),
            bucket: default_bucket(),
            prefix: default_prefix(),
        }
    }
}

/// Search index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

/// Re-enqueue policy for failed fetches
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Number of extra attempts after the first failed fetch; 0 drops the task
    #[serde(default)]
    pub max_attempts: u32,

    /// Base backoff before a retry re-enters the frontier, doubled per attempt
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

impl RetryConfig {
    /// Backoff before re-enqueueing a task that has already failed `attempt` times
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_secs(self.backoff_secs.saturating_mul(factor))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            backoff_secs: default_backoff_secs(),
        }
    }
}

fn default_concurrency() -> u32 {
    4
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_max_bytes() -> usize {
    5_000_000
}

fn default_max_depth() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_polite_delay_secs() -> u64 {
    1
}

fn default_dequeue_timeout_secs() -> u64 {
    5
}

fn default_blob_root() -> String {
    "./blobs".to_string()
}

fn default_bucket() -> String {
    "clawdgle".to_string()
}

fn default_prefix() -> String {
    "markdown/".to_string()
}

fn default_collection() -> String {
    "clawdgle_docs".to_string()
}

fn default_backoff_secs() -> u64 {
    30
}
