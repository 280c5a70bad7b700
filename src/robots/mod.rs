//! Robots.txt handling module
//!
//! robots.txt is fetched fresh for every task and never cached. Any failure
//! to obtain it (network error, timeout, status >= 400) is treated as
//! permission to crawl with no extra delay.

mod parser;

pub use parser::ParsedRobots;

use crate::url::robots_url;
use std::time::Duration;
use url::Url;

/// Upper bound on a single robots.txt request
pub const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes of robots.txt read before the rest is ignored
pub const MAX_ROBOTS_BYTES: usize = 500 * 1024;

/// Largest Crawl-delay honored, in seconds
pub const MAX_CRAWL_DELAY_SECS: u64 = 60;

/// Whether a URL may be fetched, and how long to space requests to its host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotsDecision {
    pub allowed: bool,
    /// Crawl-delay in whole seconds
    pub crawl_delay: u64,
}

impl RobotsDecision {
    /// The fail-open decision
    pub fn allow_all() -> Self {
        Self {
            allowed: true,
            crawl_delay: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.crawl_delay)
    }
}

/// Robots compliance as seen by a worker
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    client: reqwest::Client,
    agent: String,
    timeout: Duration,
    enabled: bool,
}

impl RobotsPolicy {
    /// Policy matching groups against `agent` (the user agent product token)
    pub fn new(client: reqwest::Client, agent: impl Into<String>) -> Self {
        Self {
            client,
            agent: agent.into(),
            timeout: ROBOTS_TIMEOUT,
            enabled: true,
        }
    }

    /// A policy that never makes a request and allows everything
    pub fn disabled(client: reqwest::Client) -> Self {
        Self {
            client,
            agent: String::new(),
            timeout: ROBOTS_TIMEOUT,
            enabled: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fetches robots.txt for the URL's origin and decides on the URL
    pub async fn decision(&self, url: &Url) -> RobotsDecision {
        if !self.enabled {
            return RobotsDecision::allow_all();
        }

        match self.fetch(url).await {
            Some(robots) => robots.decision(url.as_str(), &self.agent),
            None => RobotsDecision::allow_all(),
        }
    }

    async fn fetch(&self, url: &Url) -> Option<ParsedRobots> {
        let robots_url = robots_url(url)?;

        let mut response = match self
            .client
            .get(robots_url.clone())
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("robots.txt unavailable at {}: {}", robots_url, e);
                return None;
            }
        };

        let status = response.status();
        if status.as_u16() >= 400 {
            tracing::debug!("robots.txt at {} returned {}, allowing", robots_url, status);
            return None;
        }

        let mut body: Vec<u8> = Vec::new();
        while body.len() < MAX_ROBOTS_BYTES {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let take = chunk.len().min(MAX_ROBOTS_BYTES - body.len());
                    body.extend_from_slice(&chunk[..take]);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("robots.txt body at {} unreadable: {}", robots_url, e);
                    return None;
                }
            }
        }

        Some(ParsedRobots::from_content(&String::from_utf8_lossy(&body)))
    }
}
