//! Robots.txt parser implementation
//!
//! Allow/Disallow matching is delegated to the robotstxt crate; Crawl-delay
//! is not part of its matcher, so it is scanned here.

use crate::robots::{RobotsDecision, MAX_CRAWL_DELAY_SECS};
use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Checks if a URL is allowed for the given user agent token
    ///
    /// `url` may be a full URL or a bare path.
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, agent, url)
    }

    /// Gets the crawl delay that applies to `agent`, in seconds
    ///
    /// A group naming the agent wins over the `*` group. Consecutive
    /// `User-agent` lines form one group.
    pub fn crawl_delay(&self, agent: &str) -> Option<f64> {
        let agent = agent.to_lowercase();

        let mut group: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut for_agent: Option<f64> = None;
        let mut for_wildcard: Option<f64> = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                if !in_agent_lines {
                    group.clear();
                    in_agent_lines = true;
                }
                group.push(value.to_lowercase());
                continue;
            }
            in_agent_lines = false;

            if key != "crawl-delay" {
                continue;
            }
            let Ok(delay) = value.parse::<f64>() else {
                continue;
            };
            if !delay.is_finite() || delay < 0.0 {
                continue;
            }

            if group.iter().any(|ua| ua != "*" && !ua.is_empty() && agent.contains(ua.as_str())) {
                for_agent.get_or_insert(delay);
            } else if group.iter().any(|ua| ua == "*") {
                for_wildcard.get_or_insert(delay);
            }
        }

        for_agent.or(for_wildcard)
    }

    /// Allow decision and whole-second crawl delay for one URL
    ///
    /// Fractional delays round up, so `Crawl-delay: 0.5` waits one second.
    /// Delays above [`MAX_CRAWL_DELAY_SECS`] are clamped to it.
    pub fn decision(&self, url: &str, agent: &str) -> RobotsDecision {
        let crawl_delay = match self.crawl_delay(agent) {
            Some(delay) if delay > MAX_CRAWL_DELAY_SECS as f64 => {
                tracing::warn!(
                    "Crawl-delay {} exceeds {}s, clamping",
                    delay,
                    MAX_CRAWL_DELAY_SECS
                );
                MAX_CRAWL_DELAY_SECS
            }
            Some(delay) => delay.ceil() as u64,
            None => 0,
        };

        RobotsDecision {
            allowed: self.is_allowed(url, agent),
            crawl_delay,
        }
    }
}
