//! HTTP fetcher implementation
//!
//! This module handles page requests for the crawler:
//! - Building the shared HTTP client with the crawler's user agent
//! - Size-capped GET requests with lossy UTF-8 decoding
//! - Error classification
//!
//! No retry happens here; the worker decides what a failure means.

use crate::config::UserAgentConfig;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum number of redirects followed for one request
pub const MAX_REDIRECTS: usize = 10;

/// Why a page could not be fetched
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },
}

impl FetchError {
    fn from_request(url: &Url, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(url.to_string())
        } else {
            Self::Network {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    fn from_body(url: &Url, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(url.to_string())
        } else {
            Self::Body {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    /// HTTP status, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Builds the HTTP client shared by every worker
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Whole-request timeout, body included
///
/// # Example
///
/// ```
/// use clawdgle::config::UserAgentConfig;
/// use clawdgle::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     name: "ClawdgleBot".to_string(),
///     version: "0.1".to_string(),
///     contact_url: Some("https://example.com/bot".to_string()),
///     header: None,
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(20)).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Size-capped page fetcher
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    max_bytes: usize,
}

impl Fetcher {
    pub fn new(client: Client, max_bytes: usize) -> Self {
        Self { client, max_bytes }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GETs `url` and returns at most `max_bytes` of its body as text
    ///
    /// The body is streamed; once the cap is reached the rest is never read.
    /// Invalid UTF-8 (including a character cut by the cap) decodes to U+FFFD.
    pub async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_request(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut body: Vec<u8> = Vec::with_capacity(self.max_bytes.min(64 * 1024));
        while body.len() < self.max_bytes {
            let chunk = response
                .chunk()
                .await
                .map_err(|e| FetchError::from_body(url, e))?;
            match chunk {
                Some(chunk) => {
                    let take = chunk.len().min(self.max_bytes - body.len());
                    body.extend_from_slice(&chunk[..take]);
                }
                None => break,
            }
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
