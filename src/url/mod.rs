//! URL handling module for Clawdgle
//!
//! This module provides URL normalization, host and origin extraction, and
//! allow-list matching.

mod domain;
mod matcher;
mod normalize;

pub use domain::{authority_key, extract_domain, robots_url};
pub use matcher::{domain_allowed, matches_domain};
pub use normalize::normalize_url;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a URL string
///
/// Used both as the search document id and as the blob key stem, so repeated
/// crawls of the same URL land on the same object and the same document.
///
/// ```
/// use clawdgle::url::url_digest;
///
/// let digest = url_digest("https://a.example/");
/// assert_eq!(digest.len(), 64);
/// assert_eq!(digest, url_digest("https://a.example/"));
/// ```
pub fn url_digest(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}
