//! Configuration module for Clawdgle
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! with environment variable overrides for container deployments.
//!
//! # Example
//!
//! ```no_run
//! use clawdgle::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("clawdgle.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    BlobConfig, Config, CrawlerConfig, IndexConfig, RetryConfig, StorageConfig, UserAgentConfig,
};

pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash, parse_config,
};
pub use validation::validate;
