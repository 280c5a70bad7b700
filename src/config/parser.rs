use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;

/// Loads and parses a configuration file from the given path
///
/// Environment overrides (see [`apply_env_overrides`]) are applied from the
/// process environment before validation.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use clawdgle::config::load_config;
///
/// let config = load_config(Path::new("clawdgle.toml")).unwrap();
/// println!("Max depth: {}", config.crawler.max_depth);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    validate(&config)?;
    Ok(config)
}

/// Parses TOML content without applying overrides or validation
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Applies the deployment's environment variable overrides
///
/// Recognized variables: `API_USER_AGENT`, `CRAWL_CONCURRENCY`,
/// `CRAWL_TIMEOUT_SECS`, `CRAWL_MAX_BYTES`, `CRAWL_MAX_DEPTH`,
/// `CRAWL_ALLOW_DOMAINS` (comma separated), `CRAWL_RESPECT_ROBOTS` and
/// `CRAWL_POLITE_DELAY_SECS`. Numeric values that fail to parse are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(ua) = lookup("API_USER_AGENT").filter(|v| !v.trim().is_empty()) {
        config.user_agent.header = Some(ua.trim().to_string());
    }

    let crawler = &mut config.crawler;
    override_number(&lookup, "CRAWL_CONCURRENCY", &mut crawler.concurrency);
    override_number(&lookup, "CRAWL_TIMEOUT_SECS", &mut crawler.timeout_secs);
    override_number(&lookup, "CRAWL_MAX_BYTES", &mut crawler.max_bytes);
    override_number(&lookup, "CRAWL_MAX_DEPTH", &mut crawler.max_depth);
    override_number(
        &lookup,
        "CRAWL_POLITE_DELAY_SECS",
        &mut crawler.polite_delay_secs,
    );

    if let Some(domains) = lookup("CRAWL_ALLOW_DOMAINS") {
        crawler.allow_domains = domains
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(flag) = lookup("CRAWL_RESPECT_ROBOTS") {
        crawler.respect_robots = matches!(
            flag.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y"
        );
    }
}

fn override_number<F, T>(lookup: &F, name: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(name) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!("Ignoring {}={:?}: not a valid number", name, raw),
        }
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so operators can tell which configuration a worker runs.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
