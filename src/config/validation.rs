use crate::config::types::{
    BlobConfig, Config, CrawlerConfig, IndexConfig, StorageConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_blob_config(&config.blob)?;
    validate_index_config(&config.index)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_bytes < 1024 {
        return Err(ConfigError::Validation(format!(
            "max_bytes must be >= 1024, got {}",
            config.max_bytes
        )));
    }

    if config.dequeue_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "dequeue_timeout_secs must be >= 1".to_string(),
        ));
    }

    for domain in &config.allow_domains {
        validate_domain_pattern(domain)?;
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.name.is_empty() {
        return Err(ConfigError::Validation("name cannot be empty".to_string()));
    }

    // Product tokens in robots.txt are alphanumeric plus hyphens
    if !config.name.chars().all(|c| c.is_alphanumeric() || c == '-') {
        return Err(ConfigError::Validation(format!(
            "name must contain only alphanumeric characters and hyphens, got '{}'",
            config.name
        )));
    }

    if config.version.is_empty() {
        return Err(ConfigError::Validation(
            "version cannot be empty".to_string(),
        ));
    }

    if let Some(contact) = &config.contact_url {
        Url::parse(contact)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    if let Some(header) = &config.header {
        if header.trim().is_empty() {
            return Err(ConfigError::Validation(
                "header cannot be blank".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_blob_config(config: &BlobConfig) -> Result<(), ConfigError> {
    if config.root.is_empty() {
        return Err(ConfigError::Validation("blob root cannot be empty".to_string()));
    }

    if config.bucket.is_empty()
        || config.bucket == "."
        || config.bucket == ".."
        || !config
            .bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ConfigError::Validation(format!(
            "bucket must be a name of [A-Za-z0-9._-] other than '.' or '..', got '{}'",
            config.bucket
        )));
    }

    if config.prefix.starts_with('/') || config.prefix.contains("..") {
        return Err(ConfigError::Validation(format!(
            "prefix must be relative and cannot contain '..', got '{}'",
            config.prefix
        )));
    }

    Ok(())
}

fn validate_index_config(config: &IndexConfig) -> Result<(), ConfigError> {
    if config.collection.is_empty() {
        return Err(ConfigError::Validation(
            "collection cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates an allow-list domain pattern (supports a `*.` prefix)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);
    validate_domain_string(domain)
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}
