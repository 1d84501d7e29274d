use crate::config::types::{CacheConfig, Config, CrawlerConfig};
use crate::proxy::ProxyAddress;
use crate::ConfigError;
use std::collections::BTreeMap;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_cookies(&config.cookies)?;
    validate_cache_config(&config.cache)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.concurrency == Some(0) {
        return Err(ConfigError::Validation(
            "concurrency must be >= 1 when set, got 0".to_string(),
        ));
    }

    if config.timeout_ms == Some(0) {
        return Err(ConfigError::Validation(
            "timeout-ms must be > 0 when set, got 0".to_string(),
        ));
    }

    if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
        ProxyAddress::parse(proxy)?;
    }
    for proxy in &config.proxy_pool {
        ProxyAddress::parse(proxy)?;
    }

    Ok(())
}

/// Cookie names must be non-empty and free of separators
fn validate_cookies(cookies: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    for (name, value) in cookies {
        if name.is_empty() || name.contains(['=', ';', ' ']) {
            return Err(ConfigError::Validation(format!(
                "invalid cookie name '{}'",
                name
            )));
        }
        if value.contains(';') {
            return Err(ConfigError::Validation(format!(
                "cookie '{}' value cannot contain ';'",
                name
            )));
        }
    }
    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if !config.enabled && (config.path.is_some() || config.flush) {
        tracing::warn!("[cache] options are set but caching is disabled");
    }
    Ok(())
}
