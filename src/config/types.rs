use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for a crawler
///
/// Every table is optional; an empty file yields the same crawler as
/// `Crawler::builder().build()`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Cookies sent with every request
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Dispatch behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Value of the `User-Agent` header
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum number of dispatches in flight at once
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Extra attempts for non-2xx responses and transient transport failures
    #[serde(rename = "retry-count", default)]
    pub retry_count: u32,

    /// Per-attempt timeout (milliseconds)
    #[serde(rename = "timeout-ms", default)]
    pub timeout_ms: Option<u64>,

    /// Single proxy used when no pool is configured
    #[serde(default)]
    pub proxy: Option<String>,

    /// Proxies chosen from at random per dispatch
    #[serde(rename = "proxy-pool", default)]
    pub proxy_pool: Vec<String>,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            concurrency: None,
            retry_count: 0,
            timeout_ms: None,
            proxy: None,
            proxy_pool: Vec::new(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// SQLite database file; an in-memory cache is used when absent
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Clear the cache when the crawler is built
    #[serde(default)]
    pub flush: bool,
}

fn default_user_agent() -> String {
    crate::crawler::DEFAULT_USER_AGENT.to_string()
}
