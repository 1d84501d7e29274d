//! Construction-time crawler options

use crate::cache::{Cache, MemoryCache, SqliteCache};
use crate::config::Config;
use crate::crawler::core::Crawler;
use crate::crawler::hooks::{HookList, RequestHook, ResponseHook};
use crate::crawler::{Counters, RetryPolicy, RetryPredicate};
use crate::proxy::ProxySelector;
use crate::request::{Request, RequestPool, Response};
use crate::transport::{ReqwestTransport, Transport};
use crate::{ConfigError, CrawlError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// User agent sent when none is configured
pub const DEFAULT_USER_AGENT: &str = "Predator";

/// Builder for [`Crawler`]
///
/// Every option has a default, so `Crawler::builder().build()` yields a crawler
/// that connects directly, never retries and does not cache.
///
/// # Example
///
/// ```no_run
/// use predator_core::Crawler;
///
/// # fn main() -> predator_core::Result<()> {
/// let crawler = Crawler::builder()
///     .user_agent("my-bot/1.0")
///     .retry(3, |resp| resp.status_code() != 200)
///     .proxy_pool(vec!["socks5://127.0.0.1:1080".to_string()])
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct CrawlerBuilder {
    user_agent: String,
    cookies: BTreeMap<String, String>,
    concurrency: Option<usize>,
    retry: RetryPolicy,
    proxy: Option<String>,
    proxy_pool: Vec<String>,
    timeout: Option<Duration>,
    cache: Option<Arc<dyn Cache>>,
    flush_cache: bool,
    before_request: Vec<RequestHook>,
    after_response: Vec<ResponseHook>,
    transport: Option<Arc<dyn Transport>>,
    cancellation: Option<CancellationToken>,
    pool_size: usize,
}

impl Default for CrawlerBuilder {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookies: BTreeMap::new(),
            concurrency: None,
            retry: RetryPolicy::none(),
            proxy: None,
            proxy_pool: Vec::new(),
            timeout: None,
            cache: None,
            flush_cache: false,
            before_request: Vec::new(),
            after_response: Vec::new(),
            transport: None,
            cancellation: None,
            pool_size: crate::request::DEFAULT_MAX_IDLE,
        }
    }
}

impl CrawlerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a builder from a loaded configuration file
    ///
    /// Retries use the default predicate (retry non-2xx responses). When
    /// caching is enabled the cache is backed by SQLite if a path is given and
    /// kept in memory otherwise.
    pub fn from_config(config: &Config) -> Result<Self, CrawlError> {
        let crawler = &config.crawler;
        let mut builder = Self::new()
            .user_agent(crawler.user_agent.clone())
            .cookies(config.cookies.clone())
            .retry_policy(RetryPolicy::with_count(crawler.retry_count))
            .proxy_pool(crawler.proxy_pool.clone())
            .flush_cache_on_build(config.cache.flush);

        if let Some(proxy) = &crawler.proxy {
            builder = builder.proxy(proxy.clone());
        }
        if let Some(limit) = crawler.concurrency {
            builder = builder.concurrency(limit);
        }
        if let Some(timeout) = crawler.timeout() {
            builder = builder.timeout(timeout);
        }

        if config.cache.enabled {
            let cache: Arc<dyn Cache> = match &config.cache.path {
                Some(path) => Arc::new(SqliteCache::new(path)?),
                None => Arc::new(MemoryCache::new()),
            };
            builder = builder.cache(cache);
        }

        Ok(builder)
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Adds a cookie sent with every request
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn cookies<I, K, V>(mut self, cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.cookies
            .extend(cookies.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Caps the number of dispatches in flight at once
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit);
        self
    }

    /// Re-issues a request up to `count` extra times while `predicate` holds
    pub fn retry<F>(mut self, count: u32, predicate: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        let predicate: RetryPredicate = Arc::new(predicate);
        self.retry = RetryPolicy::new(count, predicate);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Routes every request through one proxy
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Picks a random proxy per dispatch; takes priority over [`Self::proxy`]
    pub fn proxy_pool(mut self, pool: Vec<String>) -> Self {
        self.proxy_pool = pool;
        self
    }

    /// Per-attempt timeout applied by the default transport and proxy dialer
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Clears the cache when the crawler is built
    pub fn flush_cache_on_build(mut self, flush: bool) -> Self {
        self.flush_cache = flush;
        self
    }

    pub fn before_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request) + Send + Sync + 'static,
    {
        self.before_request.push(Arc::new(hook));
        self
    }

    pub fn after_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.after_response.push(Arc::new(hook));
        self
    }

    /// Replaces the default `reqwest` transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Shares a cancellation token with an external controller
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Maximum number of idle requests kept for reuse
    pub fn pool_size(mut self, max_idle: usize) -> Self {
        self.pool_size = max_idle;
        self
    }

    /// Validates the options and builds the crawler
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to dispatch
    /// * `Err(CrawlError::Config)` - A proxy address is malformed or an option is out of range
    /// * `Err(CrawlError::Cache)` - The cache could not be flushed
    pub fn build(self) -> Result<Crawler, CrawlError> {
        if self.user_agent.is_empty() {
            return Err(ConfigError::Validation("user agent cannot be empty".to_string()).into());
        }
        if self.concurrency == Some(0) {
            return Err(ConfigError::Validation("concurrency must be at least 1".to_string()).into());
        }

        let proxies = ProxySelector::new(self.proxy, self.proxy_pool);
        proxies.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let transport = ReqwestTransport::new(self.timeout).map_err(|e| {
                    ConfigError::Validation(format!("cannot build HTTP client: {}", e))
                })?;
                Arc::new(transport)
            }
        };

        if self.flush_cache {
            if let Some(cache) = &self.cache {
                cache.clear()?;
                tracing::info!("Flushed response cache");
            }
        }

        tracing::debug!(
            user_agent = %self.user_agent,
            retries = self.retry.max_retries(),
            proxies = proxies.entries().count(),
            caching = self.cache.is_some(),
            "Crawler built"
        );

        Ok(Crawler {
            user_agent: self.user_agent,
            cookies: self.cookies,
            retry: self.retry,
            proxies,
            counters: Arc::new(Counters::default()),
            before_request: HookList::new(self.before_request),
            after_response: HookList::new(self.after_response),
            transport,
            cache: self.cache,
            pool: RequestPool::new(self.pool_size),
            limiter: self.concurrency.map(Semaphore::new),
            cancel: self.cancellation.unwrap_or_default(),
            timeout: self.timeout,
        })
    }
}
