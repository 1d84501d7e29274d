//! Crawler dispatch
//!
//! Every verb funnels into [`Crawler::dispatch`], which walks one request
//! through its lifecycle:
//! - default headers, ID and proxy assignment
//! - before-request hooks (which may abort)
//! - cache lookup
//! - the transport call, re-issued per the retry policy
//! - cache store and after-response hooks
//! - release of the request back to the pool

use crate::cache::{Cache, CachedResponse};
use crate::config::Config;
use crate::crawler::builder::CrawlerBuilder;
use crate::crawler::hooks::{run_request_hooks, run_response_hooks, HookList, RequestHook, ResponseHook};
use crate::crawler::{Counters, RetryPolicy};
use crate::multipart::MultipartForm;
use crate::proxy::{dial, ProxyAddress, ProxySelector};
use crate::request::{Context, FieldValue, Request, RequestPool, Response};
use crate::state::DispatchState;
use crate::transport::{Transport, TransportError, TransportResponse};
use crate::{CrawlError, Result};
use futures::future::join_all;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::Method;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Request-execution core
///
/// A `Crawler` is shared by reference between concurrent callers; every
/// dispatch entry point takes `&self`. Outcomes are observed through hooks and
/// the returned error.
pub struct Crawler {
    pub(super) user_agent: String,
    pub(super) cookies: BTreeMap<String, String>,
    pub(super) retry: RetryPolicy,
    pub(super) proxies: ProxySelector,
    pub(super) counters: Arc<Counters>,
    pub(super) before_request: HookList<RequestHook>,
    pub(super) after_response: HookList<ResponseHook>,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) cache: Option<Arc<dyn Cache>>,
    pub(super) pool: RequestPool,
    pub(super) limiter: Option<Semaphore>,
    pub(super) cancel: CancellationToken,
    pub(super) timeout: Option<Duration>,
}

impl Crawler {
    pub fn builder() -> CrawlerBuilder {
        CrawlerBuilder::new()
    }

    /// Creates a crawler with default options
    pub fn new() -> Result<Self> {
        CrawlerBuilder::new().build()
    }

    /// Creates a crawler from a loaded configuration file
    pub fn from_config(config: &Config) -> Result<Self> {
        CrawlerBuilder::from_config(config)?.build()
    }

    /// Registers a hook run before every subsequent dispatch
    ///
    /// Dispatches already in flight keep the hook list they started with.
    pub fn before_request<F>(&self, hook: F)
    where
        F: Fn(&mut Request) + Send + Sync + 'static,
    {
        self.before_request.push(Arc::new(hook));
    }

    /// Registers a hook run after every subsequent response
    pub fn after_response<F>(&self, hook: F)
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.after_response.push(Arc::new(hook));
    }

    /// Fetches `url` with a GET request
    pub async fn get(&self, url: &str) -> Result<()> {
        let request = self.build_request(Method::GET, url, None);
        self.dispatch(request).await
    }

    /// Fetches `url` with a GET request that carries `ctx`
    pub async fn get_with_context(&self, url: &str, ctx: Arc<Context>) -> Result<()> {
        let request = self.build_request(Method::GET, url, Some(ctx));
        self.dispatch(request).await
    }

    /// Posts `fields` as an `application/x-www-form-urlencoded` body
    ///
    /// Fields are encoded sorted by key and then value, so the body and the
    /// cache key do not depend on the order the caller supplied them in.
    /// Repeated keys are all sent.
    pub async fn post<I, K, V>(&self, url: &str, fields: I, ctx: Option<Arc<Context>>) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut pairs: Vec<(String, String)> = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        pairs.sort();
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter())
            .finish();

        let mut request = self.build_request(Method::POST, url, ctx);
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k, FieldValue::Text(v)))
            .collect();
        request.set_form_body(fields, encoded.into_bytes());
        request.set_content_type(FORM_URLENCODED);
        self.dispatch(request).await
    }

    /// Posts a finished multipart form
    pub async fn post_multipart(
        &self,
        url: &str,
        form: MultipartForm,
        ctx: Option<Arc<Context>>,
    ) -> Result<()> {
        let (body, content_type, fields) = form.finish();
        let mut request = self.build_request(Method::POST, url, ctx);
        request.set_form_body(fields, body);
        request.set_content_type(&content_type);
        self.dispatch(request).await
    }

    /// Fetches every URL concurrently
    ///
    /// Each outcome is reported independently; one failure does not stop the
    /// others.
    pub async fn get_all<I, S>(&self, urls: I) -> Vec<Result<()>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: Vec<S> = urls.into_iter().collect();
        join_all(urls.iter().map(|url| self.get(url.as_ref()))).await
    }

    /// Runs a prepared request through the full dispatch pipeline
    ///
    /// Requests from [`Request::new`] or [`Request::derive`] are accepted as
    /// well as those built by the verbs above. The request is returned to the
    /// pool when the dispatch ends, whatever the outcome.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The request completed or a hook aborted it
    /// * `Err(CrawlError)` - Configuration fault, terminal transport failure, hook panic or cancellation
    pub async fn dispatch(&self, mut request: Request) -> Result<()> {
        let _permit = match self.acquire_slot(&request.url).await {
            Ok(permit) => permit,
            Err(err) => {
                self.pool.release(request);
                return Err(err);
            }
        };

        self.prepare(&mut request);
        let id = request.id;
        tracing::debug!(
            request_id = id,
            method = %request.method,
            url = %request.url,
            proxy = request.proxy_url.as_deref().unwrap_or("direct"),
            "Request built"
        );

        let mut state = DispatchState::Built;
        let outcome = self.run(&mut request, &mut state).await;
        if let Err(err) = &outcome {
            state.advance(DispatchState::Failed, id);
            tracing::warn!(request_id = id, url = %request.url, "Dispatch failed: {}", err);
        }

        self.pool.release(request);
        outcome
    }

    /// Waits for a free dispatch slot when a concurrency limit is set
    async fn acquire_slot(&self, url: &str) -> Result<Option<SemaphorePermit<'_>>> {
        let Some(limiter) = &self.limiter else {
            return Ok(None);
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CrawlError::Cancelled { url: url.to_string() }),
            permit = limiter.acquire() => Ok(permit.ok()),
        }
    }

    fn build_request(&self, method: Method, url: &str, ctx: Option<Arc<Context>>) -> Request {
        let mut request = self.pool.acquire();
        request.method = method;
        request.url.push_str(url);
        if let Some(ctx) = ctx {
            request.ctx = ctx;
        }
        request
    }

    /// Fills in ID, default headers and proxy where the caller left them unset
    fn prepare(&self, request: &mut Request) {
        if request.id == 0 {
            request.attach(&self.counters);
        }
        if request.header(USER_AGENT.as_str()).is_none() {
            request.set_header(USER_AGENT.as_str(), &self.user_agent);
        }
        if !self.cookies.is_empty() && request.header(COOKIE.as_str()).is_none() {
            let cookie = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            request.set_header(COOKIE.as_str(), &cookie);
        }
        if request.header(ACCEPT.as_str()).is_none() {
            request.set_header(ACCEPT.as_str(), "*/*");
        }
        if request.method == Method::POST && request.header(CONTENT_TYPE.as_str()).is_none() {
            request.set_content_type(FORM_URLENCODED);
        }
        if request.proxy_url.is_none() {
            request.proxy_url = self.proxies.choose();
        }
    }

    async fn run(&self, request: &mut Request, state: &mut DispatchState) -> Result<()> {
        let id = request.id;

        let hooks = self.before_request.snapshot();
        run_request_hooks(&hooks, request)
            .map_err(|message| CrawlError::HookPanicked { request_id: id, message })?;
        if request.is_aborted() {
            state.advance(DispatchState::Aborted, id);
            tracing::debug!(request_id = id, "Request aborted by hook");
            return Ok(());
        }

        // Hooks may have swapped the proxy, so it is parsed only now
        let proxy = request
            .proxy_url
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(ProxyAddress::parse)
            .transpose()?;

        let cache_key = match &self.cache {
            Some(cache) => {
                let key = request.hash()?;
                match cache.get(&key) {
                    Ok(Some(cached)) => {
                        state.advance(DispatchState::Dispatched, id);
                        tracing::debug!(request_id = id, key = %key, "Cache hit");
                        let response = Response::from_cached(cached, std::mem::take(request));
                        return self.complete(response, request, state);
                    }
                    Ok(None) => tracing::debug!(request_id = id, key = %key, "Cache miss"),
                    Err(e) => {
                        tracing::warn!(request_id = id, "Cache lookup failed, treating as miss: {}", e)
                    }
                }
                Some(key)
            }
            None => None,
        };

        state.advance(DispatchState::Dispatched, id);
        let response = loop {
            if self.cancel.is_cancelled() {
                return Err(CrawlError::Cancelled {
                    url: request.url.clone(),
                });
            }

            let outcome = self.attempt(request, proxy.as_ref()).await;
            match outcome {
                Ok(raw) => {
                    self.counters.record_response();
                    let response = Response::from_transport(raw, std::mem::take(request));
                    if !self.retry.should_retry(&response) {
                        break response;
                    }
                    *request = response.into_request();
                }
                Err(TransportError::Cancelled) => {
                    return Err(CrawlError::Cancelled {
                        url: request.url.clone(),
                    });
                }
                Err(TransportError::Proxy(e)) if e.reason.is_addressing() => {
                    return Err(CrawlError::Proxy(e));
                }
                Err(source) => {
                    if !self.retry.should_retry_error(request, &source) {
                        return Err(CrawlError::Transport {
                            url: request.url.clone(),
                            source,
                        });
                    }
                    tracing::debug!(request_id = id, "Attempt failed: {}", source);
                }
            }

            let attempt = request.increment_retries();
            state.advance(DispatchState::Retried, id);
            tracing::debug!(
                request_id = id,
                attempt,
                bound = self.retry.max_retries(),
                "Retrying request"
            );
            state.advance(DispatchState::Dispatched, id);
        };

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if response.is_success() {
                match cache.set(key, &CachedResponse::from(&response)) {
                    Ok(()) => tracing::debug!(request_id = id, key = %key, "Response cached"),
                    Err(e) => tracing::warn!(request_id = id, "Failed to cache response: {}", e),
                }
            }
        }

        self.complete(response, request, state)
    }

    async fn attempt(
        &self,
        request: &Request,
        proxy: Option<&ProxyAddress>,
    ) -> std::result::Result<TransportResponse, TransportError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.transport.execute(request, proxy) => result,
        }
    }

    /// Runs after-response hooks and puts the request back into `slot`
    fn complete(
        &self,
        response: Response,
        slot: &mut Request,
        state: &mut DispatchState,
    ) -> Result<()> {
        let id = response.request.id;
        let hooks = self.after_response.snapshot();
        let outcome = run_response_hooks(&hooks, &response);
        *slot = response.into_request();

        outcome.map_err(|message| CrawlError::HookPanicked { request_id: id, message })?;
        state.advance(DispatchState::Completed, id);
        Ok(())
    }

    /// Picks the proxy the next dispatch would use
    pub fn choose_proxy(&self) -> Option<String> {
        self.proxies.choose()
    }

    /// Opens a TCP tunnel to `target` through a proxy chosen per dispatch rules
    ///
    /// Connects directly when no proxy is configured.
    pub async fn dial_with_proxy(&self, target: &str) -> Result<TcpStream> {
        self.dial_with_proxy_and_timeout(target, self.timeout).await
    }

    pub async fn dial_with_proxy_and_timeout(
        &self,
        target: &str,
        timeout: Option<Duration>,
    ) -> Result<TcpStream> {
        match self.choose_proxy() {
            Some(proxy) => Ok(dial(&proxy, target, timeout).await?),
            None => {
                let connect = TcpStream::connect(target);
                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, connect).await {
                        Ok(outcome) => outcome.map_err(|e| TransportError::Connect(e.to_string())),
                        Err(_) => Err(TransportError::Timeout),
                    },
                    None => connect
                        .await
                        .map_err(|e| TransportError::Connect(e.to_string())),
                };
                outcome.map_err(|source| CrawlError::Transport {
                    url: target.to_string(),
                    source,
                })
            }
        }
    }

    /// Number of requests built so far
    pub fn requests_sent(&self) -> u32 {
        self.counters.requests()
    }

    /// Number of transport responses received so far, retries included
    pub fn responses_received(&self) -> u32 {
        self.counters.responses()
    }

    /// Removes every cached response; a no-op without a cache
    pub fn clear_cache(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.clear()?;
        }
        Ok(())
    }

    /// Token that cancels in-flight and future dispatches when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Number of recycled requests waiting in the pool
    pub fn idle_requests(&self) -> usize {
        self.pool.idle()
    }
}
