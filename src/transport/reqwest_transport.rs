//! `reqwest`-backed transport

use crate::proxy::ProxyAddress;
use crate::request::Request;
use crate::transport::{Transport, TransportError, TransportResponse};
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Builds an HTTP client, optionally routed through `proxy`
///
/// # Arguments
///
/// * `proxy` - Proxy for every request made by this client, or `None` for direct connections
/// * `timeout` - Overall per-request timeout
///
/// # Example
///
/// ```
/// use predator_core::transport::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(None, Some(Duration::from_secs(10))).unwrap();
/// ```
pub fn build_http_client(
    proxy: Option<&ProxyAddress>,
    timeout: Option<Duration>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    builder = match proxy {
        Some(proxy) => builder.proxy(Proxy::all(proxy.as_str())?),
        None => builder.no_proxy(),
    };

    builder.build()
}

/// Transport that executes requests with `reqwest`
///
/// One client is kept per proxy address so connection pools are reused across
/// dispatches that draw the same proxy.
pub struct ReqwestTransport {
    direct: Client,
    proxied: Mutex<HashMap<String, Client>>,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        Ok(Self {
            direct: build_http_client(None, timeout)?,
            proxied: Mutex::new(HashMap::new()),
            timeout,
        })
    }

    fn client_for(&self, proxy: Option<&ProxyAddress>) -> Result<Client, TransportError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut clients = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(proxy.as_str()) {
            return Ok(client.clone());
        }

        tracing::debug!(proxy = %proxy, "Building HTTP client for proxy");
        let client = build_http_client(Some(proxy), self.timeout)?;
        clients.insert(proxy.as_str().to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: &Request,
        proxy: Option<&ProxyAddress>,
    ) -> Result<TransportResponse, TransportError> {
        let client = self.client_for(proxy)?;

        let mut builder = client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(classify)?.to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err)
    }
}
