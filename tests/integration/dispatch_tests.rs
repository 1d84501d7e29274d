//! Integration tests for request dispatch
//!
//! These tests use wiremock to create mock HTTP servers and drive the
//! crawler end-to-end through the real `reqwest` transport.

use predator_core::multipart::{BoundaryGenerator, DEFAULT_DASH_PREFIX};
use predator_core::{Cache, Context, CrawlError, Crawler, MultipartForm, Request, SqliteCache};
use reqwest::Method;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Returns a URL on loopback where nothing is listening
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

#[tokio::test]
async fn test_retry_bound_makes_four_attempts() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&mock_server)
        .await;

    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed_clone = Arc::clone(&observed);
    let crawler = Crawler::builder()
        .retry(3, |resp| resp.status_code() == 503)
        .after_response(move |resp| {
            observed_clone
                .lock()
                .unwrap()
                .push((resp.status_code(), resp.request.number_of_retries()));
        })
        .build()
        .unwrap();

    crawler
        .get(&format!("{}/flaky", mock_server.uri()))
        .await
        .unwrap();

    // The after-hook sees only the final response
    assert_eq!(*observed.lock().unwrap(), vec![(503, 3)]);
    assert_eq!(crawler.responses_received(), 4);
}

#[tokio::test]
async fn test_retry_stops_once_predicate_is_satisfied() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let status = Arc::new(AtomicU32::new(0));
    let status_clone = Arc::clone(&status);
    let crawler = Crawler::builder()
        .retry(5, |resp| !resp.is_success())
        .after_response(move |resp| {
            status_clone.store(u32::from(resp.status_code()), Ordering::SeqCst);
        })
        .build()
        .unwrap();

    crawler
        .get(&format!("{}/recovering", mock_server.uri()))
        .await
        .unwrap();

    assert_eq!(status.load(Ordering::SeqCst), 200);
    assert_eq!(crawler.responses_received(), 3);
}

#[tokio::test]
async fn test_abort_short_circuits_dispatch() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let after_calls = Arc::new(AtomicU32::new(0));
    let after_clone = Arc::clone(&after_calls);
    let crawler = Crawler::builder()
        .before_request(|req| req.abort())
        .after_response(move |_| {
            after_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    let result = crawler.get(&format!("{}/never", mock_server.uri())).await;

    assert!(result.is_ok());
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_default_headers_reach_the_server() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/headers"))
        .and(header("user-agent", "Predator"))
        .and(header("accept", "*/*"))
        .and(header("cookie", "lang=en; session=abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let crawler = Crawler::builder()
        .cookie("session", "abc")
        .cookie("lang", "en")
        .build()
        .unwrap();

    crawler
        .get(&format!("{}/headers", mock_server.uri()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_hooks_can_rewrite_headers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("x-trace", "42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let crawler = Crawler::new().unwrap();
    crawler.before_request(|req| req.set_header("X-Trace", "42"));

    crawler.get(&mock_server.uri()).await.unwrap();
}

#[tokio::test]
async fn test_post_hash_is_order_independent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_string("id=100&page=1"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    let hashes = Arc::new(Mutex::new(Vec::new()));
    let hashes_clone = Arc::clone(&hashes);
    let crawler = Crawler::builder()
        .before_request(move |req| {
            hashes_clone.lock().unwrap().push(req.hash().unwrap());
        })
        .build()
        .unwrap();

    let url = format!("{}/search", mock_server.uri());
    crawler
        .post(&url, [("id", "100"), ("page", "1")], None)
        .await
        .unwrap();
    crawler
        .post(&url, [("page", "1"), ("id", "100")], None)
        .await
        .unwrap();

    let hashes = hashes.lock().unwrap();
    assert_eq!(hashes.len(), 2);
    assert_eq!(hashes[0], hashes[1]);
    assert_eq!(hashes[0].len(), 64);
}

#[tokio::test]
async fn test_post_multipart_body_layout() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let generator: BoundaryGenerator = Arc::new(|| "12345678901234567890123456789".to_string());
    let mut form = MultipartForm::with_generator(DEFAULT_DASH_PREFIX, generator).unwrap();
    form.append_string("id", "100").unwrap();
    form.append_string("page", "1").unwrap();
    let boundary = form.boundary().to_string();

    let content_type = Arc::new(Mutex::new(None));
    let content_type_clone = Arc::clone(&content_type);
    let crawler = Crawler::builder()
        .after_response(move |resp| {
            *content_type_clone.lock().unwrap() = resp.request.header("content-type").map(String::from);
        })
        .build()
        .unwrap();

    crawler
        .post_multipart(&format!("{}/upload", mock_server.uri()), form, None)
        .await
        .unwrap();

    let received = mock_server.received_requests().await.unwrap();
    let body = String::from_utf8(received[0].body.clone()).unwrap();

    let delimiter = format!("--{}\r\n", boundary);
    assert_eq!(body.matches(&delimiter).count(), 2);
    assert!(body.starts_with(&delimiter));
    assert!(body.contains("Content-Disposition: form-data; name=\"id\"\r\n\r\n100\r\n"));
    assert!(body.contains("Content-Disposition: form-data; name=\"page\"\r\n\r\n1\r\n"));
    assert!(body.ends_with(&format!("--{}--\r\n", boundary)));

    assert_eq!(
        content_type.lock().unwrap().as_deref(),
        Some(format!("multipart/form-data; boundary={}", boundary).as_str())
    );
}

#[tokio::test]
async fn test_multipart_file_part() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("page.html");
    std::fs::write(&file_path, "<!DOCTYPE html><html><body>hi</body></html>").unwrap();

    let mut form = MultipartForm::new(DEFAULT_DASH_PREFIX).unwrap();
    form.append_file("upload", &file_path).unwrap();

    let crawler = Crawler::new().unwrap();
    crawler
        .post_multipart(&mock_server.uri(), form, None)
        .await
        .unwrap();

    let received = mock_server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&received[0].body).into_owned();
    assert!(body.contains("name=\"upload\"; filename=\"page.html\""));
    assert!(body.contains("Content-Type: text/html; charset=utf-8\r\n"));
}

#[tokio::test]
async fn test_sqlite_cache_hit_skips_network() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cached"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(SqliteCache::new(&dir.path().join("cache.db")).unwrap());

    let bodies = Arc::new(Mutex::new(Vec::new()));
    let bodies_clone = Arc::clone(&bodies);
    let crawler = Crawler::builder()
        .cache(cache.clone())
        .after_response(move |resp| {
            bodies_clone
                .lock()
                .unwrap()
                .push((resp.text().into_owned(), resp.from_cache));
        })
        .build()
        .unwrap();

    let url = format!("{}/cached", mock_server.uri());
    crawler.get(&url).await.unwrap();
    crawler.get(&url).await.unwrap();

    assert_eq!(
        *bodies.lock().unwrap(),
        vec![("fresh".to_string(), false), ("fresh".to_string(), true)]
    );
    assert_eq!(cache.len().unwrap(), 1);

    crawler.clear_cache().unwrap();
    assert!(cache.is_empty().unwrap());
}

#[tokio::test]
async fn test_hook_panic_is_isolated_to_its_dispatch() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let crawler = Crawler::builder()
        .before_request(|req| {
            if req.url.ends_with("/boom") {
                panic!("before hook failed");
            }
        })
        .build()
        .unwrap();

    let base = mock_server.uri();
    let results = crawler
        .get_all([format!("{}/ok", base), format!("{}/boom", base)])
        .await;

    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(CrawlError::HookPanicked { ref message, .. }) if message == "before hook failed"
    ));

    // Only the healthy request reached the server
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_partial_failure_in_batch() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let crawler = Crawler::builder()
        .retry(1, |_| false)
        .build()
        .unwrap();

    let results = crawler
        .get_all([mock_server.uri(), closed_port_url(), mock_server.uri()])
        .await;

    assert!(results[0].is_ok());
    assert!(results[2].is_ok());
    let err = results[1].as_ref().unwrap_err();
    assert!(matches!(err, CrawlError::Transport { .. }));
    assert!(!err.is_configuration());
}

#[tokio::test]
async fn test_cancellation_interrupts_in_flight_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&mock_server)
        .await;

    let crawler = Crawler::builder()
        .retry(3, |_| true)
        .build()
        .unwrap();
    let token = crawler.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let started = Instant::now();
    let err = crawler.get(&mock_server.uri()).await.unwrap_err();

    assert!(matches!(err, CrawlError::Cancelled { .. }));
    assert!(!err.is_retryable());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_malformed_proxy_is_reported_before_network() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let err = Crawler::builder()
        .proxy("127.0.0.1:3128")
        .build()
        .err()
        .unwrap();
    assert!(err.is_configuration());

    let crawler = Crawler::builder()
        .before_request(|req| req.proxy_url = Some("socks4://127.0.0.1:1080".to_string()))
        .build()
        .unwrap();
    let err = crawler.get(&mock_server.uri()).await.unwrap_err();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_http_proxy_routes_requests() {
    // The mock server plays the forward proxy: plain-http requests reach it in absolute form
    let proxy_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/via-proxy"))
        .respond_with(ResponseTemplate::new(200).set_body_string("proxied"))
        .expect(1)
        .mount(&proxy_server)
        .await;

    let body = Arc::new(Mutex::new(String::new()));
    let body_clone = Arc::clone(&body);
    let crawler = Crawler::builder()
        .proxy_pool(vec![proxy_server.uri()])
        .after_response(move |resp| *body_clone.lock().unwrap() = resp.text().into_owned())
        .build()
        .unwrap();

    crawler
        .get("http://upstream.invalid/via-proxy")
        .await
        .unwrap();

    assert_eq!(*body.lock().unwrap(), "proxied");
}

#[tokio::test]
async fn test_context_is_shared_with_follow_up_requests() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let follow_up: Arc<Mutex<Option<Request>>> = Arc::new(Mutex::new(None));
    let follow_up_clone = Arc::clone(&follow_up);
    let base = mock_server.uri();
    let next_url = format!("{}/detail", base);

    let crawler = Crawler::builder()
        .before_request(|req| {
            if req.ctx.get("qid").is_none() {
                req.ctx.put("qid", "100");
            }
        })
        .after_response(move |resp| {
            if resp.request.url.ends_with("/list") {
                let next = resp.request.derive(Method::GET, next_url.clone(), Vec::new());
                *follow_up_clone.lock().unwrap() = Some(next);
            }
        })
        .build()
        .unwrap();

    let ctx = Context::shared();
    crawler
        .get_with_context(&format!("{}/list", base), Arc::clone(&ctx))
        .await
        .unwrap();
    assert_eq!(ctx.get("qid"), Some("100".to_string()));

    let next = follow_up.lock().unwrap().take().unwrap();
    assert!(Arc::ptr_eq(&next.ctx, &ctx));
    assert_ne!(next.id, 0);
    crawler.dispatch(next).await.unwrap();

    assert_eq!(crawler.requests_sent(), 2);
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrency_limit_still_completes_every_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
        .expect(6)
        .mount(&mock_server)
        .await;

    let crawler = Crawler::builder().concurrency(2).build().unwrap();
    let urls: Vec<String> = (0..6).map(|i| format!("{}/{}", mock_server.uri(), i)).collect();

    let results = crawler.get_all(&urls).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(crawler.requests_sent(), 6);
}
