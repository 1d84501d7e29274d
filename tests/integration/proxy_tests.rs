//! Integration tests for proxy tunneling
//!
//! These tests run small in-process HTTP CONNECT and SOCKS5 servers on
//! loopback and check the dialer's handshake and error reporting.

use predator_core::proxy::{dial, DialFailure};
use predator_core::{CrawlError, Crawler};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Reads an HTTP header block from `stream`
async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Echoes everything it receives until the client closes
async fn echo(mut stream: TcpStream) {
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if stream.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Starts a CONNECT proxy that answers with `status_line` and returns the
/// CONNECT request it saw
async fn start_connect_proxy(status_line: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await;
        stream
            .write_all(format!("{}\r\n\r\n", status_line).as_bytes())
            .await
            .unwrap();
        if status_line.contains(" 200 ") {
            echo(stream).await;
        }
        head
    });

    (format!("http://{}", addr), handle)
}

/// Starts a SOCKS5 proxy; with `credentials` it requires username/password auth
async fn start_socks5_proxy(
    credentials: Option<(&'static str, &'static str)>,
) -> (String, JoinHandle<(String, u16)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut greeting = [0u8; 2];
        stream.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting[0], 0x05);
        let mut methods = vec![0u8; usize::from(greeting[1])];
        stream.read_exact(&mut methods).await.unwrap();

        match credentials {
            Some((user, pass)) => {
                assert!(methods.contains(&0x02));
                stream.write_all(&[0x05, 0x02]).await.unwrap();

                let mut version_and_len = [0u8; 2];
                stream.read_exact(&mut version_and_len).await.unwrap();
                let mut got_user = vec![0u8; usize::from(version_and_len[1])];
                stream.read_exact(&mut got_user).await.unwrap();
                let mut pass_len = [0u8; 1];
                stream.read_exact(&mut pass_len).await.unwrap();
                let mut got_pass = vec![0u8; usize::from(pass_len[0])];
                stream.read_exact(&mut got_pass).await.unwrap();

                let ok = got_user == user.as_bytes() && got_pass == pass.as_bytes();
                stream
                    .write_all(&[0x01, if ok { 0x00 } else { 0x01 }])
                    .await
                    .unwrap();
                assert!(ok);
            }
            None => stream.write_all(&[0x05, 0x00]).await.unwrap(),
        }

        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await.unwrap();
        assert_eq!(&header[..3], &[0x05, 0x01, 0x00]);
        let host = match header[3] {
            0x01 => {
                let mut ip = [0u8; 4];
                stream.read_exact(&mut ip).await.unwrap();
                std::net::Ipv4Addr::from(ip).to_string()
            }
            0x03 => {
                let mut len = [0u8; 1];
                stream.read_exact(&mut len).await.unwrap();
                let mut name = vec![0u8; usize::from(len[0])];
                stream.read_exact(&mut name).await.unwrap();
                String::from_utf8(name).unwrap()
            }
            other => panic!("unexpected address type {}", other),
        };
        let mut port = [0u8; 2];
        stream.read_exact(&mut port).await.unwrap();

        stream
            .write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x1f, 0x90])
            .await
            .unwrap();
        let target = (host, u16::from_be_bytes(port));
        echo(stream).await;
        target
    });

    (addr.to_string(), handle)
}

async fn assert_echo(stream: &mut TcpStream) {
    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_http_connect_tunnel() {
    let (proxy, server) = start_connect_proxy("HTTP/1.1 200 Connection established").await;

    let mut stream = dial(&proxy, "example.com:443", Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_echo(&mut stream).await;
    drop(stream);

    let head = server.await.unwrap();
    assert!(head.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
    assert!(head.contains("Host: example.com:443\r\n"));
}

#[tokio::test]
async fn test_http_connect_rejected() {
    let (proxy, _server) = start_connect_proxy("HTTP/1.1 403 Forbidden").await;

    let err = dial(&proxy, "example.com:443", None).await.unwrap_err();
    assert_eq!(err.reason, DialFailure::Rejected);
    assert_eq!(err.address, proxy);
    assert!(err.to_string().starts_with("cannot connect to proxy ip [ "));
}

#[tokio::test]
async fn test_socks5_tunnel_with_domain_target() {
    let (addr, server) = start_socks5_proxy(None).await;

    let mut stream = dial(&format!("socks5://{}", addr), "example.com:80", None)
        .await
        .unwrap();
    assert_echo(&mut stream).await;
    drop(stream);

    let (host, port) = server.await.unwrap();
    assert_eq!(host, "example.com");
    assert_eq!(port, 80);
}

#[tokio::test]
async fn test_socks5_with_credentials_and_ip_target() {
    let (addr, server) = start_socks5_proxy(Some(("user", "secret"))).await;

    let mut stream = dial(&format!("socks5://user:secret@{}", addr), "10.1.2.3:8080", None)
        .await
        .unwrap();
    assert_echo(&mut stream).await;
    drop(stream);

    let (host, port) = server.await.unwrap();
    assert_eq!(host, "10.1.2.3");
    assert_eq!(port, 8080);
}

#[tokio::test]
async fn test_dial_timeout() {
    // Accepts the connection but never answers the greeting
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stream);
    });

    let err = dial(
        &format!("socks5://{}", addr),
        "example.com:80",
        Some(Duration::from_millis(200)),
    )
    .await
    .unwrap_err();
    assert_eq!(err.reason, DialFailure::Timeout);
}

#[tokio::test]
async fn test_addressing_errors_do_not_touch_network() {
    let err = dial("127.0.0.1:8080", "example.com:80", None).await.unwrap_err();
    assert_eq!(err.reason, DialFailure::InvalidAddress);
    assert!(err.reason.is_addressing());

    let err = dial("ftp://127.0.0.1:21", "example.com:80", None).await.unwrap_err();
    assert_eq!(err.reason, DialFailure::UnknownProtocol);
}

#[tokio::test]
async fn test_crawler_dial_with_proxy() {
    let (proxy, _server) = start_connect_proxy("HTTP/1.1 200 Connection established").await;
    let crawler = Crawler::builder().proxy(proxy).build().unwrap();

    let mut stream = crawler.dial_with_proxy("example.com:443").await.unwrap();
    assert_echo(&mut stream).await;
}

#[tokio::test]
async fn test_crawler_dial_surfaces_proxy_error() {
    let (proxy, _server) = start_connect_proxy("HTTP/1.1 502 Bad Gateway").await;
    let crawler = Crawler::builder().proxy(proxy).build().unwrap();

    let err = crawler.dial_with_proxy("example.com:443").await.unwrap_err();
    assert!(matches!(err, CrawlError::Proxy(ref e) if e.reason == DialFailure::Rejected));
    assert!(!err.is_configuration());
}
