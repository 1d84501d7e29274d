//! Tunnels through HTTP CONNECT and SOCKS5 proxies
//!
//! Dial failures never abort the process; they are returned as a tagged
//! `ProxyDialError` carrying the reason and the proxy address.

use crate::proxy::{ProxyAddress, ProxyScheme};
use crate::ConfigError;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Why a proxy dial failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialFailure {
    /// The proxy address has no protocol separator or does not parse
    InvalidAddress,
    /// The proxy scheme is not http, https or socks5
    UnknownProtocol,
    /// The proxy host or port is empty
    EmptyHostOrPort,
    /// The target address is not `host:port`
    InvalidTarget,
    /// TCP connection to the proxy failed
    Connect,
    /// The dial did not finish within the timeout
    Timeout,
    /// The proxy spoke an unexpected protocol
    Handshake,
    /// The proxy refused the tunnel
    Rejected,
}

impl DialFailure {
    /// Returns true for failures caused by the configured address itself
    pub fn is_addressing(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress | Self::UnknownProtocol | Self::EmptyHostOrPort
        )
    }
}

impl fmt::Display for DialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidAddress => "invalid address",
            Self::UnknownProtocol => "unknown protocol",
            Self::EmptyHostOrPort => "empty host or port",
            Self::InvalidTarget => "invalid target",
            Self::Connect => "connect failed",
            Self::Timeout => "timed out",
            Self::Handshake => "handshake failed",
            Self::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// A failed proxy dial
#[derive(Debug, Error)]
#[error("cannot connect to proxy ip [ {address} ] -> {reason}: {detail}")]
pub struct ProxyDialError {
    pub reason: DialFailure,
    pub address: String,
    pub detail: String,
}

impl ProxyDialError {
    fn new(reason: DialFailure, address: &str, detail: impl Into<String>) -> Self {
        Self {
            reason,
            address: address.to_string(),
            detail: detail.into(),
        }
    }

    fn from_config(address: &str, err: ConfigError) -> Self {
        let reason = match err {
            ConfigError::UnknownProtocol(_) => DialFailure::UnknownProtocol,
            ConfigError::EmptyProxyHost(_) => DialFailure::EmptyHostOrPort,
            _ => DialFailure::InvalidAddress,
        };
        Self::new(reason, address, err.to_string())
    }
}

/// Opens a TCP tunnel to `target` (`host:port`) through `proxy`
///
/// `http` and `https` proxies are tunneled with a plain-text `CONNECT`;
/// `socks5` proxies go through the SOCKS5 handshake, with username/password
/// authentication when the address carries credentials.
///
/// # Arguments
///
/// * `proxy` - The proxy address, e.g. `socks5://127.0.0.1:1080`
/// * `target` - The destination, e.g. `example.com:443`
/// * `timeout` - Optional limit on connect plus handshake
pub async fn dial(
    proxy: &str,
    target: &str,
    timeout: Option<Duration>,
) -> Result<TcpStream, ProxyDialError> {
    let address = ProxyAddress::parse(proxy).map_err(|e| ProxyDialError::from_config(proxy, e))?;
    let (host, port) = split_target(target)
        .ok_or_else(|| ProxyDialError::new(DialFailure::InvalidTarget, proxy, target))?;

    let attempt = establish(&address, host, port);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, attempt).await.map_err(|_| {
            ProxyDialError::new(
                DialFailure::Timeout,
                proxy,
                format!("no tunnel to {} after {:?}", target, limit),
            )
        })?,
        None => attempt.await,
    }
}

async fn establish(
    address: &ProxyAddress,
    host: &str,
    port: u16,
) -> Result<TcpStream, ProxyDialError> {
    let mut stream = TcpStream::connect(address.socket_addr())
        .await
        .map_err(|e| ProxyDialError::new(DialFailure::Connect, address.as_str(), e.to_string()))?;

    match address.scheme() {
        ProxyScheme::Http | ProxyScheme::Https => {
            http_connect(&mut stream, address, host, port).await?
        }
        ProxyScheme::Socks5 => socks5_connect(&mut stream, address, host, port).await?,
    }

    tracing::debug!(proxy = %address, "Tunnel established to {}:{}", host, port);
    Ok(stream)
}

async fn http_connect(
    stream: &mut TcpStream,
    address: &ProxyAddress,
    host: &str,
    port: u16,
) -> Result<(), ProxyDialError> {
    if address.credentials().is_some() {
        return Err(ProxyDialError::new(
            DialFailure::Handshake,
            address.as_str(),
            "credentials are only supported for socks5 tunnels",
        ));
    }

    let authority = if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };
    let request = format!(
        "CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n",
        authority = authority
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| io_failure(address, e))?;

    // Read byte by byte so no tunneled data is consumed past the header block
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_CONNECT_RESPONSE {
            return Err(ProxyDialError::new(
                DialFailure::Handshake,
                address.as_str(),
                "CONNECT response headers too large",
            ));
        }
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| io_failure(address, e))?;
        if n == 0 {
            return Err(ProxyDialError::new(
                DialFailure::Handshake,
                address.as_str(),
                "proxy closed the connection during CONNECT",
            ));
        }
        head.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    let status = parts.next().unwrap_or_default();

    if !version.starts_with("HTTP/1.") {
        return Err(ProxyDialError::new(
            DialFailure::Handshake,
            address.as_str(),
            format!("unexpected CONNECT response: {}", status_line),
        ));
    }
    if status != "200" {
        return Err(ProxyDialError::new(
            DialFailure::Rejected,
            address.as_str(),
            format!("CONNECT answered {}", status_line),
        ));
    }
    Ok(())
}

async fn socks5_connect(
    stream: &mut TcpStream,
    address: &ProxyAddress,
    host: &str,
    port: u16,
) -> Result<(), ProxyDialError> {
    let credentials = address.credentials();

    // Greeting: offer no-auth, plus username/password when we have credentials
    let greeting: &[u8] = if credentials.is_some() {
        &[0x05, 0x02, 0x00, 0x02]
    } else {
        &[0x05, 0x01, 0x00]
    };
    stream
        .write_all(greeting)
        .await
        .map_err(|e| io_failure(address, e))?;

    let mut choice = [0u8; 2];
    read_exact(stream, address, &mut choice).await?;
    if choice[0] != 0x05 {
        return Err(ProxyDialError::new(
            DialFailure::Handshake,
            address.as_str(),
            format!("not a SOCKS5 server (version byte {:#04x})", choice[0]),
        ));
    }

    match (choice[1], credentials) {
        (0x00, _) => {}
        (0x02, Some((user, pass))) => socks5_authenticate(stream, address, user, pass).await?,
        (method, _) => {
            return Err(ProxyDialError::new(
                DialFailure::Rejected,
                address.as_str(),
                format!("no acceptable authentication method ({:#04x})", method),
            ));
        }
    }

    let mut request = vec![0x05, 0x01, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.push(0x01);
            request.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.push(0x04);
            request.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            let len = u8::try_from(host.len()).map_err(|_| {
                ProxyDialError::new(DialFailure::InvalidTarget, address.as_str(), host)
            })?;
            request.push(0x03);
            request.push(len);
            request.extend_from_slice(host.as_bytes());
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream
        .write_all(&request)
        .await
        .map_err(|e| io_failure(address, e))?;

    let mut reply = [0u8; 4];
    read_exact(stream, address, &mut reply).await?;
    if reply[0] != 0x05 {
        return Err(ProxyDialError::new(
            DialFailure::Handshake,
            address.as_str(),
            "malformed SOCKS5 reply",
        ));
    }
    if reply[1] != 0x00 {
        return Err(ProxyDialError::new(
            DialFailure::Rejected,
            address.as_str(),
            format!("SOCKS5 connect failed: {}", socks5_reply_message(reply[1])),
        ));
    }

    // Drain the bound address so the stream is positioned at tunneled data
    let bound_len = match reply[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            read_exact(stream, address, &mut len).await?;
            usize::from(len[0])
        }
        other => {
            return Err(ProxyDialError::new(
                DialFailure::Handshake,
                address.as_str(),
                format!("unknown SOCKS5 address type {:#04x}", other),
            ));
        }
    };
    let mut bound = vec![0u8; bound_len + 2];
    read_exact(stream, address, &mut bound).await?;
    Ok(())
}

async fn socks5_authenticate(
    stream: &mut TcpStream,
    address: &ProxyAddress,
    user: &str,
    pass: &str,
) -> Result<(), ProxyDialError> {
    let too_long =
        || ProxyDialError::new(DialFailure::Handshake, address.as_str(), "credentials too long");
    let user_len = u8::try_from(user.len()).map_err(|_| too_long())?;
    let pass_len = u8::try_from(pass.len()).map_err(|_| too_long())?;

    let mut auth = vec![0x01, user_len];
    auth.extend_from_slice(user.as_bytes());
    auth.push(pass_len);
    auth.extend_from_slice(pass.as_bytes());
    stream
        .write_all(&auth)
        .await
        .map_err(|e| io_failure(address, e))?;

    let mut status = [0u8; 2];
    read_exact(stream, address, &mut status).await?;
    if status[1] != 0x00 {
        return Err(ProxyDialError::new(
            DialFailure::Rejected,
            address.as_str(),
            "SOCKS5 authentication failed",
        ));
    }
    Ok(())
}

async fn read_exact(
    stream: &mut TcpStream,
    address: &ProxyAddress,
    buf: &mut [u8],
) -> Result<(), ProxyDialError> {
    stream
        .read_exact(buf)
        .await
        .map(|_| ())
        .map_err(|e| io_failure(address, e))
}

fn io_failure(address: &ProxyAddress, err: std::io::Error) -> ProxyDialError {
    ProxyDialError::new(DialFailure::Handshake, address.as_str(), err.to_string())
}

fn socks5_reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}

/// Splits `host:port` (or `[v6]:port`) into its parts
fn split_target(target: &str) -> Option<(&str, u16)> {
    let (host, port) = target.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host, port.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("example.com:443"), Some(("example.com", 443)));
        assert_eq!(split_target("[::1]:8080"), Some(("::1", 8080)));
        assert_eq!(split_target("example.com"), None);
        assert_eq!(split_target(":80"), None);
        assert_eq!(split_target("example.com:http"), None);
    }

    #[test]
    fn test_addressing_failures() {
        assert!(DialFailure::InvalidAddress.is_addressing());
        assert!(DialFailure::UnknownProtocol.is_addressing());
        assert!(DialFailure::EmptyHostOrPort.is_addressing());
        assert!(!DialFailure::Connect.is_addressing());
        assert!(!DialFailure::Rejected.is_addressing());
    }

    #[test]
    fn test_error_message_names_the_proxy() {
        let err = ProxyDialError::new(DialFailure::Connect, "http://10.0.0.1:80", "refused");
        assert_eq!(
            err.to_string(),
            "cannot connect to proxy ip [ http://10.0.0.1:80 ] -> connect failed: refused"
        );
    }

    #[tokio::test]
    async fn test_dial_rejects_unknown_protocol() {
        let err = dial("ftp://127.0.0.1:21", "example.com:80", None)
            .await
            .unwrap_err();
        assert_eq!(err.reason, DialFailure::UnknownProtocol);
        assert_eq!(err.address, "ftp://127.0.0.1:21");
    }

    #[tokio::test]
    async fn test_dial_rejects_empty_host() {
        let err = dial("socks5://:1080", "example.com:80", None)
            .await
            .unwrap_err();
        assert_eq!(err.reason, DialFailure::EmptyHostOrPort);
    }

    #[tokio::test]
    async fn test_dial_rejects_missing_separator() {
        let err = dial("127.0.0.1:8080", "example.com:80", None)
            .await
            .unwrap_err();
        assert_eq!(err.reason, DialFailure::InvalidAddress);
    }
}
