//! Proxy address parsing and classification

use crate::ConfigError;
use std::fmt;
use url::Url;

/// Protocols a proxy can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks5,
}

impl ProxyScheme {
    fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "socks5" | "socks5h" => Some(Self::Socks5),
            _ => None,
        }
    }

    /// Port assumed when the address does not name one
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
            Self::Socks5 => 1080,
        }
    }

    /// Returns true for schemes tunneled with HTTP CONNECT
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http | Self::Https)
    }
}

/// A validated proxy address such as `http://127.0.0.1:8080`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddress {
    raw: String,
    scheme: ProxyScheme,
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
}

impl ProxyAddress {
    /// Parses and classifies a proxy address
    ///
    /// # Errors
    ///
    /// * `ConfigError::InvalidProxy` - The address has no `//` protocol separator or is otherwise malformed
    /// * `ConfigError::UnknownProtocol` - The scheme is not http, https or socks5
    /// * `ConfigError::EmptyProxyHost` - The host or an explicitly given port is empty
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let Some(separator) = raw.find("//") else {
            return Err(ConfigError::InvalidProxy(raw.to_string()));
        };

        let scheme_part = raw[..separator].trim_end_matches(':');
        let scheme = ProxyScheme::from_str(scheme_part)
            .ok_or_else(|| ConfigError::UnknownProtocol(raw.to_string()))?;

        let rest = &raw[separator + 2..];
        let authority = rest.split('/').next().unwrap_or_default();
        let host_port = authority.rsplit('@').next().unwrap_or_default();
        if host_port.is_empty() || host_port.starts_with(':') || host_port.ends_with(':') {
            return Err(ConfigError::EmptyProxyHost(raw.to_string()));
        }

        let url = Url::parse(raw).map_err(|_| ConfigError::InvalidProxy(raw.to_string()))?;
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.trim_start_matches('[').trim_end_matches(']').to_string(),
            _ => return Err(ConfigError::EmptyProxyHost(raw.to_string())),
        };
        let port = url.port().unwrap_or_else(|| scheme.default_port());

        let credentials = if url.username().is_empty() {
            None
        } else {
            Some((
                url.username().to_string(),
                url.password().unwrap_or_default().to_string(),
            ))
        };

        Ok(Self {
            raw: raw.to_string(),
            scheme,
            host,
            port,
            credentials,
        })
    }

    /// The address exactly as configured
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> ProxyScheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` of the proxy itself
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Username and password embedded in the address, if any
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.credentials
            .as_ref()
            .map(|(user, pass)| (user.as_str(), pass.as_str()))
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
