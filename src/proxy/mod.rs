//! Proxy selection and dialing
//!
//! This module handles:
//! - Parsing and classifying proxy addresses by scheme
//! - Choosing a proxy per dispatch from a pool or a single configured proxy
//! - Opening tunnels through HTTP CONNECT and SOCKS5 proxies

mod address;
mod dialer;
mod selector;

pub use address::{ProxyAddress, ProxyScheme};
pub use dialer::{dial, DialFailure, ProxyDialError};
pub use selector::ProxySelector;
