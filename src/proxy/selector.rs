//! Per-dispatch proxy selection

use crate::proxy::ProxyAddress;
use crate::ConfigError;
use rand::seq::IndexedRandom;

/// Chooses the proxy for each dispatch
///
/// A non-empty pool always takes priority over the single proxy. The selector
/// is read-only after construction and draws from the thread-local RNG, so it
/// can be shared by concurrent dispatches.
#[derive(Debug, Clone, Default)]
pub struct ProxySelector {
    single: Option<String>,
    pool: Vec<String>,
}

impl ProxySelector {
    pub fn new(single: Option<String>, pool: Vec<String>) -> Self {
        Self {
            single: single.filter(|p| !p.is_empty()),
            pool,
        }
    }

    /// Picks a proxy for the next dispatch
    ///
    /// # Returns
    ///
    /// * `Some(proxy)` - A uniformly random pool entry, or the single proxy when the pool is empty
    /// * `None` - No proxy is configured; connect directly
    pub fn choose(&self) -> Option<String> {
        if !self.pool.is_empty() {
            return self.pool.choose(&mut rand::rng()).cloned();
        }
        self.single.clone()
    }

    /// Returns true if neither a pool nor a single proxy is configured
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty() && self.single.is_none()
    }

    /// Every configured proxy, single proxy first
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.single
            .iter()
            .chain(self.pool.iter())
            .map(String::as_str)
    }

    /// Checks that every configured address parses
    pub fn validate(&self) -> Result<(), ConfigError> {
        for entry in self.entries() {
            ProxyAddress::parse(entry)?;
        }
        Ok(())
    }
}
