//! In-memory cache backend

use crate::cache::traits::{Cache, CacheError, CacheResult, CachedResponse};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Process-local cache backed by a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CachedResponse>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> CacheResult<MutexGuard<'_, HashMap<String, CachedResponse>>> {
        self.entries.lock().map_err(|_| CacheError::Poisoned)
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<CachedResponse>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, response: &CachedResponse) -> CacheResult<()> {
        self.entries()?.insert(key.to_string(), response.clone());
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        self.entries()?.clear();
        Ok(())
    }

    fn len(&self) -> CacheResult<usize> {
        Ok(self.entries()?.len())
    }
}
