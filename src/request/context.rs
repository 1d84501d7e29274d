//! Shared key/value store for a request and its response
//!
//! A `Context` is created once per logical request and is referenced (not
//! copied) by both the `Request` and the `Response` it produces, so hooks can
//! pass typed values from request construction through to response handling.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

type Value = Arc<dyn Any + Send + Sync>;

/// Mutable key/value store shared between a request and its response
#[derive(Default)]
pub struct Context {
    values: RwLock<HashMap<String, Value>>,
}

impl Context {
    /// Creates an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty context ready to be shared across a dispatch boundary
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stores a value under `key`, replacing any previous value
    pub fn put<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Arc::new(value));
    }

    /// Gets the value under `key` as a string
    ///
    /// # Returns
    ///
    /// * `Some(String)` - The value was stored as a `String` or `&'static str`
    /// * `None` - The key is missing or holds a value of another type
    pub fn get(&self, key: &str) -> Option<String> {
        let value = self.get_any(key)?;
        if let Some(s) = value.downcast_ref::<String>() {
            return Some(s.clone());
        }
        value.downcast_ref::<&'static str>().map(|s| s.to_string())
    }

    /// Gets the raw value under `key`; the caller narrows the type
    pub fn get_any(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Gets a clone of the value under `key` if it has type `T`
    pub fn get_as<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.get_any(key)?.downcast_ref::<T>().cloned()
    }

    /// Removes the value under `key`, returning true if it was present
    pub fn delete(&self, key: &str) -> bool {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Returns the keys currently stored, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every value, keeping the map allocation
    pub fn clear(&mut self) {
        self.values
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("keys", &self.keys()).finish()
    }
}
