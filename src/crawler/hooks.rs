//! Before-request and after-response hook lists
//!
//! Hooks are stored copy-on-write: registration swaps in a new `Arc<Vec<_>>`
//! under a write lock, and each dispatch takes one snapshot of the list before
//! iterating. An in-flight dispatch therefore always sees a complete list, and
//! no lock is held while hooks run.

use crate::request::{Request, Response};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

/// Callback run before a request is sent; may mutate or abort it
pub type RequestHook = Arc<dyn Fn(&mut Request) + Send + Sync>;

/// Callback run after a response is produced
pub type ResponseHook = Arc<dyn Fn(&Response) + Send + Sync>;

/// Append-only, copy-on-write list of hooks
pub struct HookList<H> {
    hooks: RwLock<Arc<Vec<H>>>,
}

impl<H> Default for HookList<H> {
    fn default() -> Self {
        Self {
            hooks: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

impl<H: Clone> HookList<H> {
    pub fn new(initial: Vec<H>) -> Self {
        Self {
            hooks: RwLock::new(Arc::new(initial)),
        }
    }

    /// Appends a hook; dispatches already in flight keep their old snapshot
    pub fn push(&self, hook: H) {
        let mut guard = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(hook);
        *guard = Arc::new(next);
    }

    /// Takes a consistent view of the current hooks
    pub fn snapshot(&self) -> Arc<Vec<H>> {
        Arc::clone(&self.hooks.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs every before-request hook in registration order
///
/// The chain always completes even if a hook aborts the request. A panicking
/// hook stops the chain and its message is returned as the error.
pub(crate) fn run_request_hooks(hooks: &[RequestHook], request: &mut Request) -> Result<(), String> {
    for hook in hooks {
        catch_unwind(AssertUnwindSafe(|| hook(request))).map_err(panic_message)?;
    }
    Ok(())
}

/// Runs every after-response hook in registration order
pub(crate) fn run_response_hooks(hooks: &[ResponseHook], response: &Response) -> Result<(), String> {
    for hook in hooks {
        catch_unwind(AssertUnwindSafe(|| hook(response))).map_err(panic_message)?;
    }
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "hook panicked".to_string()
    }
}
