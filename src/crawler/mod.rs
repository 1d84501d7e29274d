//! Crawler orchestration
//!
//! This module contains the dispatch logic, including:
//! - Building requests with headers, proxy assignment and unique IDs
//! - Running before-request and after-response hooks
//! - Executing requests with the retry policy
//! - Consulting the response cache
//! - Recycling request objects through the pool

mod builder;
mod core;
mod counters;
mod hooks;
mod retry;

pub use builder::{CrawlerBuilder, DEFAULT_USER_AGENT};
pub use self::core::Crawler;
pub use counters::Counters;
pub use hooks::{HookList, RequestHook, ResponseHook};
pub use retry::{RetryPolicy, RetryPredicate};
