//! Configuration module for Predator
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use predator_core::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("predator.toml")).unwrap();
//! println!("Crawler will retry {} times", config.crawler.retry_count);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{CacheConfig, Config, CrawlerConfig};

pub use parser::{load_config, parse_config};
