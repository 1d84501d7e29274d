//! Predator main entry point
//!
//! This is the command-line interface for the Predator request-execution core.

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use predator_core::config::{load_config, Config};
use predator_core::multipart::DEFAULT_DASH_PREFIX;
use predator_core::{CrawlerBuilder, MultipartForm};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Predator: programmable HTTP(S) request dispatcher
///
/// Fetches each URL through the configured proxies with the configured retry
/// policy and prints one line per response.
#[derive(Parser, Debug)]
#[command(name = "predator")]
#[command(version)]
#[command(about = "Dispatch HTTP requests through rotating proxies", long_about = None)]
struct Cli {
    /// URLs to fetch
    #[arg(value_name = "URL", required = true)]
    urls: Vec<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Form field sent with a POST request (repeatable)
    #[arg(short = 'd', long = "data", value_name = "KEY=VALUE")]
    data: Vec<String>,

    /// File part sent with a multipart POST request (repeatable)
    #[arg(short = 'F', long = "file", value_name = "NAME=PATH")]
    files: Vec<String>,

    /// Send form fields as multipart/form-data
    #[arg(long)]
    multipart: bool,

    /// Override the configured retry count
    #[arg(long, value_name = "N")]
    retry: Option<u32>,

    /// Override the configured proxy
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,

    /// Print response bodies
    #[arg(long)]
    show_body: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(retry) = cli.retry {
        config.crawler.retry_count = retry;
    }
    if let Some(proxy) = &cli.proxy {
        config.crawler.proxy = Some(proxy.clone());
        config.crawler.proxy_pool.clear();
    }

    let show_body = cli.show_body;
    let crawler = CrawlerBuilder::from_config(&config)?
        .after_response(move |resp| {
            println!(
                "{} {} ({} bytes){}",
                resp.status_code(),
                resp.request.url,
                resp.body.len(),
                if resp.from_cache { " [cached]" } else { "" }
            );
            if show_body {
                println!("{}", resp.text());
            }
        })
        .build()?;

    let token = crawler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling in-flight requests");
            token.cancel();
        }
    });

    let fields = parse_pairs(&cli.data)?;
    let files = parse_pairs(&cli.files)?;

    let mut failures = 0;
    if cli.multipart || !files.is_empty() {
        for url in &cli.urls {
            let mut form = MultipartForm::new(DEFAULT_DASH_PREFIX)?;
            for (name, value) in &fields {
                form.append_string(name, value)?;
            }
            for (name, path) in &files {
                form.append_file(name, path)?;
            }
            if let Err(e) = crawler.post_multipart(url, form, None).await {
                tracing::error!("{}: {}", url, e);
                failures += 1;
            }
        }
    } else if !fields.is_empty() {
        for url in &cli.urls {
            if let Err(e) = crawler.post(url, fields.clone(), None).await {
                tracing::error!("{}: {}", url, e);
                failures += 1;
            }
        }
    } else {
        for (url, result) in cli.urls.iter().zip(crawler.get_all(&cli.urls).await) {
            if let Err(e) = result {
                tracing::error!("{}: {}", url, e);
                failures += 1;
            }
        }
    }

    tracing::info!(
        "Sent {} requests, received {} responses",
        crawler.requests_sent(),
        crawler.responses_received()
    );

    if failures > 0 {
        bail!("{} of {} requests failed", failures, cli.urls.len());
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// A non-empty `DEBUG` environment variable forces debug output.
fn setup_logging(verbose: u8, quiet: bool) {
    let debug_forced = std::env::var("DEBUG").is_ok_and(|v| !v.is_empty());

    let filter = if debug_forced {
        EnvFilter::new("predator_core=debug,predator=debug,info")
    } else if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("predator_core=info,predator=info,warn"),
            1 => EnvFilter::new("predator_core=debug,predator=debug,info"),
            2 => EnvFilter::new("predator_core=trace,predator=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Splits `KEY=VALUE` arguments
fn parse_pairs(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => bail!("expected KEY=VALUE, got '{}'", pair),
        })
        .collect()
}
