//! # commodity_price_scraper
//!
//! Scrapes a daily news archive for articles about commodity prices, pulls
//! price quotes out of the article text, and writes per-commodity CSV reports
//! plus one combined JSON report.
//!
//! ## Architecture
//!
//! 1. **Orchestration** ([`orchestrator`]): split the date range across a
//!    fixed pool of workers, each with its own browser page
//! 2. **Walking** ([`walker`]): per date, load and scroll the archive listing,
//!    keep price-related articles, visit each
//! 3. **Extraction** ([`extractor`], [`rules`], [`commodities`]): match
//!    commodity names and price phrases sentence by sentence
//! 4. **Output** ([`outputs`]): group, sort, deduplicate and write reports
//!
//! [`pipeline::execute`] ties the steps together; [`scheduler`] repeats it on
//! a cron schedule.

pub mod browser;
pub mod cli;
pub mod commodities;
pub mod config;
pub mod error;
pub mod extractor;
pub mod models;
pub mod orchestrator;
pub mod outputs;
pub mod pipeline;
pub mod rules;
pub mod scheduler;
pub mod utils;
pub mod walker;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `debug` if requested, else `info`.
pub fn init_tracing(debug: bool) {
    use tracing_subscriber::{EnvFilter, fmt as tfmt};

    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();
}
