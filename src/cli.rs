//! Command-line interface definitions.
//!
//! [`JobArgs`] holds every option that shapes a scrape job and is shared by
//! both binaries: the one-shot scraper ([`Cli`]) adds the date range, the
//! scheduler computes its own.

use crate::config::{BackendKind, BrowserSettings, ScrapeJob, Settings, parse_list};
use crate::commodities::DEFAULT_COMMODITIES;
use crate::error::Result;
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// Options common to every way of running a scrape.
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Number of parallel workers
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Comma-separated commodity names (case-insensitive)
    #[arg(short = 'c', long, default_value_t = DEFAULT_COMMODITIES.join(","))]
    pub commodities: String,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,

    /// Run the browser headless
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub headless: bool,

    /// Page load attempts before giving up on a page
    #[arg(long, default_value_t = 3)]
    pub retry_attempts: u32,

    /// Page load timeout, in seconds
    #[arg(long, default_value_t = 30)]
    pub page_timeout: u64,

    /// Directory for CSV and JSON reports
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Optional path to a YAML settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// How pages are fetched
    #[arg(long, value_enum, default_value_t = BackendKind::Webdriver)]
    pub backend: BackendKind,

    /// Use an already-running WebDriver server instead of spawning chromedriver
    #[arg(long, env = "WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// chromedriver binary to spawn
    #[arg(long, env = "CHROMEDRIVER", default_value = "chromedriver")]
    pub chromedriver: PathBuf,
}

impl JobArgs {
    /// Build a validated job for `start..=end`, reading the settings file if
    /// one was given.
    pub async fn build_job(&self, start: NaiveDate, end: NaiveDate) -> Result<ScrapeJob> {
        let settings = match &self.config {
            Some(path) => Settings::load(path).await?,
            None => Settings::default(),
        };
        let browser = BrowserSettings {
            backend: self.backend,
            headless: self.headless,
            webdriver_url: self.webdriver_url.clone(),
            chromedriver: self.chromedriver.clone(),
            ..BrowserSettings::default()
        };

        ScrapeJob::builder(start, end)
            .browser(browser)
            .settings(settings)
            .commodities(parse_list(&self.commodities))
            .workers(self.workers)
            .debug(self.debug)
            .retry_attempts(self.retry_attempts)
            .page_timeout(Duration::from_secs(self.page_timeout))
            .output_dir(&self.output_dir)
            .build()
    }
}

/// Scrape the news archive for commodity prices over a date range.
///
/// # Examples
///
/// ```sh
/// commodity_price_scraper --start 2024-03-01 --end 2024-03-07
///
/// commodity_price_scraper --start 2024-03-01 --end 2024-03-31 \
///     --workers 6 --commodities "Rice,Onion,Hilsa Fish" --headless false
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// First archive date (YYYY-MM-DD)
    #[arg(short, long)]
    pub start: NaiveDate,

    /// Last archive date, inclusive (YYYY-MM-DD)
    #[arg(short, long)]
    pub end: NaiveDate,

    #[command(flatten)]
    pub job: JobArgs,
}
