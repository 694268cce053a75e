//! Run configuration.
//!
//! A run is described by one immutable [`ScrapeJob`], built from the CLI and
//! an optional YAML settings file before any worker starts, then shared as an
//! `Arc<ScrapeJob>`. Nothing reads configuration from global state.

use crate::commodities::CommodityVariantTable;
use crate::error::{Result, ScrapeError};
use chrono::{Days, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

pub const ARCHIVE_URL_BASE: &str = "https://www.newagebd.net/archive?date=";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Title keywords that make an article worth visiting.
pub const PRICE_KEYWORDS: &[&str] = &[
    "price", "prices", "Tk", "taka", "market", "commodity", "commodities", "rises", "rise",
    "falls", "fall", "increase", "decrease", "up", "down", "wholesale", "retail", "essentials",
    "kitchen", "bazaar", "bazar", "per kg", "per kilogram", "per litre", "per hali", "cost",
    "rate", "টাকা", "দাম", "মূল্য", "বাজার",
];

/// Date ranges longer than this get one browser shared by all workers.
pub const SHARED_BROWSER_THRESHOLD: usize = 10;

/// Which page implementation workers drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// Chrome through a WebDriver server (chromedriver).
    Webdriver,
    /// Plain HTTP fetches; no JavaScript, no infinite scroll.
    Http,
}

/// How the browser side is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserSettings {
    pub backend: BackendKind,
    pub headless: bool,
    /// Connect to this WebDriver server instead of spawning chromedriver.
    pub webdriver_url: Option<String>,
    pub chromedriver: PathBuf,
    pub user_agent: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Webdriver,
            headless: true,
            webdriver_url: None,
            chromedriver: PathBuf::from("chromedriver"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Infinite-scroll limits for archive listings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScrollPolicy {
    pub max_attempts: u32,
    /// Pause after each scroll for lazy content to arrive.
    pub settle_ms: u64,
    /// Stop after this many scrolls that found an end-of-list marker.
    pub end_marker_limit: u32,
    /// Pause after the last scroll.
    pub final_wait_ms: u64,
    pub end_markers: Vec<String>,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            settle_ms: 1500,
            end_marker_limit: 1,
            final_wait_ms: 1000,
            end_markers: vec![
                "div.google-auto-placed".to_string(),
                ".no-more-articles".to_string(),
                ".end-of-content".to_string(),
            ],
        }
    }
}

/// Page-load waits and retry backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPolicy {
    /// Bound on navigation until the DOM is ready.
    pub page_timeout: Duration,
    /// Best-effort wait for a content marker after navigation.
    pub content_wait: Duration,
    pub content_markers: String,
    /// Pause after a successful load for scripts to run.
    pub settle: Duration,
    pub retry_attempts: u32,
    /// Attempt `n` waits `n * retry_backoff` before the next try.
    pub retry_backoff: Duration,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(30),
            content_wait: Duration::from_secs(3),
            content_markers: "div.post-content, article .content, main".to_string(),
            settle: Duration::from_millis(500),
            retry_attempts: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// Randomised politeness delays, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Pacing {
    pub article_delay_ms: Range<u64>,
    pub date_delay_ms: Range<u64>,
}

impl Pacing {
    /// No delays at all; used by tests and offline backends.
    pub fn none() -> Self {
        Self {
            article_delay_ms: 0..0,
            date_delay_ms: 0..0,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            article_delay_ms: 500..1000,
            date_delay_ms: 1000..2000,
        }
    }
}

/// Optional YAML settings file.
///
/// ```yaml
/// archive_url_base: "https://www.newagebd.net/archive?date="
/// shared_browser_threshold: 10
/// keywords: [price, market, bazar]
/// variants:
///   Rice: [basmati]
///   Salt: [salt, lobon]
/// scroll:
///   max_attempts: 15
/// pacing:
///   article_delay_ms: { start: 200, end: 400 }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub archive_url_base: Option<String>,
    pub shared_browser_threshold: Option<usize>,
    pub user_agent: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub variants: BTreeMap<String, Vec<String>>,
    pub scroll: Option<ScrollPolicy>,
    pub pacing: Option<Pacing>,
}

impl Settings {
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let settings: Settings = serde_yaml::from_str(&text)?;
        info!(
            extra_variants = settings.variants.len(),
            "Loaded settings file"
        );
        Ok(settings)
    }
}

/// Everything one run needs. Immutable once built.
#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Canonical names, all keys of `variants`.
    pub commodities: Vec<String>,
    pub workers: usize,
    pub debug: bool,
    pub output_dir: PathBuf,
    pub archive_url_base: String,
    pub keywords: Vec<String>,
    pub variants: CommodityVariantTable,
    pub shared_browser_threshold: usize,
    pub min_article_chars: usize,
    pub browser: BrowserSettings,
    pub load: LoadPolicy,
    pub scroll: ScrollPolicy,
    pub pacing: Pacing,
}

impl ScrapeJob {
    /// Start building a job for the given inclusive date range.
    pub fn builder(start: NaiveDate, end: NaiveDate) -> ScrapeJobBuilder {
        ScrapeJobBuilder::new(start, end)
    }

    /// Every date in the range, inclusive, oldest first.
    pub fn dates(&self) -> Vec<NaiveDate> {
        date_range(self.start, self.end)
    }

    pub fn archive_url(&self, date: NaiveDate) -> String {
        format!("{}{}", self.archive_url_base, date.format("%Y-%m-%d"))
    }

    /// Case-insensitive substring match of `title` against the keyword list.
    pub fn is_relevant_title(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.keywords
            .iter()
            .any(|k| title.contains(&k.to_lowercase()))
    }
}

/// Inclusive list of dates from `start` to `end`; empty when `start > end`.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut day = start;
    while day <= end {
        dates.push(day);
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

/// Validating builder for [`ScrapeJob`].
#[derive(Debug, Clone)]
pub struct ScrapeJobBuilder {
    job: ScrapeJob,
    requested: Vec<String>,
    settings: Settings,
}

impl ScrapeJobBuilder {
    fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            job: ScrapeJob {
                start,
                end,
                commodities: Vec::new(),
                workers: 4,
                debug: false,
                output_dir: PathBuf::from("output"),
                archive_url_base: ARCHIVE_URL_BASE.to_string(),
                keywords: PRICE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
                variants: CommodityVariantTable::builtin(),
                shared_browser_threshold: SHARED_BROWSER_THRESHOLD,
                min_article_chars: 50,
                browser: BrowserSettings::default(),
                load: LoadPolicy::default(),
                scroll: ScrollPolicy::default(),
                pacing: Pacing::default(),
            },
            requested: crate::commodities::DEFAULT_COMMODITIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            settings: Settings::default(),
        }
    }

    pub fn commodities<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.job.workers = workers;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.job.debug = debug;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.job.output_dir = dir.into();
        self
    }

    pub fn archive_url_base(mut self, base: impl Into<String>) -> Self {
        self.job.archive_url_base = base.into();
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.job.load.retry_attempts = attempts;
        self
    }

    pub fn page_timeout(mut self, timeout: Duration) -> Self {
        self.job.load.page_timeout = timeout;
        self
    }

    pub fn load_policy(mut self, load: LoadPolicy) -> Self {
        self.job.load = load;
        self
    }

    pub fn scroll_policy(mut self, scroll: ScrollPolicy) -> Self {
        self.job.scroll = scroll;
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.job.pacing = pacing;
        self
    }

    pub fn browser(mut self, browser: BrowserSettings) -> Self {
        self.job.browser = browser;
        self
    }

    pub fn shared_browser_threshold(mut self, threshold: usize) -> Self {
        self.job.shared_browser_threshold = threshold;
        self
    }

    /// Apply a settings file on top of the defaults. Explicit builder calls
    /// made afterwards still win.
    pub fn settings(mut self, settings: Settings) -> Self {
        if let Some(base) = &settings.archive_url_base {
            self.job.archive_url_base = base.clone();
        }
        if let Some(threshold) = settings.shared_browser_threshold {
            self.job.shared_browser_threshold = threshold;
        }
        if let Some(ua) = &settings.user_agent {
            self.job.browser.user_agent = ua.clone();
        }
        if let Some(keywords) = &settings.keywords {
            self.job.keywords = keywords.clone();
        }
        if let Some(scroll) = &settings.scroll {
            self.job.scroll = scroll.clone();
        }
        if let Some(pacing) = &settings.pacing {
            self.job.pacing = pacing.clone();
        }
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<ScrapeJob> {
        let mut job = self.job;
        if job.start > job.end {
            return Err(ScrapeError::Config(format!(
                "start date {} is after end date {}",
                job.start, job.end
            )));
        }
        if job.workers == 0 {
            return Err(ScrapeError::Config("worker count must be at least 1".to_string()));
        }
        if job.load.retry_attempts == 0 {
            return Err(ScrapeError::Config("retry attempts must be at least 1".to_string()));
        }
        job.variants = job.variants.with_extra_variants(&self.settings.variants)?;
        job.commodities = job.variants.resolve(&self.requested)?;
        Ok(job)
    }
}

/// Split a comma-separated CLI list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let job = ScrapeJob::builder(d(2024, 1, 1), d(2024, 1, 3)).build().unwrap();
        assert_eq!(job.workers, 4);
        assert_eq!(job.load.retry_attempts, 3);
        assert_eq!(job.load.page_timeout, Duration::from_secs(30));
        assert_eq!(job.commodities.len(), 12);
        assert!(job.browser.headless);
        assert_eq!(job.dates().len(), 3);
    }

    #[test]
    fn test_builder_rejects_reversed_range() {
        let err = ScrapeJob::builder(d(2024, 1, 5), d(2024, 1, 3)).build().unwrap_err();
        assert!(matches!(err, ScrapeError::Config(_)));
    }

    #[test]
    fn test_builder_rejects_zero_workers() {
        assert!(ScrapeJob::builder(d(2024, 1, 1), d(2024, 1, 1))
            .workers(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_builder_rejects_unknown_commodity() {
        assert!(ScrapeJob::builder(d(2024, 1, 1), d(2024, 1, 1))
            .commodities(["Rice", "Unobtainium"])
            .build()
            .is_err());
    }

    #[test]
    fn test_settings_add_commodity() {
        let settings: Settings = serde_yaml::from_str(
            "variants:\n  Salt: [salt, lobon]\nkeywords: [salt]\nshared_browser_threshold: 2\n",
        )
        .unwrap();
        let job = ScrapeJob::builder(d(2024, 1, 1), d(2024, 1, 1))
            .settings(settings)
            .commodities(["salt"])
            .build()
            .unwrap();
        assert_eq!(job.commodities, vec!["Salt".to_string()]);
        assert_eq!(job.shared_browser_threshold, 2);
        assert!(job.is_relevant_title("Salt runs short"));
        assert!(!job.is_relevant_title("Prices of rice"));
    }

    #[test]
    fn test_settings_scroll_partial() {
        let settings: Settings = serde_yaml::from_str("scroll:\n  max_attempts: 15\n").unwrap();
        let scroll = settings.scroll.unwrap();
        assert_eq!(scroll.max_attempts, 15);
        assert_eq!(scroll.settle_ms, 1500);
    }

    #[test]
    fn test_date_range_across_month() {
        let dates = date_range(d(2024, 2, 28), d(2024, 3, 1));
        assert_eq!(dates, vec![d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]);
        assert!(date_range(d(2024, 3, 2), d(2024, 3, 1)).is_empty());
    }

    #[test]
    fn test_archive_url() {
        let job = ScrapeJob::builder(d(2024, 1, 9), d(2024, 1, 9)).build().unwrap();
        assert_eq!(
            job.archive_url(d(2024, 1, 9)),
            "https://www.newagebd.net/archive?date=2024-01-09"
        );
    }

    #[test]
    fn test_keyword_relevance_is_case_insensitive() {
        let job = ScrapeJob::builder(d(2024, 1, 1), d(2024, 1, 1)).build().unwrap();
        assert!(job.is_relevant_title("Kitchen MARKET prices soar"));
        assert!(job.is_relevant_title("চালের দাম বাড়ছে"));
        assert!(!job.is_relevant_title("Cricket team wins series"));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("Rice, Sugar,,  "), vec!["Rice", "Sugar"]);
    }
}
