//! Data models for article stubs, extracted prices and worker results.
//!
//! - [`ArticleRef`]: an article card found on an archive listing page
//! - [`PriceObservation`]: one extracted price, the unit of output
//! - [`WorkerReport`]: what a worker sends back to the orchestrator
//!
//! Observations serialize with camelCase keys to keep the combined JSON
//! report readable by the downstream spreadsheets that consumed the earlier
//! scraper's output.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Retail or wholesale classification of a quoted price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriceType {
    Retail,
    Wholesale,
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceType::Retail => write!(f, "Retail"),
            PriceType::Wholesale => write!(f, "Wholesale"),
        }
    }
}

/// How a price was tied to its commodity.
///
/// `Nearby` means the price sat in a sentence next to the one naming the
/// commodity. Treat it as a weaker attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Direct,
    Nearby,
}

/// An article card from an archive listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRef {
    pub title: String,
    /// Absolute article URL.
    pub url: String,
    /// Raw `datetime` attribute of the card's `<time>` element, if present.
    pub published: Option<String>,
}

impl ArticleRef {
    /// The calendar date the article reports, if the card carried a usable one.
    ///
    /// Accepts RFC 3339 timestamps (the offset's local date is kept) and
    /// anything starting with `YYYY-MM-DD`.
    pub fn published_date(&self) -> Option<NaiveDate> {
        let raw = self.published.as_deref()?.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.date_naive());
        }
        raw.get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }
}

/// One extracted (date, commodity, price, type) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceObservation {
    /// Date the article reports, falling back to the archive date.
    pub date: NaiveDate,
    /// Archive listing date that led to the article.
    pub archive_date: NaiveDate,
    /// Canonical commodity name, always a key of the variant table.
    pub commodity: String,
    /// Price text as it appeared in the article, e.g. `Tk 50-55 per kg`.
    pub price: String,
    pub price_type: PriceType,
    pub article_title: String,
    pub article_url: String,
    /// The sentence the price was taken from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub confidence: Confidence,
}

/// Per-worker counters, logged at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub dates_processed: usize,
    pub dates_skipped: usize,
    pub articles_seen: usize,
    pub articles_relevant: usize,
    pub articles_processed: usize,
    pub articles_failed: usize,
}

impl WorkerStats {
    pub fn absorb(&mut self, other: &WorkerStats) {
        self.dates_processed += other.dates_processed;
        self.dates_skipped += other.dates_skipped;
        self.articles_seen += other.articles_seen;
        self.articles_relevant += other.articles_relevant;
        self.articles_processed += other.articles_processed;
        self.articles_failed += other.articles_failed;
    }
}

/// Result descriptor a worker sends back over the results channel.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub observations: Vec<PriceObservation>,
    pub stats: WorkerStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(published: Option<&str>) -> ArticleRef {
        ArticleRef {
            title: "Prices of essentials rise".to_string(),
            url: "https://example.com/a".to_string(),
            published: published.map(str::to_string),
        }
    }

    #[test]
    fn test_published_date_rfc3339_keeps_local_date() {
        let a = article(Some("2024-03-05T01:30:00+06:00"));
        assert_eq!(a.published_date(), NaiveDate::from_ymd_opt(2024, 3, 5));
    }

    #[test]
    fn test_published_date_plain_formats() {
        assert_eq!(
            article(Some("2024-03-05 10:00:00")).published_date(),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(
            article(Some("2024-03-05")).published_date(),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
    }

    #[test]
    fn test_published_date_missing_or_garbage() {
        assert_eq!(article(None).published_date(), None);
        assert_eq!(article(Some("")).published_date(), None);
        assert_eq!(article(Some("yesterday")).published_date(), None);
    }

    #[test]
    fn test_observation_serialization_uses_camel_case() {
        let obs = PriceObservation {
            date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            archive_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            commodity: "Rice".to_string(),
            price: "Tk 70 per kg".to_string(),
            price_type: PriceType::Retail,
            article_title: "Rice prices steady".to_string(),
            article_url: "https://example.com/rice".to_string(),
            context: None,
            confidence: Confidence::Direct,
        };
        let json = serde_json::to_string(&obs).unwrap();
        assert!(json.contains("\"priceType\":\"Retail\""));
        assert!(json.contains("\"articleTitle\""));
        assert!(json.contains("\"date\":\"2024-03-05\""));
        assert!(json.contains("\"confidence\":\"direct\""));
        assert!(!json.contains("context"));
    }

    #[test]
    fn test_stats_absorb() {
        let mut total = WorkerStats::default();
        let one = WorkerStats {
            dates_processed: 2,
            articles_failed: 1,
            ..Default::default()
        };
        total.absorb(&one);
        total.absorb(&one);
        assert_eq!(total.dates_processed, 4);
        assert_eq!(total.articles_failed, 2);
    }
}
