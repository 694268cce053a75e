//! Combined JSON report.
//!
//! All written records go into one `all_prices_data.json`:
//!
//! ```json
//! {
//!   "metadata": {
//!     "dateRange": { "start": "2024-03-01", "end": "2024-03-07" },
//!     "totalEntries": 42,
//!     "commodities": ["Rice", "Onion"],
//!     "generatedAt": "2024-03-08T02:00:31.512Z"
//!   },
//!   "data": [ { "date": "2024-03-01", "commodity": "Rice", ... } ]
//! }
//! ```

use crate::config::ScrapeJob;
use crate::error::Result;
use crate::models::PriceObservation;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

pub const COMBINED_FILE_NAME: &str = "all_prices_data.json";

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub date_range: DateRange,
    pub total_entries: usize,
    pub commodities: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CombinedReport<'a> {
    pub metadata: ReportMetadata,
    pub data: Vec<&'a PriceObservation>,
}

/// Build the report; `data` is sorted by date, then commodity.
pub fn combined_report<'a>(
    records: &[&'a PriceObservation],
    job: &ScrapeJob,
    generated_at: DateTime<Utc>,
) -> CombinedReport<'a> {
    let mut data = records.to_vec();
    data.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.commodity.cmp(&b.commodity)));
    CombinedReport {
        metadata: ReportMetadata {
            date_range: DateRange {
                start: job.start,
                end: job.end,
            },
            total_entries: data.len(),
            commodities: job.commodities.clone(),
            generated_at,
        },
        data,
    }
}

/// Write [`COMBINED_FILE_NAME`] into `dir`.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_combined(
    records: &[&PriceObservation],
    job: &ScrapeJob,
    dir: &Path,
) -> Result<PathBuf> {
    let report = combined_report(records, job, Utc::now());
    let json = serde_json::to_string_pretty(&report)?;
    let path = dir.join(COMBINED_FILE_NAME);

    info!(path = %path.display(), entries = report.metadata.total_entries, "Writing JSON");
    fs::write(&path, json).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, PriceType};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn obs(day: u32, commodity: &str) -> PriceObservation {
        PriceObservation {
            date: d(day),
            archive_date: d(day),
            commodity: commodity.to_string(),
            price: "Tk 70 per kg".to_string(),
            price_type: PriceType::Retail,
            article_title: "Market report".to_string(),
            article_url: "https://news.test/a".to_string(),
            context: Some("Rice was sold for Tk 70 per kg.".to_string()),
            confidence: Confidence::Nearby,
        }
    }

    #[tokio::test]
    async fn test_write_combined_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let job = ScrapeJob::builder(d(1), d(7))
            .commodities(["Rice", "Onion"])
            .build()
            .unwrap();
        let (a, b) = (obs(5, "Rice"), obs(2, "Onion"));
        let path = write_combined(&[&a, &b], &job, tmp.path()).await.unwrap();
        assert_eq!(path, tmp.path().join("all_prices_data.json"));

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let meta = &value["metadata"];
        assert_eq!(meta["dateRange"]["start"], "2024-03-01");
        assert_eq!(meta["dateRange"]["end"], "2024-03-07");
        assert_eq!(meta["totalEntries"], 2);
        assert_eq!(meta["commodities"], serde_json::json!(["Rice", "Onion"]));
        assert!(meta["generatedAt"].is_string());

        let data = value["data"].as_array().unwrap();
        assert_eq!(data[0]["commodity"], "Onion");
        assert_eq!(data[1]["priceType"], "Retail");
        assert_eq!(data[1]["confidence"], "nearby");
        assert_eq!(data[1]["archiveDate"], "2024-03-05");
    }

    #[test]
    fn test_empty_report() {
        let job = ScrapeJob::builder(d(1), d(1)).build().unwrap();
        let report = combined_report(&[], &job, Utc::now());
        assert_eq!(report.metadata.total_entries, 0);
        assert!(report.data.is_empty());
    }
}
