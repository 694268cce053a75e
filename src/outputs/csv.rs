//! Per-commodity CSV reports.
//!
//! Each commodity with at least one record gets `<Commodity_Name>_prices.csv`:
//!
//! ```text
//! Month,Product Name,Price Range,Price Type,Source Date,Article Title,Article URL
//! 2024-03,Rice,Tk 70 per kg,Retail,05 Mar 2024,Rice prices steady,https://...
//! ```
//!
//! Rows are sorted by date (stable, so same-day rows keep discovery order) and
//! repeated (date, price, price type) rows are dropped.

use crate::error::{Result, ScrapeError};
use crate::extractor::normalize_price;
use crate::models::PriceObservation;
use crate::utils::file_stem;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Month")]
    month: String,
    #[serde(rename = "Product Name")]
    product_name: &'a str,
    #[serde(rename = "Price Range")]
    price_range: &'a str,
    #[serde(rename = "Price Type")]
    price_type: String,
    #[serde(rename = "Source Date")]
    source_date: String,
    #[serde(rename = "Article Title")]
    article_title: &'a str,
    #[serde(rename = "Article URL")]
    article_url: &'a str,
}

impl<'a> From<&'a PriceObservation> for CsvRow<'a> {
    fn from(obs: &'a PriceObservation) -> Self {
        CsvRow {
            month: obs.date.format("%Y-%m").to_string(),
            product_name: &obs.commodity,
            price_range: &obs.price,
            price_type: obs.price_type.to_string(),
            source_date: obs.date.format("%d %b %Y").to_string(),
            article_title: &obs.article_title,
            article_url: &obs.article_url,
        }
    }
}

/// File name for a commodity's report.
pub fn csv_file_name(commodity: &str) -> String {
    format!("{}_prices.csv", file_stem(commodity))
}

/// One commodity's rows: date-sorted, then deduplicated.
pub fn prepare_rows<'a>(records: &[&'a PriceObservation]) -> Vec<&'a PriceObservation> {
    let mut rows = records.to_vec();
    rows.sort_by_key(|obs| obs.date);
    rows.into_iter()
        .unique_by(|obs| (obs.date, normalize_price(&obs.price), obs.price_type))
        .collect()
}

/// Render rows as CSV text, header included.
pub fn render_csv(rows: &[&PriceObservation]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for obs in rows {
        writer.serialize(CsvRow::from(*obs))?;
    }
    writer
        .into_inner()
        .map_err(|e| ScrapeError::Io(e.into_error()))
}

/// Write one CSV per commodity into `dir`. Returns the written paths in
/// commodity-name order.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_commodity_csvs(records: &[&PriceObservation], dir: &Path) -> Result<Vec<PathBuf>> {
    let mut by_commodity: BTreeMap<&str, Vec<&PriceObservation>> = BTreeMap::new();
    for obs in records {
        by_commodity.entry(obs.commodity.as_str()).or_default().push(obs);
    }

    let mut written = Vec::with_capacity(by_commodity.len());
    for (commodity, group) in by_commodity {
        let rows = prepare_rows(&group);
        let bytes = render_csv(&rows)?;
        let path = dir.join(csv_file_name(commodity));
        fs::write(&path, bytes).await?;
        debug!(dropped = group.len() - rows.len(), "Dropped duplicate rows");
        info!(commodity, rows = rows.len(), path = %path.display(), "Wrote CSV");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, PriceType};
    use chrono::NaiveDate;

    fn obs(day: u32, commodity: &str, price: &str, price_type: PriceType) -> PriceObservation {
        let date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        PriceObservation {
            date,
            archive_date: date,
            commodity: commodity.to_string(),
            price: price.to_string(),
            price_type,
            article_title: format!("{} market report", commodity),
            article_url: format!("https://news.test/{}/{}", commodity.to_lowercase(), day),
            context: None,
            confidence: Confidence::Direct,
        }
    }

    fn read_rows(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let header = reader.headers().unwrap().iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        (header, rows)
    }

    #[tokio::test]
    async fn test_two_dates_sorted_ascending() {
        let tmp = tempfile::tempdir().unwrap();
        let later = obs(9, "Rice", "Tk 72 per kg", PriceType::Retail);
        let earlier = obs(2, "Rice", "Tk 70 per kg", PriceType::Retail);
        let paths = write_commodity_csvs(&[&later, &earlier], tmp.path()).await.unwrap();

        assert_eq!(paths, vec![tmp.path().join("Rice_prices.csv")]);
        let (header, rows) = read_rows(&paths[0]);
        assert_eq!(
            header,
            vec![
                "Month",
                "Product Name",
                "Price Range",
                "Price Type",
                "Source Date",
                "Article Title",
                "Article URL"
            ]
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "2024-03");
        assert_eq!(rows[0][2], "Tk 70 per kg");
        assert_eq!(rows[0][4], "02 Mar 2024");
        assert_eq!(rows[1][2], "Tk 72 per kg");
        assert_eq!(rows[1][3], "Retail");
    }

    #[tokio::test]
    async fn test_one_file_per_commodity() {
        let tmp = tempfile::tempdir().unwrap();
        let rice = obs(1, "Rice", "Tk 70 per kg", PriceType::Retail);
        let hilsa = obs(1, "Hilsa Fish", "Tk 1,200 per kg", PriceType::Wholesale);
        let paths = write_commodity_csvs(&[&rice, &hilsa], tmp.path()).await.unwrap();

        assert_eq!(paths.len(), 2);
        let hilsa_path = tmp.path().join("Hilsa_Fish_prices.csv");
        assert!(paths.contains(&hilsa_path));
        let (_, rows) = read_rows(&hilsa_path);
        assert_eq!(rows[0][1], "Hilsa Fish");
        assert_eq!(rows[0][2], "Tk 1,200 per kg");
        assert_eq!(rows[0][3], "Wholesale");
    }

    #[test]
    fn test_duplicates_collapse_per_day_and_type() {
        let a = obs(1, "Rice", "Tk 70 per kg", PriceType::Retail);
        let b = obs(1, "Rice", "tk  70 per KG", PriceType::Retail);
        let c = obs(1, "Rice", "Tk 70 per kg", PriceType::Wholesale);
        let d = obs(2, "Rice", "Tk 70 per kg", PriceType::Retail);
        let rows = prepare_rows(&[&d, &a, &b, &c]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].price_type, PriceType::Retail);
        assert_eq!(rows[1].price_type, PriceType::Wholesale);
        assert_eq!(rows[2].date.format("%d").to_string(), "02");
    }

    #[test]
    fn test_csv_file_name() {
        assert_eq!(csv_file_name("Soybean Oil (Loose)"), "Soybean_Oil_Loose_prices.csv");
    }
}
