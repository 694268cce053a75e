//! Report generation.
//!
//! # Submodules
//!
//! - [`csv`]: one CSV per commodity, sorted by date and deduplicated
//! - [`json`]: one combined JSON file with run metadata
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── Rice_prices.csv
//! ├── Hilsa_Fish_prices.csv
//! ├── ...
//! └── all_prices_data.json
//! ```
//!
//! Records with an empty price or a commodity outside the variant table are
//! skipped with a warning; they never abort the write.

use crate::commodities::CommodityVariantTable;
use crate::config::ScrapeJob;
use crate::error::Result;
use crate::models::PriceObservation;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

pub mod csv;
pub mod json;

/// Files written by [`write_reports`].
#[derive(Debug, Clone, Default)]
pub struct ReportPaths {
    pub csv_files: Vec<PathBuf>,
    pub json_file: PathBuf,
}

/// Observations that are safe to write, in input order.
pub fn valid_records<'a>(
    observations: &'a [PriceObservation],
    table: &CommodityVariantTable,
) -> Vec<&'a PriceObservation> {
    observations
        .iter()
        .filter(|obs| {
            if obs.price.trim().is_empty() {
                warn!(commodity = %obs.commodity, url = %obs.article_url, "Skipping record with empty price");
                return false;
            }
            if !table.contains(&obs.commodity) {
                warn!(commodity = %obs.commodity, url = %obs.article_url, "Skipping record for unknown commodity");
                return false;
            }
            true
        })
        .collect()
}

/// Write every report for a finished run into `job.output_dir`, which
/// [`pipeline::execute`](crate::pipeline::execute) has already created and
/// checked.
#[instrument(level = "info", skip_all, fields(output_dir = %job.output_dir.display(), count = observations.len()))]
pub async fn write_reports(job: &ScrapeJob, observations: &[PriceObservation]) -> Result<ReportPaths> {
    let records = valid_records(observations, &job.variants);
    if records.len() < observations.len() {
        warn!(
            skipped = observations.len() - records.len(),
            "Some records were not written"
        );
    }

    let csv_files = csv::write_commodity_csvs(&records, &job.output_dir).await?;
    let json_file = json::write_combined(&records, job, &job.output_dir).await?;
    info!(csv_files = csv_files.len(), json = %json_file.display(), "Reports written");

    Ok(ReportPaths {
        csv_files,
        json_file,
    })
}
