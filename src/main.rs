//! Command-line entry point: scrape one date range and write reports.
//!
//! ```sh
//! commodity_price_scraper --start 2024-03-01 --end 2024-03-07 --workers 4
//! ```

use clap::Parser;
use commodity_price_scraper::cli::Cli;
use commodity_price_scraper::{init_tracing, pipeline};
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    init_tracing(args.job.debug);

    let start_time = std::time::Instant::now();
    info!("commodity_price_scraper starting up");
    debug!(?args, "Parsed CLI arguments");

    let job = match args.job.build_job(args.start, args.end).await {
        Ok(job) => Arc::new(job),
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(
        start = %job.start,
        end = %job.end,
        workers = job.workers,
        commodities = ?job.commodities,
        backend = ?job.browser.backend,
        "Job configured"
    );

    let outcome = match pipeline::execute_configured(job).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Scrape failed; no reports written");
            return Err(e.into());
        }
    };

    for report in &outcome.summary.reports {
        info!(
            worker_id = report.worker_id,
            count = report.observations.len(),
            dates = report.stats.dates_processed,
            skipped = report.stats.dates_skipped,
            articles = report.stats.articles_processed,
            failed = report.stats.articles_failed,
            "Worker summary"
        );
    }
    for path in &outcome.reports.csv_files {
        info!(path = %path.display(), "CSV report");
    }
    info!(path = %outcome.reports.json_file.display(), "JSON report");

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        observations = outcome.summary.observations.len(),
        "Execution complete"
    );
    Ok(())
}
