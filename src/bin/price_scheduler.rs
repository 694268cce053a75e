//! Run the scraper on a cron schedule over a trailing window of days.
//!
//! ```sh
//! # Every day at 02:00, scrape the previous 7 days
//! price_scheduler --days 7 --log-dir logs
//!
//! # Run once now, then keep the schedule
//! price_scheduler --run-now --cron "0 30 6 * * *"
//! ```

use chrono::Local;
use clap::Parser;
use commodity_price_scraper::cli::JobArgs;
use commodity_price_scraper::error::ScrapeError;
use commodity_price_scraper::init_tracing;
use commodity_price_scraper::scheduler::{self, DEFAULT_CRON, RunLog, ScheduleConfig};
use std::error::Error;
use std::path::PathBuf;
use tracing::{error, info};

/// Periodically scrape the news archive for commodity prices.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct SchedulerCli {
    /// Cron expression with a leading seconds field
    #[arg(long, default_value = DEFAULT_CRON)]
    cron: String,

    /// Number of days before today to scrape on each run
    #[arg(long, default_value_t = 7)]
    days: u64,

    /// Directory for scheduler.log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Run once immediately before waiting for the schedule
    #[arg(long)]
    run_now: bool,

    #[command(flatten)]
    job: JobArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = SchedulerCli::parse();
    init_tracing(args.job.debug);
    info!("price_scheduler starting up");

    let config = ScheduleConfig {
        cron: args.cron,
        days: args.days,
        log: RunLog::in_dir(&args.log_dir),
        job: args.job,
    };

    if args.run_now {
        let today = Local::now().date_naive();
        if let Err(e) = scheduler::run_scheduled_scrape(&config, today).await {
            error!(error = %e, "Immediate run failed");
        }
    }

    let mut sched = scheduler::start(config).await?;
    tokio::signal::ctrl_c().await?;
    info!("Shutting down scheduler");
    sched.shutdown().await.map_err(ScrapeError::from)?;
    Ok(())
}
