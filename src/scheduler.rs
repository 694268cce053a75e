//! Periodic scraping of a trailing window of days.
//!
//! Every trigger scrapes `today - days ..= today - 1` with the configured job
//! options and appends status lines to `<log_dir>/scheduler.log`:
//!
//! ```text
//! {"timestamp":"2024-03-08T02:00:00.012Z","status":"Started","details":{"start":"2024-03-01","end":"2024-03-07"}}
//! {"timestamp":"2024-03-08T02:09:41.870Z","status":"Completed","details":{"observations":57,"csvFiles":9}}
//! ```

use crate::cli::JobArgs;
use crate::error::{Result, ScrapeError};
use crate::pipeline;
use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument, warn};

/// Daily at 02:00 (seconds-first cron syntax).
pub const DEFAULT_CRON: &str = "0 0 2 * * *";

pub const LOG_FILE_NAME: &str = "scheduler.log";

/// The `days` days before `today`, ending yesterday.
pub fn trailing_window(today: NaiveDate, days: u64) -> Result<(NaiveDate, NaiveDate)> {
    if days == 0 {
        return Err(ScrapeError::Config("window must cover at least one day".to_string()));
    }
    let end = today.checked_sub_days(Days::new(1));
    let start = today.checked_sub_days(Days::new(days));
    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(ScrapeError::Config(format!("window of {} days before {} is out of range", days, today))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub details: Value,
}

/// Append-only JSON-lines run log.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(LOG_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, status: RunStatus, details: Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let entry = RunLogEntry {
            timestamp: Utc::now(),
            status,
            details,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Append, logging a failed write instead of returning it. A run log
    /// that cannot be written never stops a scrape.
    pub async fn record(&self, status: RunStatus, details: Value) {
        if let Err(e) = self.append(status, details).await {
            warn!(path = %self.path.display(), ?status, error = %e, "Failed to write run log");
        }
    }

    /// Every entry written so far, oldest first.
    pub async fn entries(&self) -> Result<Vec<RunLogEntry>> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(ScrapeError::from))
            .collect()
    }
}

/// What the scheduler runs and how often.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub cron: String,
    pub days: u64,
    pub job: JobArgs,
    pub log: RunLog,
}

/// One scheduled run for the window ending the day before `today`.
///
/// Failures are logged to the run log and returned. Run-log write errors are
/// only warned about.
#[instrument(level = "info", skip_all, fields(%today, days = config.days))]
pub async fn run_scheduled_scrape(config: &ScheduleConfig, today: NaiveDate) -> Result<()> {
    let (start, end) = trailing_window(today, config.days)?;
    config
        .log
        .record(RunStatus::Started, json!({ "start": start, "end": end }))
        .await;

    let result = async {
        let job = Arc::new(config.job.build_job(start, end).await?);
        pipeline::execute_configured(job).await
    }
    .await;

    match result {
        Ok(outcome) => {
            info!(
                count = outcome.summary.observations.len(),
                "Scheduled scrape completed"
            );
            config
                .log
                .record(
                    RunStatus::Completed,
                    json!({
                        "start": start,
                        "end": end,
                        "observations": outcome.summary.observations.len(),
                        "csvFiles": outcome.reports.csv_files.len(),
                    }),
                )
                .await;
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Scheduled scrape failed");
            config
                .log
                .record(
                    RunStatus::Failed,
                    json!({ "start": start, "end": end, "error": e.to_string() }),
                )
                .await;
            Err(e)
        }
    }
}

/// Build and start a scheduler that runs [`run_scheduled_scrape`] on
/// `config.cron`. The caller owns shutdown.
pub async fn start(config: ScheduleConfig) -> Result<JobScheduler> {
    let config = Arc::new(config);
    let scheduler = JobScheduler::new().await?;

    let job_config = Arc::clone(&config);
    let job = Job::new_async(config.cron.as_str(), move |_uuid, _lock| {
        let config = Arc::clone(&job_config);
        Box::pin(async move {
            let today = Local::now().date_naive();
            if let Err(e) = run_scheduled_scrape(&config, today).await {
                error!(error = %e, "Scheduled run did not complete");
            }
        })
    })?;
    scheduler.add(job).await?;
    scheduler.start().await?;
    info!(cron = %config.cron, days = config.days, log = %config.log.path().display(), "Scheduler started");
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestArgs {
        #[command(flatten)]
        job: JobArgs,
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_trailing_window() {
        assert_eq!(trailing_window(d(2024, 3, 8), 7).unwrap(), (d(2024, 3, 1), d(2024, 3, 7)));
        assert_eq!(trailing_window(d(2024, 3, 1), 1).unwrap(), (d(2024, 2, 29), d(2024, 2, 29)));
        assert!(trailing_window(d(2024, 3, 1), 0).is_err());
    }

    #[tokio::test]
    async fn test_run_log_appends_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let log = RunLog::in_dir(&tmp.path().join("logs"));
        log.append(RunStatus::Started, json!({ "start": "2024-03-01" })).await.unwrap();
        log.append(RunStatus::Completed, json!({ "observations": 3 })).await.unwrap();

        let entries = log.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, RunStatus::Started);
        assert_eq!(entries[1].details["observations"], 3);

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("\"status\":\"Completed\""));
    }

    #[tokio::test]
    async fn test_failed_run_is_logged() {
        let tmp = tempfile::tempdir().unwrap();
        let args = TestArgs::parse_from(["price_scheduler", "--commodities", "Unobtainium"]);
        let config = ScheduleConfig {
            cron: DEFAULT_CRON.to_string(),
            days: 3,
            job: args.job,
            log: RunLog::in_dir(tmp.path()),
        };
        assert!(run_scheduled_scrape(&config, d(2024, 3, 8)).await.is_err());

        let entries = config.log.entries().await.unwrap();
        let statuses: Vec<RunStatus> = entries.iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![RunStatus::Started, RunStatus::Failed]);
        assert_eq!(entries[1].details["start"], "2024-03-05");
        assert!(entries[1].details["error"].as_str().unwrap().contains("Unobtainium"));
    }

    #[tokio::test]
    async fn test_unwritable_run_log_does_not_stop_run() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let args = TestArgs::parse_from(["price_scheduler", "--commodities", "Unobtainium"]);
        let config = ScheduleConfig {
            cron: DEFAULT_CRON.to_string(),
            days: 3,
            job: args.job,
            log: RunLog::in_dir(&blocker),
        };

        let err = run_scheduled_scrape(&config, d(2024, 3, 8)).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Config(_)), "{}", err);
        assert!(config.log.entries().await.is_err());
    }
}
