//! Worker pool orchestrator.
//!
//! The job's date range is cut into contiguous slices, one per worker. Each
//! worker is a tokio task that owns one browser page and walks its slice in
//! order; results come back as [`WorkerReport`]s over an mpsc channel.
//!
//! Any worker failure (browser start, session open, panic) fails the whole
//! run. The remaining workers are told to halt; each stops before its next
//! date, closes its page and owned browser, and exits. The run then returns
//! the first failure and no results.
//!
//! For long ranges one browser is launched up front and every worker opens
//! its own page on it; otherwise each worker launches its own. The shared
//! browser is closed on every exit path.

use crate::browser::{Browser, Launcher, Page};
use crate::config::ScrapeJob;
use crate::error::{Result, ScrapeError};
use crate::models::{PriceObservation, WorkerReport, WorkerStats};
use crate::utils::polite_pause;
use crate::walker::ArchiveWalker;
use chrono::NaiveDate;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// Split `dates` into at most `workers` contiguous slices of
/// `ceil(len / workers)` dates. Empty slices are never returned.
pub fn partition_dates(dates: &[NaiveDate], workers: usize) -> Vec<Vec<NaiveDate>> {
    if dates.is_empty() || workers == 0 {
        return Vec::new();
    }
    let size = dates.len().div_ceil(workers);
    dates.chunks(size).map(<[NaiveDate]>::to_vec).collect()
}

/// What one worker is asked to do.
#[derive(Debug, Clone)]
pub struct WorkerTask<B> {
    pub worker_id: usize,
    pub dates: Vec<NaiveDate>,
    pub job: Arc<ScrapeJob>,
    /// Browser to open a page on; the worker launches its own when `None`.
    pub shared_browser: Option<B>,
    /// Set once another worker has failed.
    pub halt: Arc<AtomicBool>,
}

/// Merged results of a successful run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// All observations, in no particular order across workers.
    pub observations: Vec<PriceObservation>,
    /// One report per worker, by worker id.
    pub reports: Vec<WorkerReport>,
    pub totals: WorkerStats,
}

fn worker_error(worker_id: usize, err: ScrapeError) -> ScrapeError {
    ScrapeError::Worker {
        worker_id,
        reason: err.to_string(),
    }
}

/// Run one worker to completion.
#[instrument(level = "info", skip_all, fields(worker_id = task.worker_id, dates = task.dates.len()))]
pub async fn run_worker<L: Launcher>(
    task: WorkerTask<L::Browser>,
    launcher: Arc<L>,
) -> Result<WorkerReport> {
    let WorkerTask {
        worker_id,
        dates,
        job,
        shared_browser,
        halt,
    } = task;

    let (browser, owned) = match shared_browser {
        Some(browser) => (browser, false),
        None => {
            let browser = launcher
                .launch()
                .await
                .map_err(|e| worker_error(worker_id, e))?;
            (browser, true)
        }
    };

    let mut page = match browser.new_page().await {
        Ok(page) => page,
        Err(e) => {
            if owned {
                browser.close().await;
            }
            return Err(worker_error(worker_id, e));
        }
    };

    let walker = ArchiveWalker::new(&job, worker_id);
    let mut report = WorkerReport {
        worker_id,
        observations: Vec::new(),
        stats: WorkerStats::default(),
    };
    let t0 = Instant::now();
    for (i, date) in dates.iter().enumerate() {
        if halt.load(Ordering::Acquire) {
            warn!(
                remaining = dates.len() - i,
                "Run is failing; stopping before next date"
            );
            break;
        }
        let outcome = walker.walk_date(&mut page, *date).await;
        report.stats.absorb(&outcome.stats);
        report.observations.extend(outcome.observations);
        if i + 1 < dates.len() {
            polite_pause(&job.pacing.date_delay_ms).await;
        }
    }

    if let Err(e) = page.close().await {
        warn!(error = %e, "Failed to close page");
    }
    if owned {
        browser.close().await;
    }

    info!(
        count = report.observations.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Worker finished"
    );
    Ok(report)
}

/// Run the job on browsers from `launcher`.
#[instrument(level = "info", skip_all, fields(start = %job.start, end = %job.end, workers = job.workers))]
pub async fn run<L: Launcher>(job: Arc<ScrapeJob>, launcher: L) -> Result<RunSummary> {
    if job.start > job.end || job.workers == 0 {
        return Err(ScrapeError::Config(format!(
            "invalid job: {}..={} with {} worker(s)",
            job.start, job.end, job.workers
        )));
    }
    let dates = job.dates();
    let slices = partition_dates(&dates, job.workers);
    info!(
        dates = dates.len(),
        slices = slices.len(),
        "Partitioned date range"
    );

    let launcher = Arc::new(launcher);
    let shared = if dates.len() > job.shared_browser_threshold {
        info!(
            threshold = job.shared_browser_threshold,
            "Launching shared browser"
        );
        Some(launcher.launch().await?)
    } else {
        None
    };

    let result = run_workers(&job, &launcher, slices, shared.clone()).await;
    if let Some(browser) = shared {
        browser.close().await;
    }
    let mut reports = result?;
    reports.sort_by_key(|r| r.worker_id);

    let mut summary = RunSummary::default();
    for report in &reports {
        summary.totals.absorb(&report.stats);
        summary.observations.extend(report.observations.iter().cloned());
    }
    summary.reports = reports;
    info!(
        count = summary.observations.len(),
        processed = summary.totals.articles_processed,
        failed = summary.totals.articles_failed,
        skipped_dates = summary.totals.dates_skipped,
        "Run complete"
    );
    Ok(summary)
}

async fn run_workers<L: Launcher>(
    job: &Arc<ScrapeJob>,
    launcher: &Arc<L>,
    slices: Vec<Vec<NaiveDate>>,
    shared: Option<L::Browser>,
) -> Result<Vec<WorkerReport>> {
    let (tx, mut rx) = mpsc::channel::<WorkerReport>(slices.len().max(1));
    let mut set = JoinSet::new();
    let halt = Arc::new(AtomicBool::new(false));

    for (worker_id, dates) in slices.into_iter().enumerate() {
        let task = WorkerTask {
            worker_id,
            dates,
            job: Arc::clone(job),
            shared_browser: shared.clone(),
            halt: Arc::clone(&halt),
        };
        let launcher = Arc::clone(launcher);
        let tx = tx.clone();
        set.spawn(async move {
            let report = run_worker(task, launcher).await?;
            tx.send(report).await.map_err(|_| ScrapeError::Worker {
                worker_id,
                reason: "results channel closed".to_string(),
            })
        });
    }
    drop(tx);

    // Workers are drained rather than aborted so each one releases its page
    // and browser.
    let mut first_failure = None;
    while let Some(joined) = set.join_next().await {
        let failure = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) => ScrapeError::WorkerPanicked(e.to_string()),
        };
        if first_failure.is_none() {
            error!(error = %failure, "Worker failed; halting run");
            halt.store(true, Ordering::Release);
            first_failure = Some(failure);
        } else {
            warn!(error = %failure, "Another worker failed");
        }
    }
    if let Some(failure) = first_failure {
        return Err(failure);
    }

    let mut reports = Vec::new();
    while let Some(report) = rx.recv().await {
        reports.push(report);
    }
    Ok(reports)
}
