//! One complete run: check the output directory, scrape, write reports.
//!
//! The run either finishes and writes every report or fails without writing
//! any.

use crate::browser::Launcher;
use crate::browser::http::HttpLauncher;
use crate::browser::webdriver::WebDriverLauncher;
use crate::config::{BackendKind, ScrapeJob};
use crate::error::Result;
use crate::orchestrator::{self, RunSummary};
use crate::outputs::{self, ReportPaths};
use crate::utils::ensure_writable_dir;
use std::sync::Arc;
use tracing::{error, instrument};

#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub reports: ReportPaths,
}

/// Scrape with browsers from `launcher` and write the reports.
#[instrument(level = "info", skip_all)]
pub async fn execute<L: Launcher>(job: Arc<ScrapeJob>, launcher: L) -> Result<RunOutcome> {
    // Fail before any browser starts if the reports could not be written.
    if let Err(e) = ensure_writable_dir(&job.output_dir).await {
        error!(
            path = %job.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let summary = orchestrator::run(Arc::clone(&job), launcher).await?;
    let reports = outputs::write_reports(&job, &summary.observations).await?;
    Ok(RunOutcome { summary, reports })
}

/// [`execute`] on the backend selected in `job.browser`.
pub async fn execute_configured(job: Arc<ScrapeJob>) -> Result<RunOutcome> {
    match job.browser.backend {
        BackendKind::Webdriver => {
            let launcher = WebDriverLauncher::new(job.browser.clone());
            execute(job, launcher).await
        }
        BackendKind::Http => {
            let launcher = HttpLauncher::new(&job.browser);
            execute(job, launcher).await
        }
    }
}
