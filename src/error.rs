//! Error taxonomy for a scrape run.
//!
//! Ordinary navigation hiccups never reach this type: the page loader reports
//! them as a `false` flag and the walker skips the unit. What ends up here is
//! either something a caller has no fallback for (an archive page that kept
//! failing after every retry) or something that must fail the whole job (a
//! worker that could not start its browser, or panicked).

use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum ScrapeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Navigation to {url} failed after {attempts} attempt(s)")]
    Navigation { url: String, attempts: u32 },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Worker {worker_id} failed: {reason}")]
    Worker { worker_id: usize, reason: String },

    #[error("Worker task panicked or was cancelled: {0}")]
    WorkerPanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl From<fantoccini::error::CmdError> for ScrapeError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        ScrapeError::Browser(err.to_string())
    }
}

impl From<fantoccini::error::NewSessionError> for ScrapeError {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        ScrapeError::Browser(format!("could not open WebDriver session: {}", err))
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        ScrapeError::Browser(format!("HTTP error: {}", err))
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for ScrapeError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        ScrapeError::Scheduler(format!("{:?}", err))
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
