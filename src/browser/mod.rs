//! Browser abstraction used by the archive walker.
//!
//! The walker only needs a handful of operations from a browser tab, so they
//! are expressed as a trait and the concrete automation stack sits behind it:
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | WebDriver | [`webdriver`] | Chrome via chromedriver, real scrolling and JavaScript |
//! | HTTP | [`http`] | Plain GET requests; for server-rendered archives |
//! | Fixture | [`fixture`] | In-memory pages, for tests and offline dry runs |
//!
//! Three layers:
//!
//! - [`Launcher`]: starts a browser (spawns a driver, builds a client)
//! - [`Browser`]: a running browser; cheap to clone, shared read-only by workers
//! - [`Page`]: one isolated tab/session owned by exactly one worker
//!
//! Page loading with timeouts and retries lives in [`loader`].

use crate::error::{Result, ScrapeError};
use std::future::Future;
use std::time::Duration;

pub mod fixture;
pub mod http;
pub mod loader;
pub mod webdriver;

/// One browser tab. All methods are suspension points.
///
/// DOM inspection beyond existence checks is done on the HTML returned by
/// [`Page::html`], so backends stay small.
pub trait Page: Send {
    /// Navigate and wait for structural DOM readiness.
    fn goto(&mut self, url: &str) -> impl Future<Output = Result<()>> + Send;

    /// Wait up to `timeout` for `selector` to match. `Ok(false)` on timeout.
    fn wait_for(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Current document height in pixels (or any monotone proxy for it).
    fn scroll_height(&mut self) -> impl Future<Output = Result<u64>> + Send;

    fn scroll_to_bottom(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Whether `selector` matches anything right now.
    fn has_element(&mut self, selector: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Serialized DOM of the current document.
    fn html(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Release the tab/session.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// A running browser. Clones refer to the same instance.
pub trait Browser: Clone + Send + Sync + 'static {
    type Page: Page + 'static;

    /// Open an isolated page (its own session/context) on this browser.
    fn new_page(&self) -> impl Future<Output = Result<Self::Page>> + Send;

    /// Shut the browser down. Best-effort; errors are logged, not returned.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Starts browsers.
pub trait Launcher: Send + Sync + 'static {
    type Browser: Browser;

    fn launch(&self) -> impl Future<Output = Result<Self::Browser>> + Send;
}

/// Whether a CSS selector list matches anything in `html`. Used by the
/// backends that have no live DOM to query.
pub(crate) fn document_matches(html: &str, selector: &str) -> Result<bool> {
    let selector = scraper::Selector::parse(selector)
        .map_err(|e| ScrapeError::Browser(format!("invalid selector {:?}: {:?}", selector, e)))?;
    let document = scraper::Html::parse_document(html);
    Ok(document.select(&selector).next().is_some())
}
