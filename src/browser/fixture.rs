//! In-memory backend: a scripted website.
//!
//! Pages are registered by URL. Navigation to an unknown URL fails, as does
//! navigation to a URL scripted with [`FixtureSite::fail_first`] until its
//! failure budget is used up. Scroll heights can be scripted per URL to drive
//! the infinite-scroll loop; otherwise the height is the HTML length and never
//! changes.
//!
//! The site records visits, launches and closes so tests can assert on the
//! orchestrator's resource handling.

use super::{Browser, Launcher, Page, document_matches};
use crate::error::{Result, ScrapeError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct SiteState {
    pages: HashMap<String, String>,
    failures: HashMap<String, u32>,
    heights: HashMap<String, Vec<u64>>,
    visits: HashMap<String, u32>,
    launches: u32,
    browsers_closed: u32,
    pages_opened: u32,
    pages_closed: u32,
    refuse_sessions: bool,
}

/// Shared handle to a scripted site. Clones see the same state.
#[derive(Debug, Clone, Default)]
pub struct FixtureSite {
    state: Arc<Mutex<SiteState>>,
}

impl FixtureSite {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SiteState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serve `html` at `url`.
    pub fn page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.lock().pages.insert(url.into(), html.into());
        self
    }

    /// Fail the first `times` navigations to `url`.
    pub fn fail_first(self, url: impl Into<String>, times: u32) -> Self {
        self.lock().failures.insert(url.into(), times);
        self
    }

    /// Heights reported at `url` after 0, 1, 2, ... scrolls. The last value
    /// repeats once the list is exhausted.
    pub fn scroll_heights(self, url: impl Into<String>, heights: Vec<u64>) -> Self {
        self.lock().heights.insert(url.into(), heights);
        self
    }

    /// Make every `new_page` call fail, as a browser that cannot open
    /// sessions would.
    pub fn refuse_sessions(self) -> Self {
        self.lock().refuse_sessions = true;
        self
    }

    pub fn visits(&self, url: &str) -> u32 {
        self.lock().visits.get(url).copied().unwrap_or(0)
    }

    pub fn launches(&self) -> u32 {
        self.lock().launches
    }

    pub fn browsers_closed(&self) -> u32 {
        self.lock().browsers_closed
    }

    pub fn pages_opened(&self) -> u32 {
        self.lock().pages_opened
    }

    pub fn pages_closed(&self) -> u32 {
        self.lock().pages_closed
    }

    fn navigate(&self, url: &str) -> Result<String> {
        let mut state = self.lock();
        *state.visits.entry(url.to_string()).or_default() += 1;
        if let Some(remaining) = state.failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ScrapeError::Browser(format!("scripted failure loading {}", url)));
            }
        }
        state
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScrapeError::Browser(format!("no fixture page for {}", url)))
    }

    fn height(&self, url: &str, scrolls: usize, html_len: usize) -> u64 {
        let state = self.lock();
        match state.heights.get(url) {
            Some(heights) if !heights.is_empty() => heights[scrolls.min(heights.len() - 1)],
            _ => html_len as u64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixtureLauncher {
    site: FixtureSite,
}

impl FixtureLauncher {
    pub fn new(site: FixtureSite) -> Self {
        Self { site }
    }
}

impl Launcher for FixtureLauncher {
    type Browser = FixtureBrowser;

    async fn launch(&self) -> Result<FixtureBrowser> {
        self.site.lock().launches += 1;
        Ok(FixtureBrowser {
            site: self.site.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct FixtureBrowser {
    site: FixtureSite,
}

impl Browser for FixtureBrowser {
    type Page = FixturePage;

    async fn new_page(&self) -> Result<FixturePage> {
        let mut state = self.site.lock();
        if state.refuse_sessions {
            return Err(ScrapeError::Browser("fixture browser refused a session".to_string()));
        }
        state.pages_opened += 1;
        Ok(FixturePage {
            site: self.site.clone(),
            url: None,
            html: String::new(),
            scrolls: 0,
        })
    }

    async fn close(self) {
        self.site.lock().browsers_closed += 1;
    }
}

#[derive(Debug)]
pub struct FixturePage {
    site: FixtureSite,
    url: Option<String>,
    html: String,
    scrolls: usize,
}

impl Page for FixturePage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let html = self.site.navigate(url)?;
        self.url = Some(url.to_string());
        self.html = html;
        self.scrolls = 0;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<bool> {
        document_matches(&self.html, selector)
    }

    async fn scroll_height(&mut self) -> Result<u64> {
        let url = self.url.as_deref().unwrap_or_default();
        Ok(self.site.height(url, self.scrolls, self.html.len()))
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.scrolls += 1;
        Ok(())
    }

    async fn has_element(&mut self, selector: &str) -> Result<bool> {
        document_matches(&self.html, selector)
    }

    async fn html(&mut self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn close(self) -> Result<()> {
        self.site.lock().pages_closed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_counts_sessions() {
        let site = FixtureSite::new().page("https://example.com/", "<p>x</p>");
        let browser = FixtureLauncher::new(site.clone()).launch().await.unwrap();
        let mut page = browser.new_page().await.unwrap();
        page.goto("https://example.com/").await.unwrap();
        assert!(page.has_element("p").await.unwrap());
        assert!(!page.has_element("div").await.unwrap());
        page.close().await.unwrap();
        browser.close().await;
        assert_eq!(site.launches(), 1);
        assert_eq!(site.pages_opened(), 1);
        assert_eq!(site.pages_closed(), 1);
        assert_eq!(site.browsers_closed(), 1);
        assert_eq!(site.visits("https://example.com/"), 1);
    }

    #[tokio::test]
    async fn test_fixture_refuses_sessions() {
        let site = FixtureSite::new().refuse_sessions();
        let browser = FixtureLauncher::new(site).launch().await.unwrap();
        assert!(browser.new_page().await.is_err());
    }
}
