//! Page loading with bounded waits, linear-backoff retries and infinite scroll.
//!
//! [`load_page`] never fails: it reports success as a flag so the caller can
//! skip the unit. [`load_page_with_retry`] is for callers without a fallback
//! and returns [`ScrapeError::Navigation`] once every attempt has failed.

use super::Page;
use crate::config::{LoadPolicy, ScrollPolicy};
use crate::error::{Result, ScrapeError};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

/// Navigate `page` to `url`.
///
/// Waits up to `page_timeout` for DOM readiness, then up to `content_wait`
/// for a content marker (absence is fine), then a short settle pause.
#[instrument(level = "debug", skip(page, policy))]
pub async fn load_page<P: Page>(page: &mut P, url: &str, policy: &LoadPolicy) -> bool {
    let t0 = Instant::now();
    match timeout(policy.page_timeout, page.goto(url)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(%url, error = %e, "Error loading page");
            return false;
        }
        Err(_) => {
            warn!(%url, timeout_secs = policy.page_timeout.as_secs(), "Timed out loading page");
            return false;
        }
    }

    match page.wait_for(&policy.content_markers, policy.content_wait).await {
        Ok(true) => {}
        Ok(false) => debug!(%url, "Content marker not found; continuing"),
        Err(e) => debug!(%url, error = %e, "Content marker wait failed; continuing"),
    }

    if !policy.settle.is_zero() {
        sleep(policy.settle).await;
    }
    debug!(%url, elapsed_ms = t0.elapsed().as_millis() as u64, "Page loaded");
    true
}

/// [`load_page`] with up to `retry_attempts` tries. Attempt `n` is followed
/// by a `n * retry_backoff` pause before the next one.
#[instrument(level = "debug", skip(page, policy))]
pub async fn load_page_with_retry<P: Page>(
    page: &mut P,
    url: &str,
    policy: &LoadPolicy,
) -> Result<()> {
    let attempts = policy.retry_attempts.max(1);
    for attempt in 1..=attempts {
        if load_page(page, url, policy).await {
            return Ok(());
        }
        if attempt < attempts {
            let delay = policy.retry_backoff.saturating_mul(attempt);
            warn!(%url, attempt, max = attempts, ?delay, "Load failed; backing off");
            sleep(delay).await;
        }
    }
    Err(ScrapeError::Navigation {
        url: url.to_string(),
        attempts,
    })
}

/// Why scrolling stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStop {
    /// Height did not change after a scroll.
    Stable,
    /// End-of-list markers were seen `end_marker_limit` times.
    EndMarker,
    /// `max_attempts` scrolls were made.
    AttemptLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub stop: ScrollStop,
    pub scrolls: u32,
    pub final_height: u64,
}

/// Scroll to the bottom repeatedly so lazily loaded cards materialise.
#[instrument(level = "debug", skip_all)]
pub async fn scroll_until_stable<P: Page>(page: &mut P, policy: &ScrollPolicy) -> Result<ScrollOutcome> {
    let markers = policy.end_markers.join(", ");
    let mut previous: Option<u64> = None;
    let mut current = page.scroll_height().await?;
    let mut scrolls = 0u32;
    let mut marker_hits = 0u32;

    let stop = loop {
        if previous == Some(current) {
            break ScrollStop::Stable;
        }
        if scrolls >= policy.max_attempts {
            break ScrollStop::AttemptLimit;
        }
        previous = Some(current);

        page.scroll_to_bottom().await?;
        if policy.settle_ms > 0 {
            sleep(Duration::from_millis(policy.settle_ms)).await;
        }
        scrolls += 1;

        if !markers.is_empty() && page.has_element(&markers).await? {
            marker_hits += 1;
            if marker_hits >= policy.end_marker_limit.max(1) {
                current = page.scroll_height().await?;
                break ScrollStop::EndMarker;
            }
        }
        current = page.scroll_height().await?;
    };

    if policy.final_wait_ms > 0 {
        sleep(Duration::from_millis(policy.final_wait_ms)).await;
    }
    info!(?stop, scrolls, height = current, "Finished scrolling");
    Ok(ScrollOutcome {
        stop,
        scrolls,
        final_height: current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fixture::{FixtureLauncher, FixturePage, FixtureSite};
    use crate::browser::{Browser, Launcher};

    fn fast_policy(attempts: u32) -> LoadPolicy {
        LoadPolicy {
            page_timeout: Duration::from_secs(1),
            content_wait: Duration::ZERO,
            settle: Duration::ZERO,
            retry_attempts: attempts,
            retry_backoff: Duration::ZERO,
            ..LoadPolicy::default()
        }
    }

    fn fast_scroll() -> ScrollPolicy {
        ScrollPolicy {
            settle_ms: 0,
            final_wait_ms: 0,
            ..ScrollPolicy::default()
        }
    }

    async fn page_for(site: FixtureSite) -> FixturePage {
        FixtureLauncher::new(site).launch().await.unwrap().new_page().await.unwrap()
    }

    #[tokio::test]
    async fn test_load_page_missing_url_is_false() {
        let mut page = page_for(FixtureSite::new()).await;
        assert!(!load_page(&mut page, "https://example.com/nope", &fast_policy(1)).await);
    }

    #[tokio::test]
    async fn test_load_page_without_marker_still_succeeds() {
        let site = FixtureSite::new().page("https://example.com/a", "<html><body><p>hi</p></body></html>");
        let mut page = page_for(site).await;
        assert!(load_page(&mut page, "https://example.com/a", &fast_policy(1)).await);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let site = FixtureSite::new()
            .page("https://example.com/a", "<main>ok</main>")
            .fail_first("https://example.com/a", 2);
        let mut page = page_for(site.clone()).await;
        load_page_with_retry(&mut page, "https://example.com/a", &fast_policy(3))
            .await
            .unwrap();
        assert_eq!(site.visits("https://example.com/a"), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_raises() {
        let site = FixtureSite::new()
            .page("https://example.com/a", "<main>ok</main>")
            .fail_first("https://example.com/a", 5);
        let mut page = page_for(site.clone()).await;
        let err = load_page_with_retry(&mut page, "https://example.com/a", &fast_policy(3))
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Navigation { attempts: 3, .. }));
        assert_eq!(site.visits("https://example.com/a"), 3);
    }

    #[tokio::test]
    async fn test_scroll_stops_when_height_stable() {
        let site = FixtureSite::new()
            .page("https://example.com/a", "<main>ok</main>")
            .scroll_heights("https://example.com/a", vec![1000, 2000, 3000, 3000]);
        let mut page = page_for(site).await;
        page.goto("https://example.com/a").await.unwrap();
        let outcome = scroll_until_stable(&mut page, &fast_scroll()).await.unwrap();
        assert_eq!(outcome.stop, ScrollStop::Stable);
        assert_eq!(outcome.scrolls, 3);
        assert_eq!(outcome.final_height, 3000);
    }

    #[tokio::test]
    async fn test_scroll_stops_at_attempt_ceiling() {
        let heights = (1..=50).map(|h| h * 100).collect();
        let site = FixtureSite::new()
            .page("https://example.com/a", "<main>ok</main>")
            .scroll_heights("https://example.com/a", heights);
        let mut page = page_for(site).await;
        page.goto("https://example.com/a").await.unwrap();
        let outcome = scroll_until_stable(&mut page, &fast_scroll()).await.unwrap();
        assert_eq!(outcome.stop, ScrollStop::AttemptLimit);
        assert_eq!(outcome.scrolls, 10);
    }

    #[tokio::test]
    async fn test_scroll_stops_on_end_marker() {
        let heights = (1..=50).map(|h| h * 100).collect();
        let site = FixtureSite::new()
            .page(
                "https://example.com/a",
                "<main>ok</main><div class=\"no-more-articles\"></div>",
            )
            .scroll_heights("https://example.com/a", heights);
        let mut page = page_for(site).await;
        page.goto("https://example.com/a").await.unwrap();
        let outcome = scroll_until_stable(&mut page, &fast_scroll()).await.unwrap();
        assert_eq!(outcome.stop, ScrollStop::EndMarker);
        assert_eq!(outcome.scrolls, 1);
    }
}
