//! Archive walker: one archive date from listing page to price observations.
//!
//! For a date the walker loads `<archive_url_base><yyyy-MM-dd>`, scrolls the
//! listing until it stops growing, collects article cards, keeps the ones
//! whose title looks price-related, and visits each to run the
//! [`TextExtractor`] over its body text.
//!
//! # Failure handling
//!
//! - Listing page fails to load after retries: the date is skipped.
//! - An article fails to load: counted as a failure and skipped.
//! - More than half of the relevant articles failed: the rest of the date is
//!   abandoned.
//!
//! None of these are errors to the caller; they show up in [`WorkerStats`].

use crate::browser::Page;
use crate::browser::loader::{load_page_with_retry, scroll_until_stable};
use crate::config::ScrapeJob;
use crate::error::Result;
use crate::extractor::{TextExtractor, normalize_price};
use crate::models::{ArticleRef, PriceObservation, WorkerStats};
use crate::utils::{collapse_whitespace, polite_pause, truncate_for_log};
use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

static CARD: Lazy<Selector> = Lazy::new(|| Selector::parse("article.card.card-full").unwrap());
static CARD_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("h2.card-title a").unwrap());
static CARD_TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// Article body containers, most specific first.
static CONTENT_CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "div.post-content",
        "article .content",
        "main .article-body",
        ".news-content",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

/// Article cards on an archive listing.
///
/// Cards without a title or link are dropped, relative links are resolved
/// against `page_url`, and repeated links keep their first card.
pub fn parse_article_cards(html: &str, page_url: &str) -> Vec<ArticleRef> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    document
        .select(&CARD)
        .filter_map(|card| {
            let link = card.select(&CARD_LINK).next()?;
            let title = collapse_whitespace(&link.text().collect::<String>());
            let href = link.value().attr("href")?.trim();
            if title.is_empty() || href.is_empty() {
                return None;
            }
            let url = match &base {
                Some(base) => base.join(href).ok()?,
                None => Url::parse(href).ok()?,
            };
            let published = card
                .select(&CARD_TIME)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());
            Some(ArticleRef {
                title,
                url: url.to_string(),
                published,
            })
        })
        .unique_by(|a| a.url.clone())
        .collect()
}

/// Visible text of `el`, skipping script and style contents.
fn visible_text(el: ElementRef<'_>) -> String {
    let chunks = el.descendants().filter_map(|node| {
        let text = node.value().as_text()?;
        let parent = node.parent()?.value().as_element()?;
        if matches!(parent.name(), "script" | "style" | "noscript") {
            return None;
        }
        let text = collapse_whitespace(text);
        (!text.is_empty()).then_some(text)
    });
    chunks.collect::<Vec<_>>().join(" ")
}

/// Article body text.
///
/// Tries each content container in turn and joins the non-empty paragraph
/// texts of the first one that has any. Falls back to the whole page's
/// visible text.
pub fn extract_body_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for container in CONTENT_CONTAINERS.iter() {
        let paragraphs: Vec<String> = document
            .select(container)
            .flat_map(|c| c.select(&PARAGRAPH))
            .map(|p| collapse_whitespace(&p.text().collect::<String>()))
            .filter(|p| !p.is_empty())
            .collect();
        if !paragraphs.is_empty() {
            return paragraphs.join("\n");
        }
    }

    document
        .select(&BODY)
        .next()
        .map(visible_text)
        .unwrap_or_else(|| visible_text(document.root_element()))
}

/// What one archive date produced.
#[derive(Debug, Default)]
pub struct DateOutcome {
    pub observations: Vec<PriceObservation>,
    pub stats: WorkerStats,
}

/// Walks archive dates for one worker, reusing that worker's page.
pub struct ArchiveWalker<'a> {
    job: &'a ScrapeJob,
    extractor: TextExtractor<'a>,
    worker_id: usize,
}

impl<'a> ArchiveWalker<'a> {
    pub fn new(job: &'a ScrapeJob, worker_id: usize) -> Self {
        Self {
            job,
            extractor: TextExtractor::new(&job.variants),
            worker_id,
        }
    }

    #[instrument(level = "info", skip_all, fields(worker_id = self.worker_id, %date))]
    pub async fn walk_date<P: Page>(&self, page: &mut P, date: NaiveDate) -> DateOutcome {
        let mut outcome = DateOutcome::default();
        let archive_url = self.job.archive_url(date);

        if let Err(e) = load_page_with_retry(page, &archive_url, &self.job.load).await {
            warn!(error = %e, "Skipping date: archive page did not load");
            outcome.stats.dates_skipped = 1;
            return outcome;
        }
        if let Err(e) = scroll_until_stable(page, &self.job.scroll).await {
            warn!(error = %e, "Scrolling failed; using what is loaded");
        }
        let html = match page.html().await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "Skipping date: could not read archive page");
                outcome.stats.dates_skipped = 1;
                return outcome;
            }
        };

        let cards = parse_article_cards(&html, &archive_url);
        let relevant: Vec<ArticleRef> = cards
            .iter()
            .filter(|a| self.job.is_relevant_title(&a.title))
            .cloned()
            .collect();
        outcome.stats.articles_seen = cards.len();
        outcome.stats.articles_relevant = relevant.len();
        info!(
            found = cards.len(),
            relevant = relevant.len(),
            "Collected archive articles"
        );

        let mut failures = 0usize;
        for (i, article) in relevant.iter().enumerate() {
            if failures * 2 > relevant.len() {
                warn!(
                    failures,
                    relevant = relevant.len(),
                    "Too many article failures; abandoning rest of date"
                );
                break;
            }
            match self.visit_article(page, article, date).await {
                Ok(observations) => {
                    outcome.stats.articles_processed += 1;
                    outcome.observations.extend(observations);
                }
                Err(e) => {
                    failures += 1;
                    outcome.stats.articles_failed += 1;
                    warn!(url = %article.url, error = %e, "Article failed");
                }
            }
            if i + 1 < relevant.len() {
                polite_pause(&self.job.pacing.article_delay_ms).await;
            }
        }

        outcome.stats.dates_processed = 1;
        info!(
            count = outcome.observations.len(),
            failed = failures,
            "Finished date"
        );
        outcome
    }

    #[instrument(level = "debug", skip_all, fields(url = %article.url))]
    async fn visit_article<P: Page>(
        &self,
        page: &mut P,
        article: &ArticleRef,
        archive_date: NaiveDate,
    ) -> Result<Vec<PriceObservation>> {
        load_page_with_retry(page, &article.url, &self.job.load).await?;
        let html = page.html().await?;
        let text = extract_body_text(&html);

        let chars = text.chars().count();
        if chars < self.job.min_article_chars {
            debug!(chars, "Article text too short; skipped");
            return Ok(Vec::new());
        }
        debug!(text = %truncate_for_log(&text, 200), "Article text");

        let date = match article.published_date() {
            Some(published) if (self.job.start..=self.job.end).contains(&published) => published,
            Some(published) => {
                debug!(
                    %published,
                    %archive_date,
                    "Published date outside job range; using archive date"
                );
                archive_date
            }
            None => archive_date,
        };
        let observations: Vec<PriceObservation> = self
            .extractor
            .extract(&text, &self.job.commodities)
            .into_iter()
            .unique_by(|f| (f.commodity.clone(), normalize_price(&f.price), f.price_type))
            .map(|f| PriceObservation {
                date,
                archive_date,
                commodity: f.commodity,
                price: f.price,
                price_type: f.price_type,
                article_title: article.title.clone(),
                article_url: article.url.clone(),
                context: Some(f.context),
                confidence: f.confidence,
            })
            .collect();

        if !observations.is_empty() {
            info!(title = %article.title, count = observations.len(), "Extracted prices");
        }
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fixture::{FixtureLauncher, FixturePage, FixtureSite};
    use crate::browser::{Browser, Launcher};
    use crate::config::{LoadPolicy, Pacing, ScrollPolicy};
    use crate::models::PriceType;
    use std::time::Duration;

    const BASE: &str = "https://news.test/archive?date=";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn job(commodities: &[&str]) -> ScrapeJob {
        job_between(d(2024, 3, 5), d(2024, 3, 5), commodities)
    }

    fn job_between(start: NaiveDate, end: NaiveDate, commodities: &[&str]) -> ScrapeJob {
        ScrapeJob::builder(start, end)
            .commodities(commodities.iter().copied())
            .archive_url_base(BASE)
            .load_policy(LoadPolicy {
                content_wait: Duration::ZERO,
                settle: Duration::ZERO,
                retry_backoff: Duration::ZERO,
                ..LoadPolicy::default()
            })
            .scroll_policy(ScrollPolicy {
                settle_ms: 0,
                final_wait_ms: 0,
                ..ScrollPolicy::default()
            })
            .pacing(Pacing::none())
            .build()
            .unwrap()
    }

    fn card(title: &str, href: &str, datetime: Option<&str>) -> String {
        let time = datetime
            .map(|t| format!("<time datetime=\"{}\">x</time>", t))
            .unwrap_or_default();
        format!(
            "<article class=\"card card-full\"><h2 class=\"card-title\"><a href=\"{}\">{}</a></h2>{}</article>",
            href, title, time
        )
    }

    fn article_page(body: &str) -> String {
        format!(
            "<html><body><nav>Menu</nav><div class=\"post-content\"><p>{}</p></div></body></html>",
            body
        )
    }

    async fn page(site: &FixtureSite) -> FixturePage {
        FixtureLauncher::new(site.clone())
            .launch()
            .await
            .unwrap()
            .new_page()
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_cards_resolves_and_filters() {
        let html = format!(
            "<main>{}{}{}{}</main>",
            card("Rice prices up", "/business/rice", Some("2024-03-05T08:00:00+06:00")),
            card("", "/empty-title", None),
            card("Duplicate", "/business/rice", None),
            "<article class=\"card card-full\"><h2 class=\"card-title\"><a>No link</a></h2></article>",
        );
        let cards = parse_article_cards(&html, "https://news.test/archive?date=2024-03-05");
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].url, "https://news.test/business/rice");
        assert_eq!(cards[0].title, "Rice prices up");
        assert_eq!(cards[0].published.as_deref(), Some("2024-03-05T08:00:00+06:00"));
    }

    #[test]
    fn test_parse_cards_ignores_other_markup() {
        let html = "<article class=\"card\"><h2 class=\"card-title\"><a href=\"/x\">Prices</a></h2></article>";
        assert!(parse_article_cards(html, "https://news.test/").is_empty());
    }

    #[test]
    fn test_body_text_prefers_containers() {
        let html = "<body><p>Sidebar</p><article><div class=\"content\"><p>First.</p><p> </p><p>Second.</p></div></article></body>";
        assert_eq!(extract_body_text(html), "First.\nSecond.");
    }

    #[test]
    fn test_body_text_falls_back_to_page_text() {
        let html = "<html><head><style>p{}</style></head><body><div>Rice sold for Tk 60 per kg.</div><script>var x = 1;</script></body></html>";
        let text = extract_body_text(html);
        assert!(text.contains("Rice sold for Tk 60 per kg."));
        assert!(!text.contains("var x"));
    }

    #[tokio::test]
    async fn test_walk_date_single_observation() {
        let job = job(&["Rice"]);
        let site = FixtureSite::new()
            .page(
                format!("{}2024-03-05", BASE),
                card("Rice prices in the market", "/rice", None),
            )
            .page(
                "https://news.test/rice",
                article_page("Rice was sold for Tk 70 per kg at the market today."),
            );
        let mut page = page(&site).await;
        let outcome = ArchiveWalker::new(&job, 0).walk_date(&mut page, d(2024, 3, 5)).await;

        assert_eq!(outcome.observations.len(), 1);
        let obs = &outcome.observations[0];
        assert_eq!(obs.commodity, "Rice");
        assert_eq!(obs.price, "Tk 70 per kg");
        assert_eq!(obs.price_type, PriceType::Retail);
        assert_eq!(obs.date, d(2024, 3, 5));
        assert_eq!(obs.article_url, "https://news.test/rice");
        assert_eq!(outcome.stats.articles_processed, 1);
    }

    #[tokio::test]
    async fn test_walk_date_uses_published_date() {
        let job = job_between(d(2024, 3, 4), d(2024, 3, 5), &["Rice"]);
        let site = FixtureSite::new()
            .page(
                format!("{}2024-03-05", BASE),
                card("Rice price", "/rice", Some("2024-03-04")),
            )
            .page(
                "https://news.test/rice",
                article_page("Rice was sold for Tk 70 per kg at the market today."),
            );
        let mut page = page(&site).await;
        let outcome = ArchiveWalker::new(&job, 0).walk_date(&mut page, d(2024, 3, 5)).await;
        assert_eq!(outcome.observations[0].date, d(2024, 3, 4));
        assert_eq!(outcome.observations[0].archive_date, d(2024, 3, 5));
    }

    #[tokio::test]
    async fn test_walk_date_ignores_published_date_outside_range() {
        let job = job(&["Rice"]);
        let site = FixtureSite::new()
            .page(
                format!("{}2024-03-05", BASE),
                card("Rice price", "/rice", Some("2019-01-01")),
            )
            .page(
                "https://news.test/rice",
                article_page("Rice was sold for Tk 70 per kg at the market today."),
            );
        let mut page = page(&site).await;
        let outcome = ArchiveWalker::new(&job, 0).walk_date(&mut page, d(2024, 3, 5)).await;
        assert_eq!(outcome.observations.len(), 1);
        assert_eq!(outcome.observations[0].date, d(2024, 3, 5));
        assert!((job.start..=job.end).contains(&outcome.observations[0].date));
    }

    #[tokio::test]
    async fn test_walk_date_no_relevant_articles() {
        let job = job(&["Rice"]);
        let site = FixtureSite::new().page(
            format!("{}2024-03-05", BASE),
            card("Cricket team wins series", "/cricket", None),
        );
        let mut page = page(&site).await;
        let outcome = ArchiveWalker::new(&job, 0).walk_date(&mut page, d(2024, 3, 5)).await;
        assert!(outcome.observations.is_empty());
        assert_eq!(outcome.stats.articles_seen, 1);
        assert_eq!(outcome.stats.articles_relevant, 0);
        assert_eq!(outcome.stats.dates_processed, 1);
        assert_eq!(site.visits("https://news.test/cricket"), 0);
    }

    #[tokio::test]
    async fn test_walk_date_skips_unloadable_archive() {
        let job = job(&["Rice"]);
        let site = FixtureSite::new();
        let mut page = page(&site).await;
        let outcome = ArchiveWalker::new(&job, 0).walk_date(&mut page, d(2024, 3, 5)).await;
        assert!(outcome.observations.is_empty());
        assert_eq!(outcome.stats.dates_skipped, 1);
        assert_eq!(site.visits(&format!("{}2024-03-05", BASE)), 3);
    }

    #[tokio::test]
    async fn test_walk_date_skips_short_articles() {
        let job = job(&["Rice"]);
        let site = FixtureSite::new()
            .page(format!("{}2024-03-05", BASE), card("Rice price", "/rice", None))
            .page("https://news.test/rice", article_page("Rice Tk 70."));
        let mut page = page(&site).await;
        let outcome = ArchiveWalker::new(&job, 0).walk_date(&mut page, d(2024, 3, 5)).await;
        assert!(outcome.observations.is_empty());
        assert_eq!(outcome.stats.articles_processed, 1);
    }

    #[tokio::test]
    async fn test_failure_budget_abandons_date() {
        let job = job(&["Rice"]);
        let listing = ["/a", "/b", "/c", "/d"]
            .iter()
            .map(|href| card("Market prices", href, None))
            .collect::<String>();
        let body = article_page("Rice was sold for Tk 70 per kg at the market today.");
        let site = FixtureSite::new()
            .page(format!("{}2024-03-05", BASE), listing)
            .page("https://news.test/d", body);
        let mut page = page(&site).await;
        let outcome = ArchiveWalker::new(&job, 0).walk_date(&mut page, d(2024, 3, 5)).await;

        assert_eq!(outcome.stats.articles_relevant, 4);
        assert_eq!(outcome.stats.articles_failed, 3);
        assert_eq!(site.visits("https://news.test/d"), 0);
        assert!(outcome.observations.is_empty());
    }
}
