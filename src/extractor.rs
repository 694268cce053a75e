//! Price extraction from article body text.
//!
//! The pipeline, per commodity:
//!
//! 1. Split the body into sentences.
//! 2. Keep sentences naming one of the commodity's variants (word-boundary match).
//! 3. Run the [`PRICE_RULES`] table over each kept sentence, collecting
//!    non-overlapping matches that survive the rules' exclusions.
//! 4. Drop repeats of the same normalized price within the article.
//! 5. Classify each price as retail or wholesale from its sentence.
//! 6. If nothing was found, look one sentence either side of every mention,
//!    skipping neighbours that name a different commodity, and label those
//!    hits [`Confidence::Nearby`].
//!
//! Both false positives and misses are expected on unusual phrasing.

use crate::commodities::CommodityVariantTable;
use crate::models::{Confidence, PriceType};
use crate::rules::{PRICE_RULES, PriceRule};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::ops::Range;
use tracing::{debug, trace};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static WHOLESALE_TERMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)wholesale|bulk|পাইকারি").unwrap());

/// A price attributed to a commodity, before article metadata is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceFragment {
    pub commodity: String,
    pub price: String,
    pub price_type: PriceType,
    pub context: String,
    pub confidence: Confidence,
}

/// Split text after `.`, `!`, `?` or the Bengali danda when followed by
/// whitespace. Empty pieces are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?' | '।') {
            continue;
        }
        match chars.peek() {
            Some(&(next, n)) if n.is_whitespace() => {
                let sentence = text[start..next].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = next;
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Collapse whitespace and lowercase, for duplicate detection.
pub fn normalize_price(price: &str) -> String {
    WHITESPACE.replace_all(price.trim(), " ").to_lowercase()
}

pub fn classify_price_type(sentence: &str) -> PriceType {
    if WHOLESALE_TERMS.is_match(sentence) {
        PriceType::Wholesale
    } else {
        PriceType::Retail
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn clean_price(raw: &str) -> String {
    raw.trim().trim_end_matches(['.', ',']).trim_end().to_string()
}

/// Runs the rule table over article text for a set of commodities.
#[derive(Debug, Clone, Copy)]
pub struct TextExtractor<'a> {
    table: &'a CommodityVariantTable,
    rules: &'a [PriceRule],
}

impl<'a> TextExtractor<'a> {
    pub fn new(table: &'a CommodityVariantTable) -> Self {
        Self {
            table,
            rules: PRICE_RULES.as_slice(),
        }
    }

    /// Extract prices for every commodity in `commodities`, in list order.
    pub fn extract(&self, text: &str, commodities: &[String]) -> Vec<PriceFragment> {
        let sentences = split_sentences(text);
        commodities
            .iter()
            .flat_map(|commodity| self.extract_for(&sentences, commodity))
            .collect()
    }

    /// Extract prices for one commodity from pre-split sentences.
    pub fn extract_for(&self, sentences: &[&str], commodity: &str) -> Vec<PriceFragment> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        let mentions: Vec<usize> = sentences
            .iter()
            .enumerate()
            .filter(|(_, s)| self.table.mentions(commodity, s))
            .map(|(i, _)| i)
            .collect();

        for &idx in &mentions {
            self.collect(sentences[idx], commodity, Confidence::Direct, &mut seen, &mut found);
        }

        if found.is_empty() {
            for &idx in &mentions {
                let neighbours = [idx.checked_sub(1), Some(idx + 1)];
                for n in neighbours.into_iter().flatten() {
                    let Some(sentence) = sentences.get(n) else {
                        continue;
                    };
                    if self.table.mentions_other(commodity, sentence) {
                        trace!(commodity, sentence, "Neighbour names another commodity; skipped");
                        continue;
                    }
                    self.collect(sentence, commodity, Confidence::Nearby, &mut seen, &mut found);
                }
            }
        }

        if !found.is_empty() {
            debug!(commodity, count = found.len(), "Extracted prices");
        }
        found
    }

    fn collect(
        &self,
        sentence: &str,
        commodity: &str,
        confidence: Confidence,
        seen: &mut HashSet<String>,
        found: &mut Vec<PriceFragment>,
    ) {
        for price in self.scan_sentence(sentence) {
            if !seen.insert(normalize_price(&price)) {
                continue;
            }
            found.push(PriceFragment {
                commodity: commodity.to_string(),
                price,
                price_type: classify_price_type(sentence),
                context: sentence.trim().to_string(),
                confidence,
            });
        }
    }

    /// Prices quoted in one sentence, in rule order.
    pub fn scan_sentence(&self, sentence: &str) -> Vec<String> {
        let mut claimed: Vec<Range<usize>> = Vec::new();
        let mut prices = Vec::new();

        for rule in self.rules {
            if rule.fallback_only && !prices.is_empty() {
                continue;
            }
            for site in rule.sites(sentence) {
                if claimed.iter().any(|r| overlaps(r, &site.range)) {
                    continue;
                }
                claimed.push(site.range.clone());
                if let Some(reason) = rule.excluded_by(&site) {
                    trace!(rule = rule.name, price = site.price(), reason, "Match excluded");
                    continue;
                }
                let price = clean_price(site.price());
                if !price.is_empty() {
                    prices.push(price);
                }
            }
        }
        prices
    }
}
