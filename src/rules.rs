//! Ordered price-pattern rules.
//!
//! Each rule is a regex with a `price` capture group plus a list of exclusion
//! predicates. Rules are evaluated in table order against one sentence at a
//! time; the extractor keeps the first rule that claims a span of text, so the
//! most specific phrasings ("sold for …") win over the generic ones.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

/// Currency marker and amount, with an optional range ("Tk 50-55", "Tk 50 to 55").
const AMOUNT: &str = r"(?:Taka|Tk|৳)\s*\d+[\d,.]*(?:\s*(?:-|–|to|থেকে)\s*\d+[\d,.]*)?";
const CONNECTOR: &str = r"(?:per|each|an|a|/|প্রতি)";
const UNIT: &str =
    r"(?:kilogram|kilo|kg|কেজি|litre|liter|লিটার|l|pieces|piece|pcs|unit|hali|হালি|apiece|dozen)\b";

/// A candidate price found by a rule inside one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSite<'a> {
    pub sentence: &'a str,
    /// Byte range of the `price` capture inside `sentence`.
    pub range: Range<usize>,
}

impl<'a> MatchSite<'a> {
    pub fn price(&self) -> &'a str {
        &self.sentence[self.range.clone()]
    }

    pub fn before(&self) -> &'a str {
        &self.sentence[..self.range.start]
    }

    pub fn after(&self) -> &'a str {
        &self.sentence[self.range.end..]
    }
}

/// A named predicate that rejects a match site.
#[derive(Debug, Clone, Copy)]
pub struct Exclusion {
    pub name: &'static str,
    pub applies: fn(&MatchSite<'_>) -> bool,
}

static CHANGE_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:increased|increase|rose|risen|rise|up|higher|jumped|climbed|decreased|decrease|fell|fallen|dropped|down|lower|reduced)\s+by\b",
    )
    .unwrap()
});
static UP_TO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bup\s+to\b").unwrap());
/// Words that end the change amount and start a new figure ("... to Tk 120").
static CHANGE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:to|from|while|whereas)\b|;").unwrap());
static AGGREGATE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:crore|lakh|lac|million|billion|thousand)\b").unwrap()
});

/// "rose by Tk 5" quotes a change, not a price level.
///
/// A match is a change amount when it follows a change phrase ending in "by"
/// and nothing between the two closes the amount. "rose by about Tk 10" is a
/// change; the "Tk 120" in "rose by Tk 10 to Tk 120" is a level.
pub fn is_price_change(site: &MatchSite<'_>) -> bool {
    let before = site.before();
    let Some(phrase) = CHANGE_PHRASE.find_iter(before).last() else {
        return false;
    };
    let gap = UP_TO.replace_all(&before[phrase.end()..], "");
    !CHANGE_END.is_match(&gap)
}

/// "Tk 500 crore" is a budget or turnover figure, not a unit price.
pub fn is_aggregate_amount(site: &MatchSite<'_>) -> bool {
    AGGREGATE_SUFFIX.is_match(site.after())
}

pub const PRICE_CHANGE: Exclusion = Exclusion {
    name: "price_change",
    applies: is_price_change,
};

pub const AGGREGATE_AMOUNT: Exclusion = Exclusion {
    name: "aggregate_amount",
    applies: is_aggregate_amount,
};

#[derive(Debug)]
pub struct PriceRule {
    pub name: &'static str,
    pattern: Regex,
    /// Only consulted for a sentence where no earlier rule produced a price.
    pub fallback_only: bool,
    exclusions: &'static [Exclusion],
}

impl PriceRule {
    fn new(
        name: &'static str,
        pattern: &str,
        fallback_only: bool,
        exclusions: &'static [Exclusion],
    ) -> Self {
        Self {
            name,
            pattern: Regex::new(&format!("(?i){}", pattern)).unwrap(),
            fallback_only,
            exclusions,
        }
    }

    /// All non-overlapping candidate sites for this rule in `sentence`.
    pub fn sites<'a>(&self, sentence: &'a str) -> Vec<MatchSite<'a>> {
        self.pattern
            .captures_iter(sentence)
            .filter_map(|caps| caps.name("price"))
            .map(|m| MatchSite {
                sentence,
                range: m.range(),
            })
            .collect()
    }

    /// Name of the first exclusion that rejects `site`, if any.
    pub fn excluded_by(&self, site: &MatchSite<'_>) -> Option<&'static str> {
        self.exclusions
            .iter()
            .find(|ex| (ex.applies)(site))
            .map(|ex| ex.name)
    }
}

/// The rule table, most specific first.
pub static PRICE_RULES: Lazy<Vec<PriceRule>> = Lazy::new(|| {
    vec![
        PriceRule::new(
            "sold_for",
            &format!(r"\bsold\s+for\s+(?P<price>{AMOUNT}\s*{CONNECTOR}?\s*{UNIT})"),
            false,
            &[PRICE_CHANGE],
        ),
        PriceRule::new(
            "quoted_at",
            &format!(
                r"\b(?:retail(?:ed|s)?|pric(?:e|ed|es)|cost(?:s|ed)?)\s+(?:at|for|of)\s+(?P<price>{AMOUNT}\s*{CONNECTOR}?\s*{UNIT})"
            ),
            false,
            &[PRICE_CHANGE],
        ),
        PriceRule::new(
            "at_price",
            &format!(r"\bat\s+(?P<price>{AMOUNT}\s*{CONNECTOR}?\s*{UNIT})"),
            false,
            &[PRICE_CHANGE],
        ),
        PriceRule::new(
            "unit_price",
            &format!(r"(?P<price>{AMOUNT}\s*{CONNECTOR}\s*{UNIT})"),
            false,
            &[PRICE_CHANGE],
        ),
        PriceRule::new(
            "bare_amount",
            &format!(r"(?P<price>{AMOUNT})"),
            true,
            &[PRICE_CHANGE, AGGREGATE_AMOUNT],
        ),
    ]
});
