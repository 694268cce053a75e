//! Commodity names and the surface forms used to find them in article text.
//!
//! Every canonical name maps to a list of variants: English synonyms, common
//! transliterations and the Bengali spelling. Each variant is compiled once
//! into a case-insensitive, Unicode word-boundary regex so "egg" does not fire
//! inside "eggplant" and "rice" does not fire inside "price".

use crate::error::{Result, ScrapeError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Commodities scraped when `--commodities` is not given.
pub const DEFAULT_COMMODITIES: &[&str] = &[
    "Sugar",
    "Rice",
    "Broiler Chicken",
    "Hilsa Fish",
    "Pangas Fish",
    "Potato",
    "Onion",
    "Soybean Oil",
    "Palm Oil",
    "Eggs",
    "Green Chillies",
    "Sonalika Chicken",
];

const BUILTIN_VARIANTS: &[(&str, &[&str])] = &[
    ("Sugar", &["sugar", "refined sugar", "white sugar", "packaged sugar", "চিনি"]),
    ("Rice", &["rice", "chal", "চাল", "miniket", "najirshail", "coarse rice", "fine rice"]),
    ("Broiler Chicken", &["broiler", "chicken", "murgi", "মুরগি", "farm chicken", "poultry"]),
    ("Hilsa Fish", &["hilsa", "ilish", "ইলিশ", "hilsha"]),
    ("Pangas Fish", &["pangas", "পাঙ্গাস", "pangash"]),
    ("Potato", &["potato", "alu", "আলু", "potatoes"]),
    ("Onion", &["onion", "peyaj", "পেঁয়াজ", "onions"]),
    ("Soybean Oil", &["soybean oil", "soyabean oil", "soya oil", "সয়াবিন তেল"]),
    ("Palm Oil", &["palm oil", "palm", "পাম তেল"]),
    ("Eggs", &["egg", "eggs", "dim", "ডিম", "hali"]),
    ("Green Chillies", &["green chilli", "green chillies", "kacha morich", "কাঁচা মরিচ", "chilli", "chillies"]),
    ("Garlic", &["garlic", "roshun", "রসুন"]),
    ("Ginger", &["ginger", "ada", "আদা"]),
    ("Tomato", &["tomato", "tomatoes", "টমেটো"]),
    ("Beef", &["beef", "গরুর মাংস", "cow meat"]),
    ("Mutton", &["mutton", "খাসির মাংস", "goat meat"]),
    ("Katla Fish", &["katla", "কাতলা"]),
    ("Rohita Fish", &["rohita", "rui", "রুই"]),
    ("Tilapia Fish", &["tilapia", "তেলাপিয়া"]),
    ("Lentils", &["lentils", "dal", "ডাল", "mosur", "মসুর"]),
    ("Milk", &["milk", "dudh", "দুধ"]),
    ("Aubergine", &["aubergine", "brinjal", "begun", "বেগুন", "eggplant"]),
    ("Papaya", &["papaya", "pepe", "পেঁপে"]),
    ("Bitter Gourd", &["bitter gourd", "korola", "করলা", "uchche"]),
    ("Pointed Gourd", &["pointed gourd", "potol", "পটল"]),
    ("Okra", &["okra", "bhindi", "ঢেঁড়স", "dherosh"]),
    ("String Beans", &["string beans", "sheem", "শিম", "beans"]),
    ("Teasel Gourd", &["teasel gourd", "kakrol", "কাঁকরোল"]),
    ("Ridge Gourd", &["ridge gourd", "jhinge", "ঝিঙে"]),
    ("Snake Gourd", &["snake gourd", "chichinga", "চিচিঙ্গা"]),
    ("Sonalika Chicken", &["sonalika chicken", "sonalika", "সোনালী মুরগি", "sonali chicken"]),
];

static BUILTIN: Lazy<CommodityVariantTable> = Lazy::new(|| {
    let entries = BUILTIN_VARIANTS
        .iter()
        .map(|(name, variants)| {
            CommodityEntry::new(name, variants.iter().map(|v| v.to_string()))
                .expect("built-in variant patterns are valid")
        })
        .collect();
    CommodityVariantTable { entries }
});

#[derive(Debug, Clone)]
struct Variant {
    text: String,
    matcher: Regex,
}

impl Variant {
    fn new(text: &str) -> Result<Self> {
        let text = text.trim().to_lowercase();
        let matcher = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&text)))
            .map_err(|e| ScrapeError::Config(format!("bad variant {:?}: {}", text, e)))?;
        Ok(Self { text, matcher })
    }
}

#[derive(Debug, Clone)]
struct CommodityEntry {
    name: String,
    variants: Vec<Variant>,
}

impl CommodityEntry {
    fn new(name: &str, variants: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut entry = Self {
            name: name.trim().to_string(),
            variants: Vec::new(),
        };
        entry.extend(variants)?;
        if entry.variants.is_empty() {
            let fallback = entry.name.to_lowercase();
            entry.extend([fallback])?;
        }
        Ok(entry)
    }

    fn extend(&mut self, variants: impl IntoIterator<Item = String>) -> Result<()> {
        for raw in variants {
            if raw.trim().is_empty() {
                continue;
            }
            let variant = Variant::new(&raw)?;
            if !self.variants.iter().any(|v| v.text == variant.text) {
                self.variants.push(variant);
            }
        }
        Ok(())
    }
}

/// Canonical commodity name → surface-form variants, compiled for matching.
///
/// Built once before the run starts and shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct CommodityVariantTable {
    entries: Vec<CommodityEntry>,
}

impl CommodityVariantTable {
    /// The table shipped with the scraper.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Add variants to existing commodities, or new commodities, from a
    /// settings file. Names are matched case-insensitively.
    pub fn with_extra_variants(mut self, extra: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        for (name, variants) in extra {
            match self
                .entries
                .iter_mut()
                .find(|e| e.name.eq_ignore_ascii_case(name.trim()))
            {
                Some(entry) => entry.extend(variants.iter().cloned())?,
                None => self
                    .entries
                    .push(CommodityEntry::new(name, variants.iter().cloned())?),
            }
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Case-insensitive lookup of the canonical spelling.
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.name.as_str())
    }

    /// Map user-supplied names onto canonical keys, rejecting unknown ones and
    /// dropping duplicates while keeping the given order.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<String>> {
        let mut resolved: Vec<String> = Vec::new();
        let mut unknown = Vec::new();
        for raw in names {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            match self.canonical_name(raw) {
                Some(name) if !resolved.iter().any(|r| r == name) => resolved.push(name.to_string()),
                Some(_) => {}
                None => unknown.push(raw.to_string()),
            }
        }
        if !unknown.is_empty() {
            return Err(ScrapeError::Config(format!(
                "unknown commodities: {} (known: {})",
                unknown.join(", "),
                self.names().collect::<Vec<_>>().join(", ")
            )));
        }
        if resolved.is_empty() {
            return Err(ScrapeError::Config("no commodities selected".to_string()));
        }
        Ok(resolved)
    }

    /// The first variant of `commodity` found in `text`, if any.
    pub fn matching_variant(&self, commodity: &str, text: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == commodity)?
            .variants
            .iter()
            .find(|v| v.matcher.is_match(text))
            .map(|v| v.text.as_str())
    }

    pub fn mentions(&self, commodity: &str, text: &str) -> bool {
        self.matching_variant(commodity, text).is_some()
    }

    /// Whether `text` names any commodity in the table other than `commodity`.
    pub fn mentions_other(&self, commodity: &str, text: &str) -> bool {
        self.entries
            .iter()
            .filter(|e| e.name != commodity)
            .any(|e| e.variants.iter().any(|v| v.matcher.is_match(text)))
    }
}

impl Default for CommodityVariantTable {
    fn default() -> Self {
        Self::builtin()
    }
}
