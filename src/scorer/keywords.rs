use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::pilot::PILOT_COUNTRIES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeywordTier {
    Critical,
    High,
    Medium,
}

impl KeywordTier {
    pub const ALL: [KeywordTier; 3] = [KeywordTier::Critical, KeywordTier::High, KeywordTier::Medium];

    pub fn weight(self) -> u32 {
        match self {
            KeywordTier::Critical => 3,
            KeywordTier::High => 2,
            KeywordTier::Medium => 1,
        }
    }
}

/// Bonus applied once when any country keyword appears.
pub const COUNTRY_BONUS: u32 = 2;

const CRITICAL: &[&str] = &[
    "inflation",
    "crisis",
    "default",
    "devaluation",
    "imf",
    "bailout",
    "collapse",
    "hyperinflation",
    "recession",
];

const HIGH: &[&str] = &[
    "policy",
    "rate",
    "rates",
    "debt",
    "interest",
    "central bank",
    "currency",
    "exchange",
    "reserves",
    "loan",
    "world bank",
];

const MEDIUM: &[&str] = &[
    "bank",
    "market",
    "trade",
    "economy",
    "economic",
    "budget",
    "investment",
    "exports",
    "imports",
    "growth",
];

/// Keyword tiers plus per-country bonus terms. All entries are lower-case.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    tiers: BTreeMap<KeywordTier, BTreeSet<String>>,
    country: HashMap<String, BTreeSet<String>>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for (tier, words) in [
            (KeywordTier::Critical, CRITICAL),
            (KeywordTier::High, HIGH),
            (KeywordTier::Medium, MEDIUM),
        ] {
            for w in words {
                table.add(tier, w);
            }
        }
        for c in PILOT_COUNTRIES {
            for k in c.keywords {
                table.add_country_keyword(c.code, k);
            }
        }
        table
    }
}

impl KeywordTable {
    pub fn empty() -> Self {
        Self {
            tiers: BTreeMap::new(),
            country: HashMap::new(),
        }
    }

    pub fn add(&mut self, tier: KeywordTier, keyword: &str) {
        self.tiers
            .entry(tier)
            .or_default()
            .insert(normalize(keyword));
    }

    pub fn add_country_keyword(&mut self, country_code: &str, keyword: &str) {
        self.country
            .entry(country_code.to_ascii_uppercase())
            .or_default()
            .insert(normalize(keyword));
    }

    pub fn tier(&self, tier: KeywordTier) -> impl Iterator<Item = &str> {
        self.tiers.get(&tier).into_iter().flatten().map(String::as_str)
    }

    pub fn country(&self, country_code: &str) -> impl Iterator<Item = &str> {
        self.country
            .get(&country_code.to_ascii_uppercase())
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}

/// Lower-cases and collapses every non-alphanumeric run to a single space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Title prepared for whole-word keyword lookups.
pub struct MatchText(String);

impl MatchText {
    pub fn new(text: &str) -> Self {
        Self(format!(" {} ", normalize(text)))
    }

    /// Whole-word (or whole-phrase) match of an already normalized keyword.
    pub fn contains(&self, keyword: &str) -> bool {
        !keyword.is_empty() && self.0.contains(&format!(" {keyword} "))
    }
}
