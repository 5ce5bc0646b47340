use std::cmp::Ordering;

use crate::config::MIN_RELEVANCE_SCORE;
use crate::scorer::keywords::{KeywordTable, KeywordTier, MatchText, COUNTRY_BONUS};
use crate::types::{EconomicEvent, EventOrigin};

pub const MAX_SCORE: u8 = 5;
pub const MIN_SCORE: u8 = 1;

/// Keyword-tier relevance scoring. Pure over its tables.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    table: KeywordTable,
    min_score: u8,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(KeywordTable::default(), MIN_RELEVANCE_SCORE)
    }
}

impl RelevanceScorer {
    pub fn new(table: KeywordTable, min_score: u8) -> Self {
        Self { table, min_score }
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    pub fn min_score(&self) -> u8 {
        self.min_score
    }

    /// Uncapped keyword sum for `title` in the context of `country_code`.
    pub fn raw_score(&self, title: &str, country_code: &str) -> u32 {
        let text = MatchText::new(title);
        let mut total: u32 = KeywordTier::ALL
            .iter()
            .map(|&tier| {
                self.table.tier(tier).filter(|k| text.contains(k)).count() as u32 * tier.weight()
            })
            .sum();
        if self.table.country(country_code).any(|k| text.contains(k)) {
            total += COUNTRY_BONUS;
        }
        total
    }

    /// Score in `[1, 5]`. Curated events keep their pre-assigned score.
    pub fn score(&self, event: &EconomicEvent) -> u8 {
        if event.origin == EventOrigin::Curated {
            return event.relevance_score;
        }
        let raw = self.raw_score(&event.title, &event.country);
        raw.clamp(MIN_SCORE as u32, MAX_SCORE as u32) as u8
    }

    /// Writes scores into fetched events; curated events are left untouched.
    pub fn apply(&self, events: &mut [EconomicEvent]) {
        for e in events.iter_mut().filter(|e| e.origin == EventOrigin::Fetched) {
            e.relevance_score = self.score(e);
        }
    }

    pub fn passes(&self, event: &EconomicEvent) -> bool {
        event.relevance_score >= self.min_score
    }
}

/// Display order: score descending, then most recent first.
pub fn ranking(a: &EconomicEvent, b: &EconomicEvent) -> Ordering {
    b.relevance_score
        .cmp(&a.relevance_score)
        .then_with(|| b.date.cmp(&a.date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(title: &str) -> EconomicEvent {
        EconomicEvent::fetched(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            "GHS",
            title,
            "Reuters",
            None,
        )
    }

    #[test]
    fn tier_weights_add_up() {
        let s = RelevanceScorer::default();
        // inflation (+3) + policy (+2) + market (+1)
        assert_eq!(s.raw_score("Inflation policy shakes market", "ARS"), 6);
        // + country bonus once, even with two country terms
        assert_eq!(s.raw_score("Ghana cedi inflation", "GHS"), 5);
    }

    #[test]
    fn extra_critical_keyword_adds_exactly_three() {
        let s = RelevanceScorer::default();
        let base = s.raw_score("Debt talks continue", "GHS");
        let more = s.raw_score("Debt crisis talks continue", "GHS");
        assert_eq!(more, base + 3);
        assert!(s.score(&event("Debt crisis talks continue")) > s.score(&event("Debt talks continue")));
    }

    #[test]
    fn score_is_clamped_into_range() {
        let s = RelevanceScorer::default();
        assert_eq!(s.score(&event("Local football results")), MIN_SCORE);
        assert_eq!(
            s.score(&event("Ghana inflation crisis default debt policy")),
            MAX_SCORE
        );
    }

    #[test]
    fn curated_score_is_passed_through() {
        let s = RelevanceScorer::default();
        let mut e = event("Nothing relevant here");
        e.origin = EventOrigin::Curated;
        e.relevance_score = 4;
        assert_eq!(s.score(&e), 4);

        let mut events = vec![e.clone()];
        s.apply(&mut events);
        assert_eq!(events[0].relevance_score, 4);
    }

    #[test]
    fn ranking_breaks_score_ties_by_recency() {
        let mut a = event("a");
        let mut b = event("b");
        a.relevance_score = 3;
        b.relevance_score = 3;
        b.date = a.date + chrono::Duration::days(1);
        let mut v = vec![a.clone(), b.clone()];
        v.sort_by(ranking);
        assert_eq!(v[0].title, "b");

        b.relevance_score = 2;
        let mut v = vec![b, a];
        v.sort_by(ranking);
        assert_eq!(v[0].title, "a");
    }
}
