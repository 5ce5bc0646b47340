use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::pilot::PilotCountry;
use crate::sources::{EventSource, SourceError};
use crate::types::{DateRange, EconomicEvent, EventOrigin, PLACEHOLDER_URL};

#[derive(Debug, Deserialize)]
struct CuratedRow {
    date: String,
    country_code: String,
    country_name: String,
    event_title: String,
    source: String,
    relevance_score: String,
}

/// Hand-maintained reference table of key events. Loaded once, read-only.
#[derive(Debug, Default)]
pub struct CuratedSource {
    rows: Vec<CuratedEvent>,
}

#[derive(Debug, Clone)]
struct CuratedEvent {
    date: NaiveDate,
    country_code: String,
    country_name: String,
    title: String,
    source: String,
    score: u8,
}

impl CuratedSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let source = Self::from_reader(file)?;
        info!(
            rows = source.len(),
            path = %path.as_ref().display(),
            "[SOURCE] curated reference table loaded"
        );
        Ok(source)
    }

    /// Parses the CSV, skipping rows that are malformed or carry an out-of-range score.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut rows = Vec::new();
        for (line, record) in rdr.deserialize::<CuratedRow>().enumerate() {
            let row = match record {
                Ok(r) => r,
                Err(e) => {
                    debug!(line = line + 2, "[SOURCE] curated: skipping malformed row: {e}");
                    continue;
                }
            };
            match parse_row(row) {
                Some(ev) => rows.push(ev),
                None => debug!(line = line + 2, "[SOURCE] curated: skipping invalid row"),
            }
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn events_for(&self, country: &PilotCountry, range: &DateRange) -> Vec<EconomicEvent> {
        self.rows
            .iter()
            .filter(|r| {
                country.matches_code(&r.country_code)
                    || r.country_name.eq_ignore_ascii_case(country.country)
            })
            .filter(|r| range.contains(r.date))
            .map(|r| EconomicEvent {
                date: r.date,
                country: country.code.to_string(),
                title: r.title.clone(),
                source: r.source.clone(),
                relevance_score: r.score,
                url: PLACEHOLDER_URL.to_string(),
                origin: EventOrigin::Curated,
            })
            .collect()
    }
}

fn parse_row(row: CuratedRow) -> Option<CuratedEvent> {
    let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").ok()?;
    let score: u8 = row.relevance_score.parse().ok()?;
    if !(1..=5).contains(&score) || row.event_title.is_empty() || row.country_code.is_empty() {
        return None;
    }
    Some(CuratedEvent {
        date,
        country_code: row.country_code,
        country_name: row.country_name,
        title: row.event_title,
        source: row.source,
        score,
    })
}

#[async_trait]
impl EventSource for CuratedSource {
    fn name(&self) -> &'static str {
        "curated"
    }

    async fn fetch(
        &self,
        country: &PilotCountry,
        range: &DateRange,
    ) -> std::result::Result<Vec<EconomicEvent>, SourceError> {
        Ok(self.events_for(country, range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pilot;
    use crate::sources::testing::d;

    const CSV: &str = "\
date,country_code,country_name,event_title,source,relevance_score
2016-03-10,GHS,Ghana,Ghana IMF Stand-By Arrangement Approved,CSV,4
2018-08-10,TRY,Turkey,\"Lira plunges, hits record low\",CSV,5
not-a-date,GHS,Ghana,Broken row,CSV,3
2019-01-01,GHS,Ghana,Score out of range,CSV,9
2020-05-05,GHS,Ghana
";

    #[tokio::test]
    async fn ghana_stand_by_arrangement_is_returned_unaltered() {
        let src = CuratedSource::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(src.len(), 2);

        let ghana = pilot::lookup("GHS").unwrap();
        let range = DateRange::new(d("2015-01-01"), d("2017-12-31"));
        let events = src.fetch(ghana, &range).await.unwrap();

        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.date, d("2016-03-10"));
        assert_eq!(e.title, "Ghana IMF Stand-By Arrangement Approved");
        assert_eq!(e.source, "CSV");
        assert_eq!(e.relevance_score, 4);
        assert_eq!(e.origin, EventOrigin::Curated);
        assert_eq!(e.url, PLACEHOLDER_URL);
    }

    #[test]
    fn quoted_titles_and_other_countries() {
        let src = CuratedSource::from_reader(CSV.as_bytes()).unwrap();
        let turkey = pilot::lookup("TRY").unwrap();
        let events = src.events_for(turkey, &DateRange::new(d("2018-01-01"), d("2018-12-31")));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Lira plunges, hits record low");
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let src = CuratedSource::from_reader(CSV.as_bytes()).unwrap();
        let ghana = pilot::lookup("GHS").unwrap();
        let exact = DateRange::new(d("2016-03-10"), d("2016-03-10"));
        assert_eq!(src.events_for(ghana, &exact).len(), 1);
    }
}
