use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::WIKIPEDIA_API_URL;
use crate::pilot::PilotCountry;
use crate::sources::{get_text, truncate_title, EventSource, SourceError};
use crate::types::{DateRange, EconomicEvent};

const SOURCE_NAME: &str = "Wikipedia";
const MAX_TITLE_CHARS: usize = 160;
const MIN_SENTENCE_CHARS: usize = 30;

/// Dated sentences from encyclopedia pages about a country's economy and crises.
pub struct WikipediaTimelineSource {
    client: reqwest::Client,
    api_url: String,
}

impl WikipediaTimelineSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: WIKIPEDIA_API_URL.to_string(),
        }
    }

    fn pages_for(country: &PilotCountry) -> Vec<String> {
        let mut pages = vec![format!("Economy of {}", country.country)];
        pages.extend(country.timeline_pages.iter().map(|p| p.to_string()));
        pages
    }

    async fn fetch_extract(&self, page: &str) -> Result<String, SourceError> {
        let body = get_text(
            &self.client,
            &self.api_url,
            &[
                ("action", "query".to_string()),
                ("prop", "extracts".to_string()),
                ("explaintext", "1".to_string()),
                ("redirects", "1".to_string()),
                ("format", "json".to_string()),
                ("titles", page.to_string()),
            ],
        )
        .await?;
        parse_extract(&body)
    }
}

#[async_trait]
impl EventSource for WikipediaTimelineSource {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    async fn fetch(
        &self,
        country: &PilotCountry,
        range: &DateRange,
    ) -> Result<Vec<EconomicEvent>, SourceError> {
        let mut events = Vec::new();
        let mut last_err = None;
        let mut any_ok = false;

        for page in Self::pages_for(country) {
            match self.fetch_extract(&page).await {
                Ok(extract) => {
                    any_ok = true;
                    events.extend(dated_sentences(&extract, &page, country.code, range));
                }
                Err(e) => {
                    debug!(page = %page, "[SOURCE] wikipedia page failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        match (any_ok, last_err) {
            (false, Some(e)) => Err(e),
            (true, Some(e)) => {
                warn!(country = country.code, "[SOURCE] wikipedia partially failed: {e}");
                Ok(events)
            }
            _ => Ok(events),
        }
    }
}

/// Pulls the plain-text extract of the first page out of a MediaWiki query response.
pub fn parse_extract(body: &str) -> Result<String, SourceError> {
    let v: serde_json::Value = serde_json::from_str(body)?;
    let pages = v
        .get("query")
        .and_then(|q| q.get("pages"))
        .and_then(|p| p.as_object())
        .ok_or_else(|| SourceError::Parse("missing query.pages".to_string()))?;

    Ok(pages
        .values()
        .find_map(|p| p.get("extract").and_then(|e| e.as_str()))
        .unwrap_or_default()
        .to_string())
}

fn month_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:\b(\d{1,2}) )?\b(January|February|March|April|May|June|July|August|September|October|November|December)(?: (\d{1,2}),?)? (\d{4})\b",
        )
        .expect("valid month regex")
    })
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19[5-9]\d|20\d{2})\b").expect("valid year regex"))
}

/// Best-effort date of a sentence: an explicit "[day] Month [day,] YYYY" wins;
/// otherwise the first year mentioned, dated 1 January.
pub fn sentence_date(sentence: &str) -> Option<NaiveDate> {
    if let Some(c) = month_date_re().captures(sentence) {
        let month = month_number(c.get(2)?.as_str())?;
        let year: i32 = c.get(4)?.as_str().parse().ok()?;
        let day: u32 = c
            .get(1)
            .or_else(|| c.get(3))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(1);
        return NaiveDate::from_ymd_opt(year, month, day)
            .or_else(|| NaiveDate::from_ymd_opt(year, month, 1));
    }
    let year: i32 = year_re().captures(sentence)?.get(1)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, 1, 1)
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "January", "February", "March", "April", "May", "June", "July", "August", "September",
        "October", "November", "December",
    ];
    MONTHS.iter().position(|m| *m == name).map(|i| i as u32 + 1)
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .flat_map(|line| line.split(". "))
        .map(str::trim)
        .filter(|s| s.len() >= MIN_SENTENCE_CHARS && !s.starts_with("=="))
}

fn page_url(page: &str, sentence: &str) -> String {
    let anchor: String = sentence.split_whitespace().take(8).collect::<Vec<_>>().join(" ");
    format!(
        "https://en.wikipedia.org/wiki/{}#:~:text={}",
        urlencoding::encode(&page.replace(' ', "_")),
        urlencoding::encode(&anchor)
    )
}

pub fn dated_sentences(
    extract: &str,
    page: &str,
    country_code: &str,
    range: &DateRange,
) -> Vec<EconomicEvent> {
    split_sentences(extract)
        .filter_map(|s| sentence_date(s).map(|date| (date, s)))
        .filter(|(date, _)| range.contains(*date))
        .map(|(date, s)| {
            EconomicEvent::fetched(
                date,
                country_code,
                truncate_title(s, MAX_TITLE_CHARS),
                SOURCE_NAME,
                Some(page_url(page, s)),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::d;

    const RESPONSE: &str = r#"{
        "batchcomplete": "",
        "query": {"pages": {"12345": {"pageid": 12345, "title": "Economy of Ghana",
            "extract": "== History ==\nIn April 2015, the IMF approved a three-year Extended Credit Facility for Ghana. The cedi depreciated sharply against the dollar during 2014. Cocoa remains a major export.\nOn 12 December 2022, Ghana suspended payments on most of its external debt."}}}
    }"#;

    #[test]
    fn parses_extract_from_query_pages() {
        let text = parse_extract(RESPONSE).unwrap();
        assert!(text.starts_with("== History =="));
    }

    #[test]
    fn missing_pages_is_a_parse_error() {
        assert!(matches!(parse_extract("{}"), Err(SourceError::Parse(_))));
    }

    #[test]
    fn sentence_dates_prefer_month_precision() {
        assert_eq!(sentence_date("In April 2015, the IMF approved"), Some(d("2015-04-01")));
        assert_eq!(sentence_date("On 12 December 2022, Ghana suspended"), Some(d("2022-12-12")));
        assert_eq!(sentence_date("On March 3, 2019 the bank acted"), Some(d("2019-03-03")));
        assert_eq!(sentence_date("The cedi fell during 2014"), Some(d("2014-01-01")));
        assert_eq!(sentence_date("No date at all here"), None);
    }

    #[test]
    fn only_dated_sentences_inside_range_are_kept() {
        let text = parse_extract(RESPONSE).unwrap();
        let range = DateRange::new(d("2015-01-01"), d("2015-12-31"));
        let events = dated_sentences(&text, "Economy of Ghana", "GHS", &range);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].date, d("2015-04-01"));
        assert_eq!(events[0].source, "Wikipedia");
        assert!(events[0].url.starts_with("https://en.wikipedia.org/wiki/Economy_of_Ghana#"));
    }
}
