use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::config::WORLDBANK_NEWS_API_URL;
use crate::pilot::PilotCountry;
use crate::sources::{decode_entities, get_text, truncate_title, EventSource, SourceError};
use crate::types::{DateRange, EconomicEvent};

const SOURCE_NAME: &str = "World Bank";
const PAGE_ROWS: usize = 25;

/// World Bank news and press releases via the public search API.
pub struct WorldBankNewsSource {
    client: reqwest::Client,
    api_url: String,
}

impl WorldBankNewsSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_url: WORLDBANK_NEWS_API_URL.to_string(),
        }
    }
}

#[async_trait]
impl EventSource for WorldBankNewsSource {
    fn name(&self) -> &'static str {
        "worldbank"
    }

    async fn fetch(
        &self,
        country: &PilotCountry,
        range: &DateRange,
    ) -> Result<Vec<EconomicEvent>, SourceError> {
        let body = get_text(
            &self.client,
            &self.api_url,
            &[
                ("format", "json".to_string()),
                ("qterm", country.country.to_string()),
                ("strdate", range.start.format("%Y-%m-%d").to_string()),
                ("enddate", range.end.format("%Y-%m-%d").to_string()),
                ("rows", PAGE_ROWS.to_string()),
                ("fl", "title,lnchdt,url".to_string()),
            ],
        )
        .await?;
        parse_news(&body, country.code, range)
    }
}

/// Documents from a search API response. Titles arrive either as a plain string
/// or wrapped as `{"cdata!": "..."}`; documents missing a title or date are skipped.
pub fn parse_news(
    body: &str,
    country_code: &str,
    range: &DateRange,
) -> Result<Vec<EconomicEvent>, SourceError> {
    let v: serde_json::Value = serde_json::from_str(body)?;
    let docs = v
        .get("documents")
        .and_then(|d| d.as_object())
        .ok_or_else(|| SourceError::Parse("missing documents".to_string()))?;

    let mut events = Vec::new();
    for (id, doc) in docs {
        let title = doc.get("title").and_then(|t| {
            t.as_str()
                .or_else(|| t.get("cdata!").and_then(|c| c.as_str()))
        });
        let date = doc
            .get("lnchdt")
            .and_then(|d| d.as_str())
            .and_then(|s| s.get(..10))
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());

        let (Some(title), Some(date)) = (title, date) else {
            if id != "facets" {
                debug!(id = %id, "[SOURCE] worldbank: skipping document without title/date");
            }
            continue;
        };
        if !range.contains(date) {
            continue;
        }
        let url = doc.get("url").and_then(|u| u.as_str()).map(str::to_string);
        events.push(EconomicEvent::fetched(
            date,
            country_code,
            truncate_title(&decode_entities(title), 200),
            SOURCE_NAME,
            url,
        ));
    }
    Ok(events)
}
