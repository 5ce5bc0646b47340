use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::config::NEWSDATA_API_URL;
use crate::pilot::PilotCountry;
use crate::sources::{get_text, truncate_title, EventSource, SourceError};
use crate::types::{DateRange, EconomicEvent};

/// Keyed news archive API. Only registered when an API key is configured.
pub struct NewsDataSource {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl NewsDataSource {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_url: NEWSDATA_API_URL.to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl EventSource for NewsDataSource {
    fn name(&self) -> &'static str {
        "newsdata"
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
                ("apikey", self.api_key.clone()),
                ("q", format!("{} {}", country.country, country.currency_name)),
                ("from_date", range.start.format("%Y-%m-%d").to_string()),
                ("to_date", range.end.format("%Y-%m-%d").to_string()),
                ("language", "en".to_string()),
            ],
        )
        .await?;
        parse_results(&body, country.code, range)
    }
}

pub fn parse_results(
    body: &str,
    country_code: &str,
    range: &DateRange,
) -> Result<Vec<EconomicEvent>, SourceError> {
    let v: serde_json::Value = serde_json::from_str(body)?;
    let status = v.get("status").and_then(|s| s.as_str()).unwrap_or("");
    if status != "success" {
        let msg = v
            .get("results")
            .and_then(|r| r.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or(status);
        return Err(SourceError::Unavailable(format!("newsdata status: {msg}")));
    }

    let results = v
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| SourceError::Parse("missing results".to_string()))?;

    Ok(results
        .iter()
        .filter_map(|r| {
            let title = r.get("title").and_then(|t| t.as_str())?;
            let date = r
                .get("pubDate")
                .and_then(|d| d.as_str())
                .and_then(|s| s.get(..10))
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            let Some(date) = date else {
                debug!(title = %title, "[SOURCE] newsdata: skipping article without pubDate");
                return None;
            };
            if !range.contains(date) {
                return None;
            }
            let source = r
                .get("source_id")
                .and_then(|s| s.as_str())
                .unwrap_or("NewsData");
            let link = r.get("link").and_then(|l| l.as_str()).map(str::to_string);
            Some(EconomicEvent::fetched(
                date,
                country_code,
                truncate_title(title, 200),
                source,
                link,
            ))
        })
        .collect())
}
