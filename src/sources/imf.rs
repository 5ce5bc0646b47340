use std::collections::HashSet;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;

use crate::config::{IMF_BASE_URL, IMF_SEARCH_URL};
use crate::pilot::PilotCountry;
use crate::sources::{decode_entities, get_text, truncate_title, EventSource, SourceError};
use crate::types::{DateRange, EconomicEvent};

const SOURCE_NAME: &str = "IMF";

/// IMF news archive, scraped by country and date window.
pub struct ImfArchiveSource {
    client: reqwest::Client,
    search_url: String,
}

impl ImfArchiveSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            search_url: IMF_SEARCH_URL.to_string(),
        }
    }
}

#[async_trait]
impl EventSource for ImfArchiveSource {
    fn name(&self) -> &'static str {
        "imf"
    }

    async fn fetch(
        &self,
        country: &PilotCountry,
        range: &DateRange,
    ) -> Result<Vec<EconomicEvent>, SourceError> {
        let html = get_text(
            &self.client,
            &self.search_url,
            &[
                ("q", country.country.to_string()),
                ("from", range.start.format("%Y-%m-%d").to_string()),
                ("to", range.end.format("%Y-%m-%d").to_string()),
            ],
        )
        .await?;
        Ok(parse_articles(&html, country.code, range))
    }
}

fn article_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r##"(?s)<a[^>]+href="((?:https?://www\.imf\.org)?/en/News/Articles/(\d{4})/(\d{2})/(\d{2})/[^"#?]+)"[^>]*>(.*?)</a>"##,
        )
        .expect("valid IMF link regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag regex"))
}

/// Article links on an IMF listing page. The date comes from the article path
/// (`/en/News/Articles/YYYY/MM/DD/...`); links without a readable title are skipped.
pub fn parse_articles(html: &str, country_code: &str, range: &DateRange) -> Vec<EconomicEvent> {
    let mut seen = HashSet::new();
    article_link_re()
        .captures_iter(html)
        .filter_map(|c| {
            let href = c.get(1)?.as_str();
            let date = NaiveDate::from_ymd_opt(
                c.get(2)?.as_str().parse().ok()?,
                c.get(3)?.as_str().parse().ok()?,
                c.get(4)?.as_str().parse().ok()?,
            )?;
            let text = tag_re().replace_all(c.get(5)?.as_str(), " ");
            let title = decode_entities(&text.split_whitespace().collect::<Vec<_>>().join(" "));
            if title.is_empty() {
                return None;
            }
            let url = if href.starts_with('/') {
                format!("{IMF_BASE_URL}{href}")
            } else {
                href.to_string()
            };
            Some((date, title, url))
        })
        .filter(|(date, _, url)| range.contains(*date) && seen.insert(url.clone()))
        .map(|(date, title, url)| {
            EconomicEvent::fetched(date, country_code, truncate_title(&title, 200), SOURCE_NAME, Some(url))
        })
        .collect()
}
