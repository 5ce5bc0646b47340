//! Event source adapters.
//!
//! Each adapter turns one external source into `EconomicEvent`s for a country and
//! date range. Adapters report failures as `SourceError`; the aggregator absorbs
//! them so one broken source never takes down a request.

pub mod curated;
pub mod google_news;
pub mod imf;
pub mod newsdata;
pub mod wikipedia;
pub mod worldbank;

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::escape::{resolve_predefined_entity, unescape_with};
use thiserror::Error;
use tracing::debug;

use crate::config::USER_AGENT;
use crate::pilot::PilotCountry;
use crate::types::{DateRange, EconomicEvent};

pub use curated::CuratedSource;
pub use google_news::GoogleNewsRssSource;
pub use imf::ImfArchiveSource;
pub use newsdata::NewsDataSource;
pub use wikipedia::WikipediaTimelineSource;
pub use worldbank::WorldBankNewsSource;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Network failure, non-success status or timeout.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The response arrived but could not be interpreted.
    #[error("unparseable response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Parse(e.to_string())
        } else {
            SourceError::Unavailable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Parse(e.to_string())
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(
        &self,
        country: &PilotCountry,
        range: &DateRange,
    ) -> Result<Vec<EconomicEvent>, SourceError>;
}

/// Shared client for every outbound call; the timeout bounds each request.
pub fn http_client(timeout_secs: u64) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
}

/// GET `url` and return the body, mapping non-2xx statuses to `Unavailable`.
pub(crate) async fn get_text(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<String, SourceError> {
    let resp = client.get(url).query(query).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Unavailable(format!("HTTP {status} from {url}")));
    }
    Ok(resp.text().await?)
}

/// Trims and cuts `text` to at most `max_chars` characters, marking the cut.
pub(crate) fn truncate_title(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Decodes XML entities, numeric references and `&nbsp;` in scraped titles in one pass.
/// Text holding an entity outside that set is returned as is.
pub(crate) fn decode_entities(s: &str) -> String {
    let resolve = |entity: &str| match entity {
        "nbsp" => Some(" "),
        other => resolve_predefined_entity(other),
    };
    match unescape_with(s, resolve) {
        Ok(text) => text.into_owned(),
        Err(e) => {
            debug!(error = %e, "[SOURCE] leaving undecodable entities in place");
            s.to_string()
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::NaiveDate;

    pub fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_title_marks_cut() {
        assert_eq!(truncate_title("  short  ", 10), "short");
        assert_eq!(truncate_title("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn decode_common_entities() {
        assert_eq!(decode_entities("IMF &amp; Ghana&#39;s deal"), "IMF & Ghana's deal");
        assert_eq!(decode_entities("Rates &gt; 20%&nbsp;now"), "Rates > 20% now");
        assert_eq!(decode_entities("&#039;quoted&quot;"), "'quoted\"");
    }

    #[test]
    fn decode_entities_is_single_pass() {
        assert_eq!(decode_entities("a &amp;lt; b"), "a &lt; b");
        assert_eq!(decode_entities("caf&eacute; talks"), "caf&eacute; talks");
    }
}
