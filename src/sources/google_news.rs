use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::config::{GOOGLE_NEWS_RSS_URL, RECENT_DATE_BUFFER_DAYS, RSS_ENTRIES_PER_QUERY, RSS_KEYWORD_QUERIES};
use crate::pilot::PilotCountry;
use crate::sources::{get_text, truncate_title, EventSource, SourceError};
use crate::types::{DateRange, EconomicEvent};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: Option<String>,
    pub pub_date: Option<String>,
    pub source: Option<String>,
}

/// Google News search feed, queried with several variants per country.
pub struct GoogleNewsRssSource {
    client: reqwest::Client,
    feed_url: String,
    entries_per_query: usize,
    keyword_queries: usize,
    buffer_days: i64,
}

impl GoogleNewsRssSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            feed_url: GOOGLE_NEWS_RSS_URL.to_string(),
            entries_per_query: RSS_ENTRIES_PER_QUERY,
            keyword_queries: RSS_KEYWORD_QUERIES,
            buffer_days: RECENT_DATE_BUFFER_DAYS,
        }
    }

    pub fn with_feed_url(mut self, url: impl Into<String>) -> Self {
        self.feed_url = url.into();
        self
    }

    /// Overrides the tolerance applied to feed timestamps.
    pub fn with_buffer_days(mut self, days: i64) -> Self {
        self.buffer_days = days;
        self
    }

    pub fn queries_for(&self, country: &PilotCountry) -> Vec<String> {
        let name = country.country.to_lowercase();
        let mut queries = vec![country.country.to_string()];
        queries.extend(
            country
                .keywords
                .iter()
                .filter(|k| **k != name)
                .take(self.keyword_queries)
                .map(|k| {
                    if k.contains(&name) {
                        k.to_string()
                    } else {
                        format!("{} {}", country.country, k)
                    }
                }),
        );
        queries
    }

    async fn fetch_query(&self, query: &str) -> Result<Vec<FeedItem>, SourceError> {
        let body = get_text(
            &self.client,
            &self.feed_url,
            &[
                ("q", query.to_string()),
                ("hl", "en-US".to_string()),
                ("gl", "US".to_string()),
                ("ceid", "US:en".to_string()),
            ],
        )
        .await?;
        let mut items = parse_feed(&body)?;
        items.truncate(self.entries_per_query);
        Ok(items)
    }
}

#[async_trait]
impl EventSource for GoogleNewsRssSource {
    fn name(&self) -> &'static str {
        "google_news"
    }

    async fn fetch(
        &self,
        country: &PilotCountry,
        range: &DateRange,
    ) -> Result<Vec<EconomicEvent>, SourceError> {
        let window = range.padded(self.buffer_days);
        let mut events = Vec::new();
        let mut last_err = None;
        let mut any_ok = false;

        for query in self.queries_for(country) {
            match self.fetch_query(&query).await {
                Ok(items) => {
                    any_ok = true;
                    let before = events.len();
                    events.extend(items_to_events(items, country.code, &window));
                    debug!(query = %query, kept = events.len() - before, "[SOURCE] google_news query");
                }
                Err(e) => {
                    warn!(query = %query, "[SOURCE] google_news query failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if !any_ok => Err(e),
            _ => Ok(events),
        }
    }
}

/// Items whose publication date parses and falls inside `window`.
pub fn items_to_events(items: Vec<FeedItem>, country_code: &str, window: &DateRange) -> Vec<EconomicEvent> {
    items
        .into_iter()
        .filter_map(|item| {
            let Some(date) = item.pub_date.as_deref().and_then(parse_pub_date) else {
                debug!(title = %item.title, "[SOURCE] google_news: skipping item with bad pubDate");
                return None;
            };
            if !window.contains(date) {
                return None;
            }
            let source = item
                .source
                .clone()
                .filter(|s| !s.is_empty())
                .or_else(|| item.link.as_deref().and_then(link_host))
                .unwrap_or_else(|| "Google News".to_string());
            let title = strip_publisher_suffix(&item.title, &source);
            Some(EconomicEvent::fetched(
                date,
                country_code,
                truncate_title(title, 200),
                source,
                item.link,
            ))
        })
        .collect()
}

pub fn parse_pub_date(s: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc2822(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}

fn link_host(link: &str) -> Option<String> {
    let rest = link.split("//").nth(1)?;
    let host = rest.split('/').next()?;
    (!host.is_empty()).then(|| host.to_string())
}

/// Google appends " - Publisher" to headlines.
fn strip_publisher_suffix<'a>(title: &'a str, source: &str) -> &'a str {
    title
        .strip_suffix(source)
        .and_then(|t| t.strip_suffix(" - "))
        .unwrap_or(title)
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Title,
    Link,
    PubDate,
    Source,
}

/// Parses the `<item>` elements of an RSS 2.0 document.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut field = Field::None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"item" => current = Some(FeedItem::default()),
                b"title" if current.is_some() => field = Field::Title,
                b"link" if current.is_some() => field = Field::Link,
                b"pubDate" if current.is_some() => field = Field::PubDate,
                b"source" if current.is_some() => field = Field::Source,
                _ => field = Field::None,
            },
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| SourceError::Parse(e.to_string()))?
                    .into_owned();
                assign(&mut current, field, text);
            }
            Ok(Event::CData(c)) => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                assign(&mut current, field, text);
            }
            Ok(Event::End(e)) => {
                field = Field::None;
                if e.name().as_ref() == b"item" {
                    if let Some(item) = current.take().filter(|i| !i.title.is_empty()) {
                        items.push(item);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Parse(e.to_string())),
            _ => {}
        }
    }
    Ok(items)
}

fn assign(current: &mut Option<FeedItem>, field: Field, text: String) {
    let Some(item) = current.as_mut() else { return };
    match field {
        Field::Title => item.title.push_str(&text),
        Field::Link => item.link = Some(text),
        Field::PubDate => item.pub_date = Some(text),
        Field::Source => item.source = Some(text),
        Field::None => {}
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{extract::Query, http::StatusCode, routing::get, Router};

    use super::*;
    use crate::pilot;
    use crate::sources::testing::d;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>"Ghana" - Google News</title>
  <item>
    <title>Ghana&apos;s cedi slides as inflation bites - Reuters</title>
    <link>https://news.google.com/rss/articles/abc</link>
    <pubDate>Mon, 13 May 2024 07:00:00 GMT</pubDate>
    <source url="https://www.reuters.com">Reuters</source>
  </item>
  <item>
    <title><![CDATA[Bank of Ghana holds policy rate]]></title>
    <link>https://www.myjoyonline.com/story</link>
    <pubDate>Fri, 10 May 2024 12:30:00 +0000</pubDate>
  </item>
  <item>
    <title>Old news</title>
    <link>https://example.com/old</link>
    <pubDate>Tue, 02 Jan 2024 09:00:00 GMT</pubDate>
  </item>
  <item>
    <title>Broken date</title>
    <link>https://example.com/broken</link>
    <pubDate>yesterday</pubDate>
  </item>
</channel></rss>"#;

    #[test]
    fn parses_items_including_cdata() {
        let items = parse_feed(FEED).unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].title, "Ghana's cedi slides as inflation bites - Reuters");
        assert_eq!(items[0].source.as_deref(), Some("Reuters"));
        assert_eq!(items[1].title, "Bank of Ghana holds policy rate");
    }

    #[test]
    fn date_filter_applies_buffer_and_skips_bad_dates() {
        let items = parse_feed(FEED).unwrap();
        // Range ends 2024-05-10; buffer of 3 days admits 2024-05-13.
        let window = DateRange::new(d("2024-05-01"), d("2024-05-10")).padded(3);
        let events = items_to_events(items.clone(), "GHS", &window);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Ghana's cedi slides as inflation bites");
        assert_eq!(events[0].source, "Reuters");
        assert_eq!(events[1].source, "www.myjoyonline.com");

        let strict = DateRange::new(d("2024-05-01"), d("2024-05-10"));
        assert_eq!(items_to_events(items, "GHS", &strict).len(), 1);
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        assert!(parse_feed("<rss><channel><item><title>x</item></rss>").is_err());
    }

    /// Serves `FEED` for the bare country query and 503 for every other variant.
    async fn feed_for_country_only(Query(params): Query<HashMap<String, String>>) -> (StatusCode, String) {
        match params.get("q").map(String::as_str) {
            Some("Ghana") => (StatusCode::OK, FEED.to_string()),
            _ => (StatusCode::SERVICE_UNAVAILABLE, String::new()),
        }
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn failed_query_variants_do_not_drop_successful_ones() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/rss/search", get(feed_for_country_only));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let src = GoogleNewsRssSource::new(client()).with_feed_url(format!("http://{addr}/rss/search"));
        let ghana = pilot::lookup("GHS").unwrap();
        let range = DateRange::new(d("2024-05-01"), d("2024-05-10"));

        let events = src.fetch(ghana, &range).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.country == "GHS"));
    }

    #[tokio::test]
    async fn every_query_failing_is_unavailable() {
        let src = GoogleNewsRssSource::new(client()).with_feed_url("http://127.0.0.1:9/rss/search");
        let ghana = pilot::lookup("GHS").unwrap();
        let range = DateRange::new(d("2024-05-01"), d("2024-05-10"));

        let err = src.fetch(ghana, &range).await;
        assert!(matches!(err, Err(SourceError::Unavailable(_))));
    }

    #[test]
    fn query_variants_use_country_keywords() {
        let src = GoogleNewsRssSource::new(reqwest::Client::new());
        let ghana = pilot::lookup("GHS").unwrap();
        assert_eq!(
            src.queries_for(ghana),
            vec!["Ghana".to_string(), "Ghana cedi".to_string(), "bank of ghana".to_string()]
        );
    }
}
