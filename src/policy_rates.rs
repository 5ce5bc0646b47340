//! Central bank policy rates from FRED. Only built when an API key is configured.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;

use crate::config::{FRED_OBSERVATIONS_URL, POLICY_RATE_LOOKBACK_DAYS, SERIES_CACHE_HOURS};
use crate::error::{AppError, Result};
use crate::pilot::PilotCountry;
use crate::state::TtlCache;
use crate::types::{shift_days, DateRange, PolicyRateChange, PriceObservation, PriceSeries};

pub struct PolicyRateFetcher {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    cache: TtlCache<PriceSeries>,
    validity: Duration,
}

impl PolicyRateFetcher {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_url: FRED_OBSERVATIONS_URL.to_string(),
            api_key: api_key.into(),
            cache: TtlCache::new(),
            validity: Duration::hours(SERIES_CACHE_HOURS),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Rate changes dated inside `window`. Readings from before the window opens are
    /// fetched too, so a change on the first reading inside it is still seen.
    pub async fn changes_at(
        &self,
        country: &PilotCountry,
        window: &DateRange,
        now: DateTime<Utc>,
    ) -> Result<Vec<PolicyRateChange>> {
        let Some(series_id) = country.policy_rate_series else {
            debug!(country = country.code, "[POLICY] no policy rate series");
            return Ok(Vec::new());
        };
        let range = DateRange::new(shift_days(window.start, -POLICY_RATE_LOOKBACK_DAYS), window.end);
        let rates = self.series_at(series_id, &range, now).await?;
        Ok(rate_changes(&rates.observations)
            .into_iter()
            .filter(|c| window.contains(c.date))
            .collect())
    }

    async fn series_at(&self, series_id: &str, range: &DateRange, now: DateTime<Utc>) -> Result<PriceSeries> {
        let key = format!("{series_id}:{}:{}", range.start, range.end);
        if let Some(series) = self.cache.get_at(&key, now) {
            debug!(key = %key, "[POLICY] cache hit");
            return Ok(series);
        }

        let resp = self
            .client
            .get(&self.api_url)
            .query(&[
                ("series_id", series_id.to_string()),
                ("api_key", self.api_key.clone()),
                ("file_type", "json".to_string()),
                ("observation_start", range.start.to_string()),
                ("observation_end", range.end.to_string()),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let msg = error_message(&body).unwrap_or_else(|| format!("HTTP {status}"));
            return Err(AppError::Upstream(format!("{series_id}: {msg}")));
        }

        let series = parse_observations(&body, series_id)?;
        debug!(series_id, observations = series.len(), "[POLICY] series fetched");
        self.cache.put_at(key, series.clone(), self.validity, now);
        Ok(series)
    }
}

fn error_message(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v.get("error_message")?.as_str().map(str::to_string)
}

/// FRED `observations` as a series. Missing readings (`"."`) are skipped.
pub fn parse_observations(body: &str, series_id: &str) -> Result<PriceSeries> {
    let v: serde_json::Value = serde_json::from_str(body)?;
    let observations = v
        .get("observations")
        .and_then(|o| o.as_array())
        .ok_or_else(|| AppError::Upstream(format!("{series_id}: missing observations")))?
        .iter()
        .filter_map(|o| {
            let date = o
                .get("date")
                .and_then(|d| d.as_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())?;
            let value = o
                .get("value")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite())?;
            Some(PriceObservation::new(date, value))
        })
        .collect();
    Ok(PriceSeries::new(series_id, observations))
}

/// One change per reading that differs from the reading before it.
pub fn rate_changes(obs: &[PriceObservation]) -> Vec<PolicyRateChange> {
    obs.windows(2)
        .filter(|pair| pair[0].value != pair[1].value)
        .map(|pair| PolicyRateChange {
            date: pair[1].date,
            previous_rate: pair[0].value,
            new_rate: pair[1].value,
            change: pair[1].value - pair[0].value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{extract::State, routing::get, Router};
    use chrono::TimeZone;

    use super::*;
    use crate::pilot;
    use crate::sources::testing::d;

    const GHANA_RATES: &str = r#"{
        "realtime_start": "2024-06-01", "units": "lin", "count": 5,
        "observations": [
            {"date": "2015-10-01", "value": "24.0"},
            {"date": "2015-11-01", "value": "26.0"},
            {"date": "2015-12-01", "value": "."},
            {"date": "2016-01-01", "value": "26.0"},
            {"date": "2016-02-01", "value": "26.0"}
        ]
    }"#;

    #[test]
    fn parses_observations_and_skips_missing_readings() {
        let series = parse_observations(GHANA_RATES, "INTDSRGHM193N").unwrap();
        assert_eq!(series.name, "INTDSRGHM193N");
        assert_eq!(series.len(), 4);
        assert_eq!(series.observations[1].value, 26.0);
    }

    #[test]
    fn body_without_observations_is_upstream_error() {
        let err = parse_observations(r#"{"count": 0}"#, "INTDSRGHM193N");
        assert!(matches!(err, Err(AppError::Upstream(_))));
        assert_eq!(
            error_message(r#"{"error_code": 400, "error_message": "Bad Request.  The series does not exist."}"#)
                .as_deref(),
            Some("Bad Request.  The series does not exist.")
        );
    }

    #[test]
    fn only_differing_consecutive_readings_are_changes() {
        let series = parse_observations(GHANA_RATES, "INTDSRGHM193N").unwrap();
        let changes = rate_changes(&series.observations);
        assert_eq!(
            changes,
            vec![PolicyRateChange {
                date: d("2015-11-01"),
                previous_rate: 24.0,
                new_rate: 26.0,
                change: 2.0,
            }]
        );
        assert!(rate_changes(&series.observations[..1]).is_empty());
    }

    async fn serve_rates(State(hits): State<Arc<AtomicUsize>>) -> &'static str {
        hits.fetch_add(1, Ordering::SeqCst);
        GHANA_RATES
    }

    #[tokio::test]
    async fn changes_are_limited_to_window_and_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/fred/series/observations", get(serve_rates))
            .with_state(Arc::clone(&hits));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let fetcher = PolicyRateFetcher::new(reqwest::Client::new(), "test-key")
            .with_api_url(format!("http://{addr}/fred/series/observations"));
        let ghana = pilot::lookup("GHS").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let inside = DateRange::new(d("2015-11-01"), d("2015-11-30"));
        let changes = fetcher.changes_at(ghana, &inside, now).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_rate, 26.0);

        let again = fetcher.changes_at(ghana, &inside, now).await.unwrap();
        assert_eq!(again, changes);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let later = DateRange::new(d("2016-01-15"), d("2016-02-15"));
        assert!(fetcher.changes_at(ghana, &later, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_api_is_an_error() {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap();
        let fetcher = PolicyRateFetcher::new(client, "test-key").with_api_url("http://127.0.0.1:9/fred");
        let ghana = pilot::lookup("GHS").unwrap();
        let window = DateRange::new(d("2015-11-01"), d("2015-11-30"));
        assert!(fetcher.changes_at(ghana, &window, Utc::now()).await.is_err());
    }
}
