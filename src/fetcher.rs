use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{OUTLIER_SIGMA, SERIES_CACHE_HOURS, YAHOO_CHART_URL};
use crate::error::{AppError, Result};
use crate::state::TtlCache;
use crate::types::{shift_days, DateRange, GrantDisbursement, PriceObservation, PriceSeries};

/// Daily price series from the Yahoo chart API, cached per (symbol, range), with
/// an optional directory of `date,value` CSV files used when the API fails.
pub struct SeriesFetcher {
    client: reqwest::Client,
    chart_url: String,
    csv_dir: Option<PathBuf>,
    cache: TtlCache<PriceSeries>,
    validity: Duration,
    sigma: f64,
}

impl SeriesFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            chart_url: YAHOO_CHART_URL.to_string(),
            csv_dir: None,
            cache: TtlCache::new(),
            validity: Duration::hours(SERIES_CACHE_HOURS),
            sigma: OUTLIER_SIGMA,
        }
    }

    pub fn with_csv_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.csv_dir = Some(dir.into());
        self
    }

    pub fn with_chart_url(mut self, url: impl Into<String>) -> Self {
        self.chart_url = url.into();
        self
    }

    pub async fn fetch(&self, symbol: &str, range: &DateRange) -> Result<PriceSeries> {
        self.fetch_at(symbol, range, Utc::now()).await
    }

    /// Cleaned series for `symbol` over `range`. Falls back to `{csv_dir}/{symbol}.csv`
    /// (non-alphanumerics replaced by `_`) when the chart API is unreachable.
    pub async fn fetch_at(
        &self,
        symbol: &str,
        range: &DateRange,
        now: DateTime<Utc>,
    ) -> Result<PriceSeries> {
        let key = format!("{symbol}:{}:{}", range.start, range.end);
        if let Some(series) = self.cache.get_at(&key, now) {
            debug!(key = %key, "[FETCHER] series cache hit");
            return Ok(series);
        }

        let mut series = match self.fetch_chart(symbol, range).await {
            Ok(s) => s,
            Err(e) => match self.csv_fallback(symbol, range) {
                Some(s) => {
                    warn!(symbol, error = %e, "[FETCHER] chart API failed, using CSV fallback");
                    s
                }
                None => return Err(e),
            },
        };

        let cleaned = clean_outliers(&mut series, self.sigma);
        if cleaned > 0 {
            info!(symbol, cleaned, "[FETCHER] interpolated outliers");
        }
        self.cache.put_at(key, series.clone(), self.validity, now);
        Ok(series)
    }

    async fn fetch_chart(&self, symbol: &str, range: &DateRange) -> Result<PriceSeries> {
        let period1 = range.start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = shift_days(range.end, 1)
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();
        let url = format!("{}/{}", self.chart_url, urlencoding::encode(symbol));
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
            ])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("HTTP {status} for {symbol}")));
        }
        let body = resp.text().await?;
        let series = parse_chart(&body, symbol)?;
        debug!(symbol, observations = series.len(), "[FETCHER] chart fetched");
        Ok(series)
    }

    fn csv_fallback(&self, symbol: &str, range: &DateRange) -> Option<PriceSeries> {
        let dir = self.csv_dir.as_ref()?;
        let path = dir.join(format!("{}.csv", csv_stem(symbol)));
        if !path.exists() {
            return None;
        }
        match load_series_csv(&path, symbol) {
            Ok(series) => {
                let obs = series.between(range.start, range.end).to_vec();
                Some(PriceSeries::new(symbol, obs))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "[FETCHER] CSV fallback unreadable");
                None
            }
        }
    }
}

fn csv_stem(symbol: &str) -> String {
    symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Daily closes from a chart API response. Null closes are skipped.
pub fn parse_chart(body: &str, symbol: &str) -> Result<PriceSeries> {
    let v: serde_json::Value = serde_json::from_str(body)?;
    let chart = v
        .get("chart")
        .ok_or_else(|| AppError::Upstream("missing chart".to_string()))?;

    if let Some(err) = chart.get("error").filter(|e| !e.is_null()) {
        let desc = err
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("unknown error");
        return Err(AppError::Upstream(format!("{symbol}: {desc}")));
    }

    let result = chart
        .get("result")
        .and_then(|r| r.as_array())
        .and_then(|r| r.first())
        .ok_or_else(|| AppError::Upstream(format!("{symbol}: empty result")))?;

    let timestamps = result
        .get("timestamp")
        .and_then(|t| t.as_array())
        .cloned()
        .unwrap_or_default();
    let closes = result
        .get("indicators")
        .and_then(|i| i.get("quote"))
        .and_then(|q| q.as_array())
        .and_then(|q| q.first())
        .and_then(|q| q.get("close"))
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();

    let observations = timestamps
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| {
            let date = DateTime::from_timestamp(ts.as_i64()?, 0)?.date_naive();
            let value = close.as_f64()?;
            Some(PriceObservation::new(date, value))
        })
        .collect();

    Ok(PriceSeries::new(symbol, observations))
}

/// Loads a two-column `date,value` CSV (header row required). Rows that fail to
/// parse are skipped.
pub fn load_series_csv(path: impl AsRef<Path>, name: &str) -> Result<PriceSeries> {
    let file = std::fs::File::open(path.as_ref())?;
    series_from_reader(file, name)
}

pub fn series_from_reader<R: Read>(reader: R, name: &str) -> Result<PriceSeries> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut observations = Vec::new();
    let mut skipped = 0usize;
    for record in rdr.records() {
        let record = record?;
        let parsed = record
            .get(0)
            .and_then(parse_date)
            .zip(record.get(1).and_then(|v| v.parse::<f64>().ok()));
        match parsed {
            Some((date, value)) => observations.push(PriceObservation::new(date, value)),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(series = name, skipped, "[FETCHER] skipped unparseable series rows");
    }
    Ok(PriceSeries::new(name, observations))
}

/// Replaces values outside `mean ± sigma * std` by linear interpolation between
/// the nearest kept neighbours (edges take the nearest kept value). Returns the
/// number of replaced points.
pub fn clean_outliers(series: &mut PriceSeries, sigma: f64) -> usize {
    let n = series.observations.len();
    if n < 3 {
        return 0;
    }
    let values: Vec<f64> = series.observations.iter().map(|o| o.value).collect();
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let band = sigma * var.sqrt();
    if band == 0.0 {
        return 0;
    }

    let outlier: Vec<bool> = values.iter().map(|v| (v - mean).abs() > band).collect();
    let count = outlier.iter().filter(|o| **o).count();
    if count == 0 || count == n {
        return 0;
    }

    for i in (0..n).filter(|&i| outlier[i]) {
        let prev = (0..i).rev().find(|&j| !outlier[j]);
        let next = (i + 1..n).find(|&j| !outlier[j]);
        let replacement = match (prev, next) {
            (Some(p), Some(q)) => {
                let t = (i - p) as f64 / (q - p) as f64;
                values[p] + (values[q] - values[p]) * t
            }
            (Some(p), None) => values[p],
            (None, Some(q)) => values[q],
            (None, None) => values[i],
        };
        series.observations[i].value = replacement;
    }
    count
}

#[derive(Debug, Deserialize)]
struct GrantRow {
    country_code: String,
    #[serde(default)]
    country_name: String,
    disbursement_date: String,
    amount_usd: String,
    #[serde(default)]
    grant_type: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    program_name: String,
}

/// Loads the standardized grant table produced by the ETL step.
pub fn load_grants_csv(path: impl AsRef<Path>) -> Result<Vec<GrantDisbursement>> {
    let file = std::fs::File::open(path.as_ref())?;
    let grants = grants_from_reader(file)?;
    info!(
        grants = grants.len(),
        path = %path.as_ref().display(),
        "[FETCHER] grant disbursements loaded"
    );
    Ok(grants)
}

pub fn grants_from_reader<R: Read>(reader: R) -> Result<Vec<GrantDisbursement>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut grants = Vec::new();
    for (line, record) in rdr.deserialize::<GrantRow>().enumerate() {
        let row = match record {
            Ok(r) => r,
            Err(e) => {
                debug!(line = line + 2, "[FETCHER] skipping malformed grant row: {e}");
                continue;
            }
        };
        let date = parse_date(&row.disbursement_date);
        let amount = row.amount_usd.replace(',', "").parse::<f64>().ok();
        let (Some(date), Some(amount_usd)) = (date, amount) else {
            debug!(line = line + 2, country = %row.country_name, "[FETCHER] skipping grant without date/amount");
            continue;
        };
        if row.country_code.is_empty() {
            continue;
        }
        grants.push(GrantDisbursement {
            country_code: row.country_code.to_uppercase(),
            date,
            amount_usd,
            program_type: row.grant_type,
            source: non_empty(row.source),
            program_name: non_empty(row.program_name),
        });
    }
    grants.sort_by_key(|g| g.date);
    Ok(grants)
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// `YYYY-MM-DD`, optionally followed by a time component.
fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::TimeZone;

    use super::*;
    use crate::sources::testing::d;

    const CHART: &str = r#"{"chart": {"result": [{
        "meta": {"symbol": "USDGHS=X", "currency": "GHS"},
        "timestamp": [1704067200, 1704153600, 1704240000],
        "indicators": {"quote": [{"close": [11.95, null, 12.10]}]}
    }], "error": null}}"#;

    #[test]
    fn parses_chart_and_skips_null_closes() {
        let series = parse_chart(CHART, "USDGHS=X").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.observations[0].date, d("2024-01-01"));
        assert_eq!(series.observations[1].value, 12.10);
    }

    #[test]
    fn chart_error_is_upstream_error() {
        let body = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        match parse_chart(body, "USDXXX=X") {
            Err(AppError::Upstream(msg)) => assert!(msg.contains("delisted")),
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[test]
    fn single_spike_is_interpolated() {
        let obs: Vec<_> = (0..20)
            .map(|i| {
                let value = if i == 10 { 100.0 } else { 10.0 + 0.1 * (i % 3) as f64 };
                PriceObservation::new(d("2024-01-01") + Duration::days(i), value)
            })
            .collect();
        let mut series = PriceSeries::new("USDGHS=X", obs);
        assert_eq!(clean_outliers(&mut series, 3.0), 1);
        // Neighbours are 10.0 (i=9) and 10.2 (i=11).
        assert!((series.observations[10].value - 10.1).abs() < 1e-9);
    }

    #[test]
    fn flat_series_is_left_alone() {
        let obs: Vec<_> = (0..5)
            .map(|i| PriceObservation::new(d("2024-01-01") + Duration::days(i), 7.0))
            .collect();
        let mut series = PriceSeries::new("X", obs);
        assert_eq!(clean_outliers(&mut series, 3.0), 0);
    }

    #[test]
    fn series_csv_skips_bad_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "date,value\n2024-01-02,12.0\nbad,1.0\n2024-01-01,11.5\n2024-01-03,").unwrap();
        let series = load_series_csv(file.path(), "USDGHS=X").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.observations[0].date, d("2024-01-01"));
    }

    #[test]
    fn grant_csv_loader_reads_standardized_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "country_code,country_name,disbursement_date,amount_usd,grant_type,source,program_name\n\
             GHS,Ghana,2023-05-17,600000000,ECF,IMF,Extended Credit Facility\n\
             ghs,Ghana,2016-04-21 00:00:00,\"300,000,000\",DPO,World Bank,\n\
             GHS,Ghana,unknown,1000,ECF,IMF,Broken"
        )
        .unwrap();
        let grants = load_grants_csv(file.path()).unwrap();
        assert_eq!(grants.len(), 2);
        assert_eq!(grants[0].date, d("2016-04-21"));
        assert_eq!(grants[0].country_code, "GHS");
        assert_eq!(grants[0].amount_usd, 300_000_000.0);
        assert_eq!(grants[0].program_name, None);
        assert_eq!(grants[1].source.as_deref(), Some("IMF"));
    }

    #[tokio::test]
    async fn unreachable_api_falls_back_to_csv_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("USDGHS_X.csv"),
            "date,value\n2023-12-31,11.0\n2024-01-01,11.9\n2024-01-02,12.0\n",
        )
        .unwrap();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap();
        let fetcher = SeriesFetcher::new(client)
            .with_chart_url("http://127.0.0.1:9/chart")
            .with_csv_dir(dir.path());
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let range = DateRange::new(d("2024-01-01"), d("2024-01-31"));

        let series = fetcher.fetch_at("USDGHS=X", &range, now).await.unwrap();
        assert_eq!(series.len(), 2);

        std::fs::remove_file(dir.path().join("USDGHS_X.csv")).unwrap();
        let cached = fetcher.fetch_at("USDGHS=X", &range, now).await.unwrap();
        assert_eq!(cached.len(), 2);
    }
}
