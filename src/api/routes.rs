use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::aggregator::EventAggregator;
use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::config::DEFAULT_MAX_EVENTS;
use crate::correlator::{GrantImpact, GrantImpactAnalyzer};
use crate::detector::{parse_anomaly_id, AnomalyDetector, DetectionWarning, DetectorConfig};
use crate::db::NoteStore;
use crate::error::AppError;
use crate::fetcher::SeriesFetcher;
use crate::investigation::{CorrelationFlags, Investigation, Investigator};
use crate::pilot::{self, PilotCountry, PILOT_COUNTRIES};
use crate::types::{
    shift_days, Anomaly, DateRange, EconomicEvent, GrantDisbursement, PriceSeries, ResearchNote,
};

/// Default lookback for anomaly scans when no range is given.
const DEFAULT_SCAN_DAYS: i64 = 3 * 365;
/// Default lookback for event queries when no range is given.
const DEFAULT_EVENT_DAYS: i64 = 30;
/// FX context loaded on both sides of the grant dates for impact analysis.
const IMPACT_CONTEXT_DAYS: i64 = 60;
/// Longest anomaly window a scan may request.
const MAX_WINDOW_DAYS: i64 = 5 * 365;

#[derive(Clone)]
pub struct ApiState {
    pub aggregator: Arc<EventAggregator>,
    pub investigator: Arc<Investigator>,
    pub series: Arc<SeriesFetcher>,
    pub notes: NoteStore,
    pub grants: Arc<Vec<GrantDisbursement>>,
    pub detector: DetectorConfig,
    pub impact: Arc<GrantImpactAnalyzer>,
    pub latency: Arc<LatencyStats>,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/countries", get(get_countries))
        .route("/anomalies/:code", get(get_anomalies))
        .route("/anomalies/:code/:anomaly_id", get(get_investigation))
        .route("/events/:code", get(get_events))
        .route("/grants/:code/impact", get(get_grant_impact))
        .route("/notes", get(get_notes))
        .route("/notes/:anomaly_id", get(get_note).put(put_note))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct AnomaliesQuery {
    pub threshold: Option<f64>,
    pub window: Option<i64>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub max: Option<usize>,
}

#[derive(Deserialize)]
pub struct NoteBody {
    pub note: String,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub aggregations: u64,
    pub cache_hits: u64,
    pub source_failures: u64,
    pub last_aggregation_at_ms: Option<u64>,
    pub grants_loaded: usize,
}

#[derive(Serialize)]
pub struct AnomalyResponse {
    #[serde(flatten)]
    pub anomaly: Anomaly,
    pub correlations: CorrelationFlags,
}

#[derive(Serialize)]
pub struct AnomalyScanResponse {
    pub country: &'static PilotCountry,
    pub range: DateRange,
    pub config: DetectorConfig,
    pub anomalies: Vec<AnomalyResponse>,
    pub warnings: Vec<DetectionWarning>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub country: &'static str,
    pub range: DateRange,
    pub events: Vec<EconomicEvent>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let last = state.health.last_aggregation_at_ms();
    Json(HealthResponse {
        status: "ok",
        aggregations: state.health.aggregations(),
        cache_hits: state.health.cache_hits(),
        source_failures: state.health.source_failures(),
        last_aggregation_at_ms: (last > 0).then_some(last),
        grants_loaded: state.grants.len(),
    })
}

async fn get_countries() -> Json<&'static [PilotCountry]> {
    Json(PILOT_COUNTRIES)
}

async fn get_anomalies(
    State(state): State<ApiState>,
    Path(code): Path<String>,
    Query(params): Query<AnomaliesQuery>,
) -> Result<Json<AnomalyScanResponse>, AppError> {
    let country = pilot::lookup(&code)?;
    let range = resolve_range(params.start, params.end, DEFAULT_SCAN_DAYS, Utc::now().date_naive())?;

    let cfg = scan_config(state.detector, &params)?;

    let fx = state.series.fetch(country.fx_symbol, &range).await?;
    let commodities = commodity_series(&state.series, country, &range).await;
    let detection = AnomalyDetector::new(cfg).detect(&fx);

    let mut anomalies = Vec::with_capacity(detection.anomalies.len());
    for anomaly in detection.anomalies {
        let correlations =
            state
                .investigator
                .quick_check(country, &anomaly, &state.grants, &commodities)?;
        anomalies.push(AnomalyResponse {
            anomaly,
            correlations,
        });
    }

    Ok(Json(AnomalyScanResponse {
        country,
        range,
        config: cfg,
        anomalies,
        warnings: detection.warnings,
    }))
}

async fn get_investigation(
    State(state): State<ApiState>,
    Path((code, anomaly_id)): Path<(String, String)>,
) -> Result<Json<Investigation>, AppError> {
    let country = pilot::lookup(&code)?;
    let (start, end) = parse_anomaly_id(&anomaly_id)
        .ok_or_else(|| AppError::InvalidRequest(format!("malformed anomaly id {anomaly_id}")))?;
    let range = DateRange::new(start, end);

    let fx = state.series.fetch(country.fx_symbol, &range).await?;
    let anomaly = AnomalyDetector::new(state.detector)
        .measure(&fx, &anomaly_id)
        .ok_or_else(|| AppError::NotFound(format!("no observations for anomaly {anomaly_id}")))?;
    let commodities = commodity_series(&state.series, country, &range).await;

    let investigation = state
        .investigator
        .investigate(country, &anomaly, &state.grants, &commodities)
        .await?;
    Ok(Json(investigation))
}

async fn get_events(
    State(state): State<ApiState>,
    Path(code): Path<String>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, AppError> {
    let country = pilot::lookup(&code)?;
    let range = resolve_range(params.start, params.end, DEFAULT_EVENT_DAYS, Utc::now().date_naive())?;
    let max = params.max.unwrap_or(DEFAULT_MAX_EVENTS);
    let events = state
        .aggregator
        .get_events(country.code, range.start, range.end, max)
        .await?;
    Ok(Json(EventsResponse {
        country: country.code,
        range,
        events,
    }))
}

async fn get_grant_impact(
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> Result<Json<Vec<GrantImpact>>, AppError> {
    let country = pilot::lookup(&code)?;
    let grants: Vec<GrantDisbursement> = state
        .grants
        .iter()
        .filter(|g| country.matches_code(&g.country_code))
        .cloned()
        .collect();
    let (Some(first), Some(last)) = (grants.first(), grants.last()) else {
        return Ok(Json(Vec::new()));
    };

    let range = DateRange::new(first.date, last.date).padded(IMPACT_CONTEXT_DAYS);
    let fx = state.series.fetch(country.fx_symbol, &range).await?;
    let commodities = commodity_series(&state.series, country, &range).await;
    Ok(Json(state.impact.analyze_all(&grants, &fx, &commodities)))
}

async fn get_notes(State(state): State<ApiState>) -> Result<Json<Vec<ResearchNote>>, AppError> {
    Ok(Json(state.notes.all().await?))
}

async fn get_note(
    State(state): State<ApiState>,
    Path(anomaly_id): Path<String>,
) -> Result<Json<ResearchNote>, AppError> {
    state
        .notes
        .get(&anomaly_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no note for {anomaly_id}")))
}

async fn put_note(
    State(state): State<ApiState>,
    Path(anomaly_id): Path<String>,
    Json(body): Json<NoteBody>,
) -> Result<Json<ResearchNote>, AppError> {
    if parse_anomaly_id(&anomaly_id).is_none() {
        return Err(AppError::InvalidRequest(format!("malformed anomaly id {anomaly_id}")));
    }
    Ok(Json(state.notes.save(&anomaly_id, &body.note).await?))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Applies the optional `threshold` and `window` overrides to `base`.
fn scan_config(base: DetectorConfig, params: &AnomaliesQuery) -> Result<DetectorConfig, AppError> {
    let mut cfg = base;
    if let Some(t) = params.threshold {
        if !(t > 0.0 && t.is_finite()) {
            return Err(AppError::InvalidRequest("threshold must be positive".to_string()));
        }
        cfg.threshold_percent = t;
    }
    if let Some(w) = params.window {
        if !(1..=MAX_WINDOW_DAYS).contains(&w) {
            return Err(AppError::InvalidRequest(format!(
                "window must be between 1 and {MAX_WINDOW_DAYS} days"
            )));
        }
        cfg.window_days = w;
    }
    Ok(cfg)
}

/// Fills missing bounds: `end` defaults to today, `start` to `default_days` before `end`.
fn resolve_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    default_days: i64,
    today: NaiveDate,
) -> Result<DateRange, AppError> {
    let end = end.unwrap_or(today);
    let start = start.unwrap_or_else(|| shift_days(end, -default_days));
    if start > end {
        return Err(AppError::InvalidRequest(format!("start {start} is after end {end}")));
    }
    Ok(DateRange::new(start, end))
}

/// Commodity series for `country`, named after the commodity. Unavailable series are skipped.
async fn commodity_series(
    fetcher: &SeriesFetcher,
    country: &PilotCountry,
    range: &DateRange,
) -> Vec<PriceSeries> {
    let calls = country
        .commodities
        .iter()
        .filter_map(|c| c.symbol.map(|symbol| (c.name, symbol)))
        .map(|(name, symbol)| async move {
            match fetcher.fetch(symbol, range).await {
                Ok(series) => Some(PriceSeries::new(name, series.observations)),
                Err(e) => {
                    warn!(commodity = name, symbol, error = %e, "[API] commodity series unavailable");
                    None
                }
            }
        });
    join_all(calls).await.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::d;

    #[test]
    fn range_defaults_fill_from_today() {
        let r = resolve_range(None, None, 30, d("2024-06-01")).unwrap();
        assert_eq!(r, DateRange::new(d("2024-05-02"), d("2024-06-01")));

        let r = resolve_range(None, Some(d("2016-12-31")), 365, d("2024-06-01")).unwrap();
        assert_eq!(r.start, d("2016-01-01"));
    }

    #[test]
    fn range_default_near_calendar_start_saturates() {
        let r = resolve_range(None, Some(NaiveDate::MIN), 30, d("2024-06-01")).unwrap();
        assert_eq!(r.start, NaiveDate::MIN);
    }

    #[test]
    fn scan_overrides_are_bounded() {
        let query = |threshold, window| AnomaliesQuery {
            threshold,
            window,
            start: None,
            end: None,
        };
        let base = DetectorConfig::default();

        let cfg = scan_config(base, &query(Some(15.0), Some(60))).unwrap();
        assert_eq!(cfg.window_days, 60);
        assert_eq!(cfg.threshold_percent, 15.0);
        assert_eq!(scan_config(base, &query(None, None)).unwrap(), base);

        for window in [0, MAX_WINDOW_DAYS + 1, 1_000_000_000] {
            let err = scan_config(base, &query(None, Some(window)));
            assert!(matches!(err, Err(AppError::InvalidRequest(_))));
        }
        let err = scan_config(base, &query(Some(f64::NAN), None));
        assert!(matches!(err, Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = resolve_range(Some(d("2024-02-01")), Some(d("2024-01-01")), 30, d("2024-06-01"));
        assert!(matches!(err, Err(AppError::InvalidRequest(_))));
    }
}
