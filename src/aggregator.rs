//! Multi-source event aggregation.
//!
//! Picks the historical or recent adapter list by how old the requested range is,
//! runs the adapters concurrently, then merges, deduplicates, scores, filters and
//! ranks their output. The ranked list is cached per (path, country, range).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{
    ADAPTER_TIMEOUT_SECS, HISTORICAL_AGE_DAYS, HISTORICAL_CACHE_HOURS, RECENT_CACHE_HOURS,
};
use crate::error::{AppError, Result};
use crate::pilot::{self, PilotCountry};
use crate::scorer::{ranking, RelevanceScorer};
use crate::sources::EventSource;
use crate::state::TtlCache;
use crate::types::{DateRange, EconomicEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePath {
    Historical,
    Recent,
}

impl std::fmt::Display for SourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourcePath::Historical => write!(f, "historical"),
            SourcePath::Recent => write!(f, "recent"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Ranges ending more than this many days before today use the historical path.
    pub historical_age_days: i64,
    pub historical_validity: chrono::Duration,
    pub recent_validity: chrono::Duration,
    /// Upper bound on one adapter call.
    pub adapter_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            historical_age_days: HISTORICAL_AGE_DAYS,
            historical_validity: chrono::Duration::hours(HISTORICAL_CACHE_HOURS),
            recent_validity: chrono::Duration::hours(RECENT_CACHE_HOURS),
            adapter_timeout: Duration::from_secs(ADAPTER_TIMEOUT_SECS),
        }
    }
}

pub type EventCache = TtlCache<Vec<EconomicEvent>>;

pub struct EventAggregator {
    cfg: AggregatorConfig,
    historical: Vec<Box<dyn EventSource>>,
    recent: Vec<Box<dyn EventSource>>,
    scorer: RelevanceScorer,
    cache: Arc<EventCache>,
    latency: Option<Arc<LatencyStats>>,
    health: Option<Arc<HealthState>>,
}

impl EventAggregator {
    pub fn new(cfg: AggregatorConfig, scorer: RelevanceScorer, cache: Arc<EventCache>) -> Self {
        Self {
            cfg,
            historical: Vec::new(),
            recent: Vec::new(),
            scorer,
            cache,
            latency: None,
            health: None,
        }
    }

    /// Appends an adapter to the historical path. Registration order is priority order.
    pub fn with_historical(mut self, source: Box<dyn EventSource>) -> Self {
        self.historical.push(source);
        self
    }

    /// Appends an adapter to the recent path. Registration order is priority order.
    pub fn with_recent(mut self, source: Box<dyn EventSource>) -> Self {
        self.recent.push(source);
        self
    }

    pub fn with_metrics(mut self, latency: Arc<LatencyStats>, health: Arc<HealthState>) -> Self {
        self.latency = Some(latency);
        self.health = Some(health);
        self
    }

    pub fn source_names(&self, path: SourcePath) -> Vec<&'static str> {
        self.sources(path).iter().map(|s| s.name()).collect()
    }

    pub fn select_path(&self, end: NaiveDate, today: NaiveDate) -> SourcePath {
        if (today - end).num_days() > self.cfg.historical_age_days {
            SourcePath::Historical
        } else {
            SourcePath::Recent
        }
    }

    pub async fn get_events(
        &self,
        country_key: &str,
        start: NaiveDate,
        end: NaiveDate,
        max_results: usize,
    ) -> Result<Vec<EconomicEvent>> {
        self.get_events_at(country_key, start, end, max_results, Utc::now())
            .await
    }

    /// Ranked events for `country_key` over `[start, end]`, at most `max_results`.
    pub async fn get_events_at(
        &self,
        country_key: &str,
        start: NaiveDate,
        end: NaiveDate,
        max_results: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<EconomicEvent>> {
        let (country, range) = validate(country_key, start, end)?;
        let path = self.select_path(end, now.date_naive());
        let key = cache_key(path, country.code, &range);

        if let Some(mut hit) = self.cache.get_at(&key, now) {
            debug!(key = %key, "[AGGREGATOR] cache hit");
            if let Some(h) = &self.health {
                h.inc_cache_hits();
            }
            hit.truncate(max_results);
            return Ok(hit);
        }
        debug!(key = %key, "[AGGREGATOR] cache miss");

        let started = Instant::now();
        let collected = self.collect(path, country, &range).await;
        let merged_count = collected.events.len();
        let all_failed = collected.all_failed();
        let ranked = self.rank(collected.events);

        if all_failed {
            warn!(
                key = %key,
                failures = collected.failures,
                "[AGGREGATOR] every source failed, result not cached"
            );
        } else {
            let validity = match path {
                SourcePath::Historical => self.cfg.historical_validity,
                SourcePath::Recent => self.cfg.recent_validity,
            };
            self.cache.put_at(key, ranked.clone(), validity, now);
        }

        let elapsed = started.elapsed();
        if let Some(l) = &self.latency {
            l.record(elapsed);
        }
        if let Some(h) = &self.health {
            h.record_aggregation(now.timestamp_millis().max(0) as u64);
        }
        info!(
            country = country.code,
            path = %path,
            range = %range,
            merged = merged_count,
            kept = ranked.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "[AGGREGATOR] aggregation complete"
        );

        let mut events = ranked;
        events.truncate(max_results);
        Ok(events)
    }

    /// Answers from the cache only; `None` when nothing fresh is cached.
    pub fn cached_events(
        &self,
        country_key: &str,
        start: NaiveDate,
        end: NaiveDate,
        max_results: usize,
    ) -> Result<Option<Vec<EconomicEvent>>> {
        self.cached_events_at(country_key, start, end, max_results, Utc::now())
    }

    pub fn cached_events_at(
        &self,
        country_key: &str,
        start: NaiveDate,
        end: NaiveDate,
        max_results: usize,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<EconomicEvent>>> {
        let (country, range) = validate(country_key, start, end)?;
        let path = self.select_path(end, now.date_naive());
        Ok(self
            .cache
            .get_at(&cache_key(path, country.code, &range), now)
            .map(|mut events| {
                events.truncate(max_results);
                events
            }))
    }

    fn sources(&self, path: SourcePath) -> &[Box<dyn EventSource>] {
        match path {
            SourcePath::Historical => &self.historical,
            SourcePath::Recent => &self.recent,
        }
    }

    /// Runs every adapter on `path` concurrently. Contributions are concatenated in
    /// registration order; failed or timed-out adapters contribute nothing.
    async fn collect(&self, path: SourcePath, country: &PilotCountry, range: &DateRange) -> Collected {
        let timeout = self.cfg.adapter_timeout;
        let sources = self.sources(path);
        let calls = sources.iter().map(|source| async move {
            let outcome = tokio::time::timeout(timeout, source.fetch(country, range)).await;
            (source.name(), outcome)
        });

        let mut collected = Collected {
            events: Vec::new(),
            attempted: sources.len(),
            failures: 0,
        };
        for (name, outcome) in join_all(calls).await {
            match outcome {
                Ok(Ok(events)) => {
                    debug!(source = name, events = events.len(), "[AGGREGATOR] source ok");
                    collected.events.extend(events);
                }
                Ok(Err(e)) => {
                    warn!(source = name, country = country.code, error = %e, "[AGGREGATOR] source failed");
                    collected.failures += 1;
                    self.note_failure();
                }
                Err(_) => {
                    warn!(
                        source = name,
                        country = country.code,
                        timeout_ms = timeout.as_millis() as u64,
                        "[AGGREGATOR] source timed out"
                    );
                    collected.failures += 1;
                    self.note_failure();
                }
            }
        }
        collected
    }

    fn note_failure(&self) {
        if let Some(h) = &self.health {
            h.inc_source_failures();
        }
    }

    /// Dedupe, score, drop below the minimum, then stable-sort for display.
    fn rank(&self, merged: Vec<EconomicEvent>) -> Vec<EconomicEvent> {
        let mut events = dedupe(merged);
        self.scorer.apply(&mut events);
        events.retain(|e| self.scorer.passes(e));
        events.sort_by(ranking);
        events
    }
}

/// Merged contributions of one path plus how many adapters failed to contribute.
struct Collected {
    events: Vec<EconomicEvent>,
    attempted: usize,
    failures: usize,
}

impl Collected {
    /// True when at least one adapter ran and none of them answered.
    fn all_failed(&self) -> bool {
        self.attempted > 0 && self.failures == self.attempted
    }
}

fn validate(country_key: &str, start: NaiveDate, end: NaiveDate) -> Result<(&'static PilotCountry, DateRange)> {
    let country = pilot::lookup(country_key)?;
    if start > end {
        return Err(AppError::InvalidRequest(format!(
            "start {start} is after end {end}"
        )));
    }
    Ok((country, DateRange::new(start, end)))
}

pub fn cache_key(path: SourcePath, country_code: &str, range: &DateRange) -> String {
    format!("{path}:{country_code}:{}:{}", range.start, range.end)
}

/// Keeps the first occurrence. An event repeats an earlier one when it shares
/// its real url or its `title|source`.
pub fn dedupe(events: Vec<EconomicEvent>) -> Vec<EconomicEvent> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| {
            let keys = [e.dedup_key(), e.title_source_key()];
            let repeated = keys.iter().any(|k| seen.contains(k));
            if !repeated {
                seen.extend(keys);
            }
            !repeated
        })
        .collect()
}
