use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ANOMALY_THRESHOLD_PERCENT, ANOMALY_WINDOW_DAYS};
use crate::types::{shift_days, Anomaly, MoveDirection, PriceObservation, PriceSeries};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Maximum calendar span between window endpoints.
    pub window_days: i64,
    /// Minimum |percent change|, e.g. 10.0 for 10%.
    pub threshold_percent: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_days: ANOMALY_WINDOW_DAYS,
            threshold_percent: ANOMALY_THRESHOLD_PERCENT,
        }
    }
}

/// Data-quality findings returned next to the anomalies instead of failing the scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionWarning {
    EmptySeries,
    TooFewObservations { observations: usize },
    NonPositiveBase { date: NaiveDate, value: f64 },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Detection {
    /// Non-overlapping, ordered by start date.
    pub anomalies: Vec<Anomaly>,
    pub warnings: Vec<DetectionWarning>,
}

/// Finds windows where a series moves by at least the threshold.
///
/// Every positive observation is tried as a window start; the strongest crossing
/// end within `window_days` becomes that start's candidate. Overlapping candidates
/// are then suppressed, keeping the larger move.
pub struct AnomalyDetector {
    cfg: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(cfg: DetectorConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }

    pub fn detect(&self, series: &PriceSeries) -> Detection {
        let mut detection = Detection::default();
        let obs = &series.observations;

        if obs.is_empty() {
            detection.warnings.push(DetectionWarning::EmptySeries);
            return detection;
        }
        if obs.len() < 2 {
            detection.warnings.push(DetectionWarning::TooFewObservations {
                observations: obs.len(),
            });
            return detection;
        }

        let mut candidates = Vec::new();
        for (i, start) in obs.iter().enumerate() {
            if start.value <= 0.0 || !start.value.is_finite() {
                warn!(
                    series = %series.name,
                    date = %start.date,
                    value = start.value,
                    "[DETECTOR] skipping non-positive base value"
                );
                detection.warnings.push(DetectionWarning::NonPositiveBase {
                    date: start.date,
                    value: start.value,
                });
                continue;
            }
            if let Some(candidate) = self.strongest_move_from(&series.name, start, &obs[i + 1..]) {
                candidates.push(candidate);
            }
        }

        detection.anomalies = suppress_overlaps(candidates);
        debug!(
            series = %series.name,
            observations = obs.len(),
            anomalies = detection.anomalies.len(),
            "[DETECTOR] scan complete"
        );
        detection
    }

    fn strongest_move_from(
        &self,
        series: &str,
        start: &PriceObservation,
        rest: &[PriceObservation],
    ) -> Option<Anomaly> {
        let window_end = shift_days(start.date, self.cfg.window_days);
        rest.iter()
            .take_while(|o| o.date <= window_end)
            .filter(|o| o.value.is_finite())
            .map(|o| (o, (o.value - start.value) / start.value * 100.0))
            .filter(|(_, change)| change.abs() >= self.cfg.threshold_percent)
            .fold(None::<(&PriceObservation, f64)>, |best, (o, change)| match best {
                Some((_, best_change)) if best_change.abs() >= change.abs() => best,
                _ => Some((o, change)),
            })
            .map(|(end, change)| build_anomaly(series, start, end, change))
    }

    /// Rebuilds the anomaly identified by `id` (`"{start}_{end}"`) from the observations
    /// on exactly those dates. No threshold or window check is applied.
    pub fn measure(&self, series: &PriceSeries, id: &str) -> Option<Anomaly> {
        let (start, end) = parse_anomaly_id(id)?;
        let start_obs = series.value_at_or_before(start).filter(|o| o.date == start)?;
        let end_obs = series.value_at_or_before(end).filter(|o| o.date == end)?;
        if start_obs.value <= 0.0 || end <= start {
            return None;
        }
        let change = (end_obs.value - start_obs.value) / start_obs.value * 100.0;
        Some(build_anomaly(&series.name, start_obs, end_obs, change))
    }
}

pub fn parse_anomaly_id(id: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (start, end) = id.split_once('_')?;
    Some((
        NaiveDate::parse_from_str(start, "%Y-%m-%d").ok()?,
        NaiveDate::parse_from_str(end, "%Y-%m-%d").ok()?,
    ))
}

fn build_anomaly(series: &str, start: &PriceObservation, end: &PriceObservation, change: f64) -> Anomaly {
    Anomaly {
        id: Anomaly::id_for(start.date, end.date),
        series: series.to_string(),
        start_date: start.date,
        end_date: end.date,
        start_value: start.value,
        end_value: end.value,
        change_percent: change,
        magnitude: change.abs(),
        duration_days: (end.date - start.date).num_days(),
        direction: MoveDirection::from_change(change),
    }
}

/// Greedy non-maximal suppression: largest magnitude first (earlier start on ties),
/// dropping any candidate whose date interval intersects one already kept.
fn suppress_overlaps(mut candidates: Vec<Anomaly>) -> Vec<Anomaly> {
    candidates.sort_by(|a, b| {
        b.magnitude
            .total_cmp(&a.magnitude)
            .then_with(|| a.start_date.cmp(&b.start_date))
    });

    let mut kept: Vec<Anomaly> = Vec::new();
    for c in candidates {
        let overlaps = kept
            .iter()
            .any(|k| c.start_date <= k.end_date && k.start_date <= c.end_date);
        if !overlaps {
            kept.push(c);
        }
    }

    kept.sort_by_key(|a| a.start_date);
    kept
}
