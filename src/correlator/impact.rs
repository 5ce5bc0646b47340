use chrono::NaiveDate;
use serde::Serialize;

use crate::config::impact_weights;
use crate::types::{shift_days, GrantDisbursement, PriceObservation, PriceSeries};

/// Slope band inside which a trend counts as flat.
const FLAT_SLOPE: f64 = 0.01;

const DEFAULT_WINDOW_DAYS: i64 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
    /// Fewer than two observations in the window.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendMetrics {
    pub observations: usize,
    pub mean: f64,
    /// Sample standard deviation.
    pub volatility: f64,
    /// Least-squares slope per observation.
    pub slope: f64,
    pub change_percent: f64,
    pub direction: TrendDirection,
}

impl TrendMetrics {
    fn unknown(observations: usize) -> Self {
        Self {
            observations,
            mean: 0.0,
            volatility: 0.0,
            slope: 0.0,
            change_percent: 0.0,
            direction: TrendDirection::Unknown,
        }
    }

    pub fn from_observations(obs: &[PriceObservation]) -> Self {
        if obs.len() < 2 {
            return Self::unknown(obs.len());
        }
        let values: Vec<f64> = obs.iter().map(|o| o.value).collect();
        let mean = mean(&values);
        let slope = slope(&values);
        let first = values[0];
        let last = values[values.len() - 1];
        let change_percent = if first != 0.0 {
            (last - first) / first * 100.0
        } else {
            0.0
        };
        let direction = if slope > FLAT_SLOPE {
            TrendDirection::Up
        } else if slope < -FLAT_SLOPE {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        };
        Self {
            observations: values.len(),
            mean,
            volatility: sample_std(&values, mean),
            slope,
            change_percent,
            direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommodityStability {
    High,
    Medium,
    Low,
    Unknown,
}

impl CommodityStability {
    /// Classifies a mean coefficient of variation given in percent.
    pub fn from_cv(cv_percent: f64) -> Self {
        if cv_percent < 10.0 {
            CommodityStability::High
        } else if cv_percent < 20.0 {
            CommodityStability::Medium
        } else {
            CommodityStability::Low
        }
    }

    pub fn score(self) -> f64 {
        match self {
            CommodityStability::High => 1.0,
            CommodityStability::Medium => 0.5,
            CommodityStability::Low => 0.2,
            CommodityStability::Unknown => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommodityInfluence {
    pub mean_cv_percent: f64,
    pub stability: CommodityStability,
    pub per_commodity: Vec<(String, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendStatus {
    Continuation,
    Neutral,
    Break,
}

impl TrendStatus {
    pub fn between(pre: TrendDirection, post: TrendDirection) -> Self {
        if pre == post {
            TrendStatus::Continuation
        } else if pre == TrendDirection::Stable || post == TrendDirection::Stable {
            TrendStatus::Neutral
        } else {
            TrendStatus::Break
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrantImpact {
    pub grant: GrantDisbursement,
    pub pre: TrendMetrics,
    pub post: TrendMetrics,
    pub commodities: CommodityInfluence,
    pub trend_status: TrendStatus,
    /// 1.0 to 5.0, two decimals.
    pub impact_score: f64,
}

/// Compares the FX trend before and after each disbursement, discounted by how
/// calm commodity prices were over the same period.
pub struct GrantImpactAnalyzer {
    pre_days: i64,
    post_days: i64,
}

impl Default for GrantImpactAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_DAYS, DEFAULT_WINDOW_DAYS)
    }
}

impl GrantImpactAnalyzer {
    pub fn new(pre_days: i64, post_days: i64) -> Self {
        Self { pre_days, post_days }
    }

    /// Observations in `[grant - pre_days, grant)`.
    pub fn pre_trend(&self, fx: &PriceSeries, grant_date: NaiveDate) -> TrendMetrics {
        let from = shift_days(grant_date, -self.pre_days);
        let obs: Vec<_> = fx
            .between(from, grant_date)
            .iter()
            .filter(|o| o.date < grant_date)
            .copied()
            .collect();
        TrendMetrics::from_observations(&obs)
    }

    /// Observations in `(grant, grant + post_days]`.
    pub fn post_trend(&self, fx: &PriceSeries, grant_date: NaiveDate) -> TrendMetrics {
        let to = shift_days(grant_date, self.post_days);
        let obs: Vec<_> = fx
            .between(grant_date, to)
            .iter()
            .filter(|o| o.date > grant_date)
            .copied()
            .collect();
        TrendMetrics::from_observations(&obs)
    }

    pub fn commodity_influence(
        &self,
        commodities: &[PriceSeries],
        grant_date: NaiveDate,
    ) -> CommodityInfluence {
        let half = (self.pre_days + self.post_days) / 2;
        let from = shift_days(grant_date, -half);
        let to = shift_days(grant_date, half);

        let per_commodity: Vec<(String, f64)> = commodities
            .iter()
            .filter_map(|series| {
                let values: Vec<f64> = series.between(from, to).iter().map(|o| o.value).collect();
                if values.len() < 2 {
                    return None;
                }
                let m = mean(&values);
                if m == 0.0 {
                    return None;
                }
                Some((series.name.clone(), sample_std(&values, m) / m * 100.0))
            })
            .collect();

        if per_commodity.is_empty() {
            return CommodityInfluence {
                mean_cv_percent: 0.0,
                stability: CommodityStability::Unknown,
                per_commodity,
            };
        }
        let cvs: Vec<f64> = per_commodity.iter().map(|(_, cv)| *cv).collect();
        let mean_cv = mean(&cvs);
        CommodityInfluence {
            mean_cv_percent: mean_cv,
            stability: CommodityStability::from_cv(mean_cv),
            per_commodity,
        }
    }

    pub fn analyze(
        &self,
        grant: &GrantDisbursement,
        fx: &PriceSeries,
        commodities: &[PriceSeries],
    ) -> GrantImpact {
        let pre = self.pre_trend(fx, grant.date);
        let post = self.post_trend(fx, grant.date);
        let influence = self.commodity_influence(commodities, grant.date);
        GrantImpact {
            grant: grant.clone(),
            trend_status: TrendStatus::between(pre.direction, post.direction),
            impact_score: impact_score(&pre, &post, influence.stability),
            pre,
            post,
            commodities: influence,
        }
    }

    pub fn analyze_all(
        &self,
        grants: &[GrantDisbursement],
        fx: &PriceSeries,
        commodities: &[PriceSeries],
    ) -> Vec<GrantImpact> {
        grants.iter().map(|g| self.analyze(g, fx, commodities)).collect()
    }
}

/// `1 + 4 * weighted(stability, slope change, post-period magnitude)`.
pub fn impact_score(pre: &TrendMetrics, post: &TrendMetrics, stability: CommodityStability) -> f64 {
    let deviation = ((post.slope - pre.slope).abs() * 10.0).min(1.0);
    let magnitude = (post.change_percent.abs() / 20.0).min(1.0);
    let weighted = impact_weights::COMMODITY_STABILITY * stability.score()
        + impact_weights::TREND_DEVIATION * deviation
        + impact_weights::MAGNITUDE * magnitude;
    ((1.0 + weighted * 4.0) * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Least-squares slope of `values` against their index.
fn slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mx = (n - 1.0) / 2.0;
    let my = mean(values);
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mx;
            (num + dx * (y - my), den + dx * dx)
        });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
