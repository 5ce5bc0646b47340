use serde::Serialize;

use crate::correlator::CorrelatorConfig;
use crate::types::{DateRange, PriceSeries};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommodityMove {
    pub commodity: String,
    pub start_value: f64,
    pub end_value: f64,
    pub change_percent: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommodityCorrelation {
    pub movements: Vec<CommodityMove>,
    pub has_significant_movement: bool,
}

/// Compares each commodity's price at the start and end of an anomaly window.
pub struct CommodityCorrelator {
    threshold_percent: f64,
}

impl CommodityCorrelator {
    pub fn new(cfg: &CorrelatorConfig) -> Self {
        Self {
            threshold_percent: cfg.commodity_threshold_percent,
        }
    }

    /// Uses the last observation at or before each window end. Series with no
    /// price by the start date, or a zero start price, are left out.
    pub fn correlate(&self, window: &DateRange, commodities: &[PriceSeries]) -> CommodityCorrelation {
        let movements: Vec<CommodityMove> = commodities
            .iter()
            .filter_map(|series| {
                let start = series.value_at_or_before(window.start)?;
                let end = series.value_at_or_before(window.end)?;
                if start.value == 0.0 {
                    return None;
                }
                let change_percent = (end.value - start.value) / start.value * 100.0;
                Some(CommodityMove {
                    commodity: series.name.clone(),
                    start_value: start.value,
                    end_value: end.value,
                    change_percent,
                    significant: change_percent.abs() >= self.threshold_percent,
                })
            })
            .collect();

        CommodityCorrelation {
            has_significant_movement: movements.iter().any(|m| m.significant),
            movements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::d;
    use crate::types::PriceObservation;

    fn series(name: &str, points: &[(&str, f64)]) -> PriceSeries {
        PriceSeries::new(
            name,
            points.iter().map(|(date, v)| PriceObservation::new(d(date), *v)).collect(),
        )
    }

    #[test]
    fn flags_moves_at_or_above_threshold() {
        let correlator = CommodityCorrelator::new(&CorrelatorConfig::default());
        let window = DateRange::new(d("2023-03-01"), d("2023-03-20"));
        let cocoa = series("Cocoa", &[("2023-02-28", 100.0), ("2023-03-20", 105.0)]);
        let gold = series("Gold", &[("2023-03-01", 200.0), ("2023-03-15", 204.0)]);

        let result = correlator.correlate(&window, &[cocoa, gold]);
        assert_eq!(result.movements.len(), 2);
        assert!(result.movements[0].significant);
        assert!(!result.movements[1].significant);
        assert!((result.movements[1].change_percent - 2.0).abs() < 1e-9);
        assert!(result.has_significant_movement);
    }

    #[test]
    fn series_starting_after_window_is_skipped() {
        let correlator = CommodityCorrelator::new(&CorrelatorConfig::default());
        let window = DateRange::new(d("2023-03-01"), d("2023-03-20"));
        let late = series("Oil", &[("2023-03-05", 70.0), ("2023-03-19", 90.0)]);
        let result = correlator.correlate(&window, &[late]);
        assert!(result.movements.is_empty());
        assert!(!result.has_significant_movement);
    }
}
