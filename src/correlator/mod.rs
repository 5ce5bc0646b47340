//! Links a detected anomaly to what happened around it: grant disbursements,
//! commodity moves, and the longer-run effect of each grant on the FX trend.

pub mod commodities;
pub mod grants;
pub mod impact;

use serde::{Deserialize, Serialize};

use crate::config::{COMMODITY_CORRELATION_PERCENT, GRANT_CORRELATION_RADIUS_DAYS};

pub use commodities::{CommodityCorrelation, CommodityCorrelator, CommodityMove};
pub use grants::GrantCorrelator;
pub use impact::{GrantImpact, GrantImpactAnalyzer};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// Days added on both sides of an anomaly when searching for grants.
    pub radius_days: i64,
    /// |percent change| at which a commodity move counts as significant.
    pub commodity_threshold_percent: f64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            radius_days: GRANT_CORRELATION_RADIUS_DAYS,
            commodity_threshold_percent: COMMODITY_CORRELATION_PERCENT,
        }
    }
}
