use tracing::debug;

use crate::correlator::CorrelatorConfig;
use crate::pilot::PilotCountry;
use crate::types::{DateRange, GrantDisbursement};

/// Pure date filter over grant disbursements.
pub struct GrantCorrelator {
    cfg: CorrelatorConfig,
}

impl GrantCorrelator {
    pub fn new(cfg: CorrelatorConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.cfg
    }

    /// `[start - radius, end + radius]`, both ends inclusive.
    pub fn search_window(&self, window: &DateRange) -> DateRange {
        window.padded(self.cfg.radius_days)
    }

    /// Grants for `country` dated inside the search window of `window`, oldest first.
    pub fn correlate(
        &self,
        window: &DateRange,
        country: &PilotCountry,
        grants: &[GrantDisbursement],
    ) -> Vec<GrantDisbursement> {
        let search = self.search_window(window);
        let mut matched: Vec<GrantDisbursement> = grants
            .iter()
            .filter(|g| country.matches_code(&g.country_code))
            .filter(|g| search.contains(g.date))
            .cloned()
            .collect();
        matched.sort_by_key(|g| g.date);
        debug!(
            country = country.code,
            window = %search,
            matched = matched.len(),
            "[CORRELATOR] grant search"
        );
        matched
    }

    pub fn has_grant(
        &self,
        window: &DateRange,
        country: &PilotCountry,
        grants: &[GrantDisbursement],
    ) -> bool {
        let search = self.search_window(window);
        grants
            .iter()
            .any(|g| country.matches_code(&g.country_code) && search.contains(g.date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pilot;
    use crate::sources::testing::d;

    fn grant(code: &str, date: &str) -> GrantDisbursement {
        GrantDisbursement {
            country_code: code.to_string(),
            date: d(date),
            amount_usd: 1_000_000.0,
            program_type: "ECF".to_string(),
            source: Some("IMF".to_string()),
            program_name: None,
        }
    }

    #[test]
    fn radius_boundaries_are_inclusive() {
        let correlator = GrantCorrelator::new(CorrelatorConfig::default());
        let ghana = pilot::lookup("GHS").unwrap();
        let window = DateRange::new(d("2023-05-01"), d("2023-05-20"));
        let grants = vec![
            grant("GHS", "2023-04-17"), // start - 14
            grant("GHS", "2023-04-16"), // start - 15
            grant("GHS", "2023-06-03"), // end + 14
            grant("GHS", "2023-06-04"), // end + 15
            grant("GHS", "2023-05-10"),
        ];
        let matched = correlator.correlate(&window, ghana, &grants);
        let dates: Vec<_> = matched.iter().map(|g| g.date).collect();
        assert_eq!(dates, vec![d("2023-04-17"), d("2023-05-10"), d("2023-06-03")]);
    }

    #[test]
    fn other_countries_are_excluded_and_iso3_matches() {
        let correlator = GrantCorrelator::new(CorrelatorConfig::default());
        let ghana = pilot::lookup("GHS").unwrap();
        let window = DateRange::new(d("2023-05-01"), d("2023-05-20"));
        let grants = vec![grant("TRY", "2023-05-10"), grant("GHA", "2023-05-11")];
        let matched = correlator.correlate(&window, ghana, &grants);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].country_code, "GHA");
        assert!(correlator.has_grant(&window, ghana, &grants));
    }

    #[test]
    fn no_grants_is_an_empty_result() {
        let correlator = GrantCorrelator::new(CorrelatorConfig {
            radius_days: 0,
            ..CorrelatorConfig::default()
        });
        let ghana = pilot::lookup("GHS").unwrap();
        let window = DateRange::new(d("2023-05-01"), d("2023-05-20"));
        assert!(correlator.correlate(&window, ghana, &[]).is_empty());
        assert!(!correlator.has_grant(&window, ghana, &[grant("GHS", "2023-04-30")]));
    }
}
