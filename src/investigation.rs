//! Everything known about one anomaly, gathered in a single call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregator::EventAggregator;
use crate::config::DEFAULT_MAX_EVENTS;
use crate::correlator::{CommodityCorrelation, CommodityCorrelator, CorrelatorConfig, GrantCorrelator};
use crate::db::NoteStore;
use crate::error::Result;
use crate::pilot::PilotCountry;
use crate::policy_rates::PolicyRateFetcher;
use crate::types::{
    Anomaly, EconomicEvent, GrantDisbursement, PolicyRateChange, PriceSeries, ResearchNote,
};

#[derive(Debug, Clone, Serialize)]
pub struct Investigation {
    pub anomaly: Anomaly,
    pub grants: Vec<GrantDisbursement>,
    pub commodities: CommodityCorrelation,
    /// Empty when no FRED key is configured or the lookup failed.
    pub policy_rate_changes: Vec<PolicyRateChange>,
    pub events: Vec<EconomicEvent>,
    pub note: Option<ResearchNote>,
}

/// Cheap presence flags for list views. Never touches the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationFlags {
    pub has_grant: bool,
    pub has_commodity: bool,
    pub has_news: bool,
}

pub struct Investigator {
    grants: GrantCorrelator,
    commodities: CommodityCorrelator,
    aggregator: Arc<EventAggregator>,
    policy_rates: Option<Arc<PolicyRateFetcher>>,
    notes: NoteStore,
    max_events: usize,
}

impl Investigator {
    pub fn new(cfg: CorrelatorConfig, aggregator: Arc<EventAggregator>, notes: NoteStore) -> Self {
        Self {
            grants: GrantCorrelator::new(cfg),
            commodities: CommodityCorrelator::new(&cfg),
            aggregator,
            policy_rates: None,
            notes,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }

    pub fn with_policy_rates(mut self, fetcher: Arc<PolicyRateFetcher>) -> Self {
        self.policy_rates = Some(fetcher);
        self
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    pub async fn investigate(
        &self,
        country: &PilotCountry,
        anomaly: &Anomaly,
        grants: &[GrantDisbursement],
        commodities: &[PriceSeries],
    ) -> Result<Investigation> {
        self.investigate_at(country, anomaly, grants, commodities, Utc::now())
            .await
    }

    pub async fn investigate_at(
        &self,
        country: &PilotCountry,
        anomaly: &Anomaly,
        grants: &[GrantDisbursement],
        commodities: &[PriceSeries],
        now: DateTime<Utc>,
    ) -> Result<Investigation> {
        let window = anomaly.window();
        let events = self
            .aggregator
            .get_events_at(country.code, window.start, window.end, self.max_events, now)
            .await?;
        let note = self.notes.get(&anomaly.id).await?;
        let policy_rate_changes = match &self.policy_rates {
            Some(fetcher) => fetcher
                .changes_at(country, &window, now)
                .await
                .unwrap_or_else(|e| {
                    warn!(country = country.code, error = %e, "[INVESTIGATE] policy rates unavailable");
                    Vec::new()
                }),
            None => Vec::new(),
        };
        let investigation = Investigation {
            anomaly: anomaly.clone(),
            grants: self.grants.correlate(&window, country, grants),
            commodities: self.commodities.correlate(&window, commodities),
            policy_rate_changes,
            events,
            note,
        };
        debug!(
            country = country.code,
            anomaly = %anomaly.id,
            grants = investigation.grants.len(),
            events = investigation.events.len(),
            "[INVESTIGATE] done"
        );
        Ok(investigation)
    }

    pub fn quick_check(
        &self,
        country: &PilotCountry,
        anomaly: &Anomaly,
        grants: &[GrantDisbursement],
        commodities: &[PriceSeries],
    ) -> Result<CorrelationFlags> {
        self.quick_check_at(country, anomaly, grants, commodities, Utc::now())
    }

    /// News presence is read from the event cache only.
    pub fn quick_check_at(
        &self,
        country: &PilotCountry,
        anomaly: &Anomaly,
        grants: &[GrantDisbursement],
        commodities: &[PriceSeries],
        now: DateTime<Utc>,
    ) -> Result<CorrelationFlags> {
        let window = anomaly.window();
        let has_news = self
            .aggregator
            .cached_events_at(country.code, window.start, window.end, self.max_events, now)?
            .is_some_and(|events| !events.is_empty());
        Ok(CorrelationFlags {
            has_grant: self.grants.has_grant(&window, country, grants),
            has_commodity: self
                .commodities
                .correlate(&window, commodities)
                .has_significant_movement,
            has_news,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::aggregator::{AggregatorConfig, EventCache};
    use crate::db::notes::testing::memory_pool;
    use crate::pilot;
    use crate::scorer::RelevanceScorer;
    use crate::sources::testing::d;
    use crate::sources::CuratedSource;
    use crate::types::{MoveDirection, PriceObservation};

    const CURATED: &str = "\
date,country_code,country_name,event_title,source,relevance_score
2016-03-10,GHS,Ghana,Ghana IMF Stand-By Arrangement Approved,CSV,4
";

    fn anomaly() -> Anomaly {
        Anomaly {
            id: Anomaly::id_for(d("2016-03-01"), d("2016-03-20")),
            series: "USDGHS=X".to_string(),
            start_date: d("2016-03-01"),
            end_date: d("2016-03-20"),
            start_value: 3.8,
            end_value: 4.3,
            change_percent: 13.2,
            magnitude: 13.2,
            duration_days: 19,
            direction: MoveDirection::Depreciation,
        }
    }

    async fn investigator() -> Investigator {
        let curated = CuratedSource::from_reader(CURATED.as_bytes()).unwrap();
        let aggregator = EventAggregator::new(
            AggregatorConfig::default(),
            RelevanceScorer::default(),
            Arc::new(EventCache::new()),
        )
        .with_historical(Box::new(curated));
        Investigator::new(
            CorrelatorConfig::default(),
            Arc::new(aggregator),
            NoteStore::new(memory_pool().await),
        )
    }

    #[tokio::test]
    async fn bundles_grants_commodities_events_and_note() {
        let inv = investigator().await;
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let ghana = pilot::lookup("GHS").unwrap();
        let a = anomaly();
        inv.notes.save_at(&a.id, "Check the SBA timing", now).await.unwrap();

        let grants = vec![GrantDisbursement {
            country_code: "GHS".to_string(),
            date: d("2016-04-03"),
            amount_usd: 114_800_000.0,
            program_type: "ECF".to_string(),
            source: Some("IMF".to_string()),
            program_name: None,
        }];
        let cocoa = PriceSeries::new(
            "Cocoa",
            vec![
                PriceObservation::new(d("2016-03-01"), 3000.0),
                PriceObservation::new(d("2016-03-18"), 3300.0),
            ],
        );

        let flags_before = inv
            .quick_check_at(ghana, &a, &grants, std::slice::from_ref(&cocoa), now)
            .unwrap();
        assert!(flags_before.has_grant);
        assert!(flags_before.has_commodity);
        assert!(!flags_before.has_news);

        let result = inv
            .investigate_at(ghana, &a, &grants, std::slice::from_ref(&cocoa), now)
            .await
            .unwrap();
        assert_eq!(result.grants.len(), 1);
        assert!(result.commodities.has_significant_movement);
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].relevance_score, 4);
        assert_eq!(result.note.map(|n| n.note), Some("Check the SBA timing".to_string()));
        assert!(result.policy_rate_changes.is_empty());

        let flags_after = inv
            .quick_check_at(ghana, &a, &grants, &[cocoa], now)
            .unwrap();
        assert!(flags_after.has_news);
    }

    #[tokio::test]
    async fn policy_rate_outage_leaves_investigation_intact() {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()
            .unwrap();
        let fetcher = PolicyRateFetcher::new(client, "test-key").with_api_url("http://127.0.0.1:9/fred");
        let inv = investigator().await.with_policy_rates(Arc::new(fetcher));
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let ghana = pilot::lookup("GHS").unwrap();

        let result = inv.investigate_at(ghana, &anomaly(), &[], &[], now).await.unwrap();
        assert!(result.policy_rate_changes.is_empty());
        assert_eq!(result.events.len(), 1);
    }
}
