use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder link carried by events that have no dereferenceable url.
pub const PLACEHOLDER_URL: &str = "#";

/// `date` moved by `days`, saturating at the ends of the representable calendar.
pub fn shift_days(date: NaiveDate, days: i64) -> NaiveDate {
    chrono::Duration::try_days(days)
        .and_then(|d| date.checked_add_signed(d))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

// ---------------------------------------------------------------------------
// Price series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub date: NaiveDate,
    pub value: f64,
}

impl PriceObservation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// A named, date-ordered series (currency pair or commodity symbol).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub name: String,
    pub observations: Vec<PriceObservation>,
}

impl PriceSeries {
    /// Builds a series, sorting by date and keeping the last value seen for a duplicated date.
    pub fn new(name: impl Into<String>, mut observations: Vec<PriceObservation>) -> Self {
        observations.sort_by_key(|o| o.date);
        observations.dedup_by(|later, earlier| {
            if later.date == earlier.date {
                earlier.value = later.value;
                true
            } else {
                false
            }
        });
        Self {
            name: name.into(),
            observations,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Last observation on or before `date`.
    pub fn value_at_or_before(&self, date: NaiveDate) -> Option<&PriceObservation> {
        let idx = self.observations.partition_point(|o| o.date <= date);
        idx.checked_sub(1).map(|i| &self.observations[i])
    }

    /// Observations with `from <= date <= to`.
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> &[PriceObservation] {
        let lo = self.observations.partition_point(|o| o.date < from);
        let hi = self.observations.partition_point(|o| o.date <= to);
        if lo >= hi {
            &[]
        } else {
            &self.observations[lo..hi]
        }
    }
}

// ---------------------------------------------------------------------------
// Date ranges
// ---------------------------------------------------------------------------

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Widens both ends by `days`.
    pub fn padded(&self, days: i64) -> Self {
        Self {
            start: shift_days(self.start, days.saturating_neg()),
            end: shift_days(self.end, days),
        }
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// Anomalies
// ---------------------------------------------------------------------------

/// Direction of a USD-quoted rate move as seen from the local currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    /// Rate rose: more local currency per dollar.
    Depreciation,
    /// Rate fell.
    Appreciation,
}

impl MoveDirection {
    pub fn from_change(change_percent: f64) -> Self {
        if change_percent < 0.0 {
            MoveDirection::Appreciation
        } else {
            MoveDirection::Depreciation
        }
    }
}

impl std::fmt::Display for MoveDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MoveDirection::Depreciation => "depreciation",
            MoveDirection::Appreciation => "appreciation",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// `"{start}_{end}"`, stable across runs for the same window.
    pub id: String,
    pub series: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_value: f64,
    pub end_value: f64,
    pub change_percent: f64,
    pub magnitude: f64,
    pub duration_days: i64,
    pub direction: MoveDirection,
}

impl Anomaly {
    pub fn id_for(start: NaiveDate, end: NaiveDate) -> String {
        format!("{}_{}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
    }

    pub fn window(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}

// ---------------------------------------------------------------------------
// Grants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantDisbursement {
    pub country_code: String,
    pub date: NaiveDate,
    pub amount_usd: f64,
    pub program_type: String,
    /// Disbursing institution (IMF / World Bank) when the ETL supplied it.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub program_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Policy rates
// ---------------------------------------------------------------------------

/// A move in a central bank policy rate between two consecutive readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyRateChange {
    pub date: NaiveDate,
    pub previous_rate: f64,
    pub new_rate: f64,
    pub change: f64,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    /// Row of the curated reference table; score is fixed.
    Curated,
    /// Fetched from an external source; scored by keyword tiers.
    Fetched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub date: NaiveDate,
    /// Pilot currency code the event was gathered for.
    pub country: String,
    pub title: String,
    pub source: String,
    pub relevance_score: u8,
    /// Link to the source document, `#` when there is none.
    pub url: String,
    pub origin: EventOrigin,
}

impl EconomicEvent {
    /// A fetched event awaiting scoring.
    pub fn fetched(
        date: NaiveDate,
        country: impl Into<String>,
        title: impl Into<String>,
        source: impl Into<String>,
        url: Option<String>,
    ) -> Self {
        Self {
            date,
            country: country.into(),
            title: title.into(),
            source: source.into(),
            relevance_score: 0,
            url: url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| PLACEHOLDER_URL.to_string()),
            origin: EventOrigin::Fetched,
        }
    }

    pub fn has_real_url(&self) -> bool {
        !self.url.is_empty() && self.url != PLACEHOLDER_URL
    }

    pub fn title_source_key(&self) -> String {
        format!("{}|{}", self.title, self.source)
    }

    /// Identity used for deduplication: the url when it is real, else `title|source`.
    pub fn dedup_key(&self) -> String {
        if self.has_real_url() {
            self.url.clone()
        } else {
            self.title_source_key()
        }
    }
}

// ---------------------------------------------------------------------------
// Research notes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchNote {
    pub anomaly_id: String,
    pub note: String,
    pub updated_at: DateTime<Utc>,
}
