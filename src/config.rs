use crate::error::{AppError, Result};

pub const WIKIPEDIA_API_URL: &str = "https://en.wikipedia.org/w/api.php";
pub const IMF_SEARCH_URL: &str = "https://www.imf.org/en/News/SearchNews";
pub const IMF_BASE_URL: &str = "https://www.imf.org";
pub const WORLDBANK_NEWS_API_URL: &str = "https://search.worldbank.org/api/v2/news";
pub const GOOGLE_NEWS_RSS_URL: &str = "https://news.google.com/rss/search";
pub const NEWSDATA_API_URL: &str = "https://newsdata.io/api/1/news";
pub const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
pub const FRED_OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

pub const USER_AGENT: &str = concat!("grantwatch/", env!("CARGO_PKG_VERSION"));

/// Minimum |percent change| between window endpoints for an anomaly.
pub const ANOMALY_THRESHOLD_PERCENT: f64 = 10.0;

/// Maximum calendar span of an anomaly window. Only observed dates are used as endpoints.
pub const ANOMALY_WINDOW_DAYS: i64 = 30;

/// Symmetric day offset around an anomaly used to search for grant disbursements.
pub const GRANT_CORRELATION_RADIUS_DAYS: i64 = 14;

/// A commodity move at or above this size during an anomaly is "significant".
pub const COMMODITY_CORRELATION_PERCENT: f64 = 5.0;

/// Ranges ending further back than this use the historical source path.
pub const HISTORICAL_AGE_DAYS: i64 = 60;

/// Slack applied to feed timestamps on the recent path.
pub const RECENT_DATE_BUFFER_DAYS: i64 = 3;

/// Raw RSS items considered per query variant.
pub const RSS_ENTRIES_PER_QUERY: usize = 30;

/// Country keywords used as extra RSS query variants.
pub const RSS_KEYWORD_QUERIES: usize = 2;

/// Events scoring below this are dropped.
pub const MIN_RELEVANCE_SCORE: u8 = 2;

pub const HISTORICAL_CACHE_HOURS: i64 = 24;
pub const RECENT_CACHE_HOURS: i64 = 12;
pub const SERIES_CACHE_HOURS: i64 = 12;

/// Policy rates are mostly monthly; this reaches back far enough to see the reading
/// in force when an anomaly window opens.
pub const POLICY_RATE_LOOKBACK_DAYS: i64 = 31;

pub const DEFAULT_MAX_EVENTS: usize = 5;

/// Upper bound on a single adapter call, on top of the HTTP client timeout.
pub const ADAPTER_TIMEOUT_SECS: u64 = 10;

/// Outlier cleaning band for loaded series.
pub const OUTLIER_SIGMA: f64 = 3.0;

/// Grant impact score weights.
pub mod impact_weights {
    pub const COMMODITY_STABILITY: f64 = 0.3;
    pub const TREND_DEVIATION: f64 = 0.5;
    pub const MAGNITUDE: f64 = 0.2;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub data_dir: String,
    /// Curated reference table (CURATED_EVENTS_PATH)
    pub curated_events_path: String,
    /// Standardized grant disbursements (GRANTS_PATH)
    pub grants_path: String,
    /// NewsData.io key (NEWSDATA_API_KEY). None disables the adapter.
    pub newsdata_api_key: Option<String>,
    /// FRED key (FRED_API_KEY). None disables policy-rate lookups.
    pub fred_api_key: Option<String>,
    /// Per-request HTTP timeout for every outbound call (HTTP_TIMEOUT_SECS)
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "grantwatch.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            curated_events_path: std::env::var("CURATED_EVENTS_PATH")
                .unwrap_or_else(|_| format!("{data_dir}/curated_events.csv")),
            grants_path: std::env::var("GRANTS_PATH")
                .unwrap_or_else(|_| format!("{data_dir}/grants/standardized_grants.csv")),
            newsdata_api_key: optional_key("NEWSDATA_API_KEY"),
            fred_api_key: optional_key("FRED_API_KEY"),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "8".to_string())
                .parse::<u64>()
                .unwrap_or(8),
            data_dir,
        })
    }
}

/// An unset or blank variable counts as absent.
fn optional_key(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}
