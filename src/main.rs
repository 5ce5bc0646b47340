mod aggregator;
mod api;
mod config;
mod correlator;
mod db;
mod detector;
mod error;
mod fetcher;
mod investigation;
mod pilot;
mod policy_rates;
mod scorer;
mod sources;
mod state;
mod types;

use std::path::Path;
use std::sync::Arc;

use sqlx::sqlite::SqliteConnectOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::aggregator::{AggregatorConfig, EventAggregator, EventCache, SourcePath};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::correlator::{CorrelatorConfig, GrantImpactAnalyzer};
use crate::db::NoteStore;
use crate::detector::DetectorConfig;
use crate::error::Result;
use crate::fetcher::{load_grants_csv, SeriesFetcher};
use crate::investigation::Investigator;
use crate::policy_rates::PolicyRateFetcher;
use crate::scorer::RelevanceScorer;
use crate::sources::{
    http_client, CuratedSource, GoogleNewsRssSource, ImfArchiveSource, NewsDataSource,
    WikipediaTimelineSource, WorldBankNewsSource,
};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let options = SqliteConnectOptions::new()
        .filename(&cfg.db_path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);
    let notes = NoteStore::new(pool);

    // --- Reference data ---
    let curated = if Path::new(&cfg.curated_events_path).exists() {
        CuratedSource::from_path(&cfg.curated_events_path)?
    } else {
        warn!(
            path = %cfg.curated_events_path,
            "curated events table not found, historical path runs without it"
        );
        CuratedSource::default()
    };

    let grants = match load_grants_csv(&cfg.grants_path) {
        Ok(g) => g,
        Err(e) => {
            warn!(path = %cfg.grants_path, error = %e, "grant table unavailable, correlations will show no grants");
            Vec::new()
        }
    };

    // --- Source adapters ---
    let client = http_client(cfg.http_timeout_secs)?;
    let mut aggregator = EventAggregator::new(
        AggregatorConfig::default(),
        RelevanceScorer::default(),
        Arc::new(EventCache::new()),
    )
    .with_historical(Box::new(curated))
    .with_historical(Box::new(WikipediaTimelineSource::new(client.clone())))
    .with_historical(Box::new(ImfArchiveSource::new(client.clone())))
    .with_historical(Box::new(WorldBankNewsSource::new(client.clone())))
    .with_recent(Box::new(GoogleNewsRssSource::new(client.clone())))
    .with_recent(Box::new(ImfArchiveSource::new(client.clone())))
    .with_recent(Box::new(WorldBankNewsSource::new(client.clone())));

    match &cfg.newsdata_api_key {
        Some(key) => {
            aggregator = aggregator.with_recent(Box::new(NewsDataSource::new(client.clone(), key.clone())));
        }
        None => info!("NEWSDATA_API_KEY not set, keyed news API disabled"),
    }

    let latency = Arc::new(LatencyStats::new());
    let health = Arc::new(HealthState::new());
    let aggregator = Arc::new(aggregator.with_metrics(Arc::clone(&latency), Arc::clone(&health)));
    info!(
        "Sources: historical={:?} recent={:?}",
        aggregator.source_names(SourcePath::Historical),
        aggregator.source_names(SourcePath::Recent),
    );

    let mut investigator = Investigator::new(CorrelatorConfig::default(), Arc::clone(&aggregator), notes.clone());
    match &cfg.fred_api_key {
        Some(key) => {
            investigator =
                investigator.with_policy_rates(Arc::new(PolicyRateFetcher::new(client.clone(), key.clone())));
        }
        None => info!("FRED_API_KEY not set, policy rate lookups disabled"),
    }
    let series = SeriesFetcher::new(client).with_csv_dir(Path::new(&cfg.data_dir).join("fx_rates"));

    // --- HTTP API server ---
    let api_state = ApiState {
        aggregator,
        investigator: Arc::new(investigator),
        series: Arc::new(series),
        notes,
        grants: Arc::new(grants),
        detector: DetectorConfig::default(),
        impact: Arc::new(GrantImpactAnalyzer::default()),
        latency,
        health,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
