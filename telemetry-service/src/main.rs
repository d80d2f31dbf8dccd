use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use telemetry_service::{
    config::AppConfig,
    http::{self, AppState},
    metrics_server, observability,
    store::PgTelemetryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    // Schema is expected to be applied out-of-band via `sql/schema/*.sql`.
    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .acquire_timeout(cfg.acquire_timeout())
        .connect(&cfg.database.uri)
        .await?;

    let store = Arc::new(PgTelemetryStore::new(pool, cfg.ingestion.append_policy()));
    let state = Arc::new(AppState::new(store, &cfg));

    tracing::info!(
        mapping_policy = ?cfg.analytics.mapping_policy,
        window_hours = cfg.analytics.window_hours,
        dedupe_history = cfg.ingestion.dedupe_history,
        "telemetry service starting"
    );

    http::serve(&cfg.http.bind_addr, http::router(state)).await
}
