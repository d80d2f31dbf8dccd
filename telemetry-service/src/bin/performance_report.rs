use anyhow::{bail, Result};
use sqlx::postgres::PgPoolOptions;
use std::{env, sync::Arc};
use telemetry_service::{
    config::AppConfig, observability, store::PgTelemetryStore, AnalyticsService, TelemetryError,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: performance_report <vehicle_id> [window_hours]");
    }
    let vehicle_id = &args[1];

    let cfg = AppConfig::load()?;
    let window = match args.get(2) {
        Some(h) => {
            let hours: i64 = h
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid window_hours '{h}': {e}"))?;
            if hours < 1 || hours > cfg.analytics.max_window_hours {
                bail!("window_hours must be within [1, {}]", cfg.analytics.max_window_hours);
            }
            time::Duration::hours(hours)
        }
        None => cfg.analytics_window(),
    };

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(cfg.acquire_timeout())
        .connect(&cfg.database.uri)
        .await?;
    let store = Arc::new(PgTelemetryStore::new(pool, cfg.ingestion.append_policy()));

    let analytics = AnalyticsService::new(store.clone(), store)
        .with_policy(cfg.analytics.mapping_policy);

    match analytics.performance(vehicle_id, window).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(TelemetryError::NotFound(nf)) => {
            tracing::info!(vehicle_id = %vehicle_id, "{nf}");
            bail!("{nf}")
        }
        Err(e) => Err(e.into()),
    }
}
