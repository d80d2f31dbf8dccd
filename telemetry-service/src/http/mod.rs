//! JSON-over-HTTP surface for ingestion, analytics and live-state lookups.

pub mod ingest;
pub mod reports;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::analytics::{AnalyticsService, MAX_WINDOW_HOURS};
use crate::config::AppConfig;
use crate::error::TelemetryError;
use crate::ingestion::IngestionService;
use crate::live_status::LiveStatusService;
use crate::store::{DeviceMappingStore, HistoryReader, LiveStateReader, TelemetryStore};
use crate::validation::ValidationError;

pub struct AppState {
    pub ingestion: IngestionService,
    pub analytics: AnalyticsService,
    pub live: LiveStatusService,
    pub request_timeout: Duration,
    pub max_window_hours: i64,
}

impl AppState {
    /// Wire every service to the same store handle.
    pub fn new<S>(store: Arc<S>, cfg: &AppConfig) -> Self
    where
        S: TelemetryStore + HistoryReader + DeviceMappingStore + LiveStateReader + 'static,
    {
        let analytics = AnalyticsService::new(store.clone(), store.clone())
            .with_policy(cfg.analytics.mapping_policy)
            .with_default_window(cfg.analytics_window());

        Self {
            ingestion: IngestionService::new(store.clone()),
            analytics,
            live: LiveStatusService::new(store),
            request_timeout: cfg.request_timeout(),
            max_window_hours: cfg.analytics.max_window_hours.min(MAX_WINDOW_HOURS),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/v1/ingestion/vehicle", post(ingest::ingest_vehicle))
        .route("/v1/ingestion/meter", post(ingest::ingest_meter))
        .route("/v1/analytics/performance/:vehicle_id", get(reports::performance))
        .route("/v1/vehicles/:vehicle_id/live", get(reports::vehicle_live))
        .route("/v1/meters/:meter_id/live", get(reports::meter_live))
        .with_state(state)
}

pub async fn serve(bind_addr: &str, app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "telemetry API listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// An error rendered as `{ "error": kind, "message": text }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.into(),
        }
    }
}

impl From<TelemetryError> for ApiError {
    fn from(e: TelemetryError) -> Self {
        match e {
            TelemetryError::InvalidReading(msg) => Self {
                status: StatusCode::BAD_REQUEST,
                kind: "invalid_reading",
                message: msg,
            },
            TelemetryError::InvalidWindow(msg) => Self {
                status: StatusCode::BAD_REQUEST,
                kind: "invalid_window",
                message: msg,
            },
            TelemetryError::NotFound(nf) => Self {
                status: StatusCode::NOT_FOUND,
                kind: "not_found",
                message: nf.to_string(),
            },
            TelemetryError::StorageUnavailable(detail) => {
                tracing::error!(error = %detail, "request failed on storage");
                Self {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    kind: "storage_unavailable",
                    message: "storage unavailable, retry later".to_string(),
                }
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "validation_failed",
            message: e.to_string(),
        }
    }
}

// Missing fields and wrong types come back from axum as 422; they are bad requests here.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
            other => other,
        };
        Self {
            status,
            kind: "bad_request",
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.kind,
            message: self.message,
        });
        (self.status, body).into_response()
    }
}
