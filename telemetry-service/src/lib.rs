pub mod analytics;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ingestion;
pub mod live_status;
pub mod metrics_server;
pub mod model;
pub mod observability;
pub mod store;
pub mod validation;

pub use analytics::{AnalyticsService, MappingPolicy, PerformanceReport};
pub use error::TelemetryError;
pub use ingestion::IngestionService;
pub use model::Reading;
