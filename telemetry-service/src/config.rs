use serde::Deserialize;
use std::{fs, time::Duration};

use crate::analytics::{MappingPolicy, MAX_WINDOW_HOURS};
use crate::store::AppendPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
    /// Deadline applied to each ingestion call.
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5100".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Skip history rows whose event id is already stored.
    pub dedupe_history: bool,
}

impl IngestionConfig {
    pub fn append_policy(&self) -> AppendPolicy {
        if self.dedupe_history {
            AppendPolicy::SkipDuplicates
        } else {
            AppendPolicy::Always
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub window_hours: i64,
    pub max_window_hours: i64,
    pub mapping_policy: MappingPolicy,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            max_window_hours: 24 * 31,
            mapping_policy: MappingPolicy::Latest,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_max_connections() -> u32 {
    50
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

impl AppConfig {
    /// Read the TOML file named by `TELEMETRY_CONFIG`; `DATABASE_URL` wins over `database.uri`.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("TELEMETRY_CONFIG").unwrap_or_else(|_| "telemetry-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
        let mut cfg = Self::from_toml_str(&contents)?;

        if let Ok(uri) = env::var("DATABASE_URL") {
            cfg.database.uri = uri;
        }
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let a = &self.analytics;
        if a.window_hours < 1 {
            anyhow::bail!("analytics.window_hours must be at least 1");
        }
        if a.max_window_hours < a.window_hours {
            anyhow::bail!("analytics.max_window_hours must not be below analytics.window_hours");
        }
        if a.max_window_hours > MAX_WINDOW_HOURS {
            anyhow::bail!("analytics.max_window_hours must not exceed {MAX_WINDOW_HOURS}");
        }
        if self.http.request_timeout_ms == 0 {
            anyhow::bail!("http.request_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.http.request_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.database.acquire_timeout_ms)
    }

    pub fn analytics_window(&self) -> time::Duration {
        time::Duration::hours(self.analytics.window_hours)
    }
}
