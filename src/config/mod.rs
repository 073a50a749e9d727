use std::env;
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for an embedding service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    /// JSON document describing regions, services, and error catalogs.
    pub catalog_path: Option<PathBuf>,
    pub ordering: OrderingConfig,
    pub telemetry: TelemetryConfig,
}

/// Knobs for the workflow engine itself.
#[derive(Debug, Clone)]
pub struct OrderingConfig {
    pub default_page_size: usize,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("ORDER_DESK_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let catalog_path = env::var("ORDER_DESK_CATALOG").ok().map(PathBuf::from);

        let default_page_size = match env::var("ORDER_DESK_PAGE_SIZE") {
            Ok(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or(ConfigError::InvalidPageSize)?,
            Err(_) => crate::workflows::ordering::pager::DEFAULT_PAGE_SIZE,
        };

        let log_level = env::var("ORDER_DESK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            catalog_path,
            ordering: OrderingConfig { default_page_size },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ORDER_DESK_PAGE_SIZE must be a positive integer")]
    InvalidPageSize,
}
