//! API configuration.

use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second, per client IP
    pub rate_limit_rps: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Most videos one bulk job may ask for
    pub max_bulk_count: u32,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
            max_bulk_count: 50,
            environment: "development".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(d.host),
            port: env_parse("API_PORT", d.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(d.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS", d.rate_limit_rps),
            request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT", d.request_timeout.as_secs())),
            max_body_size: env_parse("MAX_BODY_SIZE", d.max_body_size),
            max_bulk_count: env_parse("MAX_BULK_COUNT", d.max_bulk_count).max(1),
            environment: std::env::var("ENVIRONMENT").unwrap_or(d.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
