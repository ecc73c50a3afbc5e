//! Shared HTTP plumbing for every service client.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response};
use tracing::warn;

use crate::error::{ClientError, ClientResult};

/// Connection settings shared by the API-key authenticated services.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Reads `{PREFIX}_URL`, `{PREFIX}_API_KEY`, `{PREFIX}_TIMEOUT_SECS` and
    /// `{PREFIX}_MAX_RETRIES`.
    pub fn from_env(prefix: &str, default_url: &str, default_timeout_secs: u64) -> Self {
        let var = |suffix: &str| std::env::var(format!("{}_{}", prefix, suffix)).ok();

        Self {
            base_url: var("URL")
                .unwrap_or_else(|| default_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: var("API_KEY").unwrap_or_default(),
            timeout: Duration::from_secs(
                var("TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default_timeout_secs),
            ),
            max_retries: var("MAX_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub(crate) fn build_http(timeout: Duration) -> ClientResult<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(ClientError::Network)
}

/// Pass successful responses through, map everything else.
pub(crate) async fn ensure_success(service: &'static str, response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::from_status(service, status.as_u16(), body))
}

/// Execute with retry on transient failures.
pub(crate) async fn with_retry<F, Fut, T>(service: &'static str, max_retries: u32, operation: F) -> ClientResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                warn!(
                    "{} request failed (attempt {}), retrying in {:?}: {}",
                    service,
                    attempt + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    #[serial]
    fn test_config_from_env_trims_trailing_slash() {
        std::env::set_var("TESTSVC_URL", "http://svc.local/");
        std::env::set_var("TESTSVC_API_KEY", "k");
        std::env::remove_var("TESTSVC_TIMEOUT_SECS");

        let config = ServiceConfig::from_env("TESTSVC", "http://default", 30);
        assert_eq!(config.url("/v1/x"), "http://svc.local/v1/x");
        assert_eq!(config.api_key, "k");
        assert_eq!(config.timeout, Duration::from_secs(30));

        std::env::remove_var("TESTSVC_URL");
        std::env::remove_var("TESTSVC_API_KEY");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_permanent_error() {
        let calls = &AtomicU32::new(0);
        let result: ClientResult<()> = with_retry("image", 3, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::from_status("image", 400, "bad"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_unavailable() {
        let calls = &AtomicU32::new(0);
        let result = with_retry("image", 3, || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ClientError::from_status("image", 503, ""))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
