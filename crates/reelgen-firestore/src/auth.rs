//! Access tokens for the Firestore REST API.
//!
//! Service-account tokens are cached and refreshed single-flight ahead of
//! expiry. The local emulator accepts a fixed owner token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh this long before the reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Used when the provider reports an expiry we cannot interpret.
const FALLBACK_TTL: Duration = Duration::from_secs(50 * 60);

pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const EMULATOR_TOKEN: &str = "owner";

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }

    fn is_unexpired(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Source of bearer tokens for Firestore requests.
pub struct Auth {
    source: Source,
}

enum Source {
    ServiceAccount {
        provider: Arc<dyn TokenProvider>,
        cached: RwLock<Option<CachedToken>>,
    },
    Emulator,
}

impl Auth {
    /// Service account from `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn service_account_from_env() -> FirestoreResult<Self> {
        let account = CustomServiceAccount::from_env()
            .map_err(|e| FirestoreError::auth_error(format!("failed to load service account: {}", e)))?
            .ok_or_else(|| {
                FirestoreError::auth_error(
                    "GOOGLE_APPLICATION_CREDENTIALS must point at a service account JSON file",
                )
            })?;
        Ok(Self::with_provider(Arc::new(account)))
    }

    pub fn with_provider(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            source: Source::ServiceAccount {
                provider,
                cached: RwLock::new(None),
            },
        }
    }

    pub fn emulator() -> Self {
        Self {
            source: Source::Emulator,
        }
    }

    /// A bearer token valid for at least the refresh margin, when possible.
    pub async fn token(&self) -> FirestoreResult<String> {
        let (provider, cached) = match &self.source {
            Source::Emulator => return Ok(EMULATOR_TOKEN.to_string()),
            Source::ServiceAccount { provider, cached } => (provider, cached),
        };

        if let Some(token) = cached.read().await.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let mut slot = cached.write().await;
        if let Some(token) = slot.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        match provider.token(&[DATASTORE_SCOPE]).await {
            Ok(token) => {
                let remaining = (token.expires_at() - Utc::now())
                    .to_std()
                    .unwrap_or(FALLBACK_TTL);
                let value = token.as_str().to_string();
                *slot = Some(CachedToken {
                    value: value.clone(),
                    expires_at: Instant::now() + remaining,
                });
                debug!(ttl_secs = remaining.as_secs(), "Refreshed Firestore access token");
                Ok(value)
            }
            Err(e) => match slot.as_ref().filter(|t| t.is_unexpired()) {
                Some(token) => {
                    warn!("Token refresh failed, reusing current token: {}", e);
                    Ok(token.value.clone())
                }
                None => Err(FirestoreError::auth_error(format!("failed to obtain token: {}", e))),
            },
        }
    }

    /// Drop the cached token after the server rejected it.
    pub async fn invalidate(&self) {
        if let Source::ServiceAccount { cached, .. } = &self.source {
            *cached.write().await = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emulator_uses_owner_token() {
        assert_eq!(Auth::emulator().token().await.unwrap(), "owner");
    }
}
