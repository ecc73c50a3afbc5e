//! Firestore REST API client.
//!
//! - Cached service-account tokens, or the local emulator
//! - Pooled HTTP client with timeouts
//! - Exponential backoff with jitter on retryable failures
//! - Tracing spans and request metrics

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info_span, Instrument};

use reelgen_models::Version;

use crate::auth::Auth;
use crate::error::{FirestoreError, FirestoreResult};
use crate::fields::FieldUpdates;
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{Document, Value};

const PRODUCTION_ENDPOINT: &str = "https://firestore.googleapis.com";

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Usually "(default)".
    pub database_id: String,
    /// Scheme and host of the REST endpoint.
    pub endpoint: String,
    /// Talk to the emulator without credentials.
    pub emulator: bool,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Read `GCP_PROJECT_ID` (or `FIREBASE_PROJECT_ID`), `FIRESTORE_DATABASE_ID`,
    /// `FIRESTORE_EMULATOR_HOST` and timeout overrides.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .ok()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                FirestoreError::auth_error("GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set")
            })?;

        let secs = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(default))
        };

        let emulator_host = std::env::var("FIRESTORE_EMULATOR_HOST")
            .ok()
            .filter(|h| !h.is_empty());

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            endpoint: emulator_host
                .as_ref()
                .map(|host| format!("http://{}", host))
                .unwrap_or_else(|| PRODUCTION_ENDPOINT.to_string()),
            emulator: emulator_host.is_some(),
            timeout: secs("FIRESTORE_TIMEOUT_SECS", 30),
            connect_timeout: secs("FIRESTORE_CONNECT_TIMEOUT_SECS", 5),
            retry: RetryConfig::from_env(),
        })
    }

    /// Unauthenticated config pointing at an emulator (or a test server).
    pub fn emulator(endpoint: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            endpoint: endpoint.into(),
            emulator: true,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(2),
            retry: RetryConfig::default(),
        }
    }
}

/// Firestore REST API client. Cheap to clone.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    auth: Arc<Auth>,
}

impl FirestoreClient {
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let auth = if config.emulator {
            Auth::emulator()
        } else {
            Auth::service_account_from_env()?
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("reelgen-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        let base_url = format!(
            "{}/v1/projects/{}/databases/{}/documents",
            config.endpoint.trim_end_matches('/'),
            config.project_id,
            config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            auth: Arc::new(auth),
        })
    }

    pub async fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Fetch a document, `None` when it does not exist.
    pub async fn get_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<Option<Document>> {
        let url = self.document_url(collection, doc_id);

        self.execute("get_document", collection, doc_id, || async {
            let response = self.send(|token| self.http.get(&url).bearer_auth(token)).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Create a document; fails with `AlreadyExists` if the id is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let body = Document::new(fields);

        self.execute("create_document", collection, doc_id, || async {
            let response = self
                .send(|token| self.http.post(&url).bearer_auth(token).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!("{}/{}", collection, doc_id))),
                status => Err(error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Write the masked fields of an existing document.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        updates: FieldUpdates,
    ) -> FirestoreResult<Document> {
        self.patch("update_document", collection, doc_id, updates, Precondition::Exists)
            .await
    }

    /// Write the masked fields only if the document is still at `version`.
    ///
    /// A concurrent write in between yields `PreconditionFailed`.
    pub async fn update_document_if_unchanged(
        &self,
        collection: &str,
        doc_id: &str,
        updates: FieldUpdates,
        version: &Version,
    ) -> FirestoreResult<Document> {
        let result = self
            .patch(
                "update_document_precondition",
                collection,
                doc_id,
                updates,
                Precondition::UpdateTime(version),
            )
            .await;
        if matches!(&result, Err(e) if e.is_precondition_failed()) {
            crate::metrics::record_cas_conflict(collection);
        }
        result
    }

    /// Delete a document. Deleting a missing document succeeds.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<()> {
        let url = self.document_url(collection, doc_id);

        self.execute("delete_document", collection, doc_id, || async {
            let response = self.send(|token| self.http.delete(&url).bearer_auth(token)).await?;
            match response.status() {
                StatusCode::OK | StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => {
                    debug!(collection, doc_id, "Deleted document");
                    Ok(())
                }
                status => Err(error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    async fn patch(
        &self,
        operation: &str,
        collection: &str,
        doc_id: &str,
        updates: FieldUpdates,
        precondition: Precondition<'_>,
    ) -> FirestoreResult<Document> {
        let (fields, mask) = updates.into_parts();
        let mut params: Vec<String> = mask
            .iter()
            .map(|path| format!("updateMask.fieldPaths={}", urlencoding::encode(path)))
            .collect();
        params.push(match precondition {
            Precondition::Exists => "currentDocument.exists=true".to_string(),
            Precondition::UpdateTime(version) => format!(
                "currentDocument.updateTime={}",
                urlencoding::encode(version.as_str())
            ),
        });

        let url = format!("{}?{}", self.document_url(collection, doc_id), params.join("&"));
        let body = Document::new(fields);

        self.execute(operation, collection, doc_id, || async {
            let response = self
                .send(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                StatusCode::NOT_FOUND => Err(FirestoreError::not_found(format!("{}/{}", collection, doc_id))),
                StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                    let body = response.text().await.unwrap_or_default();
                    Err(FirestoreError::PreconditionFailed(body))
                }
                status => Err(error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Send an authorized request, refreshing the token once if it expired.
    async fn send<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.auth.token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !(body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")) {
            return Err(FirestoreError::auth_error(body));
        }

        self.auth.invalidate().await;
        let token = self.auth.token().await?;
        Ok(build(&token).send().await?)
    }

    /// Run one logical operation with retry, tracing and metrics.
    async fn execute<T, F, Fut>(&self, operation: &str, collection: &str, doc_id: &str, op: F) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        let span = info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %doc_id);
        let start = Instant::now();
        let result = with_retry(&self.config.retry, operation, op).instrument(span).await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, start.elapsed().as_millis() as f64);
        result
    }
}

enum Precondition<'a> {
    Exists,
    UpdateTime(&'a Version),
}

async fn error_from_response(status: StatusCode, url: &str, response: Response) -> FirestoreError {
    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let body = response.text().await.unwrap_or_default();

    if body.contains("FAILED_PRECONDITION") {
        return FirestoreError::PreconditionFailed(body);
    }
    match (status, retry_after_ms) {
        (StatusCode::TOO_MANY_REQUESTS, Some(ms)) => FirestoreError::RateLimited(ms),
        _ => FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body)),
    }
}
