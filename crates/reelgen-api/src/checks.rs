//! Dependency checks behind the readiness probe.

use std::sync::Arc;

use async_trait::async_trait;

use reelgen_firestore::FirestoreClient;
use reelgen_queue::JobQueue;

/// A backing service the API needs to serve requests.
#[async_trait]
pub trait DependencyCheck: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self) -> Result<(), String>;
}

pub struct RedisCheck(pub Arc<JobQueue>);

#[async_trait]
impl DependencyCheck for RedisCheck {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn check(&self) -> Result<(), String> {
        self.0.ping().await.map_err(|e| e.to_string())
    }
}

/// Reads a document that need not exist; a clean miss proves reachability.
pub struct FirestoreCheck(pub FirestoreClient);

#[async_trait]
impl DependencyCheck for FirestoreCheck {
    fn name(&self) -> &'static str {
        "firestore"
    }

    async fn check(&self) -> Result<(), String> {
        self.0
            .get_document("_health", "_check")
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
