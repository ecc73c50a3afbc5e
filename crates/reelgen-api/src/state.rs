//! Application state.

use std::sync::Arc;

use reelgen_firestore::FirestoreClient;
use reelgen_queue::{JobQueue, TaskQueue};
use reelgen_worker::store::{BulkStore, MarkerStore, VideoReader};
use reelgen_worker::{FirestoreStore, Signals};

use crate::checks::{DependencyCheck, FirestoreCheck, RedisCheck};
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub videos: Arc<dyn VideoReader>,
    pub bulk_jobs: Arc<dyn BulkStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub signals: Signals,
    pub checks: Arc<[Arc<dyn DependencyCheck>]>,
}

impl AppState {
    pub fn new<S>(
        config: ApiConfig,
        store: Arc<S>,
        queue: Arc<dyn TaskQueue>,
        checks: Vec<Arc<dyn DependencyCheck>>,
    ) -> Self
    where
        S: VideoReader + BulkStore + MarkerStore + 'static,
    {
        Self {
            config,
            videos: store.clone(),
            bulk_jobs: store.clone(),
            signals: Signals::new(store, queue.clone()),
            queue,
            checks: checks.into(),
        }
    }

    /// State backed by Firestore and the Redis queue from the environment.
    pub async fn from_env(config: ApiConfig) -> ApiResult<Self> {
        let firestore = FirestoreClient::from_env()
            .await
            .map_err(|e| ApiError::internal(format!("firestore: {}", e)))?;
        let queue = Arc::new(JobQueue::from_env()?);
        let store = Arc::new(FirestoreStore::new(firestore.clone()));

        let checks: Vec<Arc<dyn DependencyCheck>> = vec![
            Arc::new(RedisCheck(queue.clone())),
            Arc::new(FirestoreCheck(firestore)),
        ];
        let task_queue: Arc<dyn TaskQueue> = queue;
        Ok(Self::new(config, store, task_queue, checks))
    }
}
