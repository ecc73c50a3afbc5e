//! Task queue on Redis Streams.
//!
//! Each [`TaskKind`] has its own stream so that admission control is per
//! handler. Delayed deliveries wait in a sorted set scored by due time and
//! are moved to their stream by [`JobQueue::promote_due`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use reelgen_models::TaskId;

use crate::error::{QueueError, QueueResult};
use crate::job::{QueueTask, TaskEnvelope, TaskKind};

/// Moves due members of the delayed set onto their streams. Only the caller
/// whose ZREM succeeds publishes a member, so concurrent promoters never
/// duplicate a delivery.
const PROMOTE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
local moved = 0
for _, member in ipairs(due) do
  if redis.call('ZREM', KEYS[1], member) == 1 then
    local kind = cjson.decode(member)['task']['type']
    redis.call('XADD', ARGV[3] .. kind, '*', 'task', member)
    moved = moved + 1
  end
end
return moved
"#;

/// Delivery limits for one handler kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerLimits {
    /// Maximum concurrent deliveries.
    pub concurrency: usize,
    /// Deliveries before a failing task is dead-lettered.
    pub max_attempts: u32,
    /// Wall-clock budget for one delivery.
    pub timeout: Duration,
}

impl HandlerLimits {
    pub const fn new(concurrency: usize, max_attempts: u32, timeout_secs: u64) -> Self {
        Self {
            concurrency,
            max_attempts,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Defaults per handler.
    pub fn default_for(kind: TaskKind) -> Self {
        match kind {
            TaskKind::GenerateImage => Self::new(4, 3, 300),
            TaskKind::GenerateVoice => Self::new(8, 3, 180),
            TaskKind::SyncAssets => Self::new(16, 3, 30),
            TaskKind::CoordinateVideo => Self::new(8, 3, 60),
            TaskKind::BuildScenes => Self::new(8, 3, 60),
            TaskKind::GenerateStory => Self::new(4, 3, 120),
            TaskKind::RenderVideo => Self::new(2, 2, 1900),
            TaskKind::PublishVideo => Self::new(2, 5, 1800),
            TaskKind::RunBulkJob => Self::new(1, 1, 7200),
        }
    }

    fn from_env(kind: TaskKind) -> Self {
        let defaults = Self::default_for(kind);
        let prefix = format!("QUEUE_{}", kind.as_str().to_uppercase());
        let read = |suffix: &str, default: u64| {
            std::env::var(format!("{}_{}", prefix, suffix))
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        Self {
            concurrency: read("CONCURRENCY", defaults.concurrency as u64).max(1) as usize,
            max_attempts: read("MAX_ATTEMPTS", defaults.max_attempts as u64).max(1) as u32,
            timeout: Duration::from_secs(read("TIMEOUT_SECS", defaults.timeout.as_secs())),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    /// Prefix for every key the queue owns.
    pub key_prefix: String,
    pub consumer_group: String,
    /// TTL of dedup keys.
    pub dedup_ttl: Duration,
    /// Pending deliveries idle this long are reclaimed from dead consumers.
    /// Raised per kind by [`claim_idle_for`](Self::claim_idle_for).
    pub claim_idle: Duration,
    /// Slack on top of a handler's timeout before its delivery counts as abandoned.
    pub claim_grace: Duration,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub handlers: HashMap<TaskKind, HandlerLimits>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "reelgen".to_string(),
            consumer_group: "reelgen:workers".to_string(),
            dedup_ttl: Duration::from_secs(3600),
            claim_idle: Duration::from_secs(600),
            claim_grace: Duration::from_secs(60),
            retry_base_delay: Duration::from_secs(5),
            retry_max_delay: Duration::from_secs(300),
            handlers: TaskKind::ALL
                .into_iter()
                .map(|kind| (kind, HandlerLimits::default_for(kind)))
                .collect(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dedup_ttl: secs("QUEUE_DEDUP_TTL_SECS", defaults.dedup_ttl),
            claim_idle: secs("QUEUE_CLAIM_IDLE_SECS", defaults.claim_idle),
            claim_grace: secs("QUEUE_CLAIM_GRACE_SECS", defaults.claim_grace),
            retry_base_delay: secs("QUEUE_RETRY_BASE_SECS", defaults.retry_base_delay),
            retry_max_delay: secs("QUEUE_RETRY_MAX_SECS", defaults.retry_max_delay),
            handlers: TaskKind::ALL
                .into_iter()
                .map(|kind| (kind, HandlerLimits::from_env(kind)))
                .collect(),
        }
    }

    pub fn limits(&self, kind: TaskKind) -> HandlerLimits {
        self.handlers
            .get(&kind)
            .copied()
            .unwrap_or_else(|| HandlerLimits::default_for(kind))
    }

    /// Idle time after which a pending delivery of `kind` is reclaimed.
    ///
    /// A delivery idles for as long as its handler runs, so this is never
    /// below the handler timeout plus grace. A live consumer settles the
    /// delivery within its timeout; only an abandoned one idles past it.
    pub fn claim_idle_for(&self, kind: TaskKind) -> Duration {
        self.claim_idle
            .max(self.limits(kind).timeout.saturating_add(self.claim_grace))
    }

    /// Backoff before delivery `attempt + 1`, for a task that failed on
    /// `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }

    pub fn stream_key(&self, kind: TaskKind) -> String {
        format!("{}{}", self.stream_prefix(), kind.as_str())
    }

    fn stream_prefix(&self) -> String {
        format!("{}:stream:", self.key_prefix)
    }

    fn delayed_key(&self) -> String {
        format!("{}:delayed", self.key_prefix)
    }

    fn dlq_key(&self) -> String {
        format!("{}:dlq", self.key_prefix)
    }

    fn dedup_key(&self, key: &str) -> String {
        format!("{}:dedup:{}", self.key_prefix, key)
    }
}

/// Enqueue side of the queue, as seen by handlers and the API.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Deliver as soon as a consumer is free.
    async fn enqueue(&self, task: QueueTask) -> QueueResult<TaskId>;

    /// Deliver no earlier than `delay` from now.
    async fn enqueue_after(&self, task: QueueTask, delay: Duration) -> QueueResult<TaskId>;
}

/// One delivered task.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
    pub envelope: TaskEnvelope,
}

/// Redis Streams queue client.
#[derive(Clone)]
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
    promote: std::sync::Arc<redis::Script>,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self {
            client,
            config,
            promote: std::sync::Arc::new(redis::Script::new(PROMOTE_SCRIPT)),
        })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Create the consumer group on every stream (existing groups are kept).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        for kind in TaskKind::ALL {
            let stream = self.config.stream_key(kind);
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&stream)
                .arg(&self.config.consumer_group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(()) => info!(stream = %stream, "Created consumer group {}", self.config.consumer_group),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!(stream = %stream, "Consumer group already exists");
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Round-trip check used by readiness probes.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Claims the task's dedup key, failing with [`QueueError::Duplicate`]
    /// when an earlier enqueue holds it.
    async fn claim_dedup(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        task: &QueueTask,
    ) -> QueueResult<()> {
        let Some(key) = task.dedup_key() else {
            return Ok(());
        };

        let claimed: Option<String> = redis::cmd("SET")
            .arg(self.config.dedup_key(&key))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs().max(1))
            .query_async(conn)
            .await?;

        if claimed.is_none() {
            warn!(dedup_key = %key, "Duplicate task rejected");
            return Err(QueueError::Duplicate(key));
        }
        Ok(())
    }

    async fn push(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        envelope: &TaskEnvelope,
    ) -> QueueResult<String> {
        let payload = serde_json::to_string(envelope)?;
        let message_id: String = redis::cmd("XADD")
            .arg(self.config.stream_key(envelope.kind()))
            .arg("*")
            .arg("task")
            .arg(&payload)
            .query_async(conn)
            .await?;
        Ok(message_id)
    }

    async fn schedule(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        envelope: &TaskEnvelope,
        delay: Duration,
    ) -> QueueResult<()> {
        let payload = serde_json::to_string(envelope)?;
        let due_ms = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        conn.zadd::<_, _, _, ()>(self.config.delayed_key(), payload, due_ms)
            .await?;
        Ok(())
    }

    /// Move up to `limit` due delayed tasks onto their streams.
    pub async fn promote_due(&self, limit: usize) -> QueueResult<usize> {
        let mut conn = self.conn().await?;
        let moved: usize = self
            .promote
            .key(self.config.delayed_key())
            .arg(Utc::now().timestamp_millis())
            .arg(limit)
            .arg(self.config.stream_prefix())
            .invoke_async(&mut conn)
            .await?;

        if moved > 0 {
            debug!("Promoted {} delayed tasks", moved);
        }
        Ok(moved)
    }

    /// Read new deliveries for `kind`, blocking up to `block_ms`.
    pub async fn consume(
        &self,
        kind: TaskKind,
        consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;

        let reply: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(self.config.stream_key(kind))
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();
        Ok(self.decode_entries(kind, entries).await)
    }

    /// Take over deliveries of `kind` that a consumer left pending for longer
    /// than [`QueueConfig::claim_idle_for`].
    ///
    /// Every earlier delivery of a claimed entry counts as a spent attempt, so
    /// the returned envelopes carry the attempt number the claim represents.
    pub async fn claim_stale(
        &self,
        kind: TaskKind,
        consumer: &str,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;
        let stream = self.config.stream_key(kind);
        let min_idle_ms = self.config.claim_idle_for(kind).as_millis() as u64;

        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut claim = redis::cmd("XCLAIM");
        claim
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms);
        for entry in &pending.ids {
            claim.arg(&entry.id);
        }
        let claimed: redis::streams::StreamClaimReply = claim.query_async(&mut conn).await?;

        if !claimed.ids.is_empty() {
            info!(kind = %kind, "Claimed {} stale deliveries", claimed.ids.len());
        }
        let times_delivered: HashMap<String, usize> = pending
            .ids
            .into_iter()
            .map(|entry| (entry.id, entry.times_delivered))
            .collect();

        let mut deliveries = self.decode_entries(kind, claimed.ids).await;
        for delivery in &mut deliveries {
            let earlier = times_delivered.get(&delivery.message_id).copied().unwrap_or(1);
            delivery.envelope.attempt = claimed_attempt(delivery.envelope.attempt, earlier);
        }
        Ok(deliveries)
    }

    async fn decode_entries(
        &self,
        kind: TaskKind,
        entries: Vec<redis::streams::StreamId>,
    ) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());

        for entry in entries {
            let parsed = entry
                .get::<String>("task")
                .map(|payload| serde_json::from_str::<TaskEnvelope>(&payload));

            match parsed {
                Some(Ok(envelope)) => deliveries.push(Delivery {
                    message_id: entry.id,
                    envelope,
                }),
                Some(Err(e)) => {
                    warn!(kind = %kind, message_id = %entry.id, "Dropping malformed task: {}", e);
                    self.ack(kind, &entry.id).await.ok();
                }
                None => {
                    warn!(kind = %kind, message_id = %entry.id, "Dropping entry without payload");
                    self.ack(kind, &entry.id).await.ok();
                }
            }
        }

        deliveries
    }

    /// Acknowledge and delete a delivery.
    pub async fn ack(&self, kind: TaskKind, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let stream = self.config.stream_key(kind);

        redis::cmd("XACK")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;
        redis::cmd("XDEL")
            .arg(&stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(kind = %kind, "Acknowledged {}", message_id);
        Ok(())
    }

    /// Schedule the next attempt of a failed delivery, then ack this one.
    pub async fn retry(&self, delivery: &Delivery, delay: Duration) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let next = delivery.envelope.next_attempt();
        self.schedule(&mut conn, &next, delay).await?;
        self.ack(delivery.envelope.kind(), &delivery.message_id).await?;

        info!(
            task_id = %next.id,
            kind = %next.kind(),
            "Retrying as attempt {} in {:?}",
            next.attempt,
            delay
        );
        Ok(())
    }

    /// Move a delivery to the dead-letter stream.
    pub async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let envelope = &delivery.envelope;
        let payload = serde_json::to_string(envelope)?;

        redis::cmd("XADD")
            .arg(self.config.dlq_key())
            .arg("*")
            .arg("task")
            .arg(&payload)
            .arg("kind")
            .arg(envelope.kind().as_str())
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivery.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(envelope.kind(), &delivery.message_id).await?;

        warn!(
            task_id = %envelope.id,
            kind = %envelope.kind(),
            attempt = envelope.attempt,
            "Moved task to dead letters: {}",
            error
        );
        Ok(())
    }

    /// Undelivered entries in the stream for `kind`.
    pub async fn len(&self, kind: TaskKind) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(self.config.stream_key(kind)).await?;
        Ok(len)
    }

    pub async fn delayed_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.zcard(self.config.delayed_key()).await?;
        Ok(len)
    }

    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(self.config.dlq_key()).await?;
        Ok(len)
    }
}

/// Attempt number of a reclaimed delivery whose entry was already delivered
/// `times_delivered` times, each of which died without settling.
pub fn claimed_attempt(attempt: u32, times_delivered: usize) -> u32 {
    let earlier = u32::try_from(times_delivered.max(1)).unwrap_or(u32::MAX);
    attempt.saturating_add(earlier)
}

#[async_trait]
impl TaskQueue for JobQueue {
    async fn enqueue(&self, task: QueueTask) -> QueueResult<TaskId> {
        let mut conn = self.conn().await?;
        self.claim_dedup(&mut conn, &task).await?;

        let envelope = TaskEnvelope::new(task);
        let message_id = self.push(&mut conn, &envelope).await?;

        info!(
            task_id = %envelope.id,
            kind = %envelope.kind(),
            "Enqueued task with message ID {}",
            message_id
        );
        Ok(envelope.id)
    }

    async fn enqueue_after(&self, task: QueueTask, delay: Duration) -> QueueResult<TaskId> {
        if delay.is_zero() {
            return self.enqueue(task).await;
        }

        let mut conn = self.conn().await?;
        self.claim_dedup(&mut conn, &task).await?;

        let envelope = TaskEnvelope::new(task);
        self.schedule(&mut conn, &envelope, delay).await?;

        info!(
            task_id = %envelope.id,
            kind = %envelope.kind(),
            "Scheduled task in {:?}",
            delay
        );
        Ok(envelope.id)
    }
}
