//! Task executor.
//!
//! One consumer lane per task kind, each bounded by its own semaphore, plus
//! background loops that promote delayed tasks and reclaim stale deliveries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use reelgen_queue::{Delivery, HandlerLimits, JobQueue, TaskKind};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::TaskLogger;
use crate::metrics::{self, TaskOutcome};
use crate::pipeline::Pipeline;

/// Block time of one stream read.
const CONSUME_BLOCK_MS: u64 = 1000;
/// Most deliveries read per stream read.
const MAX_BATCH: usize = 5;
/// Most delayed tasks promoted per tick.
const PROMOTE_BATCH: usize = 100;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// How a finished delivery is settled with the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Invalid payload; acknowledged without retry.
    Drop,
    Retry,
    DeadLetter,
}

impl Disposition {
    fn outcome(self) -> TaskOutcome {
        match self {
            Disposition::Ack => TaskOutcome::Completed,
            Disposition::Drop => TaskOutcome::Dropped,
            Disposition::Retry => TaskOutcome::Retried,
            Disposition::DeadLetter => TaskOutcome::DeadLettered,
        }
    }
}

/// Decide the fate of delivery `attempt` (1-based) given its result.
pub fn disposition(result: &WorkerResult<()>, attempt: u32, max_attempts: u32) -> Disposition {
    match result {
        Ok(()) => Disposition::Ack,
        Err(e) if e.is_invalid_task() => Disposition::Drop,
        Err(e) if e.is_retryable() && attempt < max_attempts => Disposition::Retry,
        Err(_) => Disposition::DeadLetter,
    }
}

/// Whether delivery `attempt` may run at all. Reclaimed deliveries arrive
/// with every abandoned delivery counted, and can be past the budget.
pub fn within_attempts(attempt: u32, max_attempts: u32) -> bool {
    attempt <= max_attempts
}

#[derive(Clone)]
struct Lane {
    kind: TaskKind,
    limits: HandlerLimits,
    semaphore: Arc<Semaphore>,
}

#[derive(Clone)]
struct Context {
    pipeline: Arc<Pipeline>,
    queue: Arc<JobQueue>,
    consumer: Arc<str>,
}

/// Task executor that consumes every handler stream.
pub struct JobExecutor {
    config: WorkerConfig,
    context: Context,
    lanes: Vec<Lane>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: Arc<JobQueue>, pipeline: Pipeline) -> Self {
        let lanes = TaskKind::ALL
            .into_iter()
            .map(|kind| {
                let limits = queue.config().limits(kind);
                Lane {
                    kind,
                    limits,
                    semaphore: Arc::new(Semaphore::new(limits.concurrency)),
                }
            })
            .collect();
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            context: Context {
                pipeline: Arc::new(pipeline),
                queue,
                consumer: format!("worker-{}", Uuid::new_v4()).into(),
            },
            lanes,
            shutdown,
        }
    }

    /// Consume until [`shutdown`](Self::shutdown) is called, then drain.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(consumer = %self.context.consumer, lanes = self.lanes.len(), "Starting task executor");
        self.context.queue.init().await?;

        let mut loops: Vec<JoinHandle<()>> = self
            .lanes
            .iter()
            .map(|lane| {
                tokio::spawn(consume_lane(
                    self.context.clone(),
                    lane.clone(),
                    self.shutdown.subscribe(),
                ))
            })
            .collect();
        loops.push(tokio::spawn(promote_loop(
            self.context.queue.clone(),
            self.config.promote_interval,
            self.shutdown.subscribe(),
        )));
        loops.push(tokio::spawn(claim_loop(
            self.context.clone(),
            self.lanes.clone(),
            self.config.claim_interval,
            self.shutdown.subscribe(),
        )));

        let mut shutdown_rx = self.shutdown.subscribe();
        wait_for_shutdown(&mut shutdown_rx).await;
        info!("Shutdown signal received, stopping executor");

        for handle in loops {
            if let Err(e) = handle.await {
                warn!("Executor loop ended abnormally: {}", e);
            }
        }

        info!("Waiting for in-flight tasks to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_tasks())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "In-flight tasks still running at shutdown; they will be redelivered"
            );
        }

        info!("Task executor stopped");
        Ok(())
    }

    async fn wait_for_tasks(&self) {
        for lane in &self.lanes {
            let _ = lane.semaphore.acquire_many(lane.limits.concurrency as u32).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Resolves once the flag is set or the sender is gone.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn consume_lane(ctx: Context, lane: Lane, mut shutdown: watch::Receiver<bool>) {
    debug!(kind = %lane.kind, concurrency = lane.limits.concurrency, "Lane started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let available = lane.semaphore.available_permits();
        if available == 0 {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
            }
        }

        let batch = tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            batch = ctx.queue.consume(lane.kind, &ctx.consumer, CONSUME_BLOCK_MS, available.min(MAX_BATCH)) => batch,
        };

        match batch {
            Ok(deliveries) => {
                for delivery in deliveries {
                    if !spawn_delivery(&ctx, &lane, delivery).await {
                        return;
                    }
                }
            }
            Err(e) => {
                error!(kind = %lane.kind, "Error consuming tasks: {}", e);
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
            }
        }
    }
    debug!(kind = %lane.kind, "Lane stopped");
}

async fn promote_loop(queue: Arc<JobQueue>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = interval.tick() => {
                if let Err(e) = queue.promote_due(PROMOTE_BATCH).await {
                    warn!("Failed to promote delayed tasks: {}", e);
                }
            }
        }
    }
}

async fn claim_loop(ctx: Context, lanes: Vec<Lane>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = interval.tick() => {
                for lane in &lanes {
                    let available = lane.semaphore.available_permits();
                    if available > 0 {
                        match ctx.queue.claim_stale(lane.kind, &ctx.consumer, available.min(MAX_BATCH)).await {
                            Ok(deliveries) => {
                                for delivery in deliveries {
                                    if !spawn_delivery(&ctx, lane, delivery).await {
                                        return;
                                    }
                                }
                            }
                            Err(e) => warn!(kind = %lane.kind, "Failed to claim stale tasks: {}", e),
                        }
                    }
                    if let Ok(depth) = ctx.queue.len(lane.kind).await {
                        metrics::set_queue_depth(lane.kind.as_str(), depth);
                    }
                }
                if let Ok(depth) = ctx.queue.dlq_len().await {
                    metrics::set_dlq_depth(depth);
                }
            }
        }
    }
}

/// Run `delivery` on its own task once a lane permit is free. False when the
/// lane's semaphore is closed.
async fn spawn_delivery(ctx: &Context, lane: &Lane, delivery: Delivery) -> bool {
    let Ok(permit) = lane.semaphore.clone().acquire_owned().await else {
        return false;
    };
    let ctx = ctx.clone();
    let limits = lane.limits;
    tokio::spawn(async move {
        let _permit = permit;
        execute(ctx, limits, delivery).await;
    });
    true
}

async fn execute(ctx: Context, limits: HandlerLimits, delivery: Delivery) {
    let logger = TaskLogger::new(&delivery.envelope);
    let span = logger.create_span();

    async move {
        let envelope = &delivery.envelope;
        let kind = envelope.kind();

        if !within_attempts(envelope.attempt, limits.max_attempts) {
            let reason = format!(
                "abandoned {} times without settling, over the limit of {}",
                envelope.attempt.saturating_sub(1),
                limits.max_attempts
            );
            logger.log_error(&reason);
            if let Err(e) = ctx.queue.dead_letter(&delivery, &reason).await {
                logger.log_error(&format!("failed to settle delivery {}: {}", delivery.message_id, e));
            }
            metrics::record_task(kind.as_str(), TaskOutcome::DeadLettered, Duration::ZERO);
            return;
        }

        logger.log_start();

        let result = tokio::time::timeout(limits.timeout, ctx.pipeline.dispatch(&envelope.task))
            .await
            .unwrap_or_else(|_| Err(WorkerError::TaskTimeout(limits.timeout.as_secs())));

        let decision = disposition(&result, envelope.attempt, limits.max_attempts);
        let settled = match (&result, decision) {
            (_, Disposition::Ack) => ctx.queue.ack(kind, &delivery.message_id).await,
            (Err(e), Disposition::Drop) => {
                logger.log_warning(&format!("dropping invalid task: {}", e));
                ctx.queue.ack(kind, &delivery.message_id).await
            }
            (Err(e), Disposition::Retry) => {
                logger.log_error(&format!("attempt {} of {} failed: {}", envelope.attempt, limits.max_attempts, e));
                let delay = ctx.queue.config().retry_delay(envelope.attempt);
                ctx.queue.retry(&delivery, delay).await
            }
            (Err(e), _) => {
                logger.log_error(&e.to_string());
                ctx.queue.dead_letter(&delivery, &e.to_string()).await
            }
            (Ok(()), _) => ctx.queue.ack(kind, &delivery.message_id).await,
        };

        if let Err(e) = settled {
            logger.log_error(&format!("failed to settle delivery {}: {}", delivery.message_id, e));
        }
        metrics::record_task(kind.as_str(), decision.outcome(), Duration::from_millis(logger.elapsed_ms()));
        logger.log_completion(decision.outcome().as_str());
    }
    .instrument(span)
    .await
}
