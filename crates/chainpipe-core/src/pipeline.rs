//! Height scheduling: one sequencer feeding a pool of workers.
//!
//! # Parallel mode
//!
//! ```text
//! sequencer ──(bounded MPMC queue)──┬── worker 0 ──┐
//!   cursor, tip discovery           ├── worker 1 ──┼── HeightProcessor::process(height)
//!                                   └── worker N ──┘
//!           ▲                                      │
//!           └──────── re-enqueue on failure ───────┘
//! ```
//!
//! The sequencer owns the cursor. It polls the chain tip, pushes every height
//! up to the tip into the queue (blocking while the queue is full) and sleeps
//! the block refresh interval once caught up. Workers pop heights and process
//! them; a failed height goes back to the queue and is retried forever unless
//! `max_attempts` is set. Every attempt is followed by the rate-limit pause.
//!
//! # Sequential mode
//!
//! No queue: one loop discovers the tip, processes the cursor inline and only
//! advances it once the height succeeds.
//!
//! Cancellation is observed at every wait point. On cancel the queue is
//! closed, workers drain what is left, and [`HeightPipeline::run`] returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::checkpoint::CheckpointManager;
use crate::client::ChainClient;
use crate::error::PipelineError;

// ─── HeightProcessor ──────────────────────────────────────────────────────────

/// One unit of work for the pool: fully process a single height.
#[async_trait]
pub trait HeightProcessor: Send + Sync {
    /// Process `height`. An error makes the pool retry the height.
    async fn process(&self, height: i64) -> Result<(), PipelineError>;

    /// Stream name used in logs (e.g. `"transactions"`).
    fn name(&self) -> &str;
}

// ─── Configuration ────────────────────────────────────────────────────────────

/// How heights are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Sequencer plus worker pool.
    #[default]
    Parallel,
    /// Single loop, strictly ascending heights.
    Sequential,
}

/// Exponential backoff applied to the pause after a failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryBackoff {
    /// Pause after the first failure (milliseconds).
    pub initial_backoff_ms: u64,
    /// Upper bound for the pause (milliseconds).
    pub max_backoff_ms: u64,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryBackoff {
    /// Pause before retrying after the `attempt`-th failure (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_backoff_ms as f64 * self.multiplier.powi(exp);
        let capped = base_ms.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Scheduling configuration of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// First height to process. `0` = start at the chain tip.
    pub start_height: i64,
    /// Sleep after catching up with the tip (milliseconds).
    pub block_refresh_interval_ms: u64,
    /// Pause after every processing attempt and after a failed tip poll (milliseconds).
    pub rate_limit_interval_ms: u64,
    /// Number of concurrent workers (parallel mode).
    pub num_workers: usize,
    /// Capacity of the height queue (parallel mode).
    pub queue_capacity: usize,
    /// Tip polls allowed while resolving a zero start height.
    pub bootstrap_attempts: u32,
    pub mode: ExecutionMode,
    /// Start after the last checkpointed height when one exists.
    pub resume_from_checkpoint: bool,
    /// Backoff after failures. `None` keeps the fixed rate-limit pause.
    pub retry: Option<RetryBackoff>,
    /// Give up on a height after this many failed attempts. `None` = retry forever.
    pub max_attempts: Option<u32>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            start_height: 0,
            block_refresh_interval_ms: 5_000,
            rate_limit_interval_ms: 1_000,
            num_workers: 5,
            queue_capacity: 100,
            bootstrap_attempts: 5,
            mode: ExecutionMode::Parallel,
            resume_from_checkpoint: false,
            retry: None,
            max_attempts: None,
        }
    }
}

impl ProducerConfig {
    pub fn block_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.block_refresh_interval_ms)
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_interval_ms)
    }

    /// Pause after the `attempt`-th consecutive failure of a height.
    pub fn failure_delay(&self, attempt: u32) -> Duration {
        match &self.retry {
            Some(backoff) => backoff.delay(attempt),
            None => self.rate_limit_interval(),
        }
    }

    /// `true` once a height has used up its attempt budget.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(false, |max| attempt >= max)
    }
}

// ─── Run summary ──────────────────────────────────────────────────────────────

/// What a pipeline did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Next height the cursor would have assigned.
    pub next_height: i64,
    /// Heights processed successfully.
    pub processed: u64,
    /// Failed attempts that were scheduled for retry.
    pub retried: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    processed: u64,
    retried: u64,
}

/// A height in the queue, with the number of failed attempts so far.
#[derive(Debug, Clone, Copy)]
struct WorkItem {
    height: i64,
    attempt: u32,
}

impl WorkItem {
    fn new(height: i64) -> Self {
        Self { height, attempt: 0 }
    }
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancel.
async fn pause(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = token.cancelled() => false,
    }
}

// ─── HeightPipeline ───────────────────────────────────────────────────────────

/// Drives a [`HeightProcessor`] over an ever-growing range of heights.
pub struct HeightPipeline<P: HeightProcessor> {
    client: Arc<dyn ChainClient>,
    processor: Arc<P>,
    config: ProducerConfig,
    checkpoint: Option<CheckpointManager>,
    span: tracing::Span,
}

impl<P: HeightProcessor + 'static> HeightPipeline<P> {
    pub fn new(client: Arc<dyn ChainClient>, processor: Arc<P>, config: ProducerConfig) -> Self {
        let span = tracing::info_span!("pipeline", stream = processor.name());
        Self {
            client,
            processor,
            config,
            checkpoint: None,
            span,
        }
    }

    /// Checkpoints consulted when `resume_from_checkpoint` is set.
    pub fn with_checkpoint(mut self, checkpoint: CheckpointManager) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Replace the span every log line of this pipeline is recorded under.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    /// Run until `token` is cancelled.
    ///
    /// Fails only when the start height cannot be resolved.
    pub async fn run(&self, token: CancellationToken) -> Result<RunSummary, PipelineError> {
        let span = self.span.clone();
        async move {
            let Some(start) = self.resolve_start_height(&token).await? else {
                return Ok(RunSummary {
                    next_height: self.config.start_height,
                    ..RunSummary::default()
                });
            };
            tracing::info!(
                start_height = start,
                mode = ?self.config.mode,
                workers = self.config.num_workers,
                "pipeline started"
            );

            let summary = match self.config.mode {
                ExecutionMode::Parallel => self.run_parallel(start, token).await?,
                ExecutionMode::Sequential => self.run_sequential(start, token).await,
            };

            tracing::info!(
                next_height = summary.next_height,
                processed = summary.processed,
                retried = summary.retried,
                "pipeline stopped"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Resolve the first height. `None` when cancelled during bootstrap.
    async fn resolve_start_height(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<i64>, PipelineError> {
        if self.config.resume_from_checkpoint {
            if let Some(checkpoint) = &self.checkpoint {
                let last = checkpoint.load().await?;
                if last.height > 0 {
                    tracing::info!(height = last.height, "resuming after checkpoint");
                    return Ok(Some(last.height + 1));
                }
            }
        }

        if self.config.start_height != 0 {
            return Ok(Some(self.config.start_height));
        }

        let attempts = self.config.bootstrap_attempts.max(1);
        let mut reason = String::new();
        for attempt in 1..=attempts {
            match self.client.latest_block_height().await {
                Ok(height) => {
                    tracing::info!(height, "starting from chain tip");
                    return Ok(Some(height));
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "failed to fetch latest height");
                    reason = e.to_string();
                }
            }
            if attempt < attempts && !pause(self.config.rate_limit_interval(), token).await {
                return Ok(None);
            }
        }

        Err(PipelineError::Bootstrap { attempts, reason })
    }

    // ─── Parallel mode ────────────────────────────────────────────────────────

    async fn run_parallel(
        &self,
        start: i64,
        token: CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let (tx, rx) = async_channel::bounded(self.config.queue_capacity.max(1));

        let workers = (0..self.config.num_workers.max(1)).map(|id| {
            let worker = Worker {
                id,
                processor: self.processor.clone(),
                config: self.config.clone(),
                tx: tx.clone(),
                rx: rx.clone(),
                token: token.clone(),
            };
            tokio::spawn(worker.run().in_current_span())
        });
        let workers: Vec<_> = workers.collect();
        drop(rx);

        let next_height = self.sequence(start, &tx, &token).await;
        tx.close();

        let mut summary = RunSummary {
            next_height,
            ..RunSummary::default()
        };
        for joined in join_all(workers).await {
            let stats = joined.map_err(|e| PipelineError::Other(format!("worker panicked: {e}")))?;
            summary.processed += stats.processed;
            summary.retried += stats.retried;
        }
        Ok(summary)
    }

    /// Sequencer loop. Returns the cursor when cancelled.
    async fn sequence(
        &self,
        mut cursor: i64,
        tx: &async_channel::Sender<WorkItem>,
        token: &CancellationToken,
    ) -> i64 {
        'discover: loop {
            let latest = tokio::select! {
                res = self.client.latest_block_height() => res,
                _ = token.cancelled() => break 'discover,
            };
            let latest = match latest {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to fetch latest height");
                    if !pause(self.config.rate_limit_interval(), token).await {
                        break 'discover;
                    }
                    continue 'discover;
                }
            };

            while cursor <= latest {
                tokio::select! {
                    res = tx.send(WorkItem::new(cursor)) => {
                        if res.is_err() {
                            break 'discover;
                        }
                    }
                    _ = token.cancelled() => break 'discover,
                }
                tracing::trace!(height = cursor, "height enqueued");
                cursor += 1;
            }

            if !pause(self.config.block_refresh_interval(), token).await {
                break 'discover;
            }
        }
        cursor
    }

    // ─── Sequential mode ──────────────────────────────────────────────────────

    async fn run_sequential(&self, start: i64, token: CancellationToken) -> RunSummary {
        let mut cursor = start;
        let mut attempt = 0u32;
        let mut stats = WorkerStats::default();

        loop {
            let latest = tokio::select! {
                res = self.client.latest_block_height() => res,
                _ = token.cancelled() => break,
            };
            let latest = match latest {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to fetch latest height");
                    if !pause(self.config.rate_limit_interval(), &token).await {
                        break;
                    }
                    continue;
                }
            };

            if cursor > latest {
                if !pause(self.config.block_refresh_interval(), &token).await {
                    break;
                }
                continue;
            }

            let delay = match self.processor.process(cursor).await {
                Ok(()) => {
                    stats.processed += 1;
                    cursor += 1;
                    attempt = 0;
                    self.config.rate_limit_interval()
                }
                Err(e) => {
                    attempt += 1;
                    if self.config.is_exhausted(attempt) {
                        tracing::error!(height = cursor, attempt, error = %e, "giving up on height");
                        cursor += 1;
                        attempt = 0;
                        self.config.rate_limit_interval()
                    } else {
                        tracing::warn!(height = cursor, attempt, error = %e, "failed to process height, retrying");
                        stats.retried += 1;
                        self.config.failure_delay(attempt)
                    }
                }
            };

            if !pause(delay, &token).await {
                break;
            }
        }

        RunSummary {
            next_height: cursor,
            processed: stats.processed,
            retried: stats.retried,
        }
    }
}

// ─── Worker ───────────────────────────────────────────────────────────────────

struct Worker<P: HeightProcessor> {
    id: usize,
    processor: Arc<P>,
    config: ProducerConfig,
    tx: async_channel::Sender<WorkItem>,
    rx: async_channel::Receiver<WorkItem>,
    token: CancellationToken,
}

impl<P: HeightProcessor> Worker<P> {
    async fn run(self) -> WorkerStats {
        tracing::trace!(worker = self.id, "worker started");
        let mut stats = WorkerStats::default();
        // A failed height that did not fit back into the full queue.
        let mut held: Option<WorkItem> = None;

        loop {
            let mut item = match held.take() {
                Some(item) if self.token.is_cancelled() => {
                    tracing::warn!(worker = self.id, height = item.height, "shutting down, abandoning height");
                    continue;
                }
                Some(item) => item,
                None => match self.rx.recv().await {
                    Ok(item) => item,
                    Err(_) => break,
                },
            };

            let started = Instant::now();
            let delay = match self.processor.process(item.height).await {
                Ok(()) => {
                    stats.processed += 1;
                    tracing::debug!(
                        worker = self.id,
                        height = item.height,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "height done"
                    );
                    self.config.rate_limit_interval()
                }
                Err(e) => {
                    item.attempt += 1;
                    if self.config.is_exhausted(item.attempt) {
                        tracing::error!(
                            worker = self.id,
                            height = item.height,
                            attempt = item.attempt,
                            error = %e,
                            "giving up on height"
                        );
                    } else if self.token.is_cancelled() {
                        // The pause no longer paces retries once cancelled.
                        tracing::warn!(
                            worker = self.id,
                            height = item.height,
                            attempt = item.attempt,
                            error = %e,
                            "shutting down, abandoning failed height"
                        );
                    } else {
                        tracing::warn!(
                            worker = self.id,
                            height = item.height,
                            attempt = item.attempt,
                            error = %e,
                            "failed to process height, re-enqueueing"
                        );
                        stats.retried += 1;
                        self.requeue(item, &mut held);
                    }
                    self.config.failure_delay(item.attempt)
                }
            };

            // Skipped once cancelled so the queue drains quickly.
            pause(delay, &self.token).await;
        }

        if let Some(item) = held {
            tracing::warn!(worker = self.id, height = item.height, "shutting down, abandoning height");
        }
        tracing::trace!(worker = self.id, "worker finished");
        stats
    }

    fn requeue(&self, item: WorkItem, held: &mut Option<WorkItem>) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(async_channel::TrySendError::Full(item)) => {
                tracing::debug!(worker = self.id, height = item.height, "queue full, retrying locally");
                *held = Some(item);
            }
            Err(async_channel::TrySendError::Closed(item)) => {
                tracing::warn!(worker = self.id, height = item.height, "queue closed, abandoning height");
            }
        }
    }
}
