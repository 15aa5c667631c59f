//! Adaptive refresh scheduling.
//!
//! One task owns the scheduler's state machine (`Idle → Running → {Idle,
//! Backoff}`) and drives the whole pipeline: fan out source fetches,
//! fan in, consolidate, price, swap the cache, broadcast the delta.
//! Manual triggers arrive as messages on a command channel; a trigger
//! received while a cycle is running is coalesced into that cycle's
//! result rather than queued, so at most one refresh executes at a time
//! system-wide.

use chrono::Utc;
use oddsight_core::config::RefreshConfig;
use oddsight_core::{CycleOutcome, RefreshRun, Snapshot, SourceId, TierThresholds};
use oddsight_source::{QuoteBatch, QuoteSource, SourceError};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::broadcast::ChangeBroadcaster;
use crate::cache::OpportunityCache;
use crate::consolidate::consolidate;
use crate::pricing::price_all;
use crate::sink::SnapshotSink;

// =============================================================================
// Policies
// =============================================================================

/// Shared exponential backoff policy, applied uniformly to per-source
/// retries and to the between-cycle delay after a failed cycle.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// Creates a policy with the given base delay and ceiling.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Creates a policy from refresh configuration.
    #[must_use]
    pub fn from_config(config: &RefreshConfig) -> Self {
        Self::new(
            Duration::from_secs(config.backoff_base_secs),
            Duration::from_secs(config.backoff_max_secs),
        )
    }

    /// Returns the delay for a zero-based attempt number, doubling per
    /// attempt and capped at the ceiling.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Caps an externally requested delay (e.g. a provider's Retry-After)
    /// at the same ceiling as backed-off delays.
    #[must_use]
    pub fn clamp(&self, delay: Duration) -> Duration {
        delay.min(self.max)
    }
}

/// Decides how long to wait before the next scheduled cycle.
pub trait CadencePolicy: Send + Sync {
    /// Returns the interval to wait after `last_run`.
    fn next_interval(&self, last_run: Option<&RefreshRun>, subscriber_count: usize) -> Duration;
}

/// Default cadence: refresh quickly while anyone is subscribed to deltas,
/// slowly otherwise.
#[derive(Debug, Clone, Copy)]
pub struct ActivityCadence {
    active: Duration,
    idle: Duration,
}

impl ActivityCadence {
    /// Creates a cadence with explicit intervals.
    #[must_use]
    pub fn new(active: Duration, idle: Duration) -> Self {
        Self { active, idle }
    }

    /// Creates a cadence from refresh configuration.
    #[must_use]
    pub fn from_config(config: &RefreshConfig) -> Self {
        Self::new(
            Duration::from_secs(config.active_interval_secs),
            Duration::from_secs(config.idle_interval_secs),
        )
    }
}

impl CadencePolicy for ActivityCadence {
    fn next_interval(&self, _last_run: Option<&RefreshRun>, subscriber_count: usize) -> Duration {
        if subscriber_count > 0 {
            self.active
        } else {
            self.idle
        }
    }
}

// =============================================================================
// Commands and State
// =============================================================================

/// State of the scheduler's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Waiting for the next scheduled cycle or a trigger.
    Idle,
    /// A refresh cycle is in flight.
    Running,
    /// The last cycle failed; waiting a backed-off interval.
    Backoff,
}

enum SchedulerCommand {
    Trigger {
        reply: oneshot::Sender<RefreshRun>,
    },
}

/// Handle for interacting with a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
    last_run_rx: watch::Receiver<Option<RefreshRun>>,
    state_rx: watch::Receiver<SchedulerState>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    /// Triggers a refresh cycle.
    ///
    /// Idempotent: if a cycle is already running, this call is coalesced
    /// into it and resolves with that cycle's run record. Returns `None`
    /// only if the scheduler has shut down.
    pub async fn trigger_refresh(&self) -> Option<RefreshRun> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SchedulerCommand::Trigger { reply })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Returns the most recent run record, if any cycle has completed.
    #[must_use]
    pub fn last_run(&self) -> Option<RefreshRun> {
        self.last_run_rx.borrow().clone()
    }

    /// Returns the scheduler's current state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    /// Requests cooperative shutdown of the scheduler and any in-flight
    /// fetches.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Returns the cancellation token shared with the scheduler.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Drives the refresh pipeline on an adaptive cadence.
pub struct RefreshScheduler {
    sources: Vec<Arc<dyn QuoteSource>>,
    cache: Arc<OpportunityCache>,
    broadcaster: Arc<ChangeBroadcaster>,
    sink: Option<Arc<dyn SnapshotSink>>,
    config: RefreshConfig,
    thresholds: TierThresholds,
    cadence: Box<dyn CadencePolicy>,
    backoff: BackoffPolicy,
    cancel: CancellationToken,
    rx: mpsc::Receiver<SchedulerCommand>,
    last_run_tx: watch::Sender<Option<RefreshRun>>,
    state_tx: watch::Sender<SchedulerState>,
    /// Per-source incremental fetch cursors.
    cursors: HashMap<SourceId, String>,
    /// Sources disabled by an Unauthorized response, until reconfigured.
    disabled: BTreeSet<SourceId>,
    consecutive_failures: u32,
}

impl RefreshScheduler {
    /// Creates a scheduler and its handle.
    #[must_use]
    pub fn new(
        sources: Vec<Arc<dyn QuoteSource>>,
        cache: Arc<OpportunityCache>,
        broadcaster: Arc<ChangeBroadcaster>,
        config: RefreshConfig,
        thresholds: TierThresholds,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::channel(16);
        let (last_run_tx, last_run_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let cancel = CancellationToken::new();

        let handle = SchedulerHandle {
            tx,
            last_run_rx,
            state_rx,
            cancel: cancel.clone(),
        };

        let scheduler = Self {
            sources,
            cache,
            broadcaster,
            sink: None,
            backoff: BackoffPolicy::from_config(&config),
            cadence: Box::new(ActivityCadence::from_config(&config)),
            config,
            thresholds,
            cancel,
            rx,
            last_run_tx,
            state_tx,
            cursors: HashMap::new(),
            disabled: BTreeSet::new(),
            consecutive_failures: 0,
        };

        (scheduler, handle)
    }

    /// Attaches a snapshot sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replaces the cadence policy.
    #[must_use]
    pub fn with_cadence(mut self, cadence: Box<dyn CadencePolicy>) -> Self {
        self.cadence = cadence;
        self
    }

    /// Runs the scheduler until shutdown.
    pub async fn run(mut self) {
        info!(sources = self.sources.len(), "refresh scheduler started");

        loop {
            let wait = self.next_wait();
            debug!(wait_secs = wait.as_secs(), "scheduler waiting");

            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {
                    let run = self.run_cycle().await;
                    self.coalesce_pending(&run);
                }
                cmd = self.rx.recv() => match cmd {
                    Some(SchedulerCommand::Trigger { reply }) => {
                        let run = self.run_cycle().await;
                        let _ = reply.send(run.clone());
                        self.coalesce_pending(&run);
                    }
                    None => break,
                },
            }
        }

        info!("refresh scheduler stopped");
    }

    /// Replies to triggers that arrived while a cycle was in flight with
    /// that cycle's result. Coalesced, not queued.
    fn coalesce_pending(&mut self, run: &RefreshRun) {
        while let Ok(SchedulerCommand::Trigger { reply }) = self.rx.try_recv() {
            let _ = reply.send(run.clone());
        }
    }

    fn next_wait(&self) -> Duration {
        if self.consecutive_failures > 0 {
            self.backoff.delay(self.consecutive_failures - 1)
        } else {
            self.cadence.next_interval(
                self.last_run_tx.borrow().as_ref(),
                self.broadcaster.subscriber_count(),
            )
        }
    }

    /// Executes one refresh cycle end to end.
    async fn run_cycle(&mut self) -> RefreshRun {
        let span = info_span!("refresh_cycle");
        self.run_cycle_inner().instrument(span).await
    }

    async fn run_cycle_inner(&mut self) -> RefreshRun {
        self.state_tx.send_replace(SchedulerState::Running);
        let started_at = Utc::now();
        let start = Instant::now();

        let enabled: Vec<Arc<dyn QuoteSource>> = self
            .sources
            .iter()
            .filter(|s| !self.disabled.contains(s.source_id()))
            .cloned()
            .collect();
        let attempted = enabled.len() as u32;

        let (successes, failures, cancelled) = self.fetch_all(enabled).await;

        for (source_id, err) in &failures {
            if matches!(err, SourceError::Unauthorized(_)) {
                error!(source = %source_id, %err, "source unauthorized, disabling until reconfigured");
                self.disabled.insert(source_id.clone());
            } else {
                warn!(source = %source_id, %err, "source failed after retries");
            }
        }

        let outcome = if cancelled {
            CycleOutcome::Cancelled
        } else if successes.is_empty() {
            CycleOutcome::Failed
        } else if failures.is_empty() {
            CycleOutcome::Success
        } else {
            CycleOutcome::Partial
        };

        match outcome {
            CycleOutcome::Success | CycleOutcome::Partial => {
                self.apply(successes);
                self.consecutive_failures = 0;
                self.state_tx.send_replace(SchedulerState::Idle);
            }
            CycleOutcome::Failed => {
                // Cache untouched; the old snapshot keeps serving.
                self.consecutive_failures += 1;
                error!(
                    attempted,
                    consecutive_failures = self.consecutive_failures,
                    "refresh cycle failed, backing off"
                );
                self.state_tx.send_replace(SchedulerState::Backoff);
            }
            CycleOutcome::Cancelled => {
                debug!("refresh cycle cancelled before swap");
                self.state_tx.send_replace(SchedulerState::Idle);
            }
        }

        let run = RefreshRun {
            started_at,
            sources_attempted: attempted,
            sources_failed: failures.len() as u32,
            outcome,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        info!(
            outcome = %run.outcome,
            attempted = run.sources_attempted,
            failed = run.sources_failed,
            duration_ms = run.duration_ms,
            "refresh cycle finished"
        );

        self.last_run_tx.send_replace(Some(run.clone()));
        run
    }

    /// Fans out concurrent fetches and fans in the results.
    #[allow(clippy::type_complexity)]
    async fn fetch_all(
        &self,
        sources: Vec<Arc<dyn QuoteSource>>,
    ) -> (
        Vec<(SourceId, QuoteBatch)>,
        Vec<(SourceId, SourceError)>,
        bool,
    ) {
        let mut set = JoinSet::new();
        for source in sources {
            let source_id = source.source_id().to_string();
            let cursor = self.cursors.get(&source_id).cloned();
            let timeout = Duration::from_secs(self.config.per_source_timeout_secs);
            let retries = self.config.max_retries_per_source;
            let backoff = self.backoff;
            let cancel = self.cancel.clone();

            set.spawn(async move {
                let outcome =
                    fetch_with_retry(source.as_ref(), cursor, timeout, retries, backoff, cancel)
                        .await;
                (source_id, outcome)
            });
        }

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        let mut cancelled = false;

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((source_id, FetchOutcome::Success(batch))) => {
                    successes.push((source_id, batch));
                }
                Ok((source_id, FetchOutcome::Failed(err))) => failures.push((source_id, err)),
                Ok((_, FetchOutcome::Cancelled)) => cancelled = true,
                Err(err) => error!(%err, "source fetch task panicked"),
            }
        }

        (successes, failures, cancelled || self.cancel.is_cancelled())
    }

    /// Consolidates, prices, swaps, and broadcasts one cycle's batches.
    fn apply(&mut self, successes: Vec<(SourceId, QuoteBatch)>) {
        let mut reporting = BTreeSet::new();
        let mut quotes = Vec::new();
        for (source_id, batch) in successes {
            if let Some(cursor) = batch.next_cursor {
                self.cursors.insert(source_id.clone(), cursor);
            }
            quotes.extend(batch.quotes);
            reporting.insert(source_id);
        }

        let now = Utc::now();
        let previous = self.cache.current();
        let candidates = consolidate(&quotes, &previous, &reporting);
        let priced = price_all(&candidates, &previous, &self.thresholds, now);

        let next = Arc::new(Snapshot::new(previous.version + 1, priced, now));
        let swapped_out = self.cache.swap(Arc::clone(&next));

        debug!(
            version = next.version,
            opportunities = next.len(),
            "snapshot swapped"
        );

        self.broadcaster.publish(&swapped_out, &next);

        if let Some(sink) = &self.sink {
            let sink = Arc::clone(sink);
            let snapshot = Arc::clone(&next);
            tokio::spawn(async move {
                if let Err(err) = sink.record(snapshot).await {
                    warn!(%err, "snapshot sink write failed");
                }
            });
        }
    }
}

// =============================================================================
// Per-Source Fetch
// =============================================================================

enum FetchOutcome {
    Success(QuoteBatch),
    Failed(SourceError),
    Cancelled,
}

/// Fetches one source with timeout, retry, and cooperative cancellation.
async fn fetch_with_retry(
    source: &dyn QuoteSource,
    cursor: Option<String>,
    timeout: Duration,
    max_attempts: u32,
    backoff: BackoffPolicy,
    cancel: CancellationToken,
) -> FetchOutcome {
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        let result = tokio::select! {
            () = cancel.cancelled() => return FetchOutcome::Cancelled,
            result = tokio::time::timeout(timeout, source.fetch(cursor.as_deref())) => result,
        };

        let err = match result {
            Ok(Ok(batch)) => return FetchOutcome::Success(batch),
            Ok(Err(err)) => err,
            Err(_) => SourceError::Timeout(format!(
                "fetch exceeded {}s budget",
                timeout.as_secs()
            )),
        };

        attempt += 1;
        if !err.is_retryable() || attempt >= max_attempts.max(1) {
            return FetchOutcome::Failed(err);
        }

        let delay = match err.retry_after() {
            Some(requested) => backoff.clamp(requested),
            None => backoff.delay(attempt - 1),
        };
        debug!(
            source = source.source_id(),
            attempt,
            delay_secs = delay.as_secs(),
            %err,
            "retrying source fetch"
        );

        tokio::select! {
            () = cancel.cancelled() => return FetchOutcome::Cancelled,
            () = tokio::time::sleep(delay) => {}
        }
    }
}
