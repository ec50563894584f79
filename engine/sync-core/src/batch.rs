//! Time-boxed batch runner
//!
//! A [`BatchRunner`] walks the ordered work list of a [`BatchJob`], one item at
//! a time, until either the list is exhausted or the time budget runs out. On
//! budget expiry the job's buffered output is flushed and a checkpoint is
//! written at the first unprocessed item, so the next invocation picks up
//! exactly where this one stopped.

use crate::checkpoint::{Checkpoint, CheckpointStore, CheckpointStoreExt};
use crate::config::BatchConfig;
use crate::error::{Result, SyncError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Decides when an invocation must stop starting new items
pub trait Deadline: Send + Sync {
    /// Whether the budget is exhausted
    fn expired(&self) -> bool;
}

/// Wall-clock budget measured from the moment it was started
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    started: Instant,
    limit: Duration,
}

impl TimeBudget {
    /// Start measuring now
    pub fn start(limit: Duration) -> Self {
        Self { started: Instant::now(), limit }
    }

    /// Time spent since the budget started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the budget expires
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }
}

impl Deadline for TimeBudget {
    fn expired(&self) -> bool {
        self.elapsed() > self.limit
    }
}

/// A resumable unit of work driven by a [`BatchRunner`]
#[async_trait::async_trait]
pub trait BatchJob: Send {
    /// One unit of fetch-and-transform work
    type Item: Serialize + DeserializeOwned + Send + Sync;

    /// Data accumulated across the whole session
    type State: Serialize + DeserializeOwned + Send + Sync;

    /// Key under which the session's checkpoint is stored
    fn session_key(&self) -> &str;

    /// Build the work list and initial state of a fresh session.
    ///
    /// Only called when no checkpoint exists; resumed sessions reuse the list
    /// captured here.
    async fn plan(&mut self) -> anyhow::Result<(Vec<Self::Item>, Self::State)>;

    /// Per-invocation setup, run on fresh and resumed sessions alike
    async fn prepare(&mut self, _state: &Self::State) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fetch and transform one item. Errors skip the item.
    async fn process(&mut self, item: &Self::Item, state: &mut Self::State) -> anyhow::Result<()>;

    /// Write buffered output. Called before suspending and on completion.
    async fn flush(&mut self, _state: &mut Self::State) -> anyhow::Result<()> {
        Ok(())
    }

    /// Report a finished session
    async fn on_complete(&mut self, _report: &RunReport, _state: &Self::State) {}
}

/// How an invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every item of the session has been visited; the checkpoint is gone
    Completed,

    /// The budget ran out; the checkpoint points at `next_index`
    Suspended { next_index: usize },
}

/// Summary of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Session the invocation belonged to
    pub session_key: String,

    /// How the invocation ended
    pub outcome: RunOutcome,

    /// Size of the session's work list
    pub total_items: usize,

    /// Offset the invocation started at
    pub start_index: usize,

    /// Items processed successfully in this invocation
    pub processed: usize,

    /// Items skipped after an error in this invocation
    pub failed: usize,

    /// Wall-clock time spent in this invocation
    pub elapsed: Duration,
}

impl RunReport {
    /// Whether the session finished
    pub fn is_complete(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

/// Drives [`BatchJob`]s against a checkpoint store
pub struct BatchRunner {
    store: Arc<dyn CheckpointStore>,
    config: BatchConfig,
}

impl BatchRunner {
    /// Create a runner
    pub fn new(store: Arc<dyn CheckpointStore>, config: BatchConfig) -> Self {
        Self { store, config }
    }

    /// Get the configuration
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run a job under the configured wall-clock budget
    pub async fn run<J: BatchJob>(&self, job: &mut J) -> Result<RunReport> {
        self.config.validate().map_err(SyncError::config)?;
        let budget = TimeBudget::start(self.config.time_budget);
        self.run_until(job, &budget).await
    }

    /// Run a job until it completes or `deadline` expires
    pub async fn run_until<J: BatchJob>(
        &self,
        job: &mut J,
        deadline: &dyn Deadline,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let session_key = job.session_key().to_string();

        let mut checkpoint = match self.store.load::<J::Item, J::State>(&session_key) {
            Some(checkpoint) if checkpoint.is_valid() => {
                info!(
                    "Resuming session {} at item {}/{}",
                    session_key,
                    checkpoint.next_index,
                    checkpoint.items.len()
                );
                checkpoint
            }
            stale => {
                if let Some(stale) = stale {
                    warn!(
                        "Discarding checkpoint for session {}: index {} is outside its {} items",
                        session_key,
                        stale.next_index,
                        stale.items.len()
                    );
                    self.store.clear(&session_key)?;
                }

                info!("Starting new session {}", session_key);
                let (items, state) = job.plan().await?;

                if items.is_empty() {
                    info!("Session {} has no work items, nothing to do", session_key);
                    let report = RunReport {
                        session_key,
                        outcome: RunOutcome::Completed,
                        total_items: 0,
                        start_index: 0,
                        processed: 0,
                        failed: 0,
                        elapsed: started.elapsed(),
                    };
                    job.on_complete(&report, &state).await;
                    return Ok(report);
                }

                let checkpoint = Checkpoint::fresh(items, state);
                self.store.save(&session_key, &checkpoint)?;
                checkpoint
            }
        };

        job.prepare(&checkpoint.state).await?;

        let total_items = checkpoint.items.len();
        let start_index = checkpoint.next_index;
        let mut processed = 0;
        let mut failed = 0;

        while !checkpoint.is_finished() {
            if deadline.expired() {
                let next_index = checkpoint.next_index;
                warn!(
                    "Time budget exhausted for session {}, saving checkpoint at item {}/{}",
                    session_key, next_index, total_items
                );

                job.flush(&mut checkpoint.state).await?;
                checkpoint.touch();
                self.store.save(&session_key, &checkpoint)?;

                return Ok(RunReport {
                    session_key,
                    outcome: RunOutcome::Suspended { next_index },
                    total_items,
                    start_index,
                    processed,
                    failed,
                    elapsed: started.elapsed(),
                });
            }

            let index = checkpoint.next_index;
            debug!("Processing {} item {}/{}", session_key, index + 1, total_items);

            match job.process(&checkpoint.items[index], &mut checkpoint.state).await {
                Ok(()) => processed += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        "Skipping {} item {}/{}: {:#}",
                        session_key,
                        index + 1,
                        total_items,
                        e
                    );
                }
            }

            checkpoint.next_index += 1;

            if !self.config.item_delay.is_zero() {
                tokio::time::sleep(self.config.item_delay).await;
            }
        }

        job.flush(&mut checkpoint.state).await?;
        self.store.clear(&session_key)?;

        let report = RunReport {
            session_key,
            outcome: RunOutcome::Completed,
            total_items,
            start_index,
            processed,
            failed,
            elapsed: started.elapsed(),
        };

        info!(
            "Session {} completed: {} processed, {} failed in {:.2}s",
            report.session_key,
            report.processed,
            report.failed,
            report.elapsed.as_secs_f64()
        );

        job.on_complete(&report, &checkpoint.state).await;

        Ok(report)
    }
}
