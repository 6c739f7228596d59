//! Polling workers that drain due timers from the shared registry.
//!
//! Workers share nothing in process; any number of them, in any number of
//! processes, can poll the same registry. An entry whose handler fails is
//! left untouched and picked up again on the next poll.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::dispatch::{Dispatcher, TickOutcome};
use crate::error::AppError;
use crate::timers::{TimerEntry, TimerRegistry};

/// What happened to one due entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Ticked and moved to its next tick.
    Rescheduled,
    /// Timed out (or settled early) and removed.
    Completed,
    /// Left in place for a later poll: handler not done, handler failed, or
    /// another worker got to the entry first.
    Retained,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub rescheduled: usize,
    pub completed: usize,
    pub retained: usize,
}

impl PollStats {
    fn record(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Rescheduled => self.rescheduled += 1,
            EntryOutcome::Completed => self.completed += 1,
            EntryOutcome::Retained => self.retained += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.rescheduled + self.completed + self.retained
    }
}

#[derive(Clone)]
pub struct Worker {
    id: usize,
    timers: Arc<dyn TimerRegistry>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        timers: Arc<dyn TimerRegistry>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            timers,
            dispatcher,
            clock,
            poll_interval,
        }
    }

    /// Poll until `shutdown` fires. Registry failures are logged and retried
    /// on the next interval.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(worker_id = self.id, "Timer worker started");
        match self.timers.repair().await {
            Ok(0) => {}
            Ok(restored) => info!(worker_id = self.id, restored, "Repaired timer registry"),
            Err(err) => warn!(worker_id = self.id, error = %err, "Timer registry repair failed"),
        }

        loop {
            if let Err(err) = self.poll_once().await {
                warn!(worker_id = self.id, error = %err, "Timer poll failed");
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!(worker_id = self.id, "Timer worker stopped");
    }

    /// Fetch everything due now and evaluate it.
    pub async fn poll_once(&self) -> Result<PollStats, AppError> {
        let now = self.clock.unix_now();
        let due = self.timers.due(now).await?;
        let mut stats = PollStats::default();
        for entry in due {
            let outcome = match self.evaluate(&entry).await {
                Ok(outcome) => outcome,
                Err(err) if err.is_retryable() => {
                    warn!(
                        worker_id = self.id,
                        session_id = %entry.session_id,
                        timer_name = %entry.timer_name,
                        error = %err,
                        "Timer handler failed, will retry"
                    );
                    EntryOutcome::Retained
                }
                Err(err) => {
                    error!(
                        worker_id = self.id,
                        session_id = %entry.session_id,
                        timer_name = %entry.timer_name,
                        error = %err,
                        code = %err.code(),
                        "Timer handler failed with a non-transient error, entry left in place"
                    );
                    EntryOutcome::Retained
                }
            };
            stats.record(outcome);
        }
        if stats.total() > 0 {
            debug!(worker_id = self.id, ?stats, "Timer poll finished");
        }
        Ok(stats)
    }

    /// Tick or time out one entry, then reschedule or remove it.
    pub async fn evaluate(&self, entry: &TimerEntry) -> Result<EntryOutcome, AppError> {
        let now = self.clock.unix_now();
        if !entry.is_expired(now) {
            let outcome = self
                .dispatcher
                .dispatch_tick(&entry.session_id, &entry.timer_name, entry.time_remaining(now))
                .await?;
            if outcome == TickOutcome::Continue {
                let moved = self.timers.reschedule(entry, now + entry.frequency).await?;
                return Ok(if moved {
                    EntryOutcome::Rescheduled
                } else {
                    EntryOutcome::Retained
                });
            }
        }

        let done = self
            .dispatcher
            .dispatch_timeout(&entry.session_id, &entry.timer_name)
            .await?;
        if !done {
            return Ok(EntryOutcome::Retained);
        }
        self.timers.remove(entry).await?;
        Ok(EntryOutcome::Completed)
    }
}

/// A set of workers sharing one registry and dispatcher.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        timers: Arc<dyn TimerRegistry>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let handles = (0..count)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    timers.clone(),
                    dispatcher.clone(),
                    clock.clone(),
                    poll_interval,
                );
                tokio::spawn(worker.run(shutdown.clone()))
            })
            .collect();
        Self { handles, shutdown }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every worker and wait for them to finish their current poll.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for result in join_all(self.handles).await {
            if let Err(err) = result {
                warn!(error = %err, "Timer worker panicked");
            }
        }
    }
}
