use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use super::worker::{scrape_feed, ScrapeError};
use super::{Cancellation, ScrapeContext};
use crate::storage::DatabaseError;

/// Why a cycle dispatched nothing.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Failed to list due feeds: {0}")]
    ListFeeds(#[source] DatabaseError),
    #[error("Listing due feeds timed out")]
    Timeout,
}

/// Summary of one completed cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Feeds handed to workers.
    pub dispatched: usize,
    /// Workers that got through their items.
    pub completed: usize,
    /// Workers that stopped early (claim, fetch, timeout, cancel, panic).
    pub aborted: usize,
    /// Sum of document item counts over completed feeds.
    pub items_found: usize,
    /// Entries newly written over completed feeds.
    pub inserted: usize,
}

/// Periodic driver of scrape cycles.
///
/// Each cycle takes at most `concurrency` due feeds, runs one task per feed,
/// and only returns once every task has finished. Cycles never overlap: a
/// cycle that outlasts the interval delays the next one instead.
pub struct Scheduler {
    ctx: ScrapeContext,
}

/// Handle to a scheduler running in the background.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for it to exit.
    ///
    /// A cycle in flight is cancelled; its workers stop at their next
    /// external call and the batch is still joined before this returns.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Scheduler task failed");
        }
    }
}

impl Scheduler {
    pub fn new(ctx: ScrapeContext) -> Self {
        Self { ctx }
    }

    /// Start the loop on the current runtime.
    pub fn spawn(self) -> SchedulerHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(Cancellation::new(rx)));
        SchedulerHandle { shutdown: tx, task }
    }

    /// Run cycles until `shutdown` fires. The first cycle starts immediately.
    async fn run(self, mut shutdown: Cancellation) {
        let settings = self.ctx.settings;
        tracing::info!(
            concurrency = settings.concurrency,
            interval = ?settings.interval,
            "Scheduler started"
        );

        let mut timer = tokio::time::interval(settings.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            match self.run_cycle_with(shutdown.clone()).await {
                Ok(report) => tracing::debug!(?report, "Cycle finished"),
                Err(e) => tracing::error!(error = %e, "Skipping cycle"),
            }

            if shutdown.is_cancelled() {
                break;
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Run exactly one cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        self.run_cycle_with(Cancellation::never()).await
    }

    async fn run_cycle_with(&self, cancel: Cancellation) -> Result<CycleReport, CycleError> {
        let settings = self.ctx.settings;
        let limit = i64::try_from(settings.concurrency).unwrap_or(i64::MAX);

        let due = self.ctx.store.list_due_feeds(limit);
        let feeds = tokio::time::timeout(settings.call_timeout, due)
            .await
            .map_err(|_| CycleError::Timeout)?
            .map_err(CycleError::ListFeeds)?;

        let mut report = CycleReport {
            dispatched: feeds.len(),
            ..CycleReport::default()
        };
        if feeds.is_empty() {
            tracing::debug!("No feeds due");
            return Ok(report);
        }

        let mut workers = JoinSet::new();
        for feed in feeds {
            let ctx = self.ctx.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                let result = scrape_feed(&ctx, &feed, cancel).await;
                (feed, result)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => {
                    report.completed += 1;
                    report.items_found += outcome.items_found;
                    report.inserted += outcome.inserted;
                }
                Ok((feed, Err(e @ ScrapeError::Cancelled(_)))) => {
                    tracing::debug!(feed = %feed.name, error = %e, "Feed scrape interrupted");
                    report.aborted += 1;
                }
                Ok((feed, Err(e))) => {
                    tracing::warn!(
                        feed_id = %feed.id,
                        feed = %feed.name,
                        url = %feed.url,
                        error = %e,
                        "Feed scrape aborted"
                    );
                    report.aborted += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Feed worker panicked");
                    report.aborted += 1;
                }
            }
        }

        Ok(report)
    }
}
