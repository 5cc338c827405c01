//! Scrape orchestration: the periodic scheduler and the per-feed worker.
//!
//! # Architecture
//!
//! - [`scheduler`] - ticks on a fixed period, selects up to `concurrency` due
//!   feeds, runs one worker task per feed and waits for the whole batch
//! - [`worker`] - claim → fetch → write entries for a single feed, with every
//!   failure contained to the smallest unit (item, then feed)
//!
//! Both are driven by a [`ScrapeContext`] that carries the settings and the
//! collaborator handles, so nothing here reads global state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::Config;
use crate::feed::FeedRetriever;
use crate::storage::FeedStore;

mod scheduler;
mod worker;

pub use scheduler::{CycleError, CycleReport, Scheduler, SchedulerHandle};
pub use worker::{scrape_feed, FeedOutcome, ScrapeError, Stage};

/// Tunables of the scrape loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeSettings {
    /// Upper bound on feeds per cycle, and so on concurrent workers.
    pub concurrency: usize,
    /// Period between cycle starts.
    pub interval: Duration,
    /// Deadline for each external call a worker makes.
    pub call_timeout: Duration,
}

impl From<&Config> for ScrapeSettings {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            interval: config.interval(),
            call_timeout: config.call_timeout(),
        }
    }
}

/// Everything a cycle needs, passed in explicitly.
#[derive(Clone)]
pub struct ScrapeContext {
    pub store: Arc<dyn FeedStore>,
    pub retriever: Arc<dyn FeedRetriever>,
    pub settings: ScrapeSettings,
}

impl ScrapeContext {
    pub fn new(
        store: Arc<dyn FeedStore>,
        retriever: Arc<dyn FeedRetriever>,
        settings: ScrapeSettings,
    ) -> Self {
        Self {
            store,
            retriever,
            settings,
        }
    }
}

/// Read side of the shutdown signal, cloned into every worker of a batch.
#[derive(Clone)]
pub struct Cancellation(watch::Receiver<bool>);

impl Cancellation {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if the sender
    /// is gone without having fired.
    pub async fn cancelled(&mut self) {
        let closed = self.0.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` under the call deadline, giving up early on cancellation.
    pub(crate) async fn guard<F: Future>(
        &mut self,
        stage: Stage,
        timeout: Duration,
        fut: F,
    ) -> Result<F::Output, ScrapeError> {
        if self.is_cancelled() {
            return Err(ScrapeError::Cancelled(stage));
        }

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(ScrapeError::Cancelled(stage)),
            res = tokio::time::timeout(timeout, fut) => {
                res.map_err(|_| ScrapeError::Timeout(stage, timeout))
            }
        }
    }
}
